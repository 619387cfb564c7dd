use serde_json::{Map, Value};

use crate::core::errors::ApiError;

pub fn validate_config(config: &Value) -> Result<(), ApiError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 0, 65_535)?;
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
        validate_u64_field(
            server,
            "server.stream_chunk_chars",
            "stream_chunk_chars",
            1,
            10_000,
        )?;
    }

    if let Some(llm) = expect_optional_object(root, "llm")? {
        validate_optional_string_field(llm, "llm.base_url", "base_url")?;
        validate_optional_string_field(llm, "llm.chat_model", "chat_model")?;
        validate_optional_string_field(llm, "llm.embedding_model", "embedding_model")?;
        validate_u64_field(llm, "llm.timeout_secs", "timeout_secs", 1, 3_600)?;
        validate_bool_field(llm, "llm.router_enabled", "router_enabled")?;
    }

    if let Some(search) = expect_optional_object(root, "search")? {
        validate_enum_field(
            search,
            "search.provider",
            "provider",
            &["duckduckgo", "brave", "google"],
        )?;
        validate_optional_string_field(search, "search.region", "region")?;
        validate_enum_field(
            search,
            "search.safe_search",
            "safe_search",
            &["on", "moderate", "off"],
        )?;
        validate_u64_field(search, "search.max_results", "max_results", 1, 50)?;
        validate_u64_field(search, "search.max_attempts", "max_attempts", 1, 10)?;
        validate_u64_field(search, "search.base_delay_ms", "base_delay_ms", 0, 60_000)?;
        validate_u64_field(search, "search.max_jitter_ms", "max_jitter_ms", 0, 60_000)?;
        validate_u64_field(search, "search.timeout_secs", "timeout_secs", 1, 600)?;
    }

    if let Some(fetch) = expect_optional_object(root, "fetch")? {
        validate_u64_field(fetch, "fetch.timeout_secs", "timeout_secs", 1, 600)?;
        validate_u64_field(fetch, "fetch.max_concurrency", "max_concurrency", 1, 64)?;
        validate_u64_field(
            fetch,
            "fetch.max_page_chars",
            "max_page_chars",
            1,
            10_000_000,
        )?;
        validate_optional_string_field(fetch, "fetch.user_agent", "user_agent")?;
    }

    if let Some(rag) = expect_optional_object(root, "rag")? {
        validate_bool_field(rag, "rag.decompose", "decompose")?;
        validate_u64_field(rag, "rag.max_sub_queries", "max_sub_queries", 1, 10)?;
        validate_u64_field(rag, "rag.chunk_size", "chunk_size", 1, 100_000)?;
        validate_u64_field(rag, "rag.chunk_overlap", "chunk_overlap", 0, 100_000)?;
        validate_u64_field(rag, "rag.top_k", "top_k", 1, 100)?;
        validate_u64_field(rag, "rag.embed_batch_size", "embed_batch_size", 1, 2_048)?;
        validate_enum_field(rag, "rag.index_backend", "index_backend", &["memory", "sqlite"])?;
        validate_enum_field(rag, "rag.index_scope", "index_scope", &["global", "request"])?;

        let chunk_size = rag.get("chunk_size").and_then(|v| v.as_u64()).unwrap_or(1000);
        let chunk_overlap = rag.get("chunk_overlap").and_then(|v| v.as_u64()).unwrap_or(200);
        if chunk_overlap >= chunk_size {
            return Err(ApiError::BadRequest(format!(
                "Invalid config at 'rag.chunk_overlap': must be smaller than chunk_size ({})",
                chunk_size
            )));
        }
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ApiError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(config_type_error(key, "object")),
    }
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_bool().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "boolean"))
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_str().is_none() {
        return Err(config_type_error(path, "string"));
    }
    Ok(())
}

fn validate_enum_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    allowed: &[&str],
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if allowed.contains(&text) {
        return Ok(());
    }
    Err(ApiError::BadRequest(format!(
        "Invalid config at '{}': expected one of {}",
        path,
        allowed.join(", ")
    )))
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(ApiError::BadRequest(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> ApiError {
    ApiError::BadRequest(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_empty_and_default_shaped_config() {
        validate_config(&json!({})).expect("empty config");
        validate_config(&json!({
            "search": { "provider": "google", "max_results": 3, "safe_search": "off" },
            "rag": { "chunk_size": 1000, "chunk_overlap": 200, "index_scope": "global" }
        }))
        .expect("valid config");
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk_size() {
        let err = validate_config(&json!({
            "rag": { "chunk_size": 200, "chunk_overlap": 200 }
        }))
        .expect_err("overlap too large");
        assert!(err.to_string().contains("rag.chunk_overlap"));
    }

    #[test]
    fn rejects_out_of_range_attempts_and_bad_types() {
        assert!(validate_config(&json!({ "search": { "max_attempts": 0 } })).is_err());
        assert!(validate_config(&json!({ "search": { "max_results": "3" } })).is_err());
        assert!(validate_config(&json!({ "rag": "memory" })).is_err());
        assert!(validate_config(&json!({ "rag": { "index_backend": "faiss" } })).is_err());
    }
}
