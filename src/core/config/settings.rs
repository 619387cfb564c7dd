//! Typed view of the merged YAML configuration.
//!
//! Every field has a default so an empty config file yields a working
//! keyless setup (DuckDuckGo search, in-memory global index).

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub llm: LlmSettings,
    pub search: SearchSettings,
    pub fetch: FetchSettings,
    pub rag: RagSettings,
}

impl Settings {
    pub fn from_value(config: &Value) -> Result<Self, ApiError> {
        if config.as_object().map(|m| m.is_empty()).unwrap_or(true) {
            return Ok(Self::default());
        }
        serde_json::from_value(config.clone())
            .map_err(|e| ApiError::BadRequest(format!("Invalid config: {}", e)))
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(port) = env::var("PORT").ok().and_then(|v| v.parse::<u16>().ok()) {
            self.server.port = port;
        }
        if let Ok(host) = env::var("WEBRAG_HOST") {
            if !host.trim().is_empty() {
                self.server.host = host.trim().to_string();
            }
        }
        if self.llm.api_key.is_none() {
            self.llm.api_key = env::var("OPENAI_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty());
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    /// Characters per token event when replaying a finished RAG answer.
    pub stream_chunk_chars: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            cors_allowed_origins: Vec::new(),
            stream_chunk_chars: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i32>,
    pub timeout_secs: u64,
    /// Ask the model whether a question needs web search before answering.
    pub router_enabled: bool,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            temperature: Some(0.2),
            max_tokens: None,
            timeout_secs: 120,
            router_enabled: true,
        }
    }
}

impl LlmSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProviderKind {
    Duckduckgo,
    Brave,
    Google,
}

impl SearchProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchProviderKind::Duckduckgo => "duckduckgo",
            SearchProviderKind::Brave => "brave",
            SearchProviderKind::Google => "google",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub provider: SearchProviderKind,
    pub region: String,
    pub safe_search: String,
    pub max_results: usize,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_jitter_ms: u64,
    pub timeout_secs: u64,
    pub brave_search_api_key: Option<String>,
    pub google_search_api_key: Option<String>,
    pub google_search_engine_id: Option<String>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            provider: SearchProviderKind::Duckduckgo,
            region: "wt-wt".to_string(),
            safe_search: "moderate".to_string(),
            max_results: 3,
            max_attempts: 3,
            base_delay_ms: 2_000,
            max_jitter_ms: 1_000,
            timeout_secs: 15,
            brave_search_api_key: None,
            google_search_api_key: None,
            google_search_engine_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    pub max_concurrency: usize,
    pub max_page_chars: usize,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            max_concurrency: 4,
            max_page_chars: 200_000,
            user_agent: concat!("webrag-backend/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexScope {
    /// One index shared by every request for the life of the process.
    Global,
    /// A fresh in-memory index per question.
    Request,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    pub decompose: bool,
    pub max_sub_queries: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub embed_batch_size: usize,
    pub index_backend: IndexBackend,
    pub index_scope: IndexScope,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            decompose: true,
            max_sub_queries: 5,
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 5,
            embed_batch_size: 32,
            index_backend: IndexBackend::Memory,
            index_scope: IndexScope::Global,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_config_uses_defaults() {
        let settings = Settings::from_value(&json!({})).expect("settings");
        assert_eq!(settings.search.max_results, 3);
        assert_eq!(settings.search.max_attempts, 3);
        assert_eq!(settings.search.base_delay_ms, 2_000);
        assert_eq!(settings.rag.chunk_size, 1000);
        assert_eq!(settings.rag.chunk_overlap, 200);
        assert_eq!(settings.rag.top_k, 5);
        assert_eq!(settings.rag.index_scope, IndexScope::Global);
    }

    #[test]
    fn partial_sections_fill_in_defaults() {
        let settings = Settings::from_value(&json!({
            "search": { "provider": "brave", "brave_search_api_key": "k" },
            "rag": { "index_backend": "sqlite", "index_scope": "request" }
        }))
        .expect("settings");

        assert_eq!(settings.search.provider, SearchProviderKind::Brave);
        assert_eq!(settings.search.region, "wt-wt");
        assert_eq!(settings.rag.index_backend, IndexBackend::Sqlite);
        assert_eq!(settings.rag.index_scope, IndexScope::Request);
        assert_eq!(settings.fetch.max_concurrency, 4);
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let err = Settings::from_value(&json!({ "search": { "provider": "altavista" } }))
            .expect_err("unknown provider");
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
