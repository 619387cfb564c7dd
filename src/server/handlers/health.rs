use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn ping() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "initialized": true,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

/// Reachability of the model endpoint plus a summary of the index.
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let llm_reachable = state.llm.health_check().await;
    let index = state.orchestrator.shared_index();
    let indexed_chunks = match index.count().await {
        Ok(count) => count,
        Err(err) => {
            tracing::warn!("Failed to count indexed chunks: {}", err);
            0
        }
    };

    Json(json!({
        "status": if llm_reachable { "ok" } else { "degraded" },
        "provider": state.llm.provider_name(),
        "chat_model": state.llm.chat_model(),
        "search_provider": state.search_provider,
        "index_backend": index.backend_name(),
        "index_scope": state.orchestrator.index_scope(),
        "indexed_chunks": indexed_chunks,
        "llm_reachable": llm_reachable,
        "started_at": state.started_at_utc.to_rfc3339(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}
