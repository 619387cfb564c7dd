use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use webrag_backend::core::logging;
use webrag_backend::server;
use webrag_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let state = AppState::initialize().await?;
    logging::init(&state.paths);

    tracing::info!(
        "LLM provider {} (chat model {}), search via {}, index backend {} ({:?} scope)",
        state.llm.provider_name(),
        state.llm.chat_model(),
        state.search_provider,
        state.orchestrator.shared_index().backend_name(),
        state.orchestrator.index_scope()
    );

    let bind_addr = format!("{}:{}", state.settings.server.host, state.settings.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    println!("WEBRAG_PORT={}", addr.port());
    tracing::info!("Listening on {}", addr);

    let app: Router = server::router::router(state.clone());

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
