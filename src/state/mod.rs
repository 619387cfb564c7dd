use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::chat::ChatHandler;
use crate::core::config::{AppPaths, ConfigService, IndexBackend, Settings};
use crate::llm::{LlmProvider, LlmService, OpenAiCompatProvider};
use crate::rag::{DocumentIndex, MemoryVectorIndex, SqliteVectorIndex, VectorIndex};
use crate::tools::{build_provider, HttpPageFetcher, PageFetcher, SearchProvider, WebSearchClient};
use crate::webrag::WebRagOrchestrator;

pub mod error;

use error::InitializationError;

/// Application state shared across all routes.
///
/// Holds the loaded settings, the model front, the orchestrator (which owns
/// the process-wide index when `rag.index_scope` is `global`) and the chat
/// handler built on top of them.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: Arc<Settings>,
    pub llm: LlmService,
    pub search_provider: String,
    pub orchestrator: WebRagOrchestrator,
    pub chat: ChatHandler,
    pub started_at: Instant,
    pub started_at_utc: DateTime<Utc>,
}

/// Swappable external collaborators, used by `from_parts`.
pub struct Providers {
    pub llm: Arc<dyn LlmProvider>,
    pub search: Arc<dyn SearchProvider>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub index: Arc<dyn VectorIndex>,
}

impl AppState {
    /// Initializes the application state.
    ///
    /// This process includes:
    /// 1. Resolving paths and loading configuration
    /// 2. Building the LLM, search and fetch clients
    /// 3. Opening the configured vector index backend
    pub async fn initialize() -> Result<Arc<Self>, InitializationError> {
        let paths = Arc::new(AppPaths::new());
        let config = ConfigService::new(paths.clone());
        let settings = config
            .load_settings()
            .map_err(|e| InitializationError::Config(e.into()))?;

        let llm = OpenAiCompatProvider::new(
            settings.llm.base_url.clone(),
            settings.llm.api_key.clone(),
            settings.llm.timeout(),
        )
        .map_err(|e| InitializationError::Llm(e.into()))?;

        let search =
            build_provider(&settings.search).map_err(|e| InitializationError::Search(e.into()))?;

        let fetcher = HttpPageFetcher::new(&settings.fetch)
            .map_err(|e| InitializationError::Fetch(e.into()))?;

        let index: Arc<dyn VectorIndex> = match settings.rag.index_backend {
            IndexBackend::Memory => Arc::new(MemoryVectorIndex::new()),
            IndexBackend::Sqlite => Arc::new(
                SqliteVectorIndex::open(paths.index_db_path.clone())
                    .await
                    .map_err(|e| InitializationError::Index(e.into()))?,
            ),
        };

        let providers = Providers {
            llm: Arc::new(llm),
            search,
            fetcher: Arc::new(fetcher),
            index,
        };

        Ok(Self::from_parts(paths, config, settings, providers))
    }

    /// Wires state from already-built collaborators.
    pub fn from_parts(
        paths: Arc<AppPaths>,
        config: ConfigService,
        settings: Settings,
        providers: Providers,
    ) -> Arc<Self> {
        let llm = LlmService::new(providers.llm, settings.llm.clone());
        let search_provider = providers.search.name().to_string();
        let search = WebSearchClient::new(providers.search, &settings.search);
        let shared_index = DocumentIndex::new(
            llm.clone(),
            providers.index,
            settings.rag.embed_batch_size,
        );

        let orchestrator =
            WebRagOrchestrator::new(llm.clone(), search, providers.fetcher, shared_index, &settings);
        let chat = ChatHandler::new(
            llm.clone(),
            orchestrator.clone(),
            settings.llm.router_enabled,
            settings.server.stream_chunk_chars,
        );

        Arc::new(AppState {
            paths,
            config,
            settings: Arc::new(settings),
            llm,
            search_provider,
            orchestrator,
            chat,
            started_at: Instant::now(),
            started_at_utc: Utc::now(),
        })
    }
}
