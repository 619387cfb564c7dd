//! In-process stand-ins for the model, search and fetch providers.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use webrag_backend::core::config::{IndexScope, Settings};
use webrag_backend::core::errors::ApiError;
use webrag_backend::llm::{ChatRequest, LlmProvider, LlmService};
use webrag_backend::rag::{DocumentIndex, MemoryVectorIndex};
use webrag_backend::tools::fetch::{Document, PageFetcher};
use webrag_backend::tools::search::{RawSearchHit, SearchProvider, SearchQuery};
use webrag_backend::tools::WebSearchClient;
use webrag_backend::webrag::WebRagOrchestrator;

pub const PROVIDER_DOMAIN: &str = "search.test";
pub const COMPOSED_ANSWER: &str = "Paris is the capital of France, according to Example News.";

const EMBEDDING_DIMS: usize = 16;

/// Answers each kind of prompt with a scripted reply.
pub struct FakeLlm {
    pub decomposition: Option<String>,
    pub router_reply: Option<String>,
    pub composed: Option<String>,
    pub stream_tokens: Vec<String>,
    pub compose_prompts: Mutex<Vec<String>>,
    pub router_calls: AtomicUsize,
    pub direct_calls: AtomicUsize,
}

impl Default for FakeLlm {
    fn default() -> Self {
        Self {
            decomposition: None,
            router_reply: Some("yes".to_string()),
            composed: Some(COMPOSED_ANSWER.to_string()),
            stream_tokens: vec!["Hello".to_string(), ", ".to_string(), "world".to_string()],
            compose_prompts: Mutex::new(Vec::new()),
            router_calls: AtomicUsize::new(0),
            direct_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeLlm {
    pub fn compose_calls(&self) -> usize {
        self.compose_prompts.lock().expect("lock").len()
    }

    pub fn last_compose_prompt(&self) -> String {
        self.compose_prompts
            .lock()
            .expect("lock")
            .last()
            .cloned()
            .unwrap_or_default()
    }
}

fn unavailable(what: &str) -> ApiError {
    ApiError::Upstream(format!("{} unavailable", what))
}

#[async_trait]
impl LlmProvider for FakeLlm {
    fn name(&self) -> &str {
        "fake"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        Ok(true)
    }

    async fn chat(&self, request: ChatRequest, _model_id: &str) -> Result<String, ApiError> {
        let prompt = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        if prompt.contains("numbered list") {
            return self.decomposition.clone().ok_or_else(|| unavailable("decomposition"));
        }
        if prompt.contains("\"yes\" or \"no\"") {
            self.router_calls.fetch_add(1, Ordering::SeqCst);
            return self.router_reply.clone().ok_or_else(|| unavailable("router"));
        }
        if prompt.contains("Context:") {
            self.compose_prompts.lock().expect("lock").push(prompt);
            return self.composed.clone().ok_or_else(|| unavailable("composition"));
        }

        self.direct_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.stream_tokens.concat())
    }

    async fn stream_chat(
        &self,
        _request: ChatRequest,
        _model_id: &str,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        self.direct_calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(self.stream_tokens.len().max(1));
        for token in &self.stream_tokens {
            let _ = tx.send(Ok(token.clone())).await;
        }
        Ok(rx)
    }

    async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        Ok(inputs.iter().map(|text| bag_of_words(text)).collect())
    }
}

/// Word-bucket counts; similar texts land close together.
pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; EMBEDDING_DIMS];
    for word in text.split_whitespace() {
        let bucket = word
            .to_lowercase()
            .bytes()
            .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
        vector[bucket % EMBEDDING_DIMS] += 1.0;
    }
    vector
}

/// Returns scripted hits per query and records every call.
#[derive(Default)]
pub struct FakeSearch {
    pub hits: HashMap<String, Vec<RawSearchHit>>,
    pub calls: Mutex<Vec<String>>,
    /// Panics with this message instead of answering.
    pub panic_with: Option<String>,
}

impl FakeSearch {
    pub fn with_hits(mut self, query: &str, hits: Vec<RawSearchHit>) -> Self {
        self.hits.insert(query.to_string(), hits);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    fn name(&self) -> &str {
        "fake-search"
    }

    fn provider_domain(&self) -> &str {
        PROVIDER_DOMAIN
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawSearchHit>, ApiError> {
        self.calls.lock().expect("lock").push(query.text.clone());
        if let Some(message) = &self.panic_with {
            panic!("{}", message);
        }
        Ok(self.hits.get(&query.text).cloned().unwrap_or_default())
    }
}

/// Three well-formed hits for `query` on distinct hosts.
pub fn hits_for(query: &str) -> Vec<RawSearchHit> {
    let slug = query.to_lowercase().replace(' ', "-");
    (1..=3)
        .map(|n| RawSearchHit {
            title: format!("{} result {}", query, n),
            url: format!("https://site{}.example/{}", n, slug),
            snippet: format!("Snippet {} about {}", n, query),
        })
        .collect()
}

/// Serves a short page per url; batches containing a failing url error out.
#[derive(Default)]
pub struct FakeFetcher {
    pub failing: HashSet<String>,
    pub fail_everything: bool,
    pub panic_with: Option<String>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch_all(&self, urls: &[String]) -> Result<Vec<Document>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.panic_with {
            panic!("{}", message);
        }
        if self.fail_everything || urls.iter().any(|url| self.failing.contains(url)) {
            return Err(ApiError::Upstream("every page failed to load".to_string()));
        }
        Ok(urls
            .iter()
            .map(|url| Document {
                url: url.clone(),
                raw_text: format!("Page body from {}. Paris is the capital of France.", url),
            })
            .collect())
    }
}

/// Settings with no retry delays so empty searches finish immediately.
pub fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.search.base_delay_ms = 0;
    settings.search.max_jitter_ms = 0;
    settings.rag.index_scope = IndexScope::Global;
    settings
}

pub struct Harness {
    pub llm: Arc<FakeLlm>,
    pub search: Arc<FakeSearch>,
    pub fetcher: Arc<FakeFetcher>,
    pub index: DocumentIndex,
    pub orchestrator: WebRagOrchestrator,
}

pub fn harness(llm: FakeLlm, search: FakeSearch, fetcher: FakeFetcher, settings: &Settings) -> Harness {
    let llm = Arc::new(llm);
    let search = Arc::new(search);
    let fetcher = Arc::new(fetcher);

    let service = LlmService::new(llm.clone(), settings.llm.clone());
    let index = DocumentIndex::new(
        service.clone(),
        Arc::new(MemoryVectorIndex::new()),
        settings.rag.embed_batch_size,
    );
    let orchestrator = WebRagOrchestrator::new(
        service,
        WebSearchClient::new(search.clone(), &settings.search),
        fetcher.clone(),
        index.clone(),
        settings,
    );

    Harness {
        llm,
        search,
        fetcher,
        index,
        orchestrator,
    }
}
