use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use super::composer::{self, NO_INFORMATION_ANSWER};
use super::decomposer::QueryDecomposer;
use super::session::SearchSession;
use super::stage::{report, PipelineError, PipelineStage, ProgressSink, StageOutcome};
use crate::core::config::{IndexScope, Settings};
use crate::llm::LlmService;
use crate::rag::{Chunker, DocumentChunk, DocumentIndex, MemoryVectorIndex};
use crate::tools::fetch::{Document, PageFetcher};
use crate::tools::web_search::WebSearchClient;

/// Runs decompose, search and index, retrieve, then compose for one question.
///
/// Every failure is absorbed here: callers always get an answer string,
/// either the composed answer, the fixed no-information answer, or an
/// error description.
#[derive(Clone)]
pub struct WebRagOrchestrator {
    llm: LlmService,
    decomposer: QueryDecomposer,
    search: WebSearchClient,
    fetcher: Arc<dyn PageFetcher>,
    chunker: Chunker,
    shared_index: DocumentIndex,
    index_scope: IndexScope,
    max_results: usize,
    top_k: usize,
    embed_batch_size: usize,
}

#[derive(Debug, Default)]
struct SubQueryReport {
    results: usize,
    chunks: usize,
}

impl WebRagOrchestrator {
    pub fn new(
        llm: LlmService,
        search: WebSearchClient,
        fetcher: Arc<dyn PageFetcher>,
        shared_index: DocumentIndex,
        settings: &Settings,
    ) -> Self {
        let rag = &settings.rag;
        Self {
            decomposer: QueryDecomposer::new(llm.clone(), rag.decompose, rag.max_sub_queries),
            llm,
            search,
            fetcher,
            chunker: Chunker::new(rag.chunk_size, rag.chunk_overlap),
            shared_index,
            index_scope: rag.index_scope,
            max_results: settings.search.max_results,
            top_k: rag.top_k,
            embed_batch_size: rag.embed_batch_size,
        }
    }

    pub fn index_scope(&self) -> IndexScope {
        self.index_scope
    }

    /// The process-wide index; per-request runs never touch it.
    pub fn shared_index(&self) -> &DocumentIndex {
        &self.shared_index
    }

    pub async fn answer(&self, question: &str) -> String {
        self.answer_with_progress(question, None).await
    }

    /// Like [`answer`](Self::answer), reporting each stage transition to `progress`.
    pub async fn answer_with_progress(&self, question: &str, progress: Option<&ProgressSink>) -> String {
        let run = AssertUnwindSafe(self.run(question, progress)).catch_unwind().await;

        match run {
            Ok(Ok(answer)) => {
                report(progress, PipelineStage::Done, "Answer ready");
                answer
            }
            Ok(Err(err)) => {
                tracing::error!(stage = %err.stage, "WebRAG run failed: {}", err.message);
                report(progress, PipelineStage::Errored, err.to_string());
                error_answer(&err.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic);
                tracing::error!("WebRAG run panicked: {}", message);
                report(progress, PipelineStage::Errored, message.clone());
                error_answer(&message)
            }
        }
    }

    async fn run(&self, question: &str, progress: Option<&ProgressSink>) -> Result<String, PipelineError> {
        report(progress, PipelineStage::Decomposing, "Planning web searches");
        let sub_queries = self.decomposer.expand(question).await;

        let index = self.index_for_run();
        let mut session = SearchSession::new();
        let mut any_results = false;

        for (i, query) in sub_queries.iter().enumerate() {
            report(
                progress,
                PipelineStage::SearchingAndIndexing,
                format!("Searching ({}/{}): {}", i + 1, sub_queries.len(), query),
            );

            match self.search_and_index(query, &index, &mut session).await {
                StageOutcome::Data(outcome) => {
                    any_results = true;
                    tracing::info!(
                        "Sub-query {:?}: {} results, {} chunks indexed",
                        query,
                        outcome.results,
                        outcome.chunks
                    );
                }
                StageOutcome::Empty => {
                    tracing::info!("Sub-query {:?} returned no results", query);
                }
                StageOutcome::Failed(err) => {
                    tracing::warn!("Sub-query {:?} skipped: {}", query, err);
                }
            }
        }

        if !any_results {
            tracing::info!("No sub-query produced results; answering without composition");
            return Ok(NO_INFORMATION_ANSWER.to_string());
        }

        report(progress, PipelineStage::Retrieving, "Selecting relevant passages");
        let context = match self.retrieve(&index, question).await {
            StageOutcome::Data(chunks) => chunks
                .iter()
                .map(|chunk| chunk.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            StageOutcome::Empty => {
                tracing::info!("Index had no matching passages; using search snippets as context");
                session.snippet_context()
            }
            StageOutcome::Failed(err) => {
                tracing::warn!("{}; using search snippets as context", err);
                session.snippet_context()
            }
        };

        report(progress, PipelineStage::Composing, "Writing the answer");
        let raw = self
            .llm
            .complete(&composer::build_prompt(&context, question))
            .await
            .map_err(|err| PipelineError::new(PipelineStage::Composing, err.to_string()))?;

        Ok(composer::finish_answer(&raw, &session))
    }

    fn index_for_run(&self) -> DocumentIndex {
        match self.index_scope {
            IndexScope::Global => self.shared_index.clone(),
            IndexScope::Request => DocumentIndex::new(
                self.llm.clone(),
                Arc::new(MemoryVectorIndex::new()),
                self.embed_batch_size,
            ),
        }
    }

    /// Search one sub-query, then fetch, chunk and index its pages. Any
    /// result counts as data even if none of the pages could be indexed.
    async fn search_and_index(
        &self,
        query: &str,
        index: &DocumentIndex,
        session: &mut SearchSession,
    ) -> StageOutcome<SubQueryReport> {
        let results = self.search.search(query, self.max_results).await;
        if results.is_empty() {
            return StageOutcome::Empty;
        }

        let urls: Vec<String> = results.iter().map(|r| r.url.clone()).collect();
        let mut outcome = SubQueryReport {
            results: results.len(),
            chunks: 0,
        };
        session.extend(results);

        let documents = match self.fetch(&urls).await {
            StageOutcome::Data(documents) => documents,
            StageOutcome::Empty => return StageOutcome::Data(outcome),
            StageOutcome::Failed(err) => {
                tracing::warn!("{}", err);
                return StageOutcome::Data(outcome);
            }
        };

        let chunks = self.chunker.split(&documents);
        outcome.chunks = index.insert(chunks).await;
        StageOutcome::Data(outcome)
    }

    async fn fetch(&self, urls: &[String]) -> StageOutcome<Vec<Document>> {
        match self.fetcher.fetch_all(urls).await {
            Ok(documents) if documents.is_empty() => StageOutcome::Empty,
            Ok(documents) => StageOutcome::Data(documents),
            Err(err) => StageOutcome::Failed(PipelineError::new(
                PipelineStage::SearchingAndIndexing,
                format!("fetching {} pages: {}", urls.len(), err),
            )),
        }
    }

    async fn retrieve(&self, index: &DocumentIndex, question: &str) -> StageOutcome<Vec<DocumentChunk>> {
        match index.similarity_search(question, self.top_k).await {
            Ok(chunks) if chunks.is_empty() => StageOutcome::Empty,
            Ok(chunks) => StageOutcome::Data(chunks),
            Err(err) => StageOutcome::Failed(PipelineError::new(
                PipelineStage::Retrieving,
                err.to_string(),
            )),
        }
    }
}

fn error_answer(message: &str) -> String {
    format!("Sorry, something went wrong while researching your question: {message}")
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(42u8)), "unknown panic");
    }

    #[test]
    fn error_answer_includes_cause() {
        let text = error_answer("composing failed: timeout");
        assert!(text.contains("composing failed: timeout"));
        assert!(!text.contains("couldn't find"));
    }
}
