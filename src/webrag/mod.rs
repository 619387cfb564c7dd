//! Web search backed question answering.
//!
//! A run moves through `PipelineStage`s: the question is decomposed into
//! sub-queries, each sub-query is searched and its pages are indexed, the
//! index is queried with the original question, and the completion model
//! composes a cited answer from the retrieved passages.

pub mod composer;
pub mod decomposer;
mod orchestrator;
mod session;
mod stage;

pub use composer::{NO_INFORMATION_ANSWER, NO_INFORMATION_PHRASE};
pub use decomposer::QueryDecomposer;
pub use orchestrator::WebRagOrchestrator;
pub use session::SearchSession;
pub use stage::{PipelineError, PipelineStage, ProgressEvent, ProgressSink, StageOutcome};
