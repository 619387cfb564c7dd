use std::fmt;

use serde::{Serialize, Serializer};
use tokio::sync::mpsc;

use crate::core::errors::ApiError;

/// States of one orchestrator run, in order. `Errored` is reachable from any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Decomposing,
    SearchingAndIndexing,
    Retrieving,
    Composing,
    Done,
    Errored,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Decomposing => "decomposing",
            PipelineStage::SearchingAndIndexing => "searching",
            PipelineStage::Retrieving => "retrieving",
            PipelineStage::Composing => "composing",
            PipelineStage::Done => "done",
            PipelineStage::Errored => "errored",
        }
    }
}

impl Serialize for PipelineStage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a single step produced. Only `Failed` carries an error, and it
/// aborts just that step.
#[derive(Debug)]
pub enum StageOutcome<T> {
    Data(T),
    Empty,
    Failed(PipelineError),
}

#[derive(Debug, Clone)]
pub struct PipelineError {
    pub stage: PipelineStage,
    pub message: String,
}

impl PipelineError {
    pub fn new(stage: PipelineStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.message)
    }
}

impl std::error::Error for PipelineError {}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError::internal(err)
    }
}

/// Stage transition reported while a run is in flight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub stage: PipelineStage,
    pub message: String,
}

pub type ProgressSink = mpsc::UnboundedSender<ProgressEvent>;

pub(crate) fn report(sink: Option<&ProgressSink>, stage: PipelineStage, message: impl Into<String>) {
    if let Some(sink) = sink {
        // A closed receiver only means nobody is listening any more.
        let _ = sink.send(ProgressEvent {
            stage,
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_error_names_its_stage() {
        let err = PipelineError::new(PipelineStage::Composing, "model timed out");
        assert_eq!(err.to_string(), "composing failed: model timed out");
        let api: ApiError = err.into();
        assert!(api.to_string().contains("composing failed"));
    }

    #[test]
    fn report_ignores_missing_or_closed_sinks() {
        report(None, PipelineStage::Decomposing, "ignored");

        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        report(Some(&tx), PipelineStage::Retrieving, "nobody listening");
    }
}
