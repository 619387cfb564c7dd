//! VectorIndex trait — abstract interface for chunk storage backends.
//!
//! Backends are append-only and internally synchronized, so one instance can
//! be shared across concurrent requests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// A slice of a fetched page, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub source_url: String,
    pub text: String,
    /// Position of this chunk within its source page.
    pub chunk_index: usize,
    /// Character offset in the source page.
    pub start_offset: usize,
    /// Empty until the chunk has been embedded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
}

/// Result of a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    /// Cosine similarity (higher = closer).
    pub score: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Append embedded chunks. Chunks without an embedding are rejected.
    async fn insert_batch(&self, chunks: Vec<DocumentChunk>) -> Result<usize, ApiError>;

    /// The `limit` chunks closest to `query_embedding`, nearest first.
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, ApiError>;

    async fn count(&self) -> Result<usize, ApiError>;
}

pub(crate) fn ensure_embedded(chunks: &[DocumentChunk]) -> Result<(), ApiError> {
    if let Some(chunk) = chunks.iter().find(|c| c.embedding.is_empty()) {
        return Err(ApiError::BadRequest(format!(
            "chunk {} of {} has no embedding",
            chunk.chunk_index, chunk.source_url
        )));
    }
    Ok(())
}
