use async_trait::async_trait;
use tokio::sync::RwLock;

use super::store::{ensure_embedded, DocumentChunk, ScoredChunk, VectorIndex};
use crate::core::errors::ApiError;
use crate::tools::vector_math::rank_descending_by_cosine;

/// Process-lifetime index held in memory; brute-force cosine search.
#[derive(Default)]
pub struct MemoryVectorIndex {
    chunks: RwLock<Vec<DocumentChunk>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn insert_batch(&self, chunks: Vec<DocumentChunk>) -> Result<usize, ApiError> {
        ensure_embedded(&chunks)?;
        let inserted = chunks.len();
        self.chunks.write().await.extend(chunks);
        Ok(inserted)
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, ApiError> {
        let chunks = self.chunks.read().await;
        if chunks.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let candidates: Vec<&[f32]> = chunks.iter().map(|c| c.embedding.as_slice()).collect();
        let ranked = rank_descending_by_cosine(query_embedding, &candidates);

        Ok(ranked
            .into_iter()
            .take(limit)
            .map(|(idx, score)| ScoredChunk {
                chunk: chunks[idx].clone(),
                score,
            })
            .collect())
    }

    async fn count(&self) -> Result<usize, ApiError> {
        Ok(self.chunks.read().await.len())
    }
}
