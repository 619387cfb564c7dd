use std::sync::Arc;

use super::store::{DocumentChunk, VectorIndex};
use crate::core::errors::ApiError;
use crate::llm::LlmService;

/// Embeds chunks on the way in and queries on the way out.
#[derive(Clone)]
pub struct DocumentIndex {
    llm: LlmService,
    store: Arc<dyn VectorIndex>,
    embed_batch_size: usize,
}

impl DocumentIndex {
    pub fn new(llm: LlmService, store: Arc<dyn VectorIndex>, embed_batch_size: usize) -> Self {
        Self {
            llm,
            store,
            embed_batch_size: embed_batch_size.max(1),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Embeds and appends `chunks` batch by batch. A failing batch is logged
    /// and dropped; everything indexed before it stays valid. Returns the
    /// number of chunks actually stored.
    pub async fn insert(&self, chunks: Vec<DocumentChunk>) -> usize {
        let mut inserted = 0;

        for batch in chunks.chunks(self.embed_batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = match self.llm.embed(&texts).await {
                Ok(vectors) if vectors.len() == batch.len() => vectors,
                Ok(vectors) => {
                    tracing::warn!(
                        "Dropping batch: {} embeddings for {} chunks",
                        vectors.len(),
                        batch.len()
                    );
                    continue;
                }
                Err(err) => {
                    tracing::warn!("Dropping batch of {} chunks: embedding failed: {}", batch.len(), err);
                    continue;
                }
            };

            let embedded: Vec<DocumentChunk> = batch
                .iter()
                .cloned()
                .zip(embeddings)
                .map(|(mut chunk, embedding)| {
                    chunk.embedding = embedding;
                    chunk
                })
                .collect();

            match self.store.insert_batch(embedded).await {
                Ok(count) => inserted += count,
                Err(err) => {
                    tracing::warn!("Dropping batch of {} chunks: insert failed: {}", batch.len(), err);
                }
            }
        }

        inserted
    }

    /// The `k` stored chunks closest to `query`, nearest first. An empty
    /// index yields an empty list without calling the embedding provider.
    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<DocumentChunk>, ApiError> {
        if k == 0 || self.store.count().await? == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.llm.embed_one(query).await?;
        let hits = self.store.search(&query_embedding, k).await?;
        Ok(hits.into_iter().map(|hit| hit.chunk).collect())
    }

    pub async fn count(&self) -> Result<usize, ApiError> {
        self.store.count().await
    }
}
