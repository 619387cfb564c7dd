//! SQLite-backed vector index.
//!
//! Chunks and their embeddings survive restarts; search is brute-force
//! cosine similarity over every stored row. Rows are never pruned.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::store::{ensure_embedded, DocumentChunk, ScoredChunk, VectorIndex};
use crate::core::errors::ApiError;
use crate::tools::vector_math::cosine_similarity;

pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

impl SqliteVectorIndex {
    pub async fn open(db_path: PathBuf) -> Result<Self, ApiError> {
        if let Some(parent) = db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS webrag_chunks (
                chunk_id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                source_url TEXT NOT NULL DEFAULT '',
                chunk_index INTEGER NOT NULL DEFAULT 0,
                start_offset INTEGER NOT NULL DEFAULT 0,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_webrag_source ON webrag_chunks(source_url)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow, embedding: Vec<f32>) -> DocumentChunk {
        let chunk_index: i64 = row.get("chunk_index");
        let start_offset: i64 = row.get("start_offset");
        DocumentChunk {
            source_url: row.get("source_url"),
            text: row.get("content"),
            chunk_index: chunk_index.max(0) as usize,
            start_offset: start_offset.max(0) as usize,
            embedding,
        }
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn insert_batch(&self, chunks: Vec<DocumentChunk>) -> Result<usize, ApiError> {
        if chunks.is_empty() {
            return Ok(0);
        }
        ensure_embedded(&chunks)?;

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        for chunk in &chunks {
            let blob = Self::serialize_embedding(&chunk.embedding);
            sqlx::query(
                "INSERT INTO webrag_chunks (chunk_id, content, source_url, chunk_index, start_offset, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&chunk.text)
            .bind(&chunk.source_url)
            .bind(chunk.chunk_index as i64)
            .bind(chunk.start_offset as i64)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(chunks.len())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, ApiError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT content, source_url, chunk_index, start_offset, embedding
             FROM webrag_chunks
             ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                if embedding_bytes.is_empty() {
                    return None;
                }
                let stored_emb = Self::deserialize_embedding(&embedding_bytes);
                let score = cosine_similarity(query_embedding, &stored_emb);

                Some(ScoredChunk {
                    chunk: Self::row_to_chunk(row, stored_emb),
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);

        Ok(scored)
    }

    async fn count(&self) -> Result<usize, ApiError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM webrag_chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        let cnt: i64 = row.get("cnt");
        Ok(cnt.max(0) as usize)
    }
}
