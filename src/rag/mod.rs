//! Retrieval side of the pipeline.
//!
//! - `Chunker`: splits fetched pages into overlapping windows
//! - `VectorIndex`: append-only chunk storage (memory or SQLite)
//! - `DocumentIndex`: embeds chunks and queries against a `VectorIndex`

mod chunker;
mod index;
mod memory;
mod sqlite;
mod store;

pub use chunker::{Chunker, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use index::DocumentIndex;
pub use memory::MemoryVectorIndex;
pub use sqlite::SqliteVectorIndex;
pub use store::{DocumentChunk, ScoredChunk, VectorIndex};
