//! Core traits defining the interfaces between components.

use async_trait::async_trait;
use ulid::Ulid;

use crate::error::Result;
use crate::types::{Chunk, IndexKind, ScoredEntry, VectorEntry};

/// External vector store contract.
///
/// The retrieval core never owns vector storage; it wraps this contract
/// with filtering, thresholding and reranking.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Upsert a single vector.
    async fn store_vector(&self, entry: VectorEntry) -> Result<()>;

    /// Fetch a vector by ID.
    async fn get_vector(&self, id: Ulid) -> Result<Option<VectorEntry>>;

    /// Delete a vector; returns whether it existed.
    async fn delete_vector(&self, id: Ulid) -> Result<bool>;

    /// Upsert a batch atomically.
    ///
    /// Either every entry is stored and the full batch size is returned,
    /// or nothing is stored and an error is returned.
    async fn batch_store_vectors(&self, entries: &[VectorEntry]) -> Result<usize>;

    /// Create or replace a named index (drop-then-create semantics).
    async fn create_or_update_index(&self, name: &str, kind: IndexKind) -> Result<()>;

    /// Raw nearest-neighbor primitive: up to `k` entries by descending cosine similarity.
    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<ScoredEntry>>;

    /// Dimension shared by all entries, once known.
    fn dimension(&self) -> Option<usize>;
}

/// Chunking strategy producing full chunk records.
pub trait DocumentChunker: Send + Sync {
    /// Chunk a document's text into records owned by `document_id`.
    fn chunk_document(&self, document_id: Ulid, text: &str) -> Result<Vec<Chunk>>;
}
