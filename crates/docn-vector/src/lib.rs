//! docn-vector - Vector retrieval and diversity reranking
//!
//! Wraps any [`VectorStore`](docn_core::VectorStore) with the retrieval
//! contract: over-fetching, metadata filtering, similarity thresholds and
//! Maximal Marginal Relevance reranking.
//!
//! # Components
//!
//! - [`VectorRetriever`]: filtered similarity search and MMR search, with
//!   cancellation and explicit store-unavailable outcomes.
//! - [`mmr_select`] / [`resolve_lambda`]: pure MMR selection and the
//!   explicit → configured → default lambda resolver.
//! - [`MemoryVectorStore`]: in-memory store with flat and clustered indexes.

mod memory;
mod mmr;
mod retriever;
mod similarity;

pub use memory::{MemoryVectorStore, EXACT_SCAN_THRESHOLD};
pub use mmr::{mmr_rerank, mmr_select, resolve_lambda, MmrPick};
pub use retriever::{rerank, VectorRetriever};
pub use similarity::cosine_similarity;
