//! docn-query - Query routing and hybrid ranking
//!
//! This crate classifies queries by intent, runs BM25 and vector search
//! side by side, merges their candidates and diversifies the merged list
//! with Maximal Marginal Relevance.
//!
//! # Features
//!
//! - Keyword-based intent classification (English and Italian)
//! - Intent-weighted score fusion, or Reciprocal Rank Fusion
//! - Lexical-only fallback when the vector store is unavailable
//!
//! # Example
//!
//! ```rust,ignore
//! use docn_query::{QueryEngine, QueryRequest};
//! use std::sync::Arc;
//!
//! let engine = QueryEngine::new(Arc::new(bm25), Arc::new(retriever));
//! let request = QueryRequest::new("remote work policy").with_embedding(query_vector);
//! let response = engine.search(&request, &cancel).await?;
//! ```

mod engine;
mod fusion;
mod intent;

pub use engine::{FusionMode, QueryEngine, QueryRequest, QueryResponse};
pub use fusion::{max_normalize, reciprocal_rank_fusion, weighted_fusion, FusionWeights};
pub use intent::{classify, Intent};

// Re-export for convenience
pub use docn_core::CandidateResult;
