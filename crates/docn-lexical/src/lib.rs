//! docn-lexical - BM25 lexical scoring
//!
//! Corpus statistics live in an immutable, versioned [`CorpusSnapshot`].
//! [`Bm25Index::update_statistics`] builds a complete new snapshot and swaps
//! it in, so concurrent scorers see either the old or the new corpus.
//!
//! [`approximate_bm25_score`] scores a single document with no corpus at all.
//! It is a separate, reduced-fidelity mode and should not be used for ranking.

mod bm25;
mod corpus;

pub use bm25::{approximate_bm25_score, bm25_term_weight, idf, B, K1};
pub use corpus::{Bm25Index, CorpusSnapshot, LexicalHit};
