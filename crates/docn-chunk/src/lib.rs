//! docn-chunk - Chunking strategies
//!
//! Splits raw document text into overlapping, boundary-aware chunks.
//!
//! # Chunkers
//!
//! - [`SlidingWindowChunker`]: fixed-size windows cut at sentence or word
//!   boundaries, producing plain chunk records.
//!
//! - [`SemanticChunker`]: the same windows, plus title, section, chunk type,
//!   keywords and an importance score per chunk.
//!
//! # Example
//!
//! ```rust
//! use docn_chunk::chunk;
//!
//! let chunks = chunk("Hello world. Goodbye world.", 1000, 200).unwrap();
//! assert_eq!(chunks, vec!["Hello world. Goodbye world."]);
//! ```

mod semantic;
mod sliding;

pub use semantic::{
    classify_chunk, detect_headings, extract_keywords, importance_score, Heading, SemanticChunker,
    DEFAULT_KEYWORD_COUNT,
};
pub use sliding::{chunk, chunk_spans, ChunkSpan, SlidingWindowChunker, BOUNDARY_LOOKBACK};

use docn_core::{ChunkingConfig, DocumentChunker, Result};

// Re-export types for convenience
pub use docn_core::{Chunk, ChunkType};

/// Build the chunker selected by the configuration.
pub fn from_config(config: &ChunkingConfig) -> Result<Box<dyn DocumentChunker>> {
    if config.semantic {
        Ok(Box::new(
            SemanticChunker::new(config.chunk_size, config.overlap)?
                .with_keyword_count(config.keyword_count),
        ))
    } else {
        Ok(Box::new(SlidingWindowChunker::new(config.chunk_size, config.overlap)?))
    }
}
