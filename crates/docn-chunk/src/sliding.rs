//! Sliding-window text chunker.
//!
//! Windows of `chunk_size` characters advance by `chunk_size - overlap`.
//! Each window end is pulled back to the nearest sentence terminator, or
//! failing that the nearest whitespace, within the last 100 characters.

use tracing::debug;
use ulid::Ulid;

use docn_core::{Chunk, DocnError, DocumentChunker, Result};

/// How far back from a window end to look for a natural boundary.
pub const BOUNDARY_LOOKBACK: usize = 100;

/// A trimmed chunk with its character span in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    /// Start offset in characters.
    pub start: usize,

    /// End offset in characters (exclusive).
    pub end: usize,

    /// Trimmed chunk text.
    pub text: String,
}

/// Reject window parameters that could never make progress.
pub fn validate_window(chunk_size: usize, overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(DocnError::invalid_configuration("chunk_size must be positive"));
    }
    if overlap >= chunk_size {
        return Err(DocnError::invalid_configuration(format!(
            "overlap ({}) must be smaller than chunk_size ({})",
            overlap, chunk_size
        )));
    }
    Ok(())
}

/// Split text into trimmed, non-empty chunks of at most `chunk_size` characters.
pub fn chunk(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    Ok(chunk_spans(text, chunk_size, overlap)?
        .into_iter()
        .map(|span| span.text)
        .collect())
}

/// Like [`chunk`], but keeps each chunk's character span.
pub fn chunk_spans(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<ChunkSpan>> {
    validate_window(chunk_size, overlap)?;

    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let stride = chunk_size - overlap;
    let mut spans = Vec::new();
    let mut pos = 0;
    let mut iterations = 0usize;

    while pos < len {
        iterations += 1;
        let window_end = (pos + chunk_size).min(len);
        let cut = if window_end < len {
            find_cut(&chars, pos, window_end)
        } else {
            window_end
        };

        if let Some(span) = trimmed_span(&chars, pos, cut) {
            spans.push(span);
        }

        if cut >= len {
            break;
        }

        // An early cut must not let the stride skip past it.
        let mut next = (pos + stride).min(cut);
        if next <= pos {
            next = window_end;
        }
        pos = next;
    }

    debug!(
        "Chunked {} chars into {} chunks in {} iterations",
        len,
        spans.len(),
        iterations
    );

    Ok(spans)
}

/// Find where a window ending at `window_end` should be cut.
fn find_cut(chars: &[char], pos: usize, window_end: usize) -> usize {
    let floor = window_end.saturating_sub(BOUNDARY_LOOKBACK).max(pos + 1);

    if let Some(i) = (floor..window_end)
        .rev()
        .find(|&i| matches!(chars[i], '.' | '!' | '?'))
    {
        return i + 1;
    }

    if let Some(i) = (floor..window_end).rev().find(|&i| chars[i].is_whitespace()) {
        return i + 1;
    }

    window_end
}

/// Trim whitespace from `chars[start..end]`, returning None if nothing is left.
fn trimmed_span(chars: &[char], start: usize, end: usize) -> Option<ChunkSpan> {
    let first = (start..end).find(|&i| !chars[i].is_whitespace())?;
    let last = (first..end).rev().find(|&i| !chars[i].is_whitespace())?;

    Some(ChunkSpan {
        start: first,
        end: last + 1,
        text: chars[first..=last].iter().collect(),
    })
}

/// Chunker producing plain chunk records with no structural metadata.
#[derive(Debug, Clone)]
pub struct SlidingWindowChunker {
    chunk_size: usize,
    overlap: usize,
}

impl SlidingWindowChunker {
    /// Create a chunker, rejecting `overlap >= chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        validate_window(chunk_size, overlap)?;
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

impl DocumentChunker for SlidingWindowChunker {
    fn chunk_document(&self, document_id: Ulid, text: &str) -> Result<Vec<Chunk>> {
        let spans = chunk_spans(text, self.chunk_size, self.overlap)?;

        Ok(spans
            .into_iter()
            .enumerate()
            .map(|(index, span)| Chunk::new(document_id, index as u32, &span.text, span.start, span.end))
            .collect())
    }
}
