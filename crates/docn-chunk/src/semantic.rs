//! Semantic chunker.
//!
//! Uses the sliding window for boundaries, then attaches structural
//! metadata to each chunk: the document title, the nearest preceding
//! heading, a chunk type, keywords and an importance score.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use ulid::Ulid;

use docn_core::text::{is_stop_word, tokenize};
use docn_core::{Chunk, ChunkType, DocumentChunker, Result};

use crate::sliding::{chunk_spans, validate_window};

/// Keywords extracted per chunk unless configured otherwise.
pub const DEFAULT_KEYWORD_COUNT: usize = 5;

/// Longest line (in characters) still considered a heading candidate.
const MAX_HEADING_CHARS: usize = 80;

/// Longest unpunctuated line (in words) treated as a heading.
const MAX_HEADING_WORDS: usize = 8;

static MARKDOWN_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{1,6}\s+(\S.*)$").unwrap());

static NUMBERED_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)*[.)]?\s+\S").unwrap());

static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([-*•+]|\d+[.)])\s+").unwrap());

/// Section words that mark a line as a heading (English and Italian).
const HEADING_KEYWORDS: &[&str] = &[
    "introduction",
    "conclusion",
    "summary",
    "abstract",
    "overview",
    "chapter",
    "section",
    "appendix",
    "references",
    "introduzione",
    "conclusione",
    "conclusioni",
    "sommario",
    "capitolo",
    "sezione",
    "premessa",
    "indice",
    "allegato",
    "riepilogo",
];

/// A heading found in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    /// Character offset of the heading line.
    pub offset: usize,

    /// Heading text, trimmed and without markdown markers.
    pub text: String,
}

/// Chunker that attaches title, section, type, keywords and importance.
#[derive(Debug, Clone)]
pub struct SemanticChunker {
    chunk_size: usize,
    overlap: usize,
    keyword_count: usize,
}

impl SemanticChunker {
    /// Create a semantic chunker, rejecting `overlap >= chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        validate_window(chunk_size, overlap)?;
        Ok(Self {
            chunk_size,
            overlap,
            keyword_count: DEFAULT_KEYWORD_COUNT,
        })
    }

    /// Set the number of keywords extracted per chunk.
    pub fn with_keyword_count(mut self, keyword_count: usize) -> Self {
        self.keyword_count = keyword_count;
        self
    }
}

impl DocumentChunker for SemanticChunker {
    fn chunk_document(&self, document_id: Ulid, text: &str) -> Result<Vec<Chunk>> {
        let spans = chunk_spans(text, self.chunk_size, self.overlap)?;
        if spans.is_empty() {
            return Ok(Vec::new());
        }

        let headings = detect_headings(text);
        let title = headings.first().map(|h| h.text.clone());

        debug!(
            "Semantic chunking: {} spans, {} headings",
            spans.len(),
            headings.len()
        );

        let chunks = spans
            .into_iter()
            .enumerate()
            .map(|(index, span)| {
                let mut chunk = Chunk::new(document_id, index as u32, &span.text, span.start, span.end);
                let chunk_type = classify_chunk(&span.text);

                chunk.title = title.clone();
                chunk.section = section_for(&headings, span.start);
                chunk.keywords = extract_keywords(&span.text, self.keyword_count);
                chunk.chunk_type = chunk_type;
                chunk.importance = importance_score(&span.text, chunk_type);
                chunk
            })
            .collect();

        Ok(chunks)
    }
}

/// Find heading lines, in document order, with their character offsets.
pub fn detect_headings(text: &str) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut offset = 0;

    for line in text.split('\n') {
        let line_chars = line.chars().count();
        let leading = line.chars().take_while(|c| c.is_whitespace()).count();

        if let Some(heading) = heading_text(line.trim()) {
            headings.push(Heading {
                offset: offset + leading,
                text: heading,
            });
        }

        offset += line_chars + 1;
    }

    headings
}

/// Heading text if the trimmed line looks like a heading.
fn heading_text(line: &str) -> Option<String> {
    if line.is_empty() || line.chars().count() > MAX_HEADING_CHARS {
        return None;
    }

    if let Some(caps) = MARKDOWN_HEADING_RE.captures(line) {
        return Some(caps[1].trim().to_string());
    }

    // Bullets and table rows are never headings, but "1. Scope" is.
    if line.contains('|') || line.contains('\t') {
        return None;
    }
    if LIST_ITEM_RE.is_match(line) && !NUMBERED_HEADING_RE.is_match(line) {
        return None;
    }

    if is_all_caps(line) || NUMBERED_HEADING_RE.is_match(line) {
        return Some(line.to_string());
    }

    let lower = line.to_lowercase();
    if HEADING_KEYWORDS.iter().any(|k| lower.starts_with(k)) {
        return Some(line.to_string());
    }

    let starts_upper = line.chars().next().is_some_and(|c| c.is_uppercase());
    let unpunctuated = !line.ends_with(['.', '!', '?', ',', ';', ':']);
    if starts_upper && unpunctuated && line.split_whitespace().count() <= MAX_HEADING_WORDS {
        return Some(line.to_string());
    }

    None
}

/// Nearest heading at or before `offset`.
fn section_for(headings: &[Heading], offset: usize) -> Option<String> {
    headings
        .iter()
        .take_while(|h| h.offset <= offset)
        .last()
        .map(|h| h.text.clone())
}

/// At least one letter, and no lowercase letters.
fn is_all_caps(text: &str) -> bool {
    let mut letters = text.chars().filter(|c| c.is_alphabetic()).peekable();
    letters.peek().is_some() && letters.all(|c| !c.is_lowercase())
}

/// Classify a chunk's structure.
pub fn classify_chunk(text: &str) -> ChunkType {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ChunkType::Empty;
    }

    let lines: Vec<&str> = trimmed
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let list_lines = lines.iter().filter(|l| LIST_ITEM_RE.is_match(l)).count();
    if list_lines * 2 > lines.len() {
        return ChunkType::List;
    }

    let separators = trimmed.chars().filter(|&c| c == '\t' || c == '|').count();
    if separators >= lines.len() * 2 {
        return ChunkType::Table;
    }

    if trimmed.chars().count() < 100 && is_all_caps(trimmed) {
        return ChunkType::Heading;
    }
    if lines.len() == 1 && MARKDOWN_HEADING_RE.is_match(trimmed) {
        return ChunkType::Heading;
    }

    ChunkType::Paragraph
}

/// Most frequent terms, ignoring stop words, numbers and short tokens.
///
/// Ties break alphabetically so the result is deterministic.
pub fn extract_keywords(text: &str, count: usize) -> Vec<String> {
    let mut frequencies: HashMap<String, usize> = HashMap::new();

    for term in tokenize(text) {
        if term.chars().count() < 3
            || is_stop_word(&term)
            || term.chars().all(|c| c.is_numeric())
        {
            continue;
        }
        *frequencies.entry(term).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize)> = frequencies.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(count).map(|(term, _)| term).collect()
}

/// Type base score plus long-text and numeric-density bonuses, capped at 1.0.
pub fn importance_score(text: &str, chunk_type: ChunkType) -> f32 {
    let chars = text.chars().count();
    let mut score = chunk_type.base_importance();

    if chars > 500 {
        score += 0.1;
    }

    if chars > 0 {
        let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
        if digits as f32 / chars as f32 > 0.1 {
            score += 0.1;
        }
    }

    score.min(1.0)
}
