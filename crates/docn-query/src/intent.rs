//! Query intent classification.
//!
//! Keyword matching is case-insensitive substring containment, so a
//! keyword inside a longer word still matches ("accountable" contains
//! "count").

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// How a query should be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Counting or aggregate questions.
    Statistical,
    /// Topical search (default).
    SemanticSearch,
    /// Questions about categories, types and other metadata.
    MetadataQuery,
    /// Statistical question restricted to a topic.
    Hybrid,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Statistical => "statistical",
            Self::SemanticSearch => "semantic_search",
            Self::MetadataQuery => "metadata_query",
            Self::Hybrid => "hybrid",
        };
        write!(f, "{}", s)
    }
}

const STATISTICAL_KEYWORDS: &[&str] = &[
    // English
    "how many",
    "count",
    "number of",
    "statistics",
    // Italian
    "quanti",
    "quante",
    "numero di",
    "conta",
    "statistiche",
];

const SEMANTIC_KEYWORDS: &[&str] = &[
    // English
    "about",
    "related to",
    "regarding",
    "concerning",
    "discuss",
    "talk about",
    // Italian
    "riguardo",
    "relativ",
    "parlano di",
    "che parlano",
    "riguardano",
    "inerenti",
];

const METADATA_KEYWORDS: &[&str] = &[
    // English
    "what categories",
    "which categories",
    "list categories",
    "available categories",
    "list types",
    "what types",
    "which types",
    // Italian
    "quali categorie",
    "che tipi",
    "quali tipi",
    "elenca",
];

const TOTALIZING_PHRASES: &[&str] = &["in total", "in the system", "in totale", "nel sistema"];

/// A single word followed by a question mark, e.g. "pdf?".
static BARE_WORD_QUESTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+\?$").unwrap());

/// Lowercase, trim and collapse internal whitespace.
fn normalize(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Classify a query. Blank queries are `SemanticSearch`.
pub fn classify(query: &str) -> Intent {
    let normalized = normalize(query);
    if normalized.is_empty() {
        return Intent::SemanticSearch;
    }

    let statistical = contains_any(&normalized, STATISTICAL_KEYWORDS);
    let semantic = contains_any(&normalized, SEMANTIC_KEYWORDS);

    if statistical && semantic {
        Intent::Hybrid
    } else if statistical {
        Intent::Statistical
    } else if contains_any(&normalized, METADATA_KEYWORDS) {
        Intent::MetadataQuery
    } else if BARE_WORD_QUESTION_RE.is_match(&normalized)
        || contains_any(&normalized, TOTALIZING_PHRASES)
    {
        Intent::Statistical
    } else {
        Intent::SemanticSearch
    }
}
