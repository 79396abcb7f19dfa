//! Core domain types for the retrieval core.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::DocnError;
use crate::text::estimate_tokens;

/// Structural classification of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    #[default]
    Paragraph,
    Heading,
    List,
    Table,
    Empty,
}

impl ChunkType {
    /// Base importance before length and numeric-density bonuses.
    pub fn base_importance(&self) -> f32 {
        match self {
            Self::Heading => 0.9,
            Self::Table => 0.8,
            Self::List => 0.7,
            Self::Paragraph => 0.5,
            Self::Empty => 0.0,
        }
    }
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Paragraph => "paragraph",
            Self::Heading => "heading",
            Self::List => "list",
            Self::Table => "table",
            Self::Empty => "empty",
        };
        write!(f, "{}", s)
    }
}

/// A chunk of a document, the atomic retrieval unit.
///
/// Chunks are never mutated after creation; reprocessing a document
/// regenerates all of its chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique identifier (ULID).
    pub id: Ulid,

    /// Parent document ID.
    pub document_id: Ulid,

    /// Index within the document (0-based).
    pub index: u32,

    /// Chunk text (trimmed).
    pub text: String,

    /// Start offset in the source text, in characters.
    pub start_offset: usize,

    /// End offset in the source text, in characters (exclusive).
    pub end_offset: usize,

    /// Rough token estimate, `ceil(chars / 4)`. Not a tokenizer count.
    pub token_estimate: usize,

    /// Document title (first heading of the document).
    pub title: Option<String>,

    /// Nearest heading preceding the chunk.
    pub section: Option<String>,

    /// Most frequent non-stop-word terms.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Structural classification.
    #[serde(default)]
    pub chunk_type: ChunkType,

    /// Importance score in [0, 1].
    #[serde(default)]
    pub importance: f32,

    /// Blake3 hash of the chunk text.
    #[serde(with = "serde_hash_opt", default)]
    pub content_hash: Option<[u8; 32]>,
}

impl Chunk {
    /// Create a new plain chunk with no structural metadata.
    pub fn new(document_id: Ulid, index: u32, text: &str, start_offset: usize, end_offset: usize) -> Self {
        let content_hash = blake3::hash(text.as_bytes());

        Self {
            id: Ulid::new(),
            document_id,
            index,
            text: text.to_string(),
            start_offset,
            end_offset,
            token_estimate: estimate_tokens(text),
            title: None,
            section: None,
            keywords: Vec::new(),
            chunk_type: ChunkType::Paragraph,
            importance: ChunkType::Paragraph.base_importance(),
            content_hash: Some(*content_hash.as_bytes()),
        }
    }

    /// Check if the text differs from this chunk by comparing hashes.
    pub fn content_changed(&self, new_text: &str) -> bool {
        let new_hash = blake3::hash(new_text.as_bytes());
        self.content_hash
            .map(|h| h != *new_hash.as_bytes())
            .unwrap_or(true)
    }
}

/// A metadata value: string or number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Number(f64),
    Text(String),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl std::fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Metadata attached to a vector entry.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Exact-match metadata filter; all pairs must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub conditions: BTreeMap<String, MetadataValue>,
}

impl MetadataFilter {
    /// Create an empty filter (matches everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key/value condition.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.conditions.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Whether every condition is present with an equal value.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions
            .iter()
            .all(|(key, value)| metadata.get(key) == Some(value))
    }
}

/// An embedding stored in a vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    /// Chunk ID this vector belongs to.
    pub id: Ulid,

    /// Embedding vector; all entries of one index share a dimension.
    pub embedding: Vec<f32>,

    /// Filterable metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

impl VectorEntry {
    pub fn new(id: Ulid, embedding: Vec<f32>) -> Self {
        Self {
            id,
            embedding,
            metadata: Metadata::new(),
        }
    }

    /// Attach a metadata pair.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn dimension(&self) -> usize {
        self.embedding.len()
    }
}

/// A raw nearest-neighbor hit from a vector store.
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub entry: VectorEntry,
    pub similarity: f32,
}

/// Vector index strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Approximate nearest neighbor, wide probe.
    Ann,
    /// Clustered approximation, narrow probe.
    ClusteredApprox,
    /// Exact exhaustive scan.
    Flat,
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ann => "ann",
            Self::ClusteredApprox => "clustered_approx",
            Self::Flat => "flat",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for IndexKind {
    type Err = DocnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ann" | "hnsw" => Ok(Self::Ann),
            "clustered_approx" | "clustered" | "ivf" => Ok(Self::ClusteredApprox),
            "flat" | "exact" => Ok(Self::Flat),
            other => Err(DocnError::UnsupportedIndex {
                kind: other.to_string(),
            }),
        }
    }
}

/// A filtered, thresholded vector search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSearchResult {
    /// Chunk ID.
    pub id: Ulid,

    /// Cosine similarity to the query.
    pub similarity: f32,

    /// MMR score at selection time, when reranked.
    pub mmr_score: Option<f32>,

    /// Entry metadata.
    pub metadata: Metadata,

    /// Stored embedding, kept for downstream reranking.
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

impl From<ScoredEntry> for VectorSearchResult {
    fn from(scored: ScoredEntry) -> Self {
        Self {
            id: scored.entry.id,
            similarity: scored.similarity,
            mmr_score: None,
            metadata: scored.entry.metadata,
            embedding: scored.entry.embedding,
        }
    }
}

/// A ranked candidate produced per query. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateResult {
    /// Chunk ID.
    pub chunk_id: Ulid,

    /// BM25 score, if the lexical scorer matched.
    pub lexical_score: Option<f32>,

    /// Cosine similarity, if the vector retriever matched.
    pub similarity_score: Option<f32>,

    /// Weighted fusion of the normalised scores.
    pub fused_score: f32,

    /// MMR score at selection time.
    pub mmr_score: Option<f32>,

    /// Metadata from the vector store, if known.
    #[serde(default)]
    pub metadata: Metadata,
}

/// Outcome of a vector search.
///
/// Separates "no matches" from "store unavailable" without relying on
/// error types, so callers can fall back to lexical search.
#[derive(Debug, Clone)]
pub enum SearchOutcome<T> {
    Hits(Vec<T>),
    NoMatches,
    StoreUnavailable { reason: String },
}

impl<T> SearchOutcome<T> {
    /// Build from a hit list, mapping an empty list to `NoMatches`.
    pub fn from_hits(hits: Vec<T>) -> Self {
        if hits.is_empty() {
            Self::NoMatches
        } else {
            Self::Hits(hits)
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    /// Hits, or an empty list for the other outcomes.
    pub fn into_hits(self) -> Vec<T> {
        match self {
            Self::Hits(hits) => hits,
            Self::NoMatches | Self::StoreUnavailable { .. } => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Hits(hits) => hits.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Optional hash serialization as hex.
mod serde_hash_opt {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<[u8; 32]>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.map(hex::encode).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<[u8; 32]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(encoded) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let bytes = hex::decode(&encoded).map_err(serde::de::Error::custom)?;
        let hash: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("invalid hash length"))?;
        Ok(Some(hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_new_estimates_tokens() {
        let chunk = Chunk::new(Ulid::new(), 0, "abcdefghi", 0, 9);
        assert_eq!(chunk.token_estimate, 3);
        assert_eq!(chunk.chunk_type, ChunkType::Paragraph);
        assert!(!chunk.content_changed("abcdefghi"));
        assert!(chunk.content_changed("abcdefgh"));
    }

    #[test]
    fn test_chunk_hash_roundtrips_as_hex() {
        let chunk = Chunk::new(Ulid::new(), 1, "hello", 0, 5);
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["content_hash"].as_str().unwrap().len(), 64);

        let back: Chunk = serde_json::from_value(json).unwrap();
        assert_eq!(back.content_hash, chunk.content_hash);
    }

    #[test]
    fn test_metadata_value_untagged() {
        let text: MetadataValue = serde_json::from_str("\"pdf\"").unwrap();
        let number: MetadataValue = serde_json::from_str("42").unwrap();
        assert_eq!(text, MetadataValue::Text("pdf".to_string()));
        assert_eq!(number, MetadataValue::Number(42.0));
    }

    #[test]
    fn test_filter_is_and_combined() {
        let entry = VectorEntry::new(Ulid::new(), vec![1.0])
            .with_metadata("type", "pdf")
            .with_metadata("year", 2024i64);

        assert!(MetadataFilter::new().matches(&entry.metadata));
        assert!(MetadataFilter::new().with("type", "pdf").matches(&entry.metadata));
        assert!(MetadataFilter::new()
            .with("type", "pdf")
            .with("year", 2024i64)
            .matches(&entry.metadata));
        assert!(!MetadataFilter::new()
            .with("type", "pdf")
            .with("year", 2023i64)
            .matches(&entry.metadata));
        assert!(!MetadataFilter::new().with("author", "x").matches(&entry.metadata));
    }

    #[test]
    fn test_index_kind_parse() {
        assert_eq!("flat".parse::<IndexKind>().unwrap(), IndexKind::Flat);
        assert_eq!("IVF".parse::<IndexKind>().unwrap(), IndexKind::ClusteredApprox);
        assert_eq!("hnsw".parse::<IndexKind>().unwrap(), IndexKind::Ann);
        assert!("btree".parse::<IndexKind>().is_err());
    }

    #[test]
    fn test_search_outcome_hits() {
        let outcome: SearchOutcome<u32> = SearchOutcome::from_hits(vec![]);
        assert!(matches!(outcome, SearchOutcome::NoMatches));

        let outcome: SearchOutcome<u32> = SearchOutcome::StoreUnavailable {
            reason: "down".to_string(),
        };
        assert!(outcome.is_unavailable());
        assert!(outcome.into_hits().is_empty());

        let outcome = SearchOutcome::from_hits(vec![1, 2]);
        assert_eq!(outcome.len(), 2);
    }
}
