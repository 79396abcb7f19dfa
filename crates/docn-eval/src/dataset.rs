//! Golden dataset and corpus loaders.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;
use ulid::Ulid;

use docn_core::{DocnError, Metadata, Result, VectorEntry};

/// A labeled query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationQuery {
    pub query_id: String,

    pub query_text: String,

    /// Chunks that answer the query.
    #[serde(default)]
    pub relevant_chunk_ids: Vec<Ulid>,

    /// Optional graded relevance; overrides the binary grade of listed ids.
    #[serde(default)]
    pub relevance_scores: HashMap<Ulid, f64>,

    /// Precomputed query embedding.
    #[serde(default)]
    pub query_embedding: Option<Vec<f32>>,
}

impl EvaluationQuery {
    pub fn new(query_id: impl Into<String>, query_text: impl Into<String>) -> Self {
        Self {
            query_id: query_id.into(),
            query_text: query_text.into(),
            relevant_chunk_ids: Vec::new(),
            relevance_scores: HashMap::new(),
            query_embedding: None,
        }
    }

    pub fn with_relevant(mut self, ids: impl IntoIterator<Item = Ulid>) -> Self {
        self.relevant_chunk_ids.extend(ids);
        self
    }

    pub fn with_grade(mut self, id: Ulid, grade: f64) -> Self {
        self.relevance_scores.insert(id, grade);
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.query_embedding = Some(embedding);
        self
    }

    /// Graded relevance: 1.0 for each listed id, then explicit grades.
    pub fn relevance(&self) -> HashMap<Ulid, f64> {
        let mut relevance: HashMap<Ulid, f64> =
            self.relevant_chunk_ids.iter().map(|id| (*id, 1.0)).collect();
        relevance.extend(self.relevance_scores.iter().map(|(id, g)| (*id, *g)));
        relevance
    }

    /// Whether any id has a positive grade.
    pub fn has_relevant(&self) -> bool {
        self.relevance().values().any(|g| *g > 0.0)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GoldenFile {
    Wrapped { queries: Vec<EvaluationQuery> },
    Bare(Vec<EvaluationQuery>),
}

/// Load golden queries from JSON: an array, or an object with a `queries` array.
pub fn load_golden_dataset(path: impl AsRef<Path>) -> Result<Vec<EvaluationQuery>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;

    let queries = match serde_json::from_str::<GoldenFile>(&content) {
        Ok(GoldenFile::Wrapped { queries }) | Ok(GoldenFile::Bare(queries)) => queries,
        Err(e) => {
            return Err(DocnError::Config {
                message: format!("Invalid golden dataset {:?}: {}", path, e),
            })
        }
    };

    info!("Loaded {} golden queries from {:?}", queries.len(), path);
    Ok(queries)
}

/// A corpus chunk as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusRecord {
    pub id: Ulid,

    pub text: String,

    #[serde(default)]
    pub embedding: Option<Vec<f32>>,

    #[serde(default)]
    pub metadata: Metadata,
}

impl CorpusRecord {
    /// Vector entry for records that carry an embedding.
    pub fn vector_entry(&self) -> Option<VectorEntry> {
        self.embedding.as_ref().map(|embedding| VectorEntry {
            id: self.id,
            embedding: embedding.clone(),
            metadata: self.metadata.clone(),
        })
    }
}

/// Load corpus chunks from a JSON array; ids must be unique.
pub fn load_corpus(path: impl AsRef<Path>) -> Result<Vec<CorpusRecord>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let records: Vec<CorpusRecord> = serde_json::from_str(&content)?;

    let mut seen = std::collections::HashSet::new();
    if let Some(dup) = records.iter().find(|r| !seen.insert(r.id)) {
        return Err(DocnError::Config {
            message: format!("Duplicate chunk id {} in {:?}", dup.id, path),
        });
    }

    info!("Loaded {} corpus chunks from {:?}", records.len(), path);
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_relevance_merges_grades() {
        let a = Ulid::from(1u128);
        let b = Ulid::from(2u128);
        let query = EvaluationQuery::new("q1", "remote work")
            .with_relevant([a, b])
            .with_grade(b, 3.0);

        let relevance = query.relevance();
        assert_eq!(relevance[&a], 1.0);
        assert_eq!(relevance[&b], 3.0);
        assert!(query.has_relevant());
        assert!(!EvaluationQuery::new("q2", "x").has_relevant());
    }

    #[test]
    fn test_load_golden_both_shapes() {
        let id = Ulid::from(7u128);
        let bare = format!(
            r#"[{{"query_id": "q1", "query_text": "remote work", "relevant_chunk_ids": ["{}"]}}]"#,
            id
        );
        let file = write_temp(&bare);
        let queries = load_golden_dataset(file.path()).unwrap();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].relevant_chunk_ids, vec![id]);

        let wrapped = format!(
            r#"{{"queries": [{{"query_id": "q1", "query_text": "x", "relevance_scores": {{"{}": 2.0}}}}]}}"#,
            id
        );
        let file = write_temp(&wrapped);
        let queries = load_golden_dataset(file.path()).unwrap();
        assert_eq!(queries[0].relevance()[&id], 2.0);
    }

    #[test]
    fn test_load_golden_rejects_garbage() {
        let file = write_temp(r#"{"not": "queries"}"#);
        let err = load_golden_dataset(file.path()).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_load_corpus() {
        let a = Ulid::from(1u128);
        let b = Ulid::from(2u128);
        let json = format!(
            r#"[
                {{"id": "{}", "text": "remote work policy", "embedding": [1.0, 0.0], "metadata": {{"category": "hr"}}}},
                {{"id": "{}", "text": "lunch menu"}}
            ]"#,
            a, b
        );
        let file = write_temp(&json);
        let records = load_corpus(file.path()).unwrap();

        assert_eq!(records.len(), 2);
        let entry = records[0].vector_entry().unwrap();
        assert_eq!(entry.embedding, vec![1.0, 0.0]);
        assert_eq!(entry.metadata["category"].to_string(), "hr");
        assert!(records[1].vector_entry().is_none());
    }

    #[test]
    fn test_load_corpus_rejects_duplicates() {
        let a = Ulid::from(1u128);
        let json = format!(
            r#"[{{"id": "{}", "text": "a"}}, {{"id": "{}", "text": "b"}}]"#,
            a, a
        );
        let file = write_temp(&json);
        assert!(load_corpus(file.path()).is_err());
    }
}
