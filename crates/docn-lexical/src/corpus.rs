//! Corpus statistics and the BM25 index.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use rayon::prelude::*;
use tracing::{debug, info};
use ulid::Ulid;

use docn_core::text::tokenize;

use crate::bm25::{bm25_term_weight, idf};

/// Per-document term statistics.
#[derive(Debug, Clone, Default)]
struct DocStats {
    len: usize,
    tf: HashMap<String, usize>,
}

/// An immutable view of corpus statistics.
///
/// Never mutated after construction; updates build a new snapshot.
#[derive(Debug, Clone, Default)]
pub struct CorpusSnapshot {
    version: u64,
    total_len: usize,
    avg_len: f64,
    doc_freq: HashMap<String, usize>,
    docs: HashMap<Ulid, DocStats>,
}

impl CorpusSnapshot {
    /// Tokenize every document and derive document frequencies and average length.
    pub fn build(version: u64, corpus: &HashMap<Ulid, String>) -> Self {
        let docs: HashMap<Ulid, DocStats> = corpus
            .par_iter()
            .map(|(id, text)| {
                let tokens = tokenize(text);
                let mut tf: HashMap<String, usize> = HashMap::new();
                for token in &tokens {
                    *tf.entry(token.clone()).or_insert(0) += 1;
                }
                (
                    *id,
                    DocStats {
                        len: tokens.len(),
                        tf,
                    },
                )
            })
            .collect();

        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut total_len = 0;
        for stats in docs.values() {
            total_len += stats.len;
            for term in stats.tf.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
        }

        let avg_len = if docs.is_empty() {
            0.0
        } else {
            total_len as f64 / docs.len() as f64
        };

        Self {
            version,
            total_len,
            avg_len,
            doc_freq,
            docs,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of documents.
    pub fn total_docs(&self) -> usize {
        self.docs.len()
    }

    /// Sum of all document lengths, in tokens.
    pub fn total_len(&self) -> usize {
        self.total_len
    }

    /// Average document length in tokens; 0 for an empty corpus.
    pub fn avg_len(&self) -> f64 {
        self.avg_len
    }

    /// Number of documents containing `term`.
    pub fn doc_freq(&self, term: &str) -> usize {
        self.doc_freq.get(term).copied().unwrap_or(0)
    }

    pub fn contains(&self, id: &Ulid) -> bool {
        self.docs.contains_key(id)
    }

    /// IDF of `term` in this corpus.
    pub fn idf(&self, term: &str) -> f64 {
        idf(self.total_docs(), self.doc_freq(term))
    }

    /// Score a corpus document; unknown documents score 0.
    pub fn score_document(&self, query: &str, id: &Ulid) -> f64 {
        match self.docs.get(id) {
            Some(stats) => self.score_stats(&query_terms(query), stats),
            None => 0.0,
        }
    }

    /// Score arbitrary text against this corpus's statistics.
    pub fn score_text(&self, query: &str, text: &str) -> f64 {
        let tokens = tokenize(text);
        let mut tf: HashMap<String, usize> = HashMap::new();
        for token in &tokens {
            *tf.entry(token.clone()).or_insert(0) += 1;
        }
        let stats = DocStats {
            len: tokens.len(),
            tf,
        };
        self.score_stats(&query_terms(query), &stats)
    }

    fn score_stats(&self, terms: &[String], stats: &DocStats) -> f64 {
        if self.avg_len <= 0.0 {
            return 0.0;
        }

        terms
            .iter()
            .map(|term| {
                let tf = stats.tf.get(term).copied().unwrap_or(0);
                bm25_term_weight(self.idf(term), tf, stats.len, self.avg_len)
            })
            .sum()
    }
}

/// Deduplicated query terms.
fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(query)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// A scored corpus document.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub id: Ulid,
    pub score: f64,
}

/// BM25 index over a swappable corpus snapshot.
pub struct Bm25Index {
    snapshot: RwLock<Arc<CorpusSnapshot>>,
    next_version: AtomicU64,
}

impl Bm25Index {
    /// Create an index over an empty corpus.
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(CorpusSnapshot::default())),
            next_version: AtomicU64::new(1),
        }
    }

    /// Current snapshot. Holding it keeps that version alive across updates.
    pub fn snapshot(&self) -> Arc<CorpusSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Rebuild statistics from scratch and swap them in; returns the new version.
    pub fn update_statistics(&self, corpus: &HashMap<Ulid, String>) -> u64 {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        let snapshot = Arc::new(CorpusSnapshot::build(version, corpus));

        info!(
            "Corpus statistics v{}: {} docs, avg length {:.1}, {} terms",
            version,
            snapshot.total_docs(),
            snapshot.avg_len(),
            snapshot.doc_freq.len()
        );

        let mut current = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // A slower concurrent rebuild must not replace a newer one.
        if current.version() < version {
            *current = snapshot;
        }
        version
    }

    /// Score one corpus document.
    pub fn score_document(&self, query: &str, id: &Ulid) -> f64 {
        self.snapshot().score_document(query, id)
    }

    /// Score text that may not be in the corpus.
    pub fn score_text(&self, query: &str, text: &str) -> f64 {
        self.snapshot().score_text(query, text)
    }

    /// Top `top_k` documents with a positive score, best first.
    ///
    /// Ties are broken by ascending id.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<LexicalHit> {
        let snapshot = self.snapshot();
        let terms = query_terms(query);
        if terms.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let mut hits: Vec<LexicalHit> = snapshot
            .docs
            .par_iter()
            .map(|(id, stats)| LexicalHit {
                id: *id,
                score: snapshot.score_stats(&terms, stats),
            })
            .filter(|hit| hit.score > 0.0)
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(top_k);

        debug!(
            "BM25 search v{}: {} terms, {} hits",
            snapshot.version(),
            terms.len(),
            hits.len()
        );

        hits
    }

    pub fn len(&self) -> usize {
        self.snapshot().total_docs()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Bm25Index {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ulid(n: u128) -> Ulid {
        Ulid::from(n)
    }

    fn corpus() -> HashMap<Ulid, String> {
        HashMap::from([
            (
                ulid(1),
                "Our remote work policy allows employees to work from home".to_string(),
            ),
            (
                ulid(2),
                "The security policy covers password rotation".to_string(),
            ),
            (ulid(3), "Lunch menu for the cafeteria".to_string()),
        ])
    }

    #[test]
    fn test_empty_corpus_scores_zero() {
        let index = Bm25Index::new();
        assert!(index.is_empty());
        assert_eq!(index.snapshot().avg_len(), 0.0);
        assert_eq!(index.score_text("remote work", "remote work policy"), 0.0);
        assert_eq!(index.score_document("remote", &ulid(1)), 0.0);
        assert!(index.search("remote", 10).is_empty());
    }

    #[test]
    fn test_statistics() {
        let index = Bm25Index::new();
        let version = index.update_statistics(&corpus());
        let snapshot = index.snapshot();

        assert_eq!(snapshot.version(), version);
        assert_eq!(snapshot.total_docs(), 3);
        // 10 + 6 + 5 tokens
        assert_eq!(snapshot.total_len(), 21);
        assert!((snapshot.avg_len() - 7.0).abs() < 1e-12);
        assert_eq!(snapshot.doc_freq("policy"), 2);
        assert_eq!(snapshot.doc_freq("work"), 1);
        assert_eq!(snapshot.doc_freq("absent"), 0);
    }

    #[test]
    fn test_ranks_full_match_above_partial() {
        let index = Bm25Index::new();
        index.update_statistics(&corpus());

        let hits = index.search("remote work policy", 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, ulid(1));
        assert_eq!(hits[1].id, ulid(2));
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_absent_terms_contribute_nothing() {
        let index = Bm25Index::new();
        index.update_statistics(&corpus());

        assert_eq!(index.score_document("zebra unicorn", &ulid(1)), 0.0);
        assert_eq!(
            index.score_document("policy zebra", &ulid(2)),
            index.score_document("policy", &ulid(2))
        );
        assert!(index.search("zebra", 10).is_empty());
    }

    #[test]
    fn test_duplicate_query_terms_count_once() {
        let index = Bm25Index::new();
        index.update_statistics(&corpus());

        assert_eq!(
            index.score_document("policy policy POLICY", &ulid(2)),
            index.score_document("policy", &ulid(2))
        );
    }

    #[test]
    fn test_score_text_matches_document_score() {
        let index = Bm25Index::new();
        let docs = corpus();
        index.update_statistics(&docs);

        let by_id = index.score_document("security password", &ulid(2));
        let by_text = index.score_text("security password", &docs[&ulid(2)]);
        assert!((by_id - by_text).abs() < 1e-12);
    }

    #[test]
    fn test_update_swaps_snapshot() {
        let index = Bm25Index::new();
        index.update_statistics(&corpus());
        let old = index.snapshot();

        let replacement = HashMap::from([(ulid(9), "remote remote remote".to_string())]);
        index.update_statistics(&replacement);

        // The held snapshot is unaffected.
        assert_eq!(old.total_docs(), 3);
        assert!(old.contains(&ulid(1)));

        let current = index.snapshot();
        assert_eq!(current.total_docs(), 1);
        assert!(current.version() > old.version());
        assert_eq!(index.search("remote", 10)[0].id, ulid(9));
    }

    #[test]
    fn test_search_truncates_and_breaks_ties_by_id() {
        let index = Bm25Index::new();
        let docs = HashMap::from([
            (ulid(3), "apple banana".to_string()),
            (ulid(1), "apple banana".to_string()),
            (ulid(2), "apple banana".to_string()),
            (ulid(4), "cherry".to_string()),
        ]);
        index.update_statistics(&docs);

        let hits = index.search("apple", 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, ulid(1));
        assert_eq!(hits[1].id, ulid(2));
    }
}
