//! BM25 formulas.

use docn_core::text::tokenize;

/// Term-frequency saturation.
pub const K1: f64 = 1.5;

/// Length normalization strength.
pub const B: f64 = 0.75;

/// `max(0, ln((n - df + 0.5) / (df + 0.5) + 1))`.
pub fn idf(total_docs: usize, doc_freq: usize) -> f64 {
    let n = total_docs as f64;
    let df = doc_freq as f64;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln().max(0.0)
}

/// Contribution of one query term to a document's score.
///
/// Returns 0 when the term is absent or the average length is not positive.
pub fn bm25_term_weight(idf: f64, tf: usize, doc_len: usize, avg_len: f64) -> f64 {
    if tf == 0 || avg_len <= 0.0 {
        return 0.0;
    }

    let tf = tf as f64;
    let norm = K1 * (1.0 - B + B * (doc_len as f64 / avg_len));
    idf * (tf * (K1 + 1.0)) / (tf + norm)
}

/// Score a document against a query without corpus statistics.
///
/// Every term gets the neutral IDF `ln 2` and the document is its own average
/// length. Useful for ad hoc checks only.
pub fn approximate_bm25_score(query: &str, document: &str) -> f64 {
    let mut terms = tokenize(query);
    terms.sort();
    terms.dedup();

    let doc_terms = tokenize(document);
    if terms.is_empty() || doc_terms.is_empty() {
        return 0.0;
    }

    let doc_len = doc_terms.len();
    let neutral_idf = std::f64::consts::LN_2;

    terms
        .iter()
        .map(|term| {
            let tf = doc_terms.iter().filter(|t| *t == term).count();
            bm25_term_weight(neutral_idf, tf, doc_len, doc_len as f64)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idf() {
        // Term in every document of a large corpus still has positive IDF.
        assert!(idf(100, 100) > 0.0);
        assert!(idf(100, 1) > idf(100, 50));
        assert!((idf(1, 1) - (1.0f64 / 3.0 + 1.0).ln()).abs() < 1e-12);
        assert!(idf(0, 0) >= 0.0);
    }

    #[test]
    fn test_term_weight_guards() {
        assert_eq!(bm25_term_weight(1.0, 0, 10, 10.0), 0.0);
        assert_eq!(bm25_term_weight(1.0, 3, 10, 0.0), 0.0);
    }

    #[test]
    fn test_term_weight_average_document() {
        // With |d| = avgLen the denominator is tf + k1.
        let w = bm25_term_weight(2.0, 2, 10, 10.0);
        assert!((w - 2.0 * 2.0 * 2.5 / 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_approximate_score() {
        assert_eq!(approximate_bm25_score("", "remote work policy"), 0.0);
        assert_eq!(approximate_bm25_score("remote", ""), 0.0);
        assert_eq!(approximate_bm25_score("zebra", "remote work policy"), 0.0);

        let single = approximate_bm25_score("policy", "remote work policy");
        let expected = std::f64::consts::LN_2 * 2.5 / 2.5;
        assert!((single - expected).abs() < 1e-12);

        // Duplicate query terms count once.
        assert_eq!(
            approximate_bm25_score("policy policy", "remote work policy"),
            single
        );
        assert!(approximate_bm25_score("remote policy", "remote work policy") > single);
    }
}
