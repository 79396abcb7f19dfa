//! Rank-quality metrics.
//!
//! Ranks are 1-indexed. Every metric is 0 rather than NaN when its
//! denominator is empty.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// `1/rank` of the first relevant id, or 0.
pub fn reciprocal_rank(ranked: &[Ulid], relevant: &HashSet<Ulid>) -> f64 {
    ranked
        .iter()
        .position(|id| relevant.contains(id))
        .map(|i| 1.0 / (i + 1) as f64)
        .unwrap_or(0.0)
}

/// Discounted cumulative gain of the first `k` grades.
fn dcg(grades: impl Iterator<Item = f64>, k: usize) -> f64 {
    grades
        .take(k)
        .enumerate()
        .map(|(i, rel)| rel / ((i + 2) as f64).log2())
        .sum()
}

/// NDCG@k against graded relevance; 0 when the ideal DCG is 0.
pub fn ndcg_at_k(ranked: &[Ulid], relevance: &HashMap<Ulid, f64>, k: usize) -> f64 {
    let actual = dcg(
        ranked
            .iter()
            .map(|id| relevance.get(id).copied().unwrap_or(0.0)),
        k,
    );

    let mut ideal: Vec<f64> = relevance.values().copied().collect();
    ideal.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let ideal = dcg(ideal.into_iter(), k);

    if ideal <= 0.0 {
        0.0
    } else {
        actual / ideal
    }
}

fn hits_at_k(ranked: &[Ulid], relevant: &HashSet<Ulid>, k: usize) -> usize {
    ranked.iter().take(k).filter(|id| relevant.contains(id)).count()
}

/// Relevant share of the first `k` results actually returned.
pub fn precision_at_k(ranked: &[Ulid], relevant: &HashSet<Ulid>, k: usize) -> f64 {
    let returned = k.min(ranked.len());
    if returned == 0 {
        return 0.0;
    }
    hits_at_k(ranked, relevant, k) as f64 / returned as f64
}

/// Share of all relevant ids found in the first `k` results.
pub fn recall_at_k(ranked: &[Ulid], relevant: &HashSet<Ulid>, k: usize) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    hits_at_k(ranked, relevant, k) as f64 / relevant.len() as f64
}

/// 1 if any of the first `k` results is relevant.
pub fn hit_rate_at_k(ranked: &[Ulid], relevant: &HashSet<Ulid>, k: usize) -> f64 {
    if hits_at_k(ranked, relevant, k) > 0 {
        1.0
    } else {
        0.0
    }
}

/// Mean of precision@i over the ranks `i` holding a relevant id,
/// divided by the number of relevant ids.
pub fn average_precision(ranked: &[Ulid], relevant: &HashSet<Ulid>) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }

    let mut hits = 0usize;
    let mut sum = 0.0;
    for (i, id) in ranked.iter().enumerate() {
        if relevant.contains(id) {
            hits += 1;
            sum += hits as f64 / (i + 1) as f64;
        }
    }
    sum / relevant.len() as f64
}

/// Metrics for one query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryMetrics {
    pub reciprocal_rank: f64,
    pub ndcg: f64,
    pub precision: f64,
    pub recall: f64,
    pub hit_rate: f64,
    pub average_precision: f64,
}

impl QueryMetrics {
    /// Compute every metric at cutoff `k`. Ids with a positive grade are relevant.
    pub fn compute(ranked: &[Ulid], relevance: &HashMap<Ulid, f64>, k: usize) -> Self {
        let relevant: HashSet<Ulid> = relevance
            .iter()
            .filter(|(_, grade)| **grade > 0.0)
            .map(|(id, _)| *id)
            .collect();

        Self {
            reciprocal_rank: reciprocal_rank(ranked, &relevant),
            ndcg: ndcg_at_k(ranked, relevance, k),
            precision: precision_at_k(ranked, &relevant, k),
            recall: recall_at_k(ranked, &relevant, k),
            hit_rate: hit_rate_at_k(ranked, &relevant, k),
            average_precision: average_precision(ranked, &relevant),
        }
    }
}

/// Arithmetic means over all evaluated queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub mrr: f64,
    pub ndcg: f64,
    pub precision: f64,
    pub recall: f64,
    pub hit_rate: f64,
    pub map: f64,
    pub query_count: usize,
}

impl AggregateMetrics {
    pub fn from_queries<'a>(metrics: impl IntoIterator<Item = &'a QueryMetrics>) -> Self {
        let mut total = Self::default();
        for m in metrics {
            total.mrr += m.reciprocal_rank;
            total.ndcg += m.ndcg;
            total.precision += m.precision;
            total.recall += m.recall;
            total.hit_rate += m.hit_rate;
            total.map += m.average_precision;
            total.query_count += 1;
        }

        if total.query_count == 0 {
            return total;
        }

        let n = total.query_count as f64;
        Self {
            mrr: total.mrr / n,
            ndcg: total.ndcg / n,
            precision: total.precision / n,
            recall: total.recall / n,
            hit_rate: total.hit_rate / n,
            map: total.map / n,
            query_count: total.query_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(ns: &[u128]) -> Vec<Ulid> {
        ns.iter().map(|n| Ulid::from(*n)).collect()
    }

    fn set(ns: &[u128]) -> HashSet<Ulid> {
        ids(ns).into_iter().collect()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_reciprocal_rank() {
        assert_eq!(reciprocal_rank(&ids(&[1, 2, 3]), &set(&[1])), 1.0);
        assert_eq!(reciprocal_rank(&ids(&[1, 2, 3]), &set(&[3, 2])), 0.5);
        assert_eq!(reciprocal_rank(&ids(&[1, 2, 3]), &set(&[9])), 0.0);
        assert_eq!(reciprocal_rank(&[], &set(&[1])), 0.0);
    }

    #[test]
    fn test_ndcg_perfect_order_is_one() {
        let relevance = HashMap::from([
            (Ulid::from(1u128), 3.0),
            (Ulid::from(2u128), 2.0),
            (Ulid::from(3u128), 1.0),
        ]);
        assert!(close(ndcg_at_k(&ids(&[1, 2, 3]), &relevance, 3), 1.0));
        assert!(close(ndcg_at_k(&ids(&[1, 2, 3, 4]), &relevance, 10), 1.0));
        assert!(ndcg_at_k(&ids(&[3, 2, 1]), &relevance, 3) < 1.0);
    }

    #[test]
    fn test_ndcg_degenerate() {
        assert_eq!(ndcg_at_k(&ids(&[1, 2]), &HashMap::new(), 5), 0.0);
        let zero = HashMap::from([(Ulid::from(1u128), 0.0)]);
        assert_eq!(ndcg_at_k(&ids(&[1]), &zero, 5), 0.0);
    }

    #[test]
    fn test_ndcg_binary_value() {
        // Relevant at rank 2 only: (1/log2 3) / 1.
        let relevance = HashMap::from([(Ulid::from(2u128), 1.0)]);
        let expected = 1.0 / 3f64.log2();
        assert!(close(ndcg_at_k(&ids(&[1, 2]), &relevance, 2), expected));
        assert_eq!(ndcg_at_k(&ids(&[1, 2]), &relevance, 1), 0.0);
    }

    #[test]
    fn test_precision_and_recall() {
        let ranked = ids(&[1, 2, 3, 4]);
        let relevant = set(&[1, 3, 7]);

        assert!(close(precision_at_k(&ranked, &relevant, 2), 0.5));
        assert!(close(precision_at_k(&ranked, &relevant, 4), 0.5));
        // Only 4 results returned, so k = 10 divides by 4.
        assert!(close(precision_at_k(&ranked, &relevant, 10), 0.5));
        assert_eq!(precision_at_k(&[], &relevant, 5), 0.0);

        assert!(close(recall_at_k(&ranked, &relevant, 4), 2.0 / 3.0));
        assert!(close(recall_at_k(&ranked, &relevant, 1), 1.0 / 3.0));
        assert_eq!(recall_at_k(&ranked, &HashSet::new(), 4), 0.0);
    }

    #[test]
    fn test_hit_rate() {
        let ranked = ids(&[1, 2, 3]);
        assert_eq!(hit_rate_at_k(&ranked, &set(&[3]), 3), 1.0);
        assert_eq!(hit_rate_at_k(&ranked, &set(&[3]), 2), 0.0);
    }

    #[test]
    fn test_average_precision() {
        // Hits at ranks 1 and 3: (1/1 + 2/3) / 2.
        let ap = average_precision(&ids(&[1, 2, 3]), &set(&[1, 3]));
        assert!(close(ap, (1.0 + 2.0 / 3.0) / 2.0));
        // Missing relevant ids still count in the denominator.
        let ap = average_precision(&ids(&[1]), &set(&[1, 9]));
        assert!(close(ap, 0.5));
        assert_eq!(average_precision(&ids(&[1]), &HashSet::new()), 0.0);
    }

    #[test]
    fn test_query_metrics_use_positive_grades() {
        let relevance = HashMap::from([(Ulid::from(1u128), 0.0), (Ulid::from(2u128), 1.0)]);
        let m = QueryMetrics::compute(&ids(&[1, 2]), &relevance, 2);
        assert_eq!(m.reciprocal_rank, 0.5);
        assert_eq!(m.recall, 1.0);
        assert_eq!(m.hit_rate, 1.0);
    }

    #[test]
    fn test_aggregate_means() {
        let a = QueryMetrics {
            reciprocal_rank: 1.0,
            average_precision: 1.0,
            ..Default::default()
        };
        let b = QueryMetrics {
            reciprocal_rank: 0.5,
            ..Default::default()
        };
        let agg = AggregateMetrics::from_queries([a, b].iter());
        assert_eq!(agg.query_count, 2);
        assert!(close(agg.mrr, 0.75));
        assert!(close(agg.map, 0.5));

        assert_eq!(AggregateMetrics::from_queries(&[]), AggregateMetrics::default());
    }
}
