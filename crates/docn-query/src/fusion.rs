//! Candidate merging: weighted score fusion and Reciprocal Rank Fusion (RRF).

use std::collections::HashMap;
use ulid::Ulid;

use crate::intent::Intent;

/// Lexical and semantic weights for weighted fusion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub lexical: f32,
    pub semantic: f32,
}

impl FusionWeights {
    /// Weights routed by query intent.
    pub fn for_intent(intent: Intent) -> Self {
        let (lexical, semantic) = match intent {
            Intent::Statistical | Intent::MetadataQuery => (0.7, 0.3),
            Intent::SemanticSearch => (0.3, 0.7),
            Intent::Hybrid => (0.5, 0.5),
        };
        Self { lexical, semantic }
    }
}

/// Order by fused score descending, then id ascending.
fn sort_fused(fused: &mut [(Ulid, f32)]) {
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
}

/// Fuse multiple result lists using Reciprocal Rank Fusion.
///
/// RRF score = Σ 1 / (rrf_k + rank) over every list containing the id,
/// with 1-indexed ranks. Original scores are ignored.
///
/// # Arguments
/// * `results` - Ranked result lists of (id, original_score) pairs
/// * `rrf_k` - RRF constant; higher values flatten the rank curve
/// * `top_k` - Maximum number of results to return
pub fn reciprocal_rank_fusion(
    results: Vec<Vec<(Ulid, f32)>>,
    rrf_k: u32,
    top_k: usize,
) -> Vec<(Ulid, f32)> {
    let mut scores: HashMap<Ulid, f32> = HashMap::new();

    for result_list in results {
        for (rank, (id, _original_score)) in result_list.into_iter().enumerate() {
            let rrf_score = 1.0 / (rrf_k as f32 + rank as f32 + 1.0);
            *scores.entry(id).or_default() += rrf_score;
        }
    }

    let mut fused: Vec<_> = scores.into_iter().collect();
    sort_fused(&mut fused);
    fused.truncate(top_k);

    fused
}

/// Combine results as a weighted sum of their scores.
///
/// An id missing from a list contributes 0 for that list.
pub fn weighted_fusion(results: Vec<(Vec<(Ulid, f32)>, f32)>, top_k: usize) -> Vec<(Ulid, f32)> {
    let mut scores: HashMap<Ulid, f32> = HashMap::new();

    for (result_list, weight) in results {
        for (id, score) in result_list {
            *scores.entry(id).or_default() += score * weight;
        }
    }

    let mut fused: Vec<_> = scores.into_iter().collect();
    sort_fused(&mut fused);
    fused.truncate(top_k);

    fused
}

/// Divide every score by the largest one.
///
/// Lists whose maximum is not positive are returned unchanged.
pub fn max_normalize(results: &[(Ulid, f32)]) -> Vec<(Ulid, f32)> {
    let max = results.iter().map(|(_, s)| *s).fold(f32::MIN, f32::max);
    if max <= 0.0 {
        return results.to_vec();
    }
    results.iter().map(|(id, s)| (*id, s / max)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ulid(s: &str) -> Ulid {
        // Create deterministic ULIDs from strings for testing
        let hash = s
            .bytes()
            .fold(0u128, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u128));
        Ulid::from(hash)
    }

    #[test]
    fn test_rrf_single_list() {
        let results = vec![vec![(ulid("a"), 0.9), (ulid("b"), 0.8), (ulid("c"), 0.7)]];

        let fused = reciprocal_rank_fusion(results, 60, 10);

        assert_eq!(fused.len(), 3);
        assert_eq!(fused[0].0, ulid("a"));
        assert!((fused[0].1 - 1.0 / 61.0).abs() < 1e-6);
    }

    #[test]
    fn test_rrf_multiple_lists() {
        let results = vec![
            vec![(ulid("a"), 0.9), (ulid("b"), 0.8), (ulid("c"), 0.7)],
            vec![(ulid("b"), 0.95), (ulid("a"), 0.85), (ulid("d"), 0.75)],
        ];

        let fused = reciprocal_rank_fusion(results, 60, 10);

        assert_eq!(fused.len(), 4);
        // a and b tie on 1/61 + 1/62; the tie goes to the lower id.
        let (first, second) = if ulid("a") < ulid("b") {
            (ulid("a"), ulid("b"))
        } else {
            (ulid("b"), ulid("a"))
        };
        assert_eq!(fused[0].0, first);
        assert_eq!(fused[1].0, second);
        assert_eq!(fused[2].0, ulid("c"));
    }

    #[test]
    fn test_rrf_truncation() {
        let results = vec![vec![
            (ulid("a"), 0.9),
            (ulid("b"), 0.8),
            (ulid("c"), 0.7),
            (ulid("d"), 0.6),
            (ulid("e"), 0.5),
        ]];

        let fused = reciprocal_rank_fusion(results, 60, 3);

        assert_eq!(fused.len(), 3);
    }

    #[test]
    fn test_weighted_fusion() {
        let results = vec![
            (vec![(ulid("a"), 1.0), (ulid("b"), 0.5)], 0.7),
            (vec![(ulid("b"), 1.0), (ulid("c"), 0.5)], 0.3),
        ];

        let fused = weighted_fusion(results, 10);

        assert_eq!(fused.len(), 3);
        assert_eq!(fused[0].0, ulid("a"));
        assert!((fused[0].1 - 0.7).abs() < 1e-6);
        assert_eq!(fused[1].0, ulid("b"));
        assert!((fused[1].1 - 0.65).abs() < 1e-6);
        assert!((fused[2].1 - 0.15).abs() < 1e-6);
    }

    #[test]
    fn test_intent_weights() {
        assert_eq!(
            FusionWeights::for_intent(Intent::Statistical),
            FusionWeights {
                lexical: 0.7,
                semantic: 0.3
            }
        );
        assert_eq!(
            FusionWeights::for_intent(Intent::SemanticSearch).semantic,
            0.7
        );
        assert_eq!(FusionWeights::for_intent(Intent::Hybrid).lexical, 0.5);
    }

    #[test]
    fn test_max_normalize() {
        let normalized = max_normalize(&[(ulid("a"), 4.0), (ulid("b"), 1.0)]);
        assert_eq!(normalized, vec![(ulid("a"), 1.0), (ulid("b"), 0.25)]);
        assert!(max_normalize(&[]).is_empty());
    }
}
