//! Maximal Marginal Relevance selection.
//!
//! `MMR(c) = λ·sim(query, c) − (1−λ)·max_{s∈selected} sim(s, c)`.
//! The first pick has no selected set and scores `λ·sim(query, c)`.

use docn_core::{is_valid_lambda, DocnError, Result};

use crate::similarity::cosine_similarity;

/// A candidate chosen by MMR, with its score at selection time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MmrPick {
    /// Index into the candidate list.
    pub index: usize,

    /// MMR score when the candidate was selected.
    pub score: f32,
}

/// Pick up to `top_k` candidates by MMR.
///
/// `relevance[i]` is candidate `i`'s similarity to the query and
/// `pairwise(i, j)` the similarity between candidates `i` and `j`.
/// Equal scores go to the lower index.
pub fn mmr_select<F>(relevance: &[f32], top_k: usize, lambda: f32, pairwise: F) -> Vec<MmrPick>
where
    F: Fn(usize, usize) -> f32,
{
    let n = relevance.len();
    let target = top_k.min(n);
    let mut picks = Vec::with_capacity(target);
    let mut chosen = vec![false; n];
    // Highest similarity of each candidate to anything selected so far.
    let mut max_sim: Vec<Option<f32>> = vec![None; n];

    while picks.len() < target {
        let mut best: Option<MmrPick> = None;

        for i in (0..n).filter(|&i| !chosen[i]) {
            let score = match max_sim[i] {
                Some(redundancy) => lambda * relevance[i] - (1.0 - lambda) * redundancy,
                None => lambda * relevance[i],
            };
            if best.map_or(true, |b| score > b.score) {
                best = Some(MmrPick { index: i, score });
            }
        }

        let Some(pick) = best else { break };
        chosen[pick.index] = true;
        picks.push(pick);

        for i in (0..n).filter(|&i| !chosen[i]) {
            let sim = pairwise(pick.index, i);
            max_sim[i] = Some(max_sim[i].map_or(sim, |m| m.max(sim)));
        }
    }

    picks
}

/// MMR over embeddings, using cosine similarity for relevance and redundancy.
pub fn mmr_rerank(query: &[f32], candidates: &[&[f32]], top_k: usize, lambda: f32) -> Vec<MmrPick> {
    let relevance: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(query, c))
        .collect();

    mmr_select(&relevance, top_k, lambda, |i, j| {
        cosine_similarity(candidates[i], candidates[j])
    })
}

/// Resolve the effective MMR lambda.
///
/// Order: an explicit call value, then the externally configured value if
/// it lies in `(0, 1]`, then `fallback`. An explicit value outside `(0, 1]`
/// is rejected rather than skipped.
pub fn resolve_lambda(explicit: Option<f32>, configured: Option<f32>, fallback: f32) -> Result<f32> {
    if let Some(lambda) = explicit {
        if !is_valid_lambda(lambda) {
            return Err(DocnError::invalid_configuration(format!(
                "mmr lambda must be in (0, 1], got {}",
                lambda
            )));
        }
        return Ok(lambda);
    }

    Ok(configured.filter(|l| is_valid_lambda(*l)).unwrap_or(fallback))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Candidate 0 is the obvious first pick; 1 and 2 are near it.
    fn flip_scenario(lambda: f32) -> Vec<usize> {
        let relevance = [1.0, 0.9, 0.7];
        let pairwise = |i: usize, j: usize| {
            let (a, b) = if i < j { (i, j) } else { (j, i) };
            match (a, b) {
                (0, 1) => 0.95,
                (0, 2) => 0.80,
                (1, 2) => 0.85,
                _ => 1.0,
            }
        };
        mmr_select(&relevance, 3, lambda, pairwise)
            .into_iter()
            .map(|p| p.index)
            .collect()
    }

    #[test]
    fn test_selection_flips_below_threshold() {
        // 0.9λ − 0.95(1−λ) > 0.7λ − 0.8(1−λ)  ⇔  λ > 3/7
        assert_eq!(flip_scenario(0.6)[..2], [0, 1]);
        assert_eq!(flip_scenario(0.45)[..2], [0, 1]);
        assert_eq!(flip_scenario(0.4)[..2], [0, 2]);
        assert_eq!(flip_scenario(0.3)[..2], [0, 2]);
    }

    #[test]
    fn test_lambda_one_is_relevance_order() {
        let relevance = [0.2, 0.9, 0.5, 0.7];
        let picks = mmr_select(&relevance, 4, 1.0, |_, _| 1.0);
        let order: Vec<usize> = picks.iter().map(|p| p.index).collect();
        assert_eq!(order, vec![1, 3, 2, 0]);
        assert!((picks[0].score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_first_pick_score() {
        let picks = mmr_select(&[0.8, 0.4], 1, 0.5, |_, _| 0.0);
        assert_eq!(picks, vec![MmrPick { index: 0, score: 0.4 }]);
    }

    #[test]
    fn test_top_k_bounds() {
        assert!(mmr_select(&[], 5, 0.5, |_, _| 0.0).is_empty());
        assert!(mmr_select(&[0.5, 0.4], 0, 0.5, |_, _| 0.0).is_empty());
        assert_eq!(mmr_select(&[0.5, 0.4], 10, 0.5, |_, _| 0.0).len(), 2);
    }

    #[test]
    fn test_distinct_candidate_beats_near_duplicates() {
        let query = [1.0f32, 0.0, 0.0];
        let mut owned: Vec<Vec<f32>> = [0.10f32, 0.15, 0.20, 0.25, 0.30]
            .iter()
            .map(|t| vec![t.cos(), t.sin(), 0.0])
            .collect();
        owned.push(vec![0.75, -0.6614, 0.0]);
        let candidates: Vec<&[f32]> = owned.iter().map(|v| v.as_slice()).collect();

        // Relevance alone puts the distinct vector last.
        let pure = mmr_rerank(&query, &candidates, 6, 1.0);
        assert_eq!(pure.last().map(|p| p.index), Some(5));

        let diverse = mmr_rerank(&query, &candidates, 3, 0.5);
        let order: Vec<usize> = diverse.iter().map(|p| p.index).collect();
        assert_eq!(order[0], 0);
        assert!(order.contains(&5));
    }

    #[test]
    fn test_resolve_lambda_precedence() {
        assert_eq!(resolve_lambda(Some(0.9), Some(0.3), 0.5).unwrap(), 0.9);
        assert_eq!(resolve_lambda(None, Some(0.3), 0.5).unwrap(), 0.3);
        assert_eq!(resolve_lambda(None, None, 0.5).unwrap(), 0.5);
        assert_eq!(resolve_lambda(Some(1.0), None, 0.5).unwrap(), 1.0);
    }

    #[test]
    fn test_resolve_lambda_invalid_values() {
        // Invalid configured values fall through to the default.
        assert_eq!(resolve_lambda(None, Some(0.0), 0.5).unwrap(), 0.5);
        assert_eq!(resolve_lambda(None, Some(1.5), 0.5).unwrap(), 0.5);

        let err = resolve_lambda(Some(0.0), Some(0.3), 0.5).unwrap_err();
        assert!(err.is_configuration_error());
        assert!(resolve_lambda(Some(-0.2), None, 0.5).is_err());
    }
}
