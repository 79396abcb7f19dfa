use docn_vector::{cosine_similarity, mmr_select};
use proptest::prelude::*;

fn vector(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-10.0f32..10.0, dim)
}

proptest! {
    #[test]
    fn cosine_is_symmetric(a in vector(8), b in vector(8)) {
        prop_assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
    }

    #[test]
    fn cosine_self_similarity_is_one(v in vector(8)) {
        prop_assume!(v.iter().any(|x| x.abs() > 1e-3));
        prop_assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_with_zero_is_zero(v in vector(8)) {
        prop_assert_eq!(cosine_similarity(&v, &[0.0; 8]), 0.0);
    }

    #[test]
    fn cosine_is_bounded(a in vector(6), b in vector(6)) {
        let sim = cosine_similarity(&a, &b);
        prop_assert!((-1.0..=1.0).contains(&sim));
    }

    #[test]
    fn mmr_with_lambda_one_is_relevance_order(relevance in prop::collection::vec(0.0f32..1.0, 0..20)) {
        let picks = mmr_select(&relevance, relevance.len(), 1.0, |_, _| 0.9);
        for pair in picks.windows(2) {
            prop_assert!(relevance[pair[0].index] >= relevance[pair[1].index]);
        }
        prop_assert_eq!(picks.len(), relevance.len());
    }

    #[test]
    fn mmr_picks_are_distinct(
        relevance in prop::collection::vec(0.0f32..1.0, 1..15),
        top_k in 0usize..20,
        lambda in 0.01f32..1.0,
    ) {
        let picks = mmr_select(&relevance, top_k, lambda, |i, j| if i == j { 1.0 } else { 0.5 });
        let mut indices: Vec<usize> = picks.iter().map(|p| p.index).collect();
        prop_assert_eq!(indices.len(), top_k.min(relevance.len()));
        indices.sort();
        indices.dedup();
        prop_assert_eq!(indices.len(), top_k.min(relevance.len()));
    }
}
