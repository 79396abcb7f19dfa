use std::collections::HashMap;

use docn_lexical::{approximate_bm25_score, bm25_term_weight, idf, Bm25Index};
use proptest::prelude::*;
use ulid::Ulid;

/// A document of `len` tokens, `tf` of which are "target".
fn document(tf: usize, len: usize) -> String {
    let mut tokens = vec!["target"; tf];
    tokens.extend(std::iter::repeat("filler").take(len - tf));
    tokens.join(" ")
}

proptest! {
    #[test]
    fn weight_never_decreases_with_tf(
        idf_value in 0.0f64..10.0,
        tf in 1usize..50,
        doc_len in 50usize..200,
        avg_len in 1.0f64..300.0,
    ) {
        let lower = bm25_term_weight(idf_value, tf, doc_len, avg_len);
        let higher = bm25_term_weight(idf_value, tf + 1, doc_len, avg_len);
        prop_assert!(higher >= lower);
    }

    #[test]
    fn weight_never_increases_with_length(
        idf_value in 0.0f64..10.0,
        tf in 1usize..20,
        doc_len in 20usize..200,
        extra in 1usize..100,
        avg_len in 1.0f64..300.0,
    ) {
        let shorter = bm25_term_weight(idf_value, tf, doc_len, avg_len);
        let longer = bm25_term_weight(idf_value, tf, doc_len + extra, avg_len);
        prop_assert!(longer <= shorter);
    }

    #[test]
    fn idf_is_never_negative(n in 0usize..1000, df in 0usize..1000) {
        prop_assume!(df <= n);
        prop_assert!(idf(n, df) >= 0.0);
    }

    #[test]
    fn corpus_score_monotonic_in_tf(tf in 1usize..15, len in 16usize..40) {
        let target = Ulid::from(1u128);
        let other = Ulid::from(2u128);

        let score_with = |tf: usize| {
            let index = Bm25Index::new();
            index.update_statistics(&HashMap::from([
                (target, document(tf, len)),
                (other, "unrelated words only here".to_string()),
            ]));
            index.score_document("target", &target)
        };

        prop_assert!(score_with(tf + 1) >= score_with(tf));
    }

    #[test]
    fn scores_are_finite_and_non_negative(query in "[a-z ]{0,40}", text in "[a-z ]{0,200}") {
        let index = Bm25Index::new();
        index.update_statistics(&HashMap::from([(Ulid::from(7u128), text.clone())]));

        let score = index.score_text(&query, &text);
        prop_assert!(score.is_finite());
        prop_assert!(score >= 0.0);

        let approx = approximate_bm25_score(&query, &text);
        prop_assert!(approx.is_finite());
        prop_assert!(approx >= 0.0);
    }
}
