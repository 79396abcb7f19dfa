use docn_chunk::{chunk, chunk_spans};
use proptest::prelude::*;

proptest! {
    #[test]
    fn chunks_fit_window_and_are_trimmed(
        text in "[a-zA-Z .!?\n]{0,600}",
        size in 1usize..120,
        overlap_ratio in 0.0f64..1.0,
    ) {
        let overlap = ((size as f64) * overlap_ratio) as usize;
        prop_assume!(overlap < size);

        for c in chunk(&text, size, overlap).unwrap() {
            prop_assert!(!c.is_empty());
            prop_assert!(c.chars().count() <= size);
            prop_assert_eq!(c.trim(), c.as_str());
        }
    }

    #[test]
    fn spans_match_source_and_advance(
        text in "[a-zàèé .,\n]{0,400}",
        size in 2usize..80,
        overlap in 0usize..40,
    ) {
        prop_assume!(overlap < size);
        let chars: Vec<char> = text.chars().collect();
        let spans = chunk_spans(&text, size, overlap).unwrap();

        for span in &spans {
            let source: String = chars[span.start..span.end].iter().collect();
            prop_assert_eq!(&source, &span.text);
        }
        for pair in spans.windows(2) {
            prop_assert!(pair[0].start < pair[1].start);
        }
    }

    #[test]
    fn consecutive_spans_share_at_most_overlap(
        text in "[a-z .!?\n]{0,500}",
        size in 1usize..90,
        overlap in 0usize..60,
    ) {
        prop_assume!(overlap < size);
        let spans = chunk_spans(&text, size, overlap).unwrap();

        for pair in spans.windows(2) {
            let shared = pair[0].end.saturating_sub(pair[1].start);
            prop_assert!(
                shared <= overlap,
                "spans {:?} and {:?} share {} chars, overlap is {}",
                (pair[0].start, pair[0].end), (pair[1].start, pair[1].end), shared, overlap
            );
        }
    }

    #[test]
    fn every_visible_character_is_covered(
        text in "[a-z .\n]{0,300}",
        size in 1usize..60,
        overlap in 0usize..30,
    ) {
        prop_assume!(overlap < size);
        let spans = chunk_spans(&text, size, overlap).unwrap();

        for (i, c) in text.chars().enumerate() {
            if c.is_whitespace() {
                continue;
            }
            prop_assert!(
                spans.iter().any(|s| s.start <= i && i < s.end),
                "character {} not covered", i
            );
        }
    }

    #[test]
    fn overlap_not_below_size_is_rejected(size in 1usize..100, extra in 0usize..10) {
        prop_assert!(chunk("some text", size, size + extra).is_err());
    }
}
