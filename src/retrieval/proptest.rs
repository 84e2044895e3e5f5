//! Property-Based Tests for Retrieval Keys and Similarity
//!
//! # Test Properties
//!
//! 1. **Case/Whitespace Insensitivity**: fingerprints ignore casing and padding
//! 2. **List Order Insensitivity**: permuted list filters share a fingerprint
//! 3. **Cosine Bounds**: similarity is symmetric and within [-1, 1]
//! 4. **Threshold**: a scan never reports a match below its threshold

#![cfg(test)]

use proptest::prelude::*;
use serde_json::{json, Value};

use super::fingerprint::QueryDescriptor;
use super::similarity::{cosine_similarity, SimilarityIndex};

// =============================================================================
// Strategies
// =============================================================================

fn word_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9]{1,8}"
}

fn words_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(word_strategy(), 1..6)
}

fn embedding_strategy(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-10.0f32..10.0, dim)
}

// =============================================================================
// Fingerprint Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_fingerprint_ignores_case_and_padding(
        words in words_strategy(),
        pad in 1usize..4,
        top_k in proptest::option::of(1u32..100),
    ) {
        let plain = words.join(" ");
        let noisy = format!(
            "{}{}{}",
            " ".repeat(pad),
            words.iter().map(|w| w.to_uppercase()).collect::<Vec<_>>().join(&" ".repeat(pad)),
            "\t".repeat(pad),
        );

        let mut a = QueryDescriptor::new(plain);
        let mut b = QueryDescriptor::new(noisy);
        a.top_k = top_k;
        b.top_k = top_k;
        prop_assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn prop_fingerprint_ignores_list_order(
        words in words_strategy(),
        rotate in 0usize..6,
    ) {
        let mut shuffled = words.clone();
        let len = shuffled.len();
        shuffled.rotate_left(rotate % len);
        shuffled.reverse();

        let a = QueryDescriptor::new("q").with_filter("repos", json!(words));
        let b = QueryDescriptor::new("q").with_filter("repos", Value::from(shuffled));
        prop_assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn prop_fingerprint_is_deterministic(words in words_strategy(), owner in word_strategy()) {
        let descriptor = QueryDescriptor::new(words.join(" ")).with_owner(owner);
        let key = descriptor.fingerprint();
        prop_assert_eq!(key.len(), 64);
        prop_assert_eq!(key, descriptor.clone().fingerprint());
    }
}

// =============================================================================
// Similarity Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_cosine_symmetric_and_bounded(
        (a, b) in (1usize..32).prop_flat_map(|d| (embedding_strategy(d), embedding_strategy(d)))
    ) {
        let ab = cosine_similarity(&a, &b);
        let ba = cosine_similarity(&b, &a);
        prop_assert_eq!(ab.is_some(), ba.is_some());
        if let (Some(ab), Some(ba)) = (ab, ba) {
            prop_assert!((-1.0..=1.0).contains(&ab));
            prop_assert!((ab - ba).abs() < 1e-5);
        }
    }

    #[test]
    fn prop_scan_respects_threshold(
        query in embedding_strategy(8),
        candidates in prop::collection::vec(embedding_strategy(8), 0..20),
        threshold in 0.1f32..1.0,
    ) {
        let index = SimilarityIndex::new(threshold);
        let keys: Vec<String> = (0..candidates.len()).map(|i| format!("k{i}")).collect();
        let outcome = index.best_match(
            &query,
            keys.iter().map(String::as_str).zip(candidates.iter().map(Vec::as_slice)),
        );

        prop_assert_eq!(outcome.scanned + outcome.skipped, candidates.len());
        if let Some((_, similarity)) = outcome.best {
            prop_assert!(similarity >= threshold);
        }
    }
}
