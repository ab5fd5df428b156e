//! Message similarity in `[0, 1]`.
//!
//! The score is the larger of token Jaccard overlap and normalized Levenshtein
//! similarity over canonical messages. Both are symmetric and deterministic.
//! Jaccard catches reordered or extended messages; edit distance catches short
//! messages that differ by a typo-sized change.

use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

/// Edit distance is quadratic; longer messages are scored by tokens only.
const MAX_EDIT_DISTANCE_CHARS: usize = 256;

pub fn tokens(canonical: &str) -> HashSet<&str> {
    canonical.unicode_words().collect()
}

pub fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            cur[j + 1] = substitution.min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    1.0 - prev[b.len()] as f64 / longest as f64
}

/// Similarity of two canonical messages.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let token_score = jaccard(&tokens(a), &tokens(b));
    if a.chars().count() > MAX_EDIT_DISTANCE_CHARS || b.chars().count() > MAX_EDIT_DISTANCE_CHARS {
        return token_score;
    }
    token_score.max(levenshtein_similarity(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn identical_messages_score_one() {
        assert_eq!(similarity("typeerror: x is undefined", "typeerror: x is undefined"), 1.0);
    }

    #[test]
    fn unrelated_messages_score_low() {
        assert!(similarity("typeerror: x is undefined", "connection refused by peer") < 0.3);
    }

    #[test]
    fn small_edits_stay_close() {
        let score = similarity(
            "typeerror: cannot read properties of undefined (reading 'map')",
            "typeerror: cannot read properties of undefined (reading 'filter')",
        );
        assert!(score >= 0.8, "score was {score}");
    }

    #[test]
    fn levenshtein_matches_known_distances() {
        assert!((levenshtein_similarity("kitten", "sitting") - (1.0 - 3.0 / 7.0)).abs() < 1e-9);
        assert_eq!(levenshtein_similarity("", ""), 1.0);
    }

    proptest! {
        #[test]
        fn proptest_similarity_is_symmetric_and_bounded(a in "[a-z ]{0,40}", b in "[a-z ]{0,40}") {
            let ab = similarity(&a, &b);
            let ba = similarity(&b, &a);
            prop_assert!((ab - ba).abs() < 1e-12);
            prop_assert!((0.0..=1.0).contains(&ab));
        }
    }
}
