//! Character n-gram Jaccard similarity over normalized text.

use std::collections::HashSet;

use serde::Serialize;

pub const DEFAULT_NGRAM: usize = 4;

/// Best pool entry at or above a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Match {
    pub index: usize,
    pub score: f64,
}

/// Contiguous character n-grams. Text no longer than `n` is a single gram.
pub fn ngrams(text: &str, n: usize) -> HashSet<String> {
    let n = n.max(1);
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return HashSet::new();
    }
    if chars.len() <= n {
        return HashSet::from([text.to_string()]);
    }
    chars.windows(n).map(|w| w.iter().collect()).collect()
}

/// Jaccard similarity of the n-gram sets of two already-normalized strings.
///
/// Two empty strings are identical (1.0); exactly one empty string scores 0.0.
pub fn similarity(a: &str, b: &str, n: usize) -> f64 {
    let left = ngrams(a, n);
    let right = ngrams(b, n);
    jaccard(&left, &right)
}

fn jaccard(left: &HashSet<String>, right: &HashSet<String>) -> f64 {
    match (left.is_empty(), right.is_empty()) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        (false, false) => {
            let intersection = left.intersection(right).count();
            let union = left.union(right).count();
            intersection as f64 / union as f64
        }
    }
}

/// Highest-scoring entry of `pool` whose score is at least `threshold`.
///
/// Ties keep the lowest index.
pub fn best_match<S: AsRef<str>>(
    candidate: &str,
    pool: &[S],
    threshold: f64,
    n: usize,
) -> Option<Match> {
    let grams = ngrams(candidate, n);
    let mut best: Option<Match> = None;
    for (index, entry) in pool.iter().enumerate() {
        let score = jaccard(&grams, &ngrams(entry.as_ref(), n));
        if best.is_none_or(|current| score > current.score) {
            best = Some(Match { index, score });
        }
    }
    best.filter(|m| m.score >= threshold)
}
