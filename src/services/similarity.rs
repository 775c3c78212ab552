//! Normalized edit-distance similarity between two titles.
//!
//! Used to match local archive names against metadata titles. Both inputs
//! are lowercased and stripped of non-alphabetic characters before
//! comparison, so `"Naruto"` and `"naruto!!"` score a perfect 1.0.
//!
//! The distance is Levenshtein with substitution weighted at 2, i.e. a
//! mismatch costs as much as a deletion plus an insertion. The score is
//! `(m + n - distance) / (m + n)`, which lands in `[0, 1]`.

use regex::Regex;
use std::sync::LazyLock;

/// Cost of replacing one character with another.
const SUBSTITUTION_COST: usize = 2;

static NON_ALPHABETIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{Alphabetic}]+").expect("Invalid normalization regex"));

/// Lowercases `s` and removes every non-alphabetic character.
pub fn normalize(s: &str) -> String {
    NON_ALPHABETIC.replace_all(s, "").to_lowercase()
}

/// Weighted edit distance between two already-normalized character slices.
///
/// Equivalent to filling the full `(m+1) x (n+1)` table where
/// `t[i][0] = i`, `t[0][j] = j` and
/// `t[i][j] = min(t[i-1][j] + 1, t[i][j-1] + 1, t[i-1][j-1] + cost)`,
/// keeping only the previous row.
pub fn edit_distance(a: &[char], b: &[char]) -> usize {
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { SUBSTITUTION_COST };
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Similarity ratio of two strings in `[0, 1]`.
///
/// Two strings that are both empty after normalization count as an exact
/// match and score 1.0.
pub fn score(a: &str, b: &str) -> f64 {
    let a: Vec<char> = normalize(a).chars().collect();
    let b: Vec<char> = normalize(b).chars().collect();

    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let distance = edit_distance(&a, &b);
    (total - distance) as f64 / total as f64
}
