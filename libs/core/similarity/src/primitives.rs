//! The five deterministic similarity primitives of §4.A. Each returns a
//! score in `[0, 1]`, is symmetric, and is reflexive (`1.0` for identical
//! input, including the empty string against itself).

use std::collections::{HashMap, HashSet};

use crate::normalize::canonical_form;

/// Jaro-Winkler similarity on the canonical form of both inputs.
pub fn jaro_winkler(a: &str, b: &str) -> f64 {
    let (a, b) = (canonical_form(a), canonical_form(b));
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    strsim::jaro_winkler(&a, &b)
}

/// Longest-common-subsequence ratio: `2 * lcs_len / (len_a + len_b)`.
pub fn lcs_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = canonical_form(a).chars().collect();
    let b: Vec<char> = canonical_form(b).chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let lcs_len = lcs_length(&a, &b);
    (2 * lcs_len) as f64 / (a.len() + b.len()) as f64
}

fn lcs_length(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ai in a {
        for (j, bj) in b.iter().enumerate() {
            curr[j + 1] = if ai == bj {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Coarse phonetic equality via a Soundex-style code. Returns `1.0` when
/// the codes match, `0.0` otherwise — a binary primitive by design (§4.A).
pub fn phonetic_equal(a: &str, b: &str) -> f64 {
    let (a, b) = (canonical_form(a), canonical_form(b));
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if soundex(&a) == soundex(&b) {
        1.0
    } else {
        0.0
    }
}

/// A Latin-alphabet Soundex code (first letter plus up to three digits).
/// Non-Latin input falls back to a code derived from Unicode scalar values
/// so Cyrillic counterparty names still bucket predictably.
fn soundex(input: &str) -> String {
    let mut chars = input.chars().filter(|c| c.is_alphanumeric());
    let Some(first) = chars.next() else {
        return String::new();
    };
    let mut code = String::new();
    code.push(first.to_ascii_uppercase());
    let mut last_digit = soundex_digit(first);
    for c in chars {
        let digit = soundex_digit(c);
        if digit != 0 && digit != last_digit {
            code.push((b'0' + digit) as char);
            if code.len() == 4 {
                break;
            }
        }
        last_digit = digit;
    }
    while code.len() < 4 {
        code.push('0');
    }
    code
}

fn soundex_digit(c: char) -> u8 {
    match c.to_ascii_lowercase() {
        'b' | 'f' | 'p' | 'v' => 1,
        'c' | 'g' | 'j' | 'k' | 'q' | 's' | 'x' | 'z' => 2,
        'd' | 't' => 3,
        'l' => 4,
        'm' | 'n' => 5,
        'r' => 6,
        // Non-Latin letters (e.g. Cyrillic) bucket by their scalar value
        // modulo the digit range, giving a stable, if coarse, grouping.
        c if !c.is_ascii() => (c as u32 % 6) as u8 + 1,
        _ => 0,
    }
}

/// Cosine similarity over character n-gram frequency vectors (`n = 2`).
pub fn ngram_cosine(a: &str, b: &str) -> f64 {
    ngram_cosine_n(a, b, 2)
}

pub fn ngram_cosine_n(a: &str, b: &str, n: usize) -> f64 {
    let a = canonical_form(a);
    let b = canonical_form(b);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let grams_a = ngrams(&a, n);
    let grams_b = ngrams(&b, n);
    if grams_a.is_empty() || grams_b.is_empty() {
        return 0.0;
    }
    let dot: usize = grams_a
        .iter()
        .map(|(gram, count_a)| count_a * grams_b.get(gram).copied().unwrap_or(0))
        .sum();
    let norm_a = (grams_a.values().map(|c| c * c).sum::<usize>() as f64).sqrt();
    let norm_b = (grams_b.values().map(|c| c * c).sum::<usize>() as f64).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot as f64 / (norm_a * norm_b)
    }
}

fn ngrams(s: &str, n: usize) -> HashMap<String, usize> {
    let chars: Vec<char> = s.chars().collect();
    let mut counts = HashMap::new();
    if chars.len() < n {
        if !chars.is_empty() {
            *counts.entry(chars.iter().collect::<String>()).or_insert(0) += 1;
        }
        return counts;
    }
    for window in chars.windows(n) {
        *counts.entry(window.iter().collect::<String>()).or_insert(0) += 1;
    }
    counts
}

/// Jaccard similarity of the whitespace-delimited token sets.
pub fn token_jaccard(a: &str, b: &str) -> f64 {
    let a = canonical_form(a);
    let b = canonical_form(b);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let set_a: HashSet<&str> = a.split_whitespace().collect();
    let set_b: HashSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflexive_on_nonempty_and_empty_input() {
        for f in [jaro_winkler, lcs_ratio, phonetic_equal, ngram_cosine, token_jaccard] {
            assert_eq!(f("", ""), 1.0);
            assert_eq!(f("tire", "tire"), 1.0);
        }
    }

    #[test]
    fn symmetric() {
        for f in [jaro_winkler, lcs_ratio, phonetic_equal, ngram_cosine, token_jaccard] {
            assert_eq!(f("winter tire", "tire winter"), f("tire winter", "winter tire"));
        }
    }

    #[test]
    fn empty_against_nonempty_is_zero() {
        for f in [lcs_ratio, phonetic_equal, ngram_cosine, token_jaccard] {
            assert_eq!(f("", "tire"), 0.0);
        }
    }

    #[test]
    fn token_jaccard_counts_shared_words() {
        let score = token_jaccard("winter tire 205/55", "winter tire 205-55");
        assert!(score > 0.3 && score < 1.0);
    }

    #[test]
    fn lcs_ratio_handles_near_duplicates() {
        let score = lcs_ratio("Winter Tire 205/55", "winter tire 205-55");
        assert!(score > 0.85);
    }
}
