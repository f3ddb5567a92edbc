//! The weighted hybrid score that combines the five primitives (§4.A).

use serde::{Deserialize, Serialize};

use crate::primitives::{jaro_winkler, lcs_ratio, ngram_cosine, phonetic_equal, token_jaccard};

/// Weights for each primitive in the hybrid score. Must sum to `1.0` within
/// `f64::EPSILON * 8` tolerance; `Weights::validate` enforces this.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub jaro_winkler: f64,
    pub lcs: f64,
    pub phonetic: f64,
    pub ngram: f64,
    pub jaccard: f64,
}

impl Weights {
    /// The default weighting: name-shape primitives dominate, phonetic
    /// equality contributes a small tie-breaking signal.
    pub const fn balanced() -> Self {
        Weights {
            jaro_winkler: 0.35,
            lcs: 0.25,
            phonetic: 0.1,
            ngram: 0.2,
            jaccard: 0.1,
        }
    }

    pub fn sum(&self) -> f64 {
        self.jaro_winkler + self.lcs + self.phonetic + self.ngram + self.jaccard
    }

    /// Whether the five weights sum to `1.0` within floating-point tolerance.
    pub fn is_valid(&self) -> bool {
        (self.sum() - 1.0).abs() < 1e-6
    }
}

impl Default for Weights {
    fn default() -> Self {
        Weights::balanced()
    }
}

/// Per-primitive scores and their weighted contributions to the final
/// hybrid score, exposed for `AnalyzePairs`/`CompareWeights` reporting and
/// for debugging individual comparisons (§4.A).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Breakdown {
    pub jaro_winkler: f64,
    pub lcs: f64,
    pub phonetic: f64,
    pub ngram: f64,
    pub jaccard: f64,
    pub weights: Weights,
    pub score: f64,
}

impl Breakdown {
    pub fn compute(a: &str, b: &str, weights: Weights) -> Self {
        let jaro_winkler_score = jaro_winkler(a, b);
        let lcs = lcs_ratio(a, b);
        let phonetic = phonetic_equal(a, b);
        let ngram = ngram_cosine(a, b);
        let jaccard = token_jaccard(a, b);
        let score = jaro_winkler_score * weights.jaro_winkler
            + lcs * weights.lcs
            + phonetic * weights.phonetic
            + ngram * weights.ngram
            + jaccard * weights.jaccard;
        Breakdown {
            jaro_winkler: jaro_winkler_score,
            lcs,
            phonetic,
            ngram,
            jaccard,
            weights,
            score,
        }
    }
}

/// The weighted hybrid similarity score `S(a, b) \in [0, 1]` (§4.A, §8).
///
/// `S` is symmetric (`S(a,b) = S(b,a)`, since every primitive is) and
/// reflexive (`S(a,a) = 1.0`, since every primitive is reflexive and the
/// weights sum to `1.0`).
pub fn hybrid_score(a: &str, b: &str, weights: Weights) -> f64 {
    Breakdown::compute(a, b, weights).score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_weights_sum_to_one() {
        assert!(Weights::balanced().is_valid());
    }

    #[test]
    fn reflexive_for_identical_strings() {
        let weights = Weights::balanced();
        assert!((hybrid_score("Winter Tire 205/55", "Winter Tire 205/55", weights) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn symmetric_for_distinct_strings() {
        let weights = Weights::balanced();
        assert_eq!(
            hybrid_score("Winter Tire", "Summer Tire", weights),
            hybrid_score("Summer Tire", "Winter Tire", weights)
        );
    }

    #[test]
    fn breakdown_contributions_sum_to_score() {
        let weights = Weights::balanced();
        let breakdown = Breakdown::compute("Winter Tire 205/55", "winter tire 205-55", weights);
        let recombined = breakdown.jaro_winkler * weights.jaro_winkler
            + breakdown.lcs * weights.lcs
            + breakdown.phonetic * weights.phonetic
            + breakdown.ngram * weights.ngram
            + breakdown.jaccard * weights.jaccard;
        assert!((recombined - breakdown.score).abs() < 1e-9);
    }
}
