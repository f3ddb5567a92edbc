//! Batch analysis helpers used by the `/preview-stats` endpoint and by
//! offline weight tuning (§4.A, §6.2).

use serde::{Deserialize, Serialize};

use crate::hybrid::{hybrid_score, Breakdown, Weights};

/// One scored pair, as returned by `analyze_pairs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPair {
    pub left: String,
    pub right: String,
    pub breakdown: Breakdown,
    pub above_threshold: bool,
}

/// Score every pair against `weights` and flag which ones clear `threshold`.
/// Mirrors the original library's `AnalyzePairs` operation (§4.A).
pub fn analyze_pairs(pairs: &[(String, String)], threshold: f64, weights: Weights) -> Vec<ScoredPair> {
    pairs
        .iter()
        .map(|(left, right)| {
            let breakdown = Breakdown::compute(left, right, weights);
            ScoredPair {
                left: left.clone(),
                right: right.clone(),
                above_threshold: breakdown.score >= threshold,
                breakdown,
            }
        })
        .collect()
}

/// A pair of strings labeled by a human as either a true match or not,
/// used as ground truth for `compare_weights`.
#[derive(Debug, Clone, Deserialize)]
pub struct LabeledPair {
    pub left: String,
    pub right: String,
    pub is_match: bool,
}

/// Precision/recall/F1 for one candidate weighting against a labeled set.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WeightReport {
    pub weights: Weights,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

/// Score a labeled set under each candidate weighting and report
/// precision/recall/F1, so operators can pick a weighting empirically
/// instead of guessing (§4.A `CompareWeights`).
pub fn compare_weights(labeled: &[LabeledPair], candidates: &[Weights], threshold: f64) -> Vec<WeightReport> {
    candidates
        .iter()
        .map(|&weights| {
            let mut tp = 0usize;
            let mut fp = 0usize;
            let mut fn_ = 0usize;
            for pair in labeled {
                let score = hybrid_score(&pair.left, &pair.right, weights);
                let predicted = score >= threshold;
                match (predicted, pair.is_match) {
                    (true, true) => tp += 1,
                    (true, false) => fp += 1,
                    (false, true) => fn_ += 1,
                    (false, false) => {}
                }
            }
            let precision = if tp + fp == 0 { 0.0 } else { tp as f64 / (tp + fp) as f64 };
            let recall = if tp + fn_ == 0 { 0.0 } else { tp as f64 / (tp + fn_) as f64 };
            let f1 = if precision + recall == 0.0 {
                0.0
            } else {
                2.0 * precision * recall / (precision + recall)
            };
            WeightReport {
                weights,
                precision,
                recall,
                f1,
                true_positives: tp,
                false_positives: fp,
                false_negatives: fn_,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_pairs_flags_clear_duplicates() {
        let pairs = vec![
            ("Winter Tire 205/55".to_string(), "winter tire 205-55".to_string()),
            ("Winter Tire".to_string(), "Engine Oil Filter".to_string()),
        ];
        let results = analyze_pairs(&pairs, 0.8, Weights::balanced());
        assert!(results[0].above_threshold);
        assert!(!results[1].above_threshold);
    }

    #[test]
    fn compare_weights_reports_perfect_score_for_separable_data() {
        let labeled = vec![
            LabeledPair { left: "Winter Tire".into(), right: "winter tire".into(), is_match: true },
            LabeledPair { left: "Winter Tire".into(), right: "Engine Oil Filter".into(), is_match: false },
        ];
        let reports = compare_weights(&labeled, &[Weights::balanced()], 0.8);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].true_positives, 1);
        assert_eq!(reports[0].false_positives, 0);
        assert!((reports[0].f1 - 1.0).abs() < 1e-9);
    }
}
