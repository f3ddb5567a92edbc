//! Aggregation strategies over a round of provider calls (§4.D).

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::completion::{CallOutcome, Completion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStrategy {
    FirstSuccess,
    HighestConfidence,
    MajorityVote,
    AllResults,
}

/// What the orchestrator hands back to its caller: the chosen completion
/// (when the strategy picks one) plus every call's outcome, so §8
/// testable properties can assert on call counts independent of which
/// completion won.
#[derive(Debug, Clone)]
pub struct AggregatedResult {
    pub strategy: AggregationStrategy,
    pub chosen: Option<Completion>,
    pub calls: Vec<CallOutcome>,
}

impl AggregatedResult {
    pub fn successes(&self) -> impl Iterator<Item = &CallOutcome> {
        self.calls.iter().filter(|c| c.is_success())
    }
}

/// Combine a round's call outcomes according to `strategy`. `calls` is
/// assumed already ordered by completion time for `first_success`-style
/// reasoning, but the function itself does not depend on order except to
/// pick the first successful entry for `FirstSuccess`.
pub fn aggregate(strategy: AggregationStrategy, calls: Vec<CallOutcome>) -> AggregatedResult {
    let chosen = match strategy {
        AggregationStrategy::FirstSuccess => first_success(&calls),
        AggregationStrategy::HighestConfidence => highest_confidence(&calls),
        AggregationStrategy::MajorityVote => majority_vote(&calls),
        AggregationStrategy::AllResults => None,
    };
    AggregatedResult { strategy, chosen, calls }
}

fn first_success(calls: &[CallOutcome]) -> Option<Completion> {
    calls.iter().find_map(|c| c.result.as_ref().ok().cloned())
}

fn highest_confidence(calls: &[CallOutcome]) -> Option<Completion> {
    calls
        .iter()
        .filter_map(|c| c.result.as_ref().ok())
        .max_by(|a, b| {
            a.confidence
                .unwrap_or(0.0)
                .partial_cmp(&b.confidence.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .cloned()
}

/// Normalize (trim, lowercase) each successful completion's text and
/// bucket-count; ties broken by lowest aggregate latency within the
/// winning bucket. Returns the plurality winner even without a strict
/// majority, per §4.D.
fn majority_vote(calls: &[CallOutcome]) -> Option<Completion> {
    let successes: Vec<&CallOutcome> = calls.iter().filter(|c| c.is_success()).collect();
    if successes.is_empty() {
        return None;
    }

    let mut buckets: HashMap<String, Vec<&CallOutcome>> = HashMap::new();
    for call in &successes {
        let text = call.result.as_ref().expect("filtered to successes");
        let key = text.text.trim().to_lowercase();
        buckets.entry(key).or_default().push(call);
    }

    let winner = buckets.into_values().max_by(|a, b| {
        let count_cmp = a.len().cmp(&b.len());
        if count_cmp != std::cmp::Ordering::Equal {
            return count_cmp;
        }
        let latency_a: Duration = a.iter().map(|c| c.latency).sum();
        let latency_b: Duration = b.iter().map(|c| c.latency).sum();
        // Lower aggregate latency wins a tie, so reverse the comparison.
        latency_b.cmp(&latency_a)
    })?;

    winner.first().and_then(|c| c.result.as_ref().ok()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_call(id: &str, latency_ms: u64, text: &str, confidence: Option<f64>) -> CallOutcome {
        let mut completion = Completion::new(text);
        completion.confidence = confidence;
        CallOutcome::success(id, 0, Duration::from_millis(latency_ms), completion)
    }

    fn err_call(id: &str) -> CallOutcome {
        CallOutcome { provider_id: id.to_string(), channel: 0, latency: Duration::from_millis(5), result: Err("boom".into()) }
    }

    #[test]
    fn first_success_skips_failures() {
        let calls = vec![err_call("a"), ok_call("b", 10, "Winter Tire", None)];
        let result = aggregate(AggregationStrategy::FirstSuccess, calls);
        assert_eq!(result.chosen.unwrap().text, "Winter Tire");
    }

    #[test]
    fn highest_confidence_picks_the_max() {
        let calls = vec![
            ok_call("a", 10, "Low", Some(0.4)),
            ok_call("b", 10, "High", Some(0.9)),
        ];
        let result = aggregate(AggregationStrategy::HighestConfidence, calls);
        assert_eq!(result.chosen.unwrap().text, "High");
    }

    #[test]
    fn majority_vote_breaks_ties_by_latency() {
        let calls = vec![
            ok_call("a", 50, "Winter Tire", None),
            ok_call("b", 10, "winter tire", None),
        ];
        let result = aggregate(AggregationStrategy::MajorityVote, calls);
        // Both normalize to the same bucket, so this asserts the bucket merged, not which text string won.
        assert_eq!(result.chosen.unwrap().text.to_lowercase(), "winter tire");
    }

    #[test]
    fn majority_vote_picks_plurality_without_strict_majority() {
        let calls = vec![
            ok_call("a", 10, "Alpha", None),
            ok_call("b", 10, "Alpha", None),
            ok_call("c", 10, "Beta", None),
        ];
        let result = aggregate(AggregationStrategy::MajorityVote, calls);
        assert_eq!(result.chosen.unwrap().text, "Alpha");
    }

    #[test]
    fn all_results_never_chooses() {
        let calls = vec![ok_call("a", 10, "Alpha", None)];
        let result = aggregate(AggregationStrategy::AllResults, calls);
        assert!(result.chosen.is_none());
        assert_eq!(result.calls.len(), 1);
    }
}
