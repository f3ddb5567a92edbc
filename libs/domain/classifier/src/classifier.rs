//! Top-down taxonomy walk with AI-backed node selection (§4.E).

use std::sync::Arc;
use std::time::Duration;

use refnorm_models::{ClassifierCacheEntry, TaxonomyNode};
use refnorm_providers::{AggregationStrategy, ProviderOrchestrator};
use refnorm_similarity::canonical_form;

use crate::cache::ClassifierCache;
use crate::select::{build_user_prompt, parse_selection, system_prompt};

const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.6;
const DEFAULT_BREAKER_RETRY_WAIT: Duration = Duration::from_secs(30);

/// The final outcome of classifying one query against a taxonomy.
#[derive(Debug, Clone)]
pub enum ClassificationOutcome {
    /// Walk terminated at a node — either a leaf, or low AI confidence.
    Classified { code: String, name: String, confidence: Option<f64> },
    /// The orchestrator's providers stayed circuit-open through one
    /// retry; the group is left unclassified but not failed (§4.E).
    Unclassified,
}

pub struct Classifier {
    root: TaxonomyNode,
    orchestrator: Arc<ProviderOrchestrator>,
    cache: ClassifierCache,
    confidence_threshold: f64,
    breaker_retry_wait: Duration,
}

impl Classifier {
    pub fn new(root: TaxonomyNode, orchestrator: Arc<ProviderOrchestrator>) -> Self {
        Self {
            root,
            orchestrator,
            cache: ClassifierCache::new(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            breaker_retry_wait: DEFAULT_BREAKER_RETRY_WAIT,
        }
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub async fn classify(&self, query: &str, category: Option<&str>) -> ClassificationOutcome {
        let mut node = &self.root;
        loop {
            if node.is_leaf() {
                return ClassificationOutcome::Classified { code: node.code.clone(), name: node.name.clone(), confidence: None };
            }

            match self.select_child_with_retry(node, query, category).await {
                StepOutcome::Selected { child_code, confidence } => {
                    if confidence < self.confidence_threshold {
                        return ClassificationOutcome::Classified { code: node.code.clone(), name: node.name.clone(), confidence: Some(confidence) };
                    }
                    match node.children.iter().find(|c| c.code == child_code) {
                        Some(child) => node = child,
                        None => return ClassificationOutcome::Classified { code: node.code.clone(), name: node.name.clone(), confidence: Some(confidence) },
                    }
                }
                StepOutcome::NoSelection => {
                    return ClassificationOutcome::Classified { code: node.code.clone(), name: node.name.clone(), confidence: None };
                }
                StepOutcome::BreakerOpen => return ClassificationOutcome::Unclassified,
            }
        }
    }

    async fn select_child_with_retry(&self, node: &TaxonomyNode, query: &str, category: Option<&str>) -> StepOutcome {
        match self.select_child(node, query, category).await {
            StepOutcome::BreakerOpen => {
                tracing::warn!(node = %node.code, "classifier: breaker open, waiting before retry");
                tokio::time::sleep(self.breaker_retry_wait).await;
                self.select_child(node, query, category).await
            }
            other => other,
        }
    }

    async fn select_child(&self, node: &TaxonomyNode, query: &str, category: Option<&str>) -> StepOutcome {
        let normalized_query = canonical_form(query);

        if let Some(entry) = self.cache.get(&node.code, &normalized_query) {
            return StepOutcome::Selected { child_code: entry.winning_child_code, confidence: entry.confidence };
        }

        if self.orchestrator.all_breakers_open().await {
            return StepOutcome::BreakerOpen;
        }

        let user_prompt = build_user_prompt(node, query, category);
        let aggregated = self
            .orchestrator
            .dispatch(system_prompt(), &user_prompt, AggregationStrategy::FirstSuccess)
            .await;

        match parse_selection(node, &aggregated) {
            Some(selection) => {
                self.cache.put(
                    &node.code,
                    &normalized_query,
                    ClassifierCacheEntry { winning_child_code: selection.child_code.clone(), confidence: selection.confidence },
                );
                StepOutcome::Selected { child_code: selection.child_code, confidence: selection.confidence }
            }
            None => StepOutcome::NoSelection,
        }
    }
}

enum StepOutcome {
    Selected { child_code: String, confidence: f64 },
    NoSelection,
    BreakerOpen,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use refnorm_models::ProviderDescriptor;
    use refnorm_providers::{AiProvider, Completion, ProviderError};

    struct FixedAnswerProvider(&'static str);

    #[async_trait]
    impl AiProvider for FixedAnswerProvider {
        fn id(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<Completion, ProviderError> {
            Ok(Completion::new(self.0).with_confidence(0.95))
        }
    }

    fn two_level_tree() -> TaxonomyNode {
        TaxonomyNode {
            code: "00".into(),
            name: "root".into(),
            parent_code: None,
            level: 0,
            children: vec![
                TaxonomyNode { code: "01".into(), name: "Tires".into(), parent_code: Some("00".into()), level: 1, children: vec![] },
                TaxonomyNode { code: "02".into(), name: "Filters".into(), parent_code: Some("00".into()), level: 1, children: vec![] },
            ],
        }
    }

    #[tokio::test]
    async fn descends_to_the_matching_leaf() {
        let orchestrator = Arc::new(ProviderOrchestrator::new(vec![(
            ProviderDescriptor::generative("p1", "Provider One"),
            Arc::new(FixedAnswerProvider("01")),
        )]));
        let classifier = Classifier::new(two_level_tree(), orchestrator);

        let outcome = classifier.classify("Winter Tire 205/55", None).await;
        match outcome {
            ClassificationOutcome::Classified { code, .. } => assert_eq!(code, "01"),
            ClassificationOutcome::Unclassified => panic!("expected a classification"),
        }
    }

    #[tokio::test]
    async fn second_call_for_the_same_query_hits_the_cache() {
        let orchestrator = Arc::new(ProviderOrchestrator::new(vec![(
            ProviderDescriptor::generative("p1", "Provider One"),
            Arc::new(FixedAnswerProvider("02")),
        )]));
        let classifier = Classifier::new(two_level_tree(), orchestrator);

        let first = classifier.classify("Oil Filter", None).await;
        let second = classifier.classify("Oil Filter", None).await;
        for outcome in [first, second] {
            match outcome {
                ClassificationOutcome::Classified { code, .. } => assert_eq!(code, "02"),
                ClassificationOutcome::Unclassified => panic!("expected a classification"),
            }
        }
    }
}
