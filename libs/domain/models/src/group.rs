//! Equivalence classes of SourceItems produced by a normalization session (§3 Group).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::source_item::SourceItem;

/// An equivalence class of `SourceItem`s judged similar by the similarity
/// kernel and, optionally, adjudicated by the AI orchestrator.
///
/// Value-semantic: once handed to the result writer or the event bus it is
/// never mutated again (§9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    /// Canonical name chosen to represent the group. Empty when
    /// canonicalization failed and no fallback name could be derived.
    pub canonical_name: String,
    /// Business category carried from the source items (nomenclature only).
    pub category: Option<String>,
    /// Number of items merged into this group; equals `items.len()`.
    pub merged_count: usize,
    /// Confidence reported by the AI provider that produced `canonical_name`,
    /// `None` when canonicalization fell back to a deterministic choice.
    pub ai_confidence: Option<f64>,
    /// Free-text justification returned by the AI provider, if any.
    pub ai_reasoning: Option<String>,
    pub processing_level: ProcessingLevel,
    pub classifier_code: Option<String>,
    pub classifier_name: Option<String>,
    pub classifier_confidence: Option<f64>,
    /// Union of all member items' attribute maps; later items do not
    /// overwrite keys already contributed by earlier ones.
    pub attributes: HashMap<String, String>,
    pub items: Vec<SourceItem>,
}

/// How far a Group made it through the G pipeline (§4.G) before persistence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingLevel {
    /// Clustered only; canonicalization and classification were skipped or failed.
    Clustered,
    /// Canonical name assigned, classification pending or failed.
    Canonicalized,
    /// Canonical name and classifier code both assigned.
    Classified,
}

impl Group {
    /// Build a Group from a non-empty cluster of items, before
    /// canonicalization or classification has run.
    pub fn from_cluster(items: Vec<SourceItem>) -> Self {
        debug_assert!(!items.is_empty(), "a Group must contain at least one item");
        let merged_count = items.len();
        let mut attributes = HashMap::new();
        for item in &items {
            for (k, v) in &item.attributes {
                attributes.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        let category = items
            .iter()
            .find_map(|i| i.attributes.get("category").cloned());
        Self {
            canonical_name: String::new(),
            category,
            merged_count,
            ai_confidence: None,
            ai_reasoning: None,
            processing_level: ProcessingLevel::Clustered,
            classifier_code: None,
            classifier_name: None,
            classifier_confidence: None,
            attributes,
            items,
        }
    }

    /// The longest raw name among the group's members — the deterministic
    /// fallback canonical name used when AI canonicalization is unavailable.
    pub fn longest_member_name(&self) -> &str {
        self.items
            .iter()
            .map(|i| i.raw_name.as_str())
            .max_by_key(|name| name.chars().count())
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_count_equals_item_count() {
        let items = vec![
            SourceItem::new("1", "A1", "Winter Tire 205/55"),
            SourceItem::new("2", "A2", "winter tire 205-55"),
        ];
        let group = Group::from_cluster(items);
        assert_eq!(group.merged_count, 2);
        assert_eq!(group.items.len(), 2);
    }

    #[test]
    fn longest_member_name_picks_the_longest_raw_name() {
        let items = vec![
            SourceItem::new("1", "A1", "Tire"),
            SourceItem::new("2", "A2", "Winter Tire 205/55 R16"),
        ];
        let group = Group::from_cluster(items);
        assert_eq!(group.longest_member_name(), "Winter Tire 205/55 R16");
    }

    #[test]
    fn attributes_union_keeps_first_writer() {
        let items = vec![
            SourceItem::new("1", "A1", "X").with_attribute("color", "red"),
            SourceItem::new("2", "A2", "Y").with_attribute("color", "blue"),
        ];
        let group = Group::from_cluster(items);
        assert_eq!(group.attributes.get("color").map(String::as_str), Some("red"));
    }
}
