//! The industry-classifier tree walked by component E (§3 TaxonomyNode,
//! ClassifierCacheEntry).

use serde::{Deserialize, Serialize};

/// A node in an external industry taxonomy (KPVED/OKPD2 or similar).
/// Immutable after load; the full tree is process-wide read-only state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyNode {
    pub code: String,
    pub name: String,
    pub parent_code: Option<String>,
    pub level: u32,
    pub children: Vec<TaxonomyNode>,
}

impl TaxonomyNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A memoized classifier decision for one (node, normalized query) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierCacheEntry {
    pub winning_child_code: String,
    pub confidence: f64,
}
