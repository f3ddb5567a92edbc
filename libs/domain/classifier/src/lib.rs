//! Hierarchical industry-taxonomy classifier (§4.E).

mod cache;
mod classifier;
mod select;

pub use cache::ClassifierCache;
pub use classifier::{ClassificationOutcome, Classifier};
pub use select::{build_user_prompt, parse_selection, Selection};
