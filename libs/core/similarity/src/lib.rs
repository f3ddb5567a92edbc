//! Deterministic string-distance primitives and the weighted hybrid
//! similarity score used by the clustering stage of the normalization
//! pipeline (§4.A). No network or async dependency; pure, side-effect-free
//! functions suitable for both online scoring and offline weight tuning.

mod analyze;
mod hybrid;
mod normalize;
mod primitives;

pub use analyze::{analyze_pairs, compare_weights, LabeledPair, ScoredPair, WeightReport};
pub use hybrid::{hybrid_score, Breakdown, Weights};
pub use normalize::{canonical_form, canonical_form_counterparty};
pub use primitives::{jaro_winkler, lcs_ratio, ngram_cosine, phonetic_equal, token_jaccard};
