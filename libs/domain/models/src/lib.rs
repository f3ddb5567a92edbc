//! Shared domain entities and wire DTOs for the normalization engine.
//!
//! Pure data: every type here is `serde`-derived and carries no behavior
//! beyond small, side-effect-free helpers. I/O and business logic live in
//! the crates that depend on this one.

pub mod group;
pub mod progress;
pub mod provider;
pub mod session;
pub mod source_item;
pub mod taxonomy;

pub use group::{Group, ProcessingLevel};
pub use progress::{ProgressData, ProgressEvent, ProgressEventType};
pub use provider::{CircuitBreakerConfig, ProviderCapability, ProviderDescriptor, RateLimitConfig};
pub use session::{Session, SessionState};
pub use source_item::{ClientProject, ClientProjectType, DatabaseDescriptor, SourceItem};
pub use taxonomy::{ClassifierCacheEntry, TaxonomyNode};
