//! The data-access contract every host application must implement (§6.1).
//!
//! This engine never speaks SQL directly — it is handed an implementation
//! of [`NormalizationDal`] by its embedder and drives normalization
//! entirely through this seam.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use refnorm_models::{ClientProject, DatabaseDescriptor, Group, Session, SessionState, SourceItem};

use crate::error::DalError;

pub type ItemStream = Pin<Box<dyn Stream<Item = Result<SourceItem, DalError>> + Send>>;

#[async_trait]
pub trait NormalizationDal: Send + Sync {
    /// §6.1 `GetProjectDatabases`.
    async fn get_project_databases(&self, project_id: i64, active_only: bool) -> Result<Vec<DatabaseDescriptor>, DalError>;

    /// §6.1 `GetDatabaseItems` — a bounded stream so the worker's read
    /// stage never has to materialize an entire source table at once.
    async fn get_database_items(&self, database_id: i64) -> Result<ItemStream, DalError>;

    /// §6.1 `GetClientProject`.
    async fn get_client_project(&self, project_id: i64) -> Result<ClientProject, DalError>;

    /// §6.1 `TryCreateNormalizationSession` — atomic; `created = false`
    /// when an active session already exists for `database_id`, per the
    /// uniqueness invariant of §4.F (the manager must not error on
    /// contention, it must report the loser).
    async fn try_create_normalization_session(&self, database_id: i64, priority: i32, timeout_secs: u64) -> Result<(i64, bool), DalError>;

    /// §6.1 `UpdateNormalizationSession` — validated against the §3 diagram.
    async fn update_normalization_session(&self, session_id: i64, state: SessionState, finished_at: Option<DateTime<Utc>>) -> Result<(), DalError>;

    /// §6.1 `UpdateSessionActivity` — refreshes the heartbeat.
    async fn update_session_activity(&self, session_id: i64) -> Result<(), DalError>;

    /// §6.1 `GetNormalizationSession`.
    async fn get_normalization_session(&self, session_id: i64) -> Result<Session, DalError>;

    /// §6.1 `InsertNormalizedBatch` — persists a batch of finished Groups
    /// for one session/project. Each `Group` already carries its own
    /// merged attribute map (§3), so no separate attrs parameter is needed.
    async fn insert_normalized_batch(&self, groups: &[Group], session_id: i64, project_id: i64) -> Result<(), DalError>;

    /// Read-only aggregate over everything persisted for `project_id`,
    /// backing the §6.2 `/groups`, `/stats` and `/preview-stats` routes.
    /// Not itemized in §6.1's write-path contract, but required for those
    /// routes to return anything beyond session bookkeeping.
    async fn get_normalized_groups(&self, project_id: i64) -> Result<Vec<Group>, DalError>;
}
