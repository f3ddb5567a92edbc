//! The tagged-union progress stream (§3 ProgressEvent, §6.3 envelope).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload carried by a ProgressEvent. Field sets mirror §6.3 exactly; all
/// fields are optional because most variants use only a subset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_items: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub benchmark_matches: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enriched_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_groups: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_processed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_per_second: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One of the tagged-union event kinds of §3/§6.3.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventType {
    Start,
    Progress,
    Partial,
    Completed,
    Failed,
    Stopped,
}

/// The full wire envelope emitted on the event bus (§6.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub event_type: ProgressEventType,
    pub timestamp: DateTime<Utc>,
    pub client_id: i64,
    pub project_id: i64,
    /// Present for session-scoped events; absent for project-level rollups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_id: Option<i64>,
    pub data: ProgressData,
}

impl ProgressEvent {
    pub fn new(event_type: ProgressEventType, client_id: i64, project_id: i64, data: ProgressData) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            client_id,
            project_id,
            session_id: None,
            database_id: None,
            data,
        }
    }

    pub fn with_session(mut self, session_id: i64, database_id: i64) -> Self {
        self.session_id = Some(session_id);
        self.database_id = Some(database_id);
        self
    }
}
