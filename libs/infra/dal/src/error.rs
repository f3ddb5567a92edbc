//! Failures the external data-access layer may report (§6.1, §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DalError {
    #[error("entity not found: {0}")]
    NotFound(String),
    #[error("conflict: an active session already exists for database {database_id} (session {session_id})")]
    SessionAlreadyActive { database_id: i64, session_id: i64 },
    #[error("invalid state transition for session {session_id}: {from:?} -> {to:?}")]
    InvalidTransition { session_id: i64, from: refnorm_models::SessionState, to: refnorm_models::SessionState },
    #[error("backing store unavailable: {0}")]
    Unavailable(String),
}
