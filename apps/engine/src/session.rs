//! Per-database session lifecycle (§4.F): a thin, typed wrapper over the
//! DAL's session operations, plus the registry of currently-running
//! workers that backs cooperative cancellation and the heartbeat
//! sweeper.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use refnorm_dal::NormalizationDal;
use refnorm_models::SessionState;
use tracing::{info, instrument, warn};

use crate::error::EngineError;

/// A cooperative cancellation flag shared between the scheduler (which
/// sets it) and a worker (which polls it at stage checkpoints, §5).
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct ActiveHandle {
    database_id: i64,
    cancel: CancelToken,
}

/// Session-table operations (§4.F) plus the bookkeeping the scheduler
/// needs to cancel or sweep a running session. Workers never call the DAL
/// directly for session-state writes; they go through this manager so
/// every transition is validated in one place.
pub struct SessionManager {
    dal: Arc<dyn NormalizationDal>,
    active: DashMap<i64, ActiveHandle>,
}

impl SessionManager {
    pub fn new(dal: Arc<dyn NormalizationDal>) -> Self {
        Self { dal, active: DashMap::new() }
    }

    #[instrument(skip(self))]
    pub async fn try_create(&self, database_id: i64, priority: i32, timeout_secs: u64) -> Result<(i64, bool), EngineError> {
        Ok(self.dal.try_create_normalization_session(database_id, priority, timeout_secs).await?)
    }

    pub async fn update_activity(&self, session_id: i64) -> Result<(), EngineError> {
        Ok(self.dal.update_session_activity(session_id).await?)
    }

    pub async fn update(&self, session_id: i64, state: SessionState, finished_at: Option<chrono::DateTime<Utc>>) -> Result<(), EngineError> {
        Ok(self.dal.update_normalization_session(session_id, state, finished_at).await?)
    }

    pub async fn get(&self, session_id: i64) -> Result<refnorm_models::Session, EngineError> {
        Ok(self.dal.get_normalization_session(session_id).await?)
    }

    /// Called by the scheduler when it spawns a worker for `session_id`.
    pub fn register(&self, session_id: i64, database_id: i64, cancel: CancelToken) {
        self.active.insert(session_id, ActiveHandle { database_id, cancel });
    }

    /// Called by the scheduler once a worker has finished, regardless of outcome.
    pub fn deregister(&self, session_id: i64) {
        self.active.remove(&session_id);
    }

    /// Signals cancellation for a running session (§4.F `Stop`). The
    /// worker finalizes the session to `stopped` itself at its next
    /// checkpoint; this call only flips the flag.
    pub fn stop(&self, session_id: i64) -> Result<(), EngineError> {
        match self.active.get(&session_id) {
            Some(handle) => {
                handle.cancel.cancel();
                Ok(())
            }
            None => Err(EngineError::NotFound(format!("no active session {session_id}"))),
        }
    }

    /// `Resume(sessionId)` (§4.F/§3): a stopped session is resumable by
    /// creating a new pending session for the same database. Returns the
    /// new session id; the caller (the scheduler) is responsible for
    /// actually dispatching a worker for it.
    pub async fn resume(&self, session_id: i64, priority: i32, timeout_secs: u64) -> Result<(i64, bool), EngineError> {
        let session = self.get(session_id).await?;
        if session.state != SessionState::Stopped {
            return Err(EngineError::Validation(format!("session {session_id} is not stopped, cannot resume")));
        }
        self.try_create(session.database_id, priority, timeout_secs).await
    }

    /// The periodic sweep (§4.F): any actively-tracked session whose
    /// heartbeat has aged past its timeout is transitioned to `failed`
    /// and its worker is cancelled. Returns the number of sessions swept.
    #[instrument(skip(self))]
    pub async fn sweep_once(&self) -> usize {
        let now = Utc::now();
        let mut expired: Vec<i64> = Vec::new();
        for entry in self.active.iter() {
            let session_id = *entry.key();
            match self.dal.get_normalization_session(session_id).await {
                Ok(session) if session.state == SessionState::Running && session.is_heartbeat_expired(now) => {
                    expired.push(session_id);
                }
                Ok(_) => {}
                Err(err) => warn!(session_id, error = %err, "sweeper: could not read session"),
            }
        }

        for session_id in &expired {
            if let Some((_, handle)) = self.active.remove(session_id) {
                handle.cancel.cancel();
            }
            if let Err(err) = self.dal.update_normalization_session(*session_id, SessionState::Failed, Some(now)).await {
                warn!(session_id, error = %err, "sweeper: failed to mark expired session as failed");
            } else {
                info!(session_id, "sweeper: heartbeat expired, session marked failed");
            }
        }
        expired.len()
    }

    /// Snapshot of `database_id -> session_id` for every session this
    /// manager is currently tracking, used by the status endpoint.
    pub fn active_snapshot(&self) -> HashMap<i64, i64> {
        self.active.iter().map(|entry| (entry.value().database_id, *entry.key())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refnorm_dal::InMemoryDal;

    #[tokio::test]
    async fn resume_requires_the_session_to_be_stopped() {
        let dal = Arc::new(InMemoryDal::new());
        let manager = SessionManager::new(dal.clone());
        let (session_id, _) = manager.try_create(1, 0, 60).await.unwrap();
        let result = manager.resume(session_id, 0, 60).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn resume_after_stop_creates_a_new_pending_session() {
        let dal = Arc::new(InMemoryDal::new());
        let manager = SessionManager::new(dal.clone());
        let (session_id, _) = manager.try_create(1, 0, 60).await.unwrap();
        manager.update(session_id, SessionState::Running, None).await.unwrap();
        manager.update(session_id, SessionState::Stopped, Some(Utc::now())).await.unwrap();

        let (new_id, created) = manager.resume(session_id, 0, 60).await.unwrap();
        assert!(created);
        assert_ne!(new_id, session_id);
    }

    #[tokio::test]
    async fn stop_cancels_a_registered_session_and_is_idempotent_on_the_flag() {
        let dal = Arc::new(InMemoryDal::new());
        let manager = SessionManager::new(dal.clone());
        let token = CancelToken::new();
        manager.register(1, 10, token.clone());
        manager.stop(1).unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn sweep_fails_sessions_with_expired_heartbeats() {
        let dal = Arc::new(InMemoryDal::new());
        let manager = SessionManager::new(dal.clone());
        let (session_id, _) = manager.try_create(1, 0, 1).await.unwrap();
        manager.update(session_id, SessionState::Running, None).await.unwrap();
        manager.register(session_id, 1, CancelToken::new());

        // Force the heartbeat into the past by recreating it through the DAL seed path
        // is not exposed; instead rely on the 1s timeout and a short sleep.
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        let swept = manager.sweep_once().await;
        assert_eq!(swept, 1);
        let session = manager.get(session_id).await.unwrap();
        assert_eq!(session.state, SessionState::Failed);
    }
}
