//! The per-database unit of work and its state machine (§3 Session).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a `Session`. Transitions are validated in
/// `SessionState::can_transition_to` and enforced by the session manager (F).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    Running,
    Stopped,
    Completed,
    Failed,
}

impl SessionState {
    /// At most one session per database may sit in `Pending` or `Running`;
    /// this is the predicate the uniqueness invariant is built on.
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Pending | SessionState::Running)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Completed | SessionState::Failed)
    }

    /// Whether the diagram in spec §3 allows this transition.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Stopped)
                | (Running, Completed)
                | (Running, Failed)
                | (Pending, Failed) // preflight failure before the worker starts
        )
    }
}

/// The unit of work for one database (§3 Session).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub database_id: i64,
    pub state: SessionState,
    pub heartbeat_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub priority: i32,
    pub timeout_secs: u64,
}

impl Session {
    pub fn is_heartbeat_expired(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.heartbeat_at);
        age.num_seconds() > self.timeout_secs as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn valid_transitions_follow_the_diagram() {
        assert!(SessionState::Pending.can_transition_to(SessionState::Running));
        assert!(SessionState::Running.can_transition_to(SessionState::Stopped));
        assert!(SessionState::Running.can_transition_to(SessionState::Completed));
        assert!(SessionState::Running.can_transition_to(SessionState::Failed));
        assert!(!SessionState::Completed.can_transition_to(SessionState::Running));
        assert!(!SessionState::Pending.can_transition_to(SessionState::Completed));
    }

    #[test]
    fn active_covers_only_pending_and_running() {
        assert!(SessionState::Pending.is_active());
        assert!(SessionState::Running.is_active());
        assert!(!SessionState::Stopped.is_active());
        assert!(!SessionState::Completed.is_active());
        assert!(!SessionState::Failed.is_active());
    }

    #[test]
    fn heartbeat_expiry_respects_timeout() {
        let now = Utc::now();
        let session = Session {
            id: 1,
            database_id: 1,
            state: SessionState::Running,
            heartbeat_at: now - Duration::seconds(120),
            created_at: now - Duration::seconds(200),
            finished_at: None,
            priority: 0,
            timeout_secs: 60,
        };
        assert!(session.is_heartbeat_expired(now));

        let fresh = Session { heartbeat_at: now - Duration::seconds(10), ..session };
        assert!(!fresh.is_heartbeat_expired(now));
    }
}
