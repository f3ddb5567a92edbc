//! The non-blocking progress broadcaster (§4.I). Producers never block on
//! send; a full or subscriber-less channel silently drops the event,
//! since progress is advisory and the latest state is also persisted on
//! the session (§4.I).

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::trace;

use refnorm_models::{ProgressData, ProgressEvent};

pub struct EventBus {
    sender: broadcast::Sender<ProgressEvent>,
    /// Last-seen `ProgressData` per session, kept alongside the broadcast
    /// channel so the status snapshot endpoint (§6.2) can answer
    /// `processed`/`total`/`currentStep` without a subscriber having been
    /// attached when the event fired.
    last_by_session: DashMap<i64, ProgressData>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, last_by_session: DashMap::new() }
    }

    /// A new receiver for the status API's subscription endpoint; each
    /// subscriber gets its own lagging window independent of the others.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Non-blocking publish. `send` only errors when there are zero
    /// receivers, which is the normal case when nobody is watching.
    pub fn publish(&self, event: ProgressEvent) {
        if let Some(session_id) = event.session_id {
            self.last_by_session.insert(session_id, event.data.clone());
        }
        if self.sender.send(event).is_err() {
            trace!("event bus: no active subscribers, event dropped");
        }
    }

    /// Last known progress payload for a session, for the status snapshot.
    pub fn last_progress(&self, session_id: i64) -> Option<ProgressData> {
        self.last_by_session.get(&session_id).map(|entry| entry.clone())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refnorm_models::{ProgressData, ProgressEventType};

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        bus.publish(ProgressEvent::new(ProgressEventType::Start, 1, 1, ProgressData::default()));
    }

    #[tokio::test]
    async fn a_subscriber_receives_published_events() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(ProgressEvent::new(ProgressEventType::Progress, 1, 1, ProgressData::default()));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type, ProgressEventType::Progress);
    }
}
