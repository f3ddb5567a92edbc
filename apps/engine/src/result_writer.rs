//! Batched, retried persistence of finished Groups (§4.J). Once a batch
//! is handed to `ResultWriter::write`, the worker no longer touches those
//! records (§3 ownership).

use std::sync::Arc;
use std::time::Duration;

use refnorm_dal::NormalizationDal;
use refnorm_models::{Group, ProgressData, ProgressEvent, ProgressEventType};
use tracing::{instrument, warn};

use crate::event_bus::EventBus;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(100);

pub struct ResultWriter {
    dal: Arc<dyn NormalizationDal>,
    batch_size: usize,
}

/// Summary of one `write` call, enough for the worker to decide whether
/// the session still completes cleanly (§4.J: a failed batch does not
/// fail the session, only marks it a partial completion).
#[derive(Debug, Default)]
pub struct WriteOutcome {
    pub persisted: usize,
    pub failed_batches: usize,
}

impl ResultWriter {
    pub fn new(dal: Arc<dyn NormalizationDal>, batch_size: usize) -> Self {
        Self { dal, batch_size: batch_size.max(1) }
    }

    #[instrument(skip(self, groups, bus))]
    pub async fn write(&self, groups: &[Group], session_id: i64, project_id: i64, client_id: i64, bus: &EventBus) -> WriteOutcome {
        let mut outcome = WriteOutcome::default();
        for chunk in groups.chunks(self.batch_size) {
            match self.write_chunk_with_retry(chunk, session_id, project_id).await {
                Ok(()) => outcome.persisted += chunk.len(),
                Err(err) => {
                    outcome.failed_batches += 1;
                    warn!(session_id, error = %err, "result writer: batch failed after retries");
                    bus.publish(
                        ProgressEvent::new(
                            ProgressEventType::Partial,
                            client_id,
                            project_id,
                            ProgressData { message: Some(format!("batch write failed: {err}")), ..Default::default() },
                        )
                        .with_session(session_id, 0),
                    );
                }
            }
        }
        outcome
    }

    async fn write_chunk_with_retry(&self, chunk: &[Group], session_id: i64, project_id: i64) -> Result<(), refnorm_dal::DalError> {
        let mut attempt = 0;
        loop {
            match self.dal.insert_normalized_batch(chunk, session_id, project_id).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < MAX_RETRIES => {
                    attempt += 1;
                    let backoff = BASE_BACKOFF * 2u32.pow(attempt - 1);
                    warn!(session_id, attempt, error = %err, "result writer: retrying batch");
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refnorm_dal::InMemoryDal;
    use refnorm_models::SourceItem;

    #[tokio::test]
    async fn a_clean_write_persists_every_group() {
        let dal = Arc::new(InMemoryDal::new());
        let writer = ResultWriter::new(dal.clone(), 500);
        let bus = EventBus::new(16);
        let groups = vec![
            Group::from_cluster(vec![SourceItem::new("1", "A1", "Winter Tire")]),
            Group::from_cluster(vec![SourceItem::new("2", "A2", "Summer Tire")]),
        ];
        let outcome = writer.write(&groups, 1, 10, 1, &bus).await;
        assert_eq!(outcome.persisted, 2);
        assert_eq!(outcome.failed_batches, 0);
        assert_eq!(dal.committed_batch(1).len(), 2);
    }

    #[tokio::test]
    async fn writing_respects_the_configured_batch_size() {
        let dal = Arc::new(InMemoryDal::new());
        let writer = ResultWriter::new(dal.clone(), 1);
        let bus = EventBus::new(16);
        let groups = vec![
            Group::from_cluster(vec![SourceItem::new("1", "A1", "A")]),
            Group::from_cluster(vec![SourceItem::new("2", "A2", "B")]),
            Group::from_cluster(vec![SourceItem::new("3", "A3", "C")]),
        ];
        let outcome = writer.write(&groups, 1, 10, 1, &bus).await;
        assert_eq!(outcome.persisted, 3);
        assert_eq!(dal.committed_batch(1).len(), 3);
    }
}
