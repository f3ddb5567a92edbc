//! An in-memory `NormalizationDal`, used by tests and by the `demos/`
//! standalone binary. Not a production data store.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::stream;
use refnorm_models::{ClientProject, DatabaseDescriptor, Group, Session, SessionState, SourceItem};

use crate::error::DalError;
use crate::trait_def::{ItemStream, NormalizationDal};

pub struct InMemoryDal {
    databases: DashMap<i64, DatabaseDescriptor>,
    projects: DashMap<i64, ClientProject>,
    items: DashMap<i64, Vec<SourceItem>>,
    sessions: DashMap<i64, Session>,
    active_by_database: DashMap<i64, i64>,
    batches: DashMap<i64, Vec<Group>>,
    project_batches: DashMap<i64, Vec<Group>>,
    next_session_id: AtomicI64,
}

impl InMemoryDal {
    pub fn new() -> Self {
        Self {
            databases: DashMap::new(),
            projects: DashMap::new(),
            items: DashMap::new(),
            sessions: DashMap::new(),
            active_by_database: DashMap::new(),
            batches: DashMap::new(),
            project_batches: DashMap::new(),
            next_session_id: AtomicI64::new(1),
        }
    }

    pub fn seed_database(&self, descriptor: DatabaseDescriptor) {
        self.databases.insert(descriptor.id, descriptor);
    }

    pub fn seed_project(&self, project: ClientProject) {
        self.projects.insert(project.project_id, project);
    }

    pub fn seed_items(&self, database_id: i64, items: Vec<SourceItem>) {
        self.items.insert(database_id, items);
    }

    /// Test/demo helper: every Group ever committed via `insert_normalized_batch`.
    pub fn committed_batch(&self, session_id: i64) -> Vec<Group> {
        self.batches.get(&session_id).map(|entry| entry.clone()).unwrap_or_default()
    }
}

impl Default for InMemoryDal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NormalizationDal for InMemoryDal {
    async fn get_project_databases(&self, project_id: i64, active_only: bool) -> Result<Vec<DatabaseDescriptor>, DalError> {
        Ok(self
            .databases
            .iter()
            .filter(|entry| entry.project_id == project_id && (!active_only || entry.active))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn get_database_items(&self, database_id: i64) -> Result<ItemStream, DalError> {
        let items = self.items.get(&database_id).map(|entry| entry.clone()).unwrap_or_default();
        Ok(Box::pin(stream::iter(items.into_iter().map(Ok))))
    }

    async fn get_client_project(&self, project_id: i64) -> Result<ClientProject, DalError> {
        self.projects
            .get(&project_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DalError::NotFound(format!("project {project_id}")))
    }

    async fn try_create_normalization_session(&self, database_id: i64, priority: i32, timeout_secs: u64) -> Result<(i64, bool), DalError> {
        match self.active_by_database.entry(database_id) {
            Entry::Occupied(existing) => Ok((*existing.get(), false)),
            Entry::Vacant(slot) => {
                let session_id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
                let now = Utc::now();
                let session = Session {
                    id: session_id,
                    database_id,
                    state: SessionState::Pending,
                    heartbeat_at: now,
                    created_at: now,
                    finished_at: None,
                    priority,
                    timeout_secs,
                };
                self.sessions.insert(session_id, session);
                slot.insert(session_id);
                Ok((session_id, true))
            }
        }
    }

    async fn update_normalization_session(&self, session_id: i64, state: SessionState, finished_at: Option<DateTime<Utc>>) -> Result<(), DalError> {
        let mut entry = self.sessions.get_mut(&session_id).ok_or_else(|| DalError::NotFound(format!("session {session_id}")))?;
        if !entry.state.can_transition_to(state) {
            return Err(DalError::InvalidTransition { session_id, from: entry.state, to: state });
        }
        entry.state = state;
        entry.finished_at = finished_at;
        let database_id = entry.database_id;
        drop(entry);
        if state.is_terminal() {
            self.active_by_database.remove_if(&database_id, |_, sid| *sid == session_id);
        }
        Ok(())
    }

    async fn update_session_activity(&self, session_id: i64) -> Result<(), DalError> {
        let mut entry = self.sessions.get_mut(&session_id).ok_or_else(|| DalError::NotFound(format!("session {session_id}")))?;
        entry.heartbeat_at = Utc::now();
        Ok(())
    }

    async fn get_normalization_session(&self, session_id: i64) -> Result<Session, DalError> {
        self.sessions
            .get(&session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DalError::NotFound(format!("session {session_id}")))
    }

    async fn insert_normalized_batch(&self, groups: &[Group], session_id: i64, project_id: i64) -> Result<(), DalError> {
        self.batches.entry(session_id).or_default().extend_from_slice(groups);
        self.project_batches.entry(project_id).or_default().extend_from_slice(groups);
        Ok(())
    }

    async fn get_normalized_groups(&self, project_id: i64) -> Result<Vec<Group>, DalError> {
        Ok(self.project_batches.get(&project_id).map(|entry| entry.clone()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn sample_database() -> DatabaseDescriptor {
        DatabaseDescriptor { id: 1, project_id: 10, name: "db-1".into(), active: true }
    }

    #[tokio::test]
    async fn try_create_is_idempotent_while_active() {
        let dal = InMemoryDal::new();
        let (first_id, first_created) = dal.try_create_normalization_session(1, 0, 60).await.unwrap();
        let (second_id, second_created) = dal.try_create_normalization_session(1, 0, 60).await.unwrap();
        assert!(first_created);
        assert!(!second_created);
        assert_eq!(first_id, second_id);
    }

    #[tokio::test]
    async fn completing_a_session_frees_the_database_for_a_new_one() {
        let dal = InMemoryDal::new();
        let (session_id, _) = dal.try_create_normalization_session(1, 0, 60).await.unwrap();
        dal.update_normalization_session(session_id, SessionState::Running, None).await.unwrap();
        dal.update_normalization_session(session_id, SessionState::Completed, Some(Utc::now())).await.unwrap();

        let (new_id, created) = dal.try_create_normalization_session(1, 0, 60).await.unwrap();
        assert!(created);
        assert_ne!(new_id, session_id);
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected() {
        let dal = InMemoryDal::new();
        let (session_id, _) = dal.try_create_normalization_session(1, 0, 60).await.unwrap();
        let result = dal.update_normalization_session(session_id, SessionState::Completed, None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn get_database_items_streams_the_seeded_items() {
        let dal = InMemoryDal::new();
        dal.seed_database(sample_database());
        dal.seed_items(1, vec![SourceItem::new("a", "A1", "Winter Tire")]);

        let mut stream = dal.get_database_items(1).await.unwrap();
        let mut collected = Vec::new();
        while let Some(item) = stream.next().await {
            collected.push(item.unwrap());
        }
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].raw_name, "Winter Tire");
    }

    #[tokio::test]
    async fn insert_normalized_batch_accumulates_across_calls() {
        let dal = InMemoryDal::new();
        let group = Group::from_cluster(vec![SourceItem::new("a", "A1", "Winter Tire")]);
        dal.insert_normalized_batch(&[group.clone()], 1, 10).await.unwrap();
        dal.insert_normalized_batch(&[group], 1, 10).await.unwrap();
        assert_eq!(dal.committed_batch(1).len(), 2);
    }
}
