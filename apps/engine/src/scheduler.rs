//! Project-level dispatch and coordination (§4.H). Validates a database
//! selection, allocates sessions through the session manager, and runs
//! one worker per selected database under a single process-wide
//! "running" flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use refnorm_classifier::Classifier;
use refnorm_dal::NormalizationDal;
use refnorm_models::{
    ClientProject, ClientProjectType, DatabaseDescriptor, ProgressData, ProgressEvent, ProgressEventType, SessionState,
};
use refnorm_providers::{CounterpartyRouter, ProviderOrchestrator};
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::error::EngineError;
use crate::event_bus::EventBus;
use crate::result_writer::ResultWriter;
use crate::session::{CancelToken, SessionManager};
use crate::worker::{run_worker, WorkerDeps, WorkerOutcome};

/// `…/normalization/start` body (§6.2). `database_ids` takes precedence
/// over `database_path`, which takes precedence over `all_active`.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StartRequest {
    pub all_active: Option<bool>,
    pub database_ids: Option<Vec<i64>>,
    pub database_path: Option<String>,
    #[serde(default)]
    pub use_kpved: bool,
    #[serde(default)]
    pub use_okpd2: bool,
}

pub struct Scheduler {
    dal: Arc<dyn NormalizationDal>,
    bus: Arc<EventBus>,
    sessions: Arc<SessionManager>,
    result_writer: Arc<ResultWriter>,
    orchestrator: Option<Arc<ProviderOrchestrator>>,
    counterparty_router: Option<Arc<CounterpartyRouter>>,
    classifier_kpved: Option<Arc<Classifier>>,
    classifier_okpd2: Option<Arc<Classifier>>,
    cluster_threshold: f64,
    progress_increment: u64,
    global_worker_budget: usize,
    default_session_timeout_secs: u64,
    shutdown_deadline: Duration,
    running: Arc<AtomicBool>,
}

#[allow(clippy::too_many_arguments)]
impl Scheduler {
    pub fn new(
        dal: Arc<dyn NormalizationDal>,
        bus: Arc<EventBus>,
        sessions: Arc<SessionManager>,
        result_writer: Arc<ResultWriter>,
        orchestrator: Option<Arc<ProviderOrchestrator>>,
        counterparty_router: Option<Arc<CounterpartyRouter>>,
        classifier_kpved: Option<Arc<Classifier>>,
        classifier_okpd2: Option<Arc<Classifier>>,
        cluster_threshold: f64,
        progress_increment: u64,
        global_worker_budget: usize,
        default_session_timeout_secs: u64,
        shutdown_deadline: Duration,
    ) -> Self {
        Self {
            dal,
            bus,
            sessions,
            result_writer,
            orchestrator,
            counterparty_router,
            classifier_kpved,
            classifier_okpd2,
            cluster_threshold,
            progress_increment,
            global_worker_budget,
            default_session_timeout_secs,
            shutdown_deadline,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Resolves the requested selection, allocates one session per
    /// database, and dispatches a worker for each — bounded at
    /// min(selection size, global worker budget, active provider channel
    /// capacity) per §4.H. Returns the count of workers actually started.
    /// Rejects with `AlreadyRunning` while a previous batch is still in
    /// flight, matching the single process-wide flag of §4.H.
    #[instrument(skip(self, request))]
    pub async fn start(&self, project: ClientProject, request: StartRequest) -> Result<usize, EngineError> {
        if self.running.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return Err(EngineError::AlreadyRunning);
        }

        let databases = match self.resolve_selection(project.project_id, &request).await {
            Ok(databases) => databases,
            Err(err) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(err);
            }
        };

        let channel_cap = self.orchestrator.as_ref().map(|o| o.total_channel_capacity()).unwrap_or(usize::MAX);
        let budget = databases.len().min(self.global_worker_budget).min(channel_cap).max(1);
        let (dispatched, skipped) = databases.split_at(databases.len().min(budget));
        if !skipped.is_empty() {
            warn!(skipped = skipped.len(), budget, "scheduler: selection exceeds worker budget, remainder not started this batch");
        }

        let deps = Arc::new(self.worker_deps(&request));
        let mut set = JoinSet::new();
        let mut started = 0usize;

        for database in dispatched {
            match self.sessions.try_create(database.id, 0, self.default_session_timeout_secs).await {
                Ok((session_id, true)) => {
                    let cancel = CancelToken::new();
                    self.sessions.register(session_id, database.id, cancel.clone());
                    let deps = deps.clone();
                    let sessions = self.sessions.clone();
                    let project = project.clone();
                    let database_id = database.id;
                    set.spawn(async move {
                        let outcome = run_worker(deps, session_id, database_id, project, cancel).await;
                        sessions.deregister(session_id);
                        outcome
                    });
                    started += 1;
                }
                Ok((_, false)) => {
                    info!(database_id = database.id, "scheduler: database already has an active session, skipping");
                }
                Err(err) => {
                    error!(database_id = database.id, error = %err, "scheduler: failed to create session");
                }
            }
        }

        self.spawn_finalizer(set, project, started);
        Ok(started)
    }

    /// Awaits every worker spawned for a batch in the background, traps
    /// panics (§4.H: a panicking worker's session is failed, others
    /// continue), aggregates counts and emits the final ProgressEvent,
    /// then clears the running flag.
    fn spawn_finalizer(&self, mut set: JoinSet<WorkerOutcome>, project: ClientProject, started: usize) {
        let running = self.running.clone();
        let bus = self.bus.clone();
        tokio::spawn(async move {
            let mut processed = 0usize;
            let mut errors = 0usize;
            let mut any_failed = false;

            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(WorkerOutcome::Completed { processed: p, errors: e, .. }) => {
                        processed += p;
                        errors += e;
                    }
                    Ok(WorkerOutcome::Stopped { processed: p, .. }) => processed += p,
                    Ok(WorkerOutcome::Failed) => any_failed = true,
                    Err(join_err) => {
                        any_failed = true;
                        error!(error = %join_err, "scheduler: worker task panicked");
                    }
                }
            }

            running.store(false, Ordering::SeqCst);
            let event_type = if any_failed { ProgressEventType::Failed } else { ProgressEventType::Completed };
            bus.publish(ProgressEvent::new(
                event_type,
                project.client_id,
                project.project_id,
                ProgressData { total_processed: Some(processed as u64), ..Default::default() },
            ));
            info!(started, processed, errors, any_failed, "scheduler: batch finished");
        });
    }

    /// Cancels every currently-tracked session (§5: stopping the
    /// scheduler cancels all worker tokens). Workers finalize to
    /// `stopped` themselves at their next checkpoint.
    pub fn stop_all(&self) {
        for (_, session_id) in self.sessions.active_snapshot() {
            let _ = self.sessions.stop(session_id);
        }
    }

    pub fn stop_session(&self, session_id: i64) -> Result<(), EngineError> {
        self.sessions.stop(session_id)
    }

    /// `…/normalization/sessions/{id}/resume` (§6.2): creates a new
    /// pending session for the stopped session's database and dispatches
    /// a worker for it directly, independent of the batch-level running
    /// flag (this is a single-session control operation, not a new run).
    pub async fn resume_session(&self, session_id: i64, project: ClientProject) -> Result<i64, EngineError> {
        let (new_session_id, _) = self.sessions.resume(session_id, 0, self.default_session_timeout_secs).await?;
        let database_id = self.sessions.get(new_session_id).await?.database_id;

        let cancel = CancelToken::new();
        self.sessions.register(new_session_id, database_id, cancel.clone());
        let deps = Arc::new(self.worker_deps(&StartRequest::default()));
        let sessions = self.sessions.clone();
        tokio::spawn(async move {
            run_worker(deps, new_session_id, database_id, project, cancel).await;
            sessions.deregister(new_session_id);
        });
        Ok(new_session_id)
    }

    /// Waits for every tracked session to finish, up to the configured
    /// deadline; anything still running past it is force-failed (§5,
    /// exit code `ShutdownWithLiveJobs`). Returns `true` if the shutdown
    /// was clean.
    pub async fn shutdown(&self) -> bool {
        self.stop_all();
        let deadline = tokio::time::Instant::now() + self.shutdown_deadline;
        while !self.sessions.active_snapshot().is_empty() {
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let remaining = self.sessions.active_snapshot();
        for (_, session_id) in &remaining {
            let _ = self.sessions.update(*session_id, SessionState::Failed, Some(chrono::Utc::now())).await;
        }
        remaining.is_empty()
    }

    async fn resolve_selection(&self, project_id: i64, request: &StartRequest) -> Result<Vec<DatabaseDescriptor>, EngineError> {
        if let Some(ids) = &request.database_ids {
            let all = self.dal.get_project_databases(project_id, false).await?;
            let selected: Vec<DatabaseDescriptor> = all.into_iter().filter(|d| ids.contains(&d.id)).collect();
            if selected.is_empty() {
                return Err(EngineError::Validation("none of the requested database_ids belong to this project".to_string()));
            }
            return Ok(selected);
        }

        if let Some(path) = &request.database_path {
            let all = self.dal.get_project_databases(project_id, false).await?;
            let selected: Vec<DatabaseDescriptor> = all.into_iter().filter(|d| d.name.contains(path.as_str())).collect();
            if selected.is_empty() {
                return Err(EngineError::Validation(format!("no databases match database_path {path:?}")));
            }
            return Ok(selected);
        }

        let active_only = request.all_active.unwrap_or(true);
        self.dal.get_project_databases(project_id, active_only).await.map_err(EngineError::from)
    }

    fn worker_deps(&self, request: &StartRequest) -> WorkerDeps {
        let classifier = if request.use_okpd2 {
            self.classifier_okpd2.clone()
        } else if request.use_kpved {
            self.classifier_kpved.clone()
        } else {
            None
        };

        WorkerDeps {
            dal: self.dal.clone(),
            bus: self.bus.clone(),
            sessions: self.sessions.clone(),
            result_writer: self.result_writer.clone(),
            orchestrator: self.orchestrator.clone(),
            counterparty_router: self.counterparty_router.clone(),
            classifier,
            cluster_threshold: self.cluster_threshold,
            progress_increment: self.progress_increment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refnorm_dal::InMemoryDal;

    fn scheduler(dal: Arc<dyn NormalizationDal>) -> Scheduler {
        let bus = Arc::new(EventBus::new(64));
        let sessions = Arc::new(SessionManager::new(dal.clone()));
        let result_writer = Arc::new(ResultWriter::new(dal.clone(), 500));
        Scheduler::new(dal, bus, sessions, result_writer, None, None, None, None, 0.85, 50, 8, 60, Duration::from_secs(5))
    }

    fn project() -> ClientProject {
        ClientProject { client_id: 1, project_id: 10, name: "acme".into(), project_type: ClientProjectType::Nomenclature }
    }

    #[tokio::test]
    async fn starting_twice_without_finishing_is_rejected_with_already_running() {
        let dal_impl = Arc::new(InMemoryDal::new());
        dal_impl.seed_database(DatabaseDescriptor { id: 1, project_id: 10, name: "db-1".into(), active: true });
        let dal: Arc<dyn NormalizationDal> = dal_impl;
        let scheduler = scheduler(dal);

        let first = scheduler.start(project(), StartRequest { all_active: Some(true), ..Default::default() }).await;
        assert!(first.is_ok());
        let second = scheduler.start(project(), StartRequest { all_active: Some(true), ..Default::default() }).await;
        assert!(matches!(second, Err(EngineError::AlreadyRunning)));
    }

    #[tokio::test]
    async fn database_ids_outside_the_project_are_a_validation_error() {
        let dal_impl = Arc::new(InMemoryDal::new());
        dal_impl.seed_database(DatabaseDescriptor { id: 1, project_id: 10, name: "db-1".into(), active: true });
        let dal: Arc<dyn NormalizationDal> = dal_impl;
        let scheduler = scheduler(dal);

        let result = scheduler.start(project(), StartRequest { database_ids: Some(vec![999]), ..Default::default() }).await;
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }
}
