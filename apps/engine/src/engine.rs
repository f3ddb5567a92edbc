//! The composition root (§9): owns every long-lived component and wires
//! them together. `Engine::ignite` builds the value from configuration;
//! `Engine::launch` starts its background daemons and the HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use refnorm_classifier::Classifier;
use refnorm_dal::NormalizationDal;
use refnorm_models::{ProviderDescriptor, TaxonomyNode};
use refnorm_providers::{AiProvider, CounterpartyRouter, ProviderOrchestrator};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::config::Config;
use crate::event_bus::EventBus;
use crate::http;
use crate::result_writer::ResultWriter;
use crate::scheduler::Scheduler;
use crate::session::SessionManager;

/// Everything the binary needs beyond environment configuration: the
/// providers to register and, optionally, the two classification
/// taxonomies selectable via `use_kpved`/`use_okpd2` (§6.2).
pub struct EngineDependencies {
    pub dal: Arc<dyn NormalizationDal>,
    pub providers: Vec<(ProviderDescriptor, Arc<dyn AiProvider>)>,
    pub counterparty_router: Option<CounterpartyRouter>,
    pub kpved_root: Option<TaxonomyNode>,
    pub okpd2_root: Option<TaxonomyNode>,
}

/// The running engine: bundles the scheduler, event bus and session
/// manager behind `Arc`s so the HTTP layer can share them with the
/// sweeper daemon.
pub struct Engine {
    pub bus: Arc<EventBus>,
    pub sessions: Arc<SessionManager>,
    pub scheduler: Arc<Scheduler>,
    pub dal: Arc<dyn NormalizationDal>,
    config: Config,
}

impl Engine {
    #[instrument(skip(deps, config))]
    pub fn ignite(deps: EngineDependencies, config: Config) -> Self {
        let bus = Arc::new(EventBus::new(config.event_bus_capacity));
        let sessions = Arc::new(SessionManager::new(deps.dal.clone()));
        let result_writer = Arc::new(ResultWriter::new(deps.dal.clone(), config.result_batch_size));

        let orchestrator =
            if deps.providers.is_empty() { None } else { Some(Arc::new(ProviderOrchestrator::new(deps.providers))) };
        let counterparty_router = deps.counterparty_router.map(Arc::new);
        let classifier_kpved = match (&deps.kpved_root, &orchestrator) {
            (Some(root), Some(orchestrator)) => Some(Arc::new(
                Classifier::new(root.clone(), orchestrator.clone()).with_confidence_threshold(config.classifier_confidence_threshold),
            )),
            _ => None,
        };
        let classifier_okpd2 = match (&deps.okpd2_root, &orchestrator) {
            (Some(root), Some(orchestrator)) => Some(Arc::new(
                Classifier::new(root.clone(), orchestrator.clone()).with_confidence_threshold(config.classifier_confidence_threshold),
            )),
            _ => None,
        };

        let scheduler = Arc::new(Scheduler::new(
            deps.dal.clone(),
            bus.clone(),
            sessions.clone(),
            result_writer,
            orchestrator,
            counterparty_router,
            classifier_kpved,
            classifier_okpd2,
            config.cluster_threshold,
            config.progress_increment,
            config.global_worker_budget,
            config.default_session_timeout_secs,
            Duration::from_secs(config.shutdown_deadline_secs),
        ));

        Self { bus, sessions, scheduler, dal: deps.dal, config }
    }

    /// Spawns the heartbeat sweeper and serves the control API until the
    /// process receives a shutdown signal, then drains live sessions.
    /// Returns `Ok(true)` for a clean shutdown and `Ok(false)` when the
    /// drain deadline was reached with sessions still live — the caller
    /// maps the latter to exit code 3 (§6.5).
    pub async fn launch(self) -> Result<bool, std::io::Error> {
        self.spawn_sweeper();

        let router: Router = http::build_router(Arc::new(EngineState {
            scheduler: self.scheduler.clone(),
            bus: self.bus.clone(),
            sessions: self.sessions.clone(),
            dal: self.dal.clone(),
        }));

        let bind_addr: SocketAddr = self.config.bind_addr;
        info!(%bind_addr, "engine: binding control API");
        let listener = TcpListener::bind(bind_addr).await?;

        axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

        let clean = self.scheduler.shutdown().await;
        if !clean {
            tracing::warn!("engine: shutdown deadline reached with sessions still live");
        }
        Ok(clean)
    }

    /// Background daemon: periodically sweeps expired session heartbeats
    /// (§4.F), grounded on the teacher's reaper pattern of a ticking loop
    /// owning no external lock across its own suspension point.
    fn spawn_sweeper(&self) {
        let sessions = self.sessions.clone();
        let interval_secs = self.config.sweeper_interval_secs;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;
                let swept = sessions.sweep_once().await;
                if swept > 0 {
                    info!(swept, "sweeper: expired sessions failed");
                }
            }
        });
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("engine: shutdown signal received, draining sessions");
}

/// Shared state handed to every axum handler (§6.2).
pub struct EngineState {
    pub scheduler: Arc<Scheduler>,
    pub bus: Arc<EventBus>,
    pub sessions: Arc<SessionManager>,
    pub dal: Arc<dyn NormalizationDal>,
}
