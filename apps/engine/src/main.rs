//! Binary entry point: loads configuration, wires the engine against the
//! in-memory DAL (the real per-client adapters are out of scope, §1),
//! and serves the control API until shutdown.

use std::process::ExitCode as ProcessExitCode;
use std::sync::Arc;

use clap::Parser;
use dotenvy::{dotenv, from_path};
use refnorm_dal::InMemoryDal;
use refnorm_engine::config::{Cli, Config, ExitCode};
use refnorm_engine::engine::{Engine, EngineDependencies};
use refnorm_telemetry::init_tracing;
use tracing::error;

fn main() -> ProcessExitCode {
    let cli = Cli::parse();
    match &cli.config {
        Some(path) => {
            if let Err(err) = from_path(path) {
                error!(error = %err, path, "failed to load --config file");
                return ProcessExitCode::from(ExitCode::ConfigError as u8);
            }
        }
        None => {
            dotenv().ok();
        }
    }
    init_tracing("refnorm_engine");

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to build tokio runtime");
            return ProcessExitCode::from(ExitCode::StartupFailure as u8);
        }
    };

    runtime.block_on(run())
}

async fn run() -> ProcessExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "configuration error");
            return ProcessExitCode::from(ExitCode::ConfigError as u8);
        }
    };

    let dal = Arc::new(InMemoryDal::new());
    let deps = EngineDependencies { dal, providers: Vec::new(), counterparty_router: None, kpved_root: None, okpd2_root: None };
    let engine = Engine::ignite(deps, config);

    match engine.launch().await {
        Ok(true) => ProcessExitCode::from(ExitCode::Clean as u8),
        Ok(false) => ProcessExitCode::from(ExitCode::ShutdownWithLiveJobs as u8),
        Err(err) => {
            error!(error = %err, "engine failed to launch");
            ProcessExitCode::from(ExitCode::StartupFailure as u8)
        }
    }
}
