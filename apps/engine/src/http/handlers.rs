//! Handler bodies for the routes wired in `http::build_router`. Every
//! handler resolves the path's `project_id` against the DAL before doing
//! anything else, so a bad project id always surfaces as 404.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use refnorm_models::{ClientProject, SessionState};

use crate::engine::EngineState;
use crate::error::EngineError;
use crate::scheduler::StartRequest;

async fn load_project(state: &EngineState, project_id: i64) -> Result<ClientProject, EngineError> {
    Ok(state.dal.get_client_project(project_id).await?)
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn start_normalization(
    State(state): State<Arc<EngineState>>,
    Path(project_id): Path<i64>,
    Json(request): Json<StartRequest>,
) -> Result<Json<Value>, EngineError> {
    let project = load_project(&state, project_id).await?;
    let started = state.scheduler.start(project, request).await?;
    Ok(Json(json!({ "started": started })))
}

pub async fn stop_normalization(State(state): State<Arc<EngineState>>, Path(project_id): Path<i64>) -> Result<Json<Value>, EngineError> {
    load_project(&state, project_id).await?;
    state.scheduler.stop_all();
    Ok(Json(json!({ "stopped": true })))
}

#[derive(Serialize)]
struct SessionSummary {
    id: i64,
    database_id: i64,
    state: SessionState,
    processed: u64,
}

pub async fn status(State(state): State<Arc<EngineState>>, Path(project_id): Path<i64>) -> Result<Json<Value>, EngineError> {
    let project = load_project(&state, project_id).await?;
    let databases = state.dal.get_project_databases(project.project_id, false).await?;

    let mut sessions = Vec::new();
    let mut processed_total = 0u64;
    let mut item_total = 0u64;
    let mut current_step = None;
    for (database_id, session_id) in state.sessions.active_snapshot() {
        if let Ok(session) = state.sessions.get(session_id).await {
            let progress = state.bus.last_progress(session_id);
            let processed = progress.as_ref().and_then(|p| p.processed).unwrap_or(0);
            processed_total += processed;
            item_total += progress.as_ref().and_then(|p| p.total.or(p.total_items)).unwrap_or(0);
            if current_step.is_none() {
                current_step = progress.as_ref().and_then(|p| p.current_step.clone());
            }
            sessions.push(SessionSummary { id: session_id, database_id, state: session.state, processed });
        }
    }

    let progress_percent = if item_total > 0 { processed_total as f64 / item_total as f64 * 100.0 } else { 0.0 };
    let active_sessions_count = sessions.len();
    let total_databases_count = databases.len();
    Ok(Json(json!({
        "isRunning": state.scheduler.is_running(),
        "processed": processed_total,
        "total": item_total,
        "progress": progress_percent,
        "currentStep": current_step,
        "sessions": sessions,
        "databases": databases,
        "active_sessions_count": active_sessions_count,
        "total_databases_count": total_databases_count,
    })))
}

pub async fn preview_stats(State(state): State<Arc<EngineState>>, Path(project_id): Path<i64>) -> Result<Json<Value>, EngineError> {
    let project = load_project(&state, project_id).await?;
    let databases = state.dal.get_project_databases(project.project_id, true).await?;
    Ok(Json(json!({ "active_databases": databases.len() })))
}

pub async fn stats(State(state): State<Arc<EngineState>>, Path(project_id): Path<i64>) -> Result<Json<Value>, EngineError> {
    let project = load_project(&state, project_id).await?;
    let groups = state.dal.get_normalized_groups(project.project_id).await?;
    let total_items: usize = groups.iter().map(|g| g.merged_count).sum();
    Ok(Json(json!({
        "group_count": groups.len(),
        "total_items": total_items,
    })))
}

pub async fn groups(State(state): State<Arc<EngineState>>, Path(project_id): Path<i64>) -> Result<Json<Value>, EngineError> {
    let project = load_project(&state, project_id).await?;
    let groups = state.dal.get_normalized_groups(project.project_id).await?;
    Ok(Json(json!({ "groups": groups })))
}

pub async fn pipeline_stats(State(state): State<Arc<EngineState>>, Path(project_id): Path<i64>) -> Result<Json<Value>, EngineError> {
    let project = load_project(&state, project_id).await?;
    let groups = state.dal.get_normalized_groups(project.project_id).await?;
    let clustered = groups.iter().filter(|g| g.processing_level == refnorm_models::ProcessingLevel::Clustered).count();
    let canonicalized = groups.iter().filter(|g| g.processing_level == refnorm_models::ProcessingLevel::Canonicalized).count();
    let classified = groups.iter().filter(|g| g.processing_level == refnorm_models::ProcessingLevel::Classified).count();
    Ok(Json(json!({ "clustered": clustered, "canonicalized": canonicalized, "classified": classified })))
}

pub async fn resume_session(
    State(state): State<Arc<EngineState>>,
    Path((project_id, session_id)): Path<(i64, i64)>,
) -> Result<Json<Value>, EngineError> {
    let project = load_project(&state, project_id).await?;
    let new_session_id = state.scheduler.resume_session(session_id, project).await?;
    Ok(Json(json!({ "session_id": new_session_id })))
}

pub async fn stop_session(
    State(state): State<Arc<EngineState>>,
    Path((project_id, session_id)): Path<(i64, i64)>,
) -> Result<Json<Value>, EngineError> {
    load_project(&state, project_id).await?;
    state.scheduler.stop_session(session_id)?;
    Ok(Json(json!({ "stopped": true })))
}
