//! The axum control API (§6.2), nested under `/projects/{project_id}`
//! since every operation is scoped to one client project. Grounded on
//! the teacher's `routes.rs` nested-`Router` + CORS layering; the
//! teacher's auth middleware is not reused (authentication is out of
//! scope here, §1).

mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::engine::EngineState;

pub fn build_router(state: Arc<EngineState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    let project_routes = Router::new()
        .route("/normalization/start", post(handlers::start_normalization))
        .route("/normalization/stop", post(handlers::stop_normalization))
        .route("/normalization/status", get(handlers::status))
        .route("/normalization/preview-stats", get(handlers::preview_stats))
        .route("/normalization/stats", get(handlers::stats))
        .route("/normalization/groups", get(handlers::groups))
        .route("/normalization/sessions/:id/resume", post(handlers::resume_session))
        .route("/normalization/sessions/:id/stop", post(handlers::stop_session))
        .route("/normalization/pipeline-stats", get(handlers::pipeline_stats));

    Router::new()
        .route("/normalization/health", get(handlers::health))
        .nest("/projects/:project_id", project_routes)
        .layer(cors)
        .with_state(state)
}
