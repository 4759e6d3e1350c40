//! Router assembly and shared application state: a state struct plus
//! `create_router` building a `Router<State>` with a CORS layer, wired
//! to the job manager's enqueue/status shape.

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use store::{DistillConfig, JobManager};
use tower_http::cors::{Any, CorsLayer};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<JobManager>,
    pub config: Arc<DistillConfig>,
}

/// Assembles the three-endpoint HTTP surface plus the ambient
/// `/metrics` addition.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/autoDistill", post(crate::handlers::submit_handler))
        .route("/api/jobs/{jobId}", get(crate::handlers::status_handler))
        .route("/healthz", get(crate::handlers::healthz_handler))
        .route("/metrics", get(crate::handlers::metrics_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any),
        )
        .with_state(state)
}
