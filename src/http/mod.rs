mod assignment;
mod error;
mod health;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::SqlitePool;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::assignment_service::AssignmentService;

#[derive(Clone)]
pub struct AppState {
    pub assignment_service: Arc<AssignmentService>,
    pub db_pool: SqlitePool,
}

/// CORS preflight (`OPTIONS`) requests are answered by the CORS layer itself.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/assign-extension", post(assignment::assign_extension))
        .route("/health", get(health::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
