use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::{handlers, state::AppState};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Module endpoints
        .route("/modules", get(handlers::list_modules))
        .route("/modules/:id", get(handlers::get_module))
        .route("/modules/:id/command", post(handlers::execute_command))
        // Rollback endpoints
        .route(
            "/rollback",
            get(handlers::list_rollback_points).post(handlers::create_rollback_point),
        )
        .route("/rollback/:id/restore", post(handlers::restore_rollback_point))
        // System endpoints
        .route("/health", get(handlers::health_summary))
        .route("/healthz", get(handlers::liveness))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
