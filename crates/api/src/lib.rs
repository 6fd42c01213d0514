//! `api` crate — HTTP layer over the execution engine.
//!
//! Exposes:
//!   GET    /templates[?category=&difficulty=&tags=]
//!   GET    /templates/{id}
//!   POST   /templates/{id}/create-workflow
//!   POST   /templates/validate
//!   POST   /custom/create
//!   GET    /executions
//!   GET    /executions/{id}/status
//!   GET    /executions/{id}/results
//!   POST   /executions/{id}/cancel
//!   GET    /modules
//!   GET    /events[?executionId=]   (server-sent events)

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

pub mod error;
pub mod handlers;

pub use error::ApiError;
pub use handlers::AppState;

use handlers::{custom, events, executions, templates};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/templates", get(templates::list))
        .route("/templates/validate", post(templates::validate))
        .route("/templates/:id", get(templates::get))
        .route("/templates/:id/create-workflow", post(templates::create_workflow))
        .route("/custom/create", post(custom::create))
        .route("/executions", get(executions::list))
        .route("/executions/:id/status", get(executions::status))
        .route("/executions/:id/results", get(executions::results))
        .route("/executions/:id/cancel", post(executions::cancel))
        .route("/modules", get(handlers::modules::list))
        .route("/events", get(events::stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: &str, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}
