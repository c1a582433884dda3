//! HTTP router for the finsight service.
//!
//! Mounts all endpoint groups under /v1/:
//! - /v1/connect    — OAuth consent URL, callback, status, disconnect
//! - /v1/accounts   — chart of accounts passthrough
//! - /v1/statements — standardized financial statements
//! - /v1/trends     — month-over-month P&L trends
//! - /v1/analyze    — LLM insight generation (+ /ask, /questions, /history)
//! - /v1/status     — health check

pub mod routes;

use crate::SharedState;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/v1", routes::v1_router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
