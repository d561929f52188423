//! The HTML-shell routes (§6.4): "out of scope beyond being routable".
//! Reserved here as 501s so the full URL surface resolves, the way
//! `host/src/server/api/mod.rs`'s fallback handler reserves unknown paths
//! with a fixed status rather than letting axum 404 them silently.

use crate::error::HostError;
use axum::routing::get;
use axum::Router;

async fn not_implemented() -> HostError {
    HostError::NotImplemented
}

pub fn create_router<S: Clone + Send + Sync + 'static>() -> Router<S> {
    Router::new()
        .route("/job/:id", get(not_implemented))
        .route("/task/:id", get(not_implemented))
        .route("/jobs/search", get(not_implemented))
        .route("/trigger", get(not_implemented))
        .route("/skip_tasks", get(not_implemented))
}
