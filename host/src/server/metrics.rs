//! `GET /metrics` (§6.4, §2 ambient stack): Prometheus text exposition,
//! reusing `sched_metrics::render()` rather than re-encoding the registry
//! here (the teacher's `server/api/metrics.rs` encodes inline since it has
//! no shared metrics crate of its own).

use axum::body::Body;
use axum::http::header;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use utoipa::OpenApi;

#[utoipa::path(get, path = "/metrics", tag = "Metrics", responses((status = 200, description = "Prometheus text exposition of process metrics")))]
async fn handler() -> Response {
    Response::builder()
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(sched_metrics::render()))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

#[derive(OpenApi)]
#[openapi(paths(handler))]
struct Docs;

pub fn create_docs() -> utoipa::openapi::OpenApi {
    Docs::openapi()
}

pub fn create_router<S: Clone + Send + Sync + 'static>() -> Router<S> {
    Router::new().route("/", get(handler))
}
