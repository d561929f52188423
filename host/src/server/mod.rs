//! The assembled axum router (§4.6, §6.4): per-service sub-routers nested
//! under `/prpc`, health/metrics at their own paths, docs, and the 404
//! fallback. Grounded on the teacher's `server/api/mod.rs` (CORS +
//! compression + `SetResponseHeaderLayer` + `TraceLayer`, `SwaggerUi` +
//! `Scalar` merge, `Uri` fallback) generalized to a tier-gated route table:
//! where the teacher applies one `concurrency_limit` layer to its one
//! mutating route group, this nests a `require_viewer`/`require_editor`
//! middleware per tier instead of per route, and applies the concurrency
//! limit to every RPC route as `§4.6` does not distinguish the editor
//! routes as uniquely expensive.

mod health;
mod job_service;
mod metrics;
mod modified_data_service;
mod skip_rule_service;
mod task_service;
mod ui;

use crate::auth::{require_editor, require_viewer, ApiKeyStore};
use crate::state::AppState;
use anyhow::Context;
use axum::http::{header, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::middleware;
use axum::Router;
use sched_core::skip_rules::SkipRuleBackend;
use sched_core::task_cfg_cache::Syncer;
use sched_lib::model::{Job, Task};
use sched_lib::repo_graph::RepoGraph;
use sched_tasks::Store;
use std::net::SocketAddr;
use std::str::FromStr;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{self, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(title = "CI Task Scheduler API", version = "1.0", description = "CI Task Scheduler API"),
    tags(
        (name = "Jobs", description = "Job lifecycle: trigger, inspect, cancel, search"),
        (name = "Tasks", description = "Task inspection and search"),
        (name = "SkipRules", description = "Skip-rule administration"),
        (name = "ModifiedData", description = "Polling cursor over recently-modified tasks"),
        (name = "Health", description = "Liveness of the store connection"),
        (name = "Metrics", description = "Prometheus text exposition"),
    )
)]
struct Docs;

pub fn create_docs() -> utoipa::openapi::OpenApi {
    [
        health::create_docs(),
        metrics::create_docs(),
        job_service::create_docs(),
        task_service::create_docs(),
        skip_rule_service::create_docs(),
        modified_data_service::create_docs(),
    ]
    .into_iter()
    .fold(Docs::openapi(), |mut doc, sub_doc| {
        doc.merge(sub_doc);
        doc
    })
}

pub fn create_router<St, G, Sy>(concurrency_limit: usize, auth: std::sync::Arc<ApiKeyStore>) -> Router<AppState<St, G, Sy>>
where
    St: Store<Job> + Store<Task> + SkipRuleBackend + Send + Sync + 'static,
    G: RepoGraph + Send + Sync + 'static,
    Sy: Syncer + Send + Sync + 'static,
{
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::ORIGIN, header::ACCEPT, HeaderName::from_static("x-api-key")])
        .allow_origin(cors::Any);
    let compression = CompressionLayer::new();

    let middleware_stack = ServiceBuilder::new().layer(cors).layer(compression).layer(
        SetResponseHeaderLayer::overriding(header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
    );

    let viewer_routes = Router::new()
        .merge(job_service::viewer_router())
        .merge(task_service::viewer_router())
        .merge(skip_rule_service::viewer_router())
        .merge(modified_data_service::viewer_router())
        .route_layer(middleware::from_fn_with_state(auth.clone(), require_viewer));

    let editor_routes = Router::new()
        .merge(job_service::editor_router())
        .merge(skip_rule_service::editor_router())
        .route_layer(middleware::from_fn_with_state(auth.clone(), require_editor));

    let prpc = Router::new()
        .merge(viewer_routes)
        .merge(editor_routes)
        .layer(ServiceBuilder::new().concurrency_limit(concurrency_limit));

    let docs = create_docs();

    Router::new()
        .nest("/prpc", prpc)
        .nest("/healthz", health::create_router())
        .nest("/metrics", metrics::create_router())
        .merge(ui::create_router())
        .layer(middleware_stack)
        .layer(TraceLayer::new_for_http())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", docs.clone()))
        .merge(Scalar::with_url("/scalar", docs))
        .fallback(|uri: Uri| async move { (StatusCode::NOT_FOUND, format!("No handler found for {uri}")) })
}

/// Binds `address` and serves `create_router` over it with graceful
/// shutdown on `cancel`, mirroring the teacher's `server::serve`.
pub async fn serve<St, G, Sy>(
    address: &str,
    concurrency_limit: usize,
    auth: std::sync::Arc<ApiKeyStore>,
    state: AppState<St, G, Sy>,
    cancel: tokio_util::sync::CancellationToken,
) -> anyhow::Result<()>
where
    St: Store<Job> + Store<Task> + SkipRuleBackend + Send + Sync + 'static,
    G: RepoGraph + Send + Sync + 'static,
    Sy: Syncer + Send + Sync + 'static,
{
    let addr = SocketAddr::from_str(address).with_context(|| format!("invalid bind address {address}"))?;
    let listener = TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);

    let router = create_router(concurrency_limit, auth).with_state(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("server couldn't serve")
}
