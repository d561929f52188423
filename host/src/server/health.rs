//! `GET /healthz` (§6.4): "200 when the store connection is live".

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use sched_core::skip_rules::SkipRuleBackend;
use sched_core::task_cfg_cache::Syncer;
use sched_lib::model::{Job, Task};
use sched_lib::repo_graph::RepoGraph;
use sched_tasks::Store;
use utoipa::OpenApi;

#[utoipa::path(get, path = "/healthz", tag = "Health", responses((status = 200, description = "the store is reachable")))]
async fn handler<St, G, Sy>(State(state): State<AppState<St, G, Sy>>) -> StatusCode
where
    St: Store<Job> + Store<Task> + SkipRuleBackend + Send + Sync + 'static,
    G: RepoGraph + Send + Sync + 'static,
    Sy: Syncer + Send + Sync + 'static,
{
    let now = chrono::Utc::now();
    match Store::<Job>::get_from_date_range(&*state.store, now, now, None).await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[derive(OpenApi)]
#[openapi(paths(handler))]
struct Docs;

pub fn create_docs() -> utoipa::openapi::OpenApi {
    Docs::openapi()
}

pub fn create_router<St, G, Sy>() -> Router<AppState<St, G, Sy>>
where
    St: Store<Job> + Store<Task> + SkipRuleBackend + Send + Sync + 'static,
    G: RepoGraph + Send + Sync + 'static,
    Sy: Syncer + Send + Sync + 'static,
{
    Router::new().route("/", get(handler))
}
