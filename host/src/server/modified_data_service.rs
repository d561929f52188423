//! `ModifiedDataService` (§4.7): `StartTrackingModifiedTasks` /
//! `GetModifiedTasks`, both viewer-tier.

use crate::error::HostResult;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use sched_core::skip_rules::SkipRuleBackend;
use sched_core::task_cfg_cache::Syncer;
use sched_lib::model::{Job, Task};
use sched_lib::repo_graph::RepoGraph;
use sched_tasks::Store;
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

#[derive(Debug, Serialize, ToSchema)]
pub struct StartTrackingResponse {
    pub token: String,
}

#[utoipa::path(post, path = "/prpc/ModifiedDataService/StartTrackingModifiedTasks", tag = "ModifiedData",
    responses((status = 200, description = "a fresh cursor token", body = StartTrackingResponse)))]
async fn start_tracking<St, G, Sy>(State(state): State<AppState<St, G, Sy>>) -> Json<StartTrackingResponse>
where
    St: Store<Job> + Store<Task> + SkipRuleBackend + Send + Sync + 'static,
    G: RepoGraph + Send + Sync + 'static,
    Sy: Syncer + Send + Sync + 'static,
{
    Json(StartTrackingResponse {
        token: state.tracker.start_tracking(),
    })
}

#[utoipa::path(get, path = "/prpc/ModifiedDataService/GetModifiedTasks/:token", tag = "ModifiedData",
    responses((status = 200, description = "tasks modified since the last poll on this token", body = [Task])))]
async fn get_modified_tasks<St, G, Sy>(
    State(state): State<AppState<St, G, Sy>>,
    Path(token): Path<String>,
) -> HostResult<Json<Vec<Task>>>
where
    St: Store<Job> + Store<Task> + SkipRuleBackend + Send + Sync + 'static,
    G: RepoGraph + Send + Sync + 'static,
    Sy: Syncer + Send + Sync + 'static,
{
    let tasks = state.tracker.get_modified(&token).await?;
    Ok(Json(tasks))
}

#[derive(OpenApi)]
#[openapi(paths(start_tracking, get_modified_tasks))]
struct Docs;

pub fn create_docs() -> utoipa::openapi::OpenApi {
    Docs::openapi()
}

pub fn viewer_router<St, G, Sy>() -> Router<AppState<St, G, Sy>>
where
    St: Store<Job> + Store<Task> + SkipRuleBackend + Send + Sync + 'static,
    G: RepoGraph + Send + Sync + 'static,
    Sy: Syncer + Send + Sync + 'static,
{
    Router::new()
        .route("/ModifiedDataService/StartTrackingModifiedTasks", post(start_tracking))
        .route("/ModifiedDataService/GetModifiedTasks/:token", get(get_modified_tasks))
}
