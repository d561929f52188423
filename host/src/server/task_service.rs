//! `TaskService` (§4.6): `GetTask` and `SearchTasks`, both viewer-tier.
//! Same generic-handler shape as `job_service`.

use crate::error::{HostError, HostResult};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use sched_core::skip_rules::SkipRuleBackend;
use sched_core::task_cfg_cache::Syncer;
use sched_lib::error::SchedError;
use sched_lib::id::Id;
use sched_lib::model::{Job, Task, TaskStatus};
use sched_lib::repo_graph::RepoGraph;
use sched_tasks::Store;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::execution_backend::CasStats;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct GetTaskParams {
    #[serde(default)]
    pub include_stats: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskWithStats {
    #[serde(flatten)]
    pub task: Task,
    pub cas_stats: Option<CasStats>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct SearchTasksParams {
    pub repo: Option<String>,
    pub name: Option<String>,
    pub status: Option<TaskStatus>,
    pub swarming_bot_id: Option<String>,
    pub time_start: Option<DateTime<Utc>>,
    pub time_end: Option<DateTime<Utc>>,
}

#[utoipa::path(get, path = "/prpc/TaskService/GetTask/:id", tag = "Tasks",
    params(GetTaskParams),
    responses((status = 200, description = "the task, optionally with CAS stats", body = TaskWithStats)))]
async fn get_task<St, G, Sy>(
    State(state): State<AppState<St, G, Sy>>,
    Path(id): Path<String>,
    Query(params): Query<GetTaskParams>,
) -> HostResult<Json<TaskWithStats>>
where
    St: Store<Job> + Store<Task> + SkipRuleBackend + Send + Sync + 'static,
    G: RepoGraph + Send + Sync + 'static,
    Sy: Syncer + Send + Sync + 'static,
{
    let id = Id::from_str(&id).map_err(|e| HostError::Sched(SchedError::invalid_argument(e.to_string())))?;
    let task = Store::<Task>::get_by_id(&*state.store, &id)
        .await
        .map_err(HostError::Sched)?
        .ok_or_else(|| HostError::Sched(SchedError::not_found(format!("task {id}"))))?;

    let cas_stats = if params.include_stats {
        Some(state.execution_backend.cas_stats(&task).await.map_err(HostError::Sched)?)
    } else {
        None
    };

    Ok(Json(TaskWithStats { task, cas_stats }))
}

#[utoipa::path(get, path = "/prpc/TaskService/SearchTasks", tag = "Tasks",
    params(SearchTasksParams),
    responses((status = 200, description = "matching tasks", body = [Task])))]
async fn search_tasks<St, G, Sy>(
    State(state): State<AppState<St, G, Sy>>,
    Query(params): Query<SearchTasksParams>,
) -> HostResult<Json<Vec<Task>>>
where
    St: Store<Job> + Store<Task> + SkipRuleBackend + Send + Sync + 'static,
    G: RepoGraph + Send + Sync + 'static,
    Sy: Syncer + Send + Sync + 'static,
{
    let start = params.time_start.unwrap_or(DateTime::<Utc>::MIN_UTC);
    let end = params.time_end.unwrap_or_else(Utc::now);
    let mut tasks = Store::<Task>::get_from_date_range(&*state.store, start, end, params.repo.as_deref())
        .await
        .map_err(HostError::Sched)?;

    tasks.retain(|t| {
        params.name.as_ref().map(|n| &t.task_key.name == n).unwrap_or(true)
            && params.status.map(|s| t.status == s).unwrap_or(true)
            && params
                .swarming_bot_id
                .as_ref()
                .map(|b| t.swarming_bot_id.as_deref() == Some(b.as_str()))
                .unwrap_or(true)
    });

    Ok(Json(tasks))
}

#[derive(OpenApi)]
#[openapi(paths(get_task, search_tasks))]
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
        .route("/TaskService/GetTask/:id", get(get_task))
        .route("/TaskService/SearchTasks", get(search_tasks))
}
