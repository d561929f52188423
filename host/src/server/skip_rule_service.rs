//! `SkipRuleService` (§4.2, §4.6): `GetSkipTaskRules` (viewer),
//! `AddSkipTaskRule`/`DeleteSkipTaskRule` (editor).

use crate::error::{HostError, HostResult};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use sched_core::skip_rules::SkipRuleBackend;
use sched_core::task_cfg_cache::Syncer;
use sched_lib::model::{Job, SkipRule, Task};
use sched_lib::repo_graph::RepoGraph;
use sched_tasks::Store;
use serde::Deserialize;
use utoipa::{OpenApi, ToSchema};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddSkipTaskRuleRequest {
    pub name: String,
    pub added_by: String,
    pub description: String,
    pub task_spec_patterns: Vec<String>,
    /// Either empty (applies to every commit), or exactly two hashes
    /// denoting a `(start, end]` range to resolve against the repo graph
    /// (§4.2 `AddRule`).
    #[serde(default)]
    pub commits: Vec<String>,
}

#[utoipa::path(get, path = "/prpc/SkipRuleService/GetSkipTaskRules", tag = "SkipRules",
    responses((status = 200, description = "the current rule set", body = [SkipRule])))]
async fn get_skip_task_rules<St, G, Sy>(
    State(state): State<AppState<St, G, Sy>>,
) -> Json<Vec<SkipRule>>
where
    St: Store<Job> + Store<Task> + SkipRuleBackend + Send + Sync + 'static,
    G: RepoGraph + Send + Sync + 'static,
    Sy: Syncer + Send + Sync + 'static,
{
    Json((*state.skip_rules.get_rules()).clone())
}

#[utoipa::path(post, path = "/prpc/SkipRuleService/AddSkipTaskRule", tag = "SkipRules",
    request_body = AddSkipTaskRuleRequest,
    responses((status = 200, description = "the stored rule", body = SkipRule)))]
async fn add_skip_task_rule<St, G, Sy>(
    State(state): State<AppState<St, G, Sy>>,
    Json(req): Json<AddSkipTaskRuleRequest>,
) -> HostResult<Json<SkipRule>>
where
    St: Store<Job> + Store<Task> + SkipRuleBackend + Send + Sync + 'static,
    G: RepoGraph + Send + Sync + 'static,
    Sy: Syncer + Send + Sync + 'static,
{
    let rule = SkipRule {
        name: req.name,
        added_by: req.added_by,
        description: req.description,
        task_spec_patterns: req.task_spec_patterns,
        commits: req.commits,
        db_modified: None,
    };
    let repos = state.graph.repos();
    let saved = state
        .skip_rules
        .add_rule(rule, state.graph.as_ref(), &repos)
        .await
        .map_err(HostError::Sched)?;
    Ok(Json(saved))
}

#[utoipa::path(post, path = "/prpc/SkipRuleService/DeleteSkipTaskRule/:name", tag = "SkipRules",
    responses((status = 200, description = "the rule was removed")))]
async fn delete_skip_task_rule<St, G, Sy>(
    State(state): State<AppState<St, G, Sy>>,
    Path(name): Path<String>,
) -> HostResult<()>
where
    St: Store<Job> + Store<Task> + SkipRuleBackend + Send + Sync + 'static,
    G: RepoGraph + Send + Sync + 'static,
    Sy: Syncer + Send + Sync + 'static,
{
    state.skip_rules.remove_rule(&name).await.map_err(HostError::Sched)
}

#[derive(OpenApi)]
#[openapi(paths(get_skip_task_rules, add_skip_task_rule, delete_skip_task_rule))]
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
    Router::new().route("/SkipRuleService/GetSkipTaskRules", get(get_skip_task_rules))
}

pub fn editor_router<St, G, Sy>() -> Router<AppState<St, G, Sy>>
where
    St: Store<Job> + Store<Task> + SkipRuleBackend + Send + Sync + 'static,
    G: RepoGraph + Send + Sync + 'static,
    Sy: Syncer + Send + Sync + 'static,
{
    Router::new()
        .route("/SkipRuleService/AddSkipTaskRule", post(add_skip_task_rule))
        .route("/SkipRuleService/DeleteSkipTaskRule/:name", post(delete_skip_task_rule))
}
