//! The shared axum app state: one generic `AppState<St, G, Sy>` wired over
//! the store, repo-graph, and syncer types chosen at startup, following the
//! generic-over-collaborators idiom `sched-core` already establishes for
//! `TaskConfigCache<S>`/`JobCreator<St, G, Sy>`, rather than the teacher's
//! single concrete `ProverState` (the teacher has nothing swappable at that
//! seam; this crate's store/repo-graph/config-sync all are).

use crate::auth::ApiKeyStore;
use crate::execution_backend::ExecutionBackend;
use crate::modified_tracker::ModifiedTracker;
use crate::trigger_dedup::TriggerDedup;
use sched_core::skip_rules::{SkipRuleBackend, SkipRuleStore};
use sched_core::task_cfg_cache::{Syncer, TaskConfigCache};
use sched_core::window::Window;
use sched_core::JobCreator;
use sched_lib::model::{Job, Task};
use sched_lib::repo_graph::RepoGraph;
use sched_tasks::Store;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub struct AppState<St, G, Sy> {
    pub store: Arc<St>,
    pub window: Arc<Window>,
    pub skip_rules: Arc<SkipRuleStore<St>>,
    pub cfg_cache: Arc<TaskConfigCache<Sy>>,
    pub job_creator: Arc<JobCreator<St, G, Sy>>,
    pub graph: Arc<G>,
    pub tracker: Arc<ModifiedTracker<St>>,
    pub auth: Arc<ApiKeyStore>,
    pub execution_backend: Arc<dyn ExecutionBackend>,
    pub trigger_dedup: Arc<TriggerDedup>,
}

impl<St, G, Sy> Clone for AppState<St, G, Sy> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            window: self.window.clone(),
            skip_rules: self.skip_rules.clone(),
            cfg_cache: self.cfg_cache.clone(),
            job_creator: self.job_creator.clone(),
            graph: self.graph.clone(),
            tracker: self.tracker.clone(),
            auth: self.auth.clone(),
            execution_backend: self.execution_backend.clone(),
            trigger_dedup: self.trigger_dedup.clone(),
        }
    }
}

impl<St, G, Sy> AppState<St, G, Sy>
where
    St: Store<Job> + Store<Task> + SkipRuleBackend + Send + Sync + 'static,
    G: RepoGraph + Send + Sync + 'static,
    Sy: Syncer + Send + Sync + 'static,
{
    pub fn new(store: Arc<St>, graph: Arc<G>, syncer: Sy, window_days: i64, min_commits: u32, auth: Arc<ApiKeyStore>) -> Self {
        let window = Arc::new(Window::new(chrono::Duration::days(window_days), min_commits));
        let skip_rules = Arc::new(SkipRuleStore::new(store.clone()));
        let cfg_cache = Arc::new(TaskConfigCache::new(syncer));
        let job_creator = Arc::new(JobCreator::new(
            store.clone(),
            window.clone(),
            cfg_cache.clone(),
            graph.clone(),
            HashMap::<String, HashSet<String>>::new(),
            HashMap::<String, String>::new(),
        ));
        let tracker = Arc::new(ModifiedTracker::new(store.clone()));
        Self {
            store,
            window,
            skip_rules,
            cfg_cache,
            job_creator,
            graph,
            tracker,
            auth,
            execution_backend: Arc::new(crate::execution_backend::NullExecutionBackend),
            trigger_dedup: Arc::new(TriggerDedup::new()),
        }
    }
}
