//! The Job Creator (§4.4): walks each repo's branch heads, instantiates new
//! `Job`s for commits inside the time window, and drives the repo-update
//! pipeline and the nightly/weekly periodic triggers.
//!
//! Grounded on the teacher's `dispatch/src/actor.rs` single-consumer
//! per-key `mpsc` loop (there, one queue per in-flight proof; here, one
//! queue per repo) for the repo-update pipeline, and on its periodic
//! `tokio::time::interval` ticker for the "defend against lost
//! notifications" fallback.

use crate::task_cfg_cache::{CachedResult, Syncer, TaskConfigCache};
use crate::window::Window;
use chrono::{Duration, Utc};
use sched_lib::error::{SchedError, SchedResult};
use sched_lib::model::{Job, Patch, RepoState, Trigger};
use sched_lib::repo_graph::{RepoGraph, RepoGraphError};
use sched_tasks::Store;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Debounce windows strictly under the nominal period so clock skew cannot
/// skip a cycle (§4.4).
pub const NIGHTLY_DEBOUNCE: Duration = Duration::hours(23);
pub const WEEKLY_DEBOUNCE: Duration = Duration::hours(6 * 24);

/// Notifications are enqueued at this interval per repo to defend against a
/// lost `HandleRepoUpdate` call (§4.4, default 5 min).
pub const PERIODIC_SYNC_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5 * 60);

fn to_sched(e: RepoGraphError) -> SchedError {
    match e {
        RepoGraphError::UnknownRepo(r) => SchedError::not_found(format!("repo {r}")),
        RepoGraphError::UnknownCommit(c) => SchedError::not_found(format!("commit {c}")),
    }
}

pub struct JobCreator<St, G, Sy> {
    store: Arc<St>,
    window: Arc<Window>,
    cfg_cache: Arc<TaskConfigCache<Sy>>,
    graph: Arc<G>,
    /// Per-repo branch heads whose history is considered already covered by
    /// another head and should not be walked again.
    ignored_branch_heads: HashMap<String, HashSet<String>>,
    /// Per-repo commit at which the config file was introduced; earlier
    /// commits have no valid config and are never walked.
    sentinel_hashes: HashMap<String, String>,
}

impl<St, G, Sy> JobCreator<St, G, Sy>
where
    St: Store<Job>,
    G: RepoGraph,
    Sy: Syncer,
{
    pub fn new(
        store: Arc<St>,
        window: Arc<Window>,
        cfg_cache: Arc<TaskConfigCache<Sy>>,
        graph: Arc<G>,
        ignored_branch_heads: HashMap<String, HashSet<String>>,
        sentinel_hashes: HashMap<String, String>,
    ) -> Self {
        Self {
            store,
            window,
            cfg_cache,
            graph,
            ignored_branch_heads,
            sentinel_hashes,
        }
    }

    /// `gatherNewJobs` (§4.4): returns unsaved Jobs in insertion order, i.e.
    /// oldest commit first, so a batch insert interrupted after `k` items
    /// leaves exactly the remaining `n - k` to be rediscovered on retry.
    pub async fn gather_new_jobs(&self, repo: &str) -> SchedResult<Vec<Job>> {
        let mut collected = Vec::new();
        let ignored = self.ignored_branch_heads.get(repo);

        for head in self.graph.branch_heads(repo).map_err(to_sched)? {
            if ignored.map(|set| set.contains(&head)).unwrap_or(false) {
                continue;
            }
            self.walk_branch(repo, &head, &mut collected).await?;
        }

        collected.reverse();
        Ok(collected)
    }

    async fn walk_branch(&self, repo: &str, head: &str, out: &mut Vec<Job>) -> SchedResult<()> {
        let sentinel = self.sentinel_hashes.get(repo);
        let mut cur = Some(head.to_string());

        while let Some(hash) = cur {
            let commit = self.graph.commit(repo, &hash).map_err(to_sched)?;
            if !self
                .window
                .test_time(repo, commit.timestamp)
                .map_err(|e| SchedError::not_found(e.to_string()))?
            {
                break;
            }

            let repo_state = RepoState {
                repo: repo.to_string(),
                revision: hash.clone(),
                patch: Patch::default(),
            };

            let config = match self.cfg_cache.get(&repo_state).await {
                CachedResult::Fresh(cfg) => cfg,
                CachedResult::Permanent(msg) => {
                    warn!(repo, commit = %hash, error = %msg, "skipping commit with permanently invalid config");
                    cur = commit.parent;
                    continue;
                }
                CachedResult::Transient(msg) => {
                    return Err(SchedError::Transient(anyhow::anyhow!(msg)));
                }
            };

            let mut all_scheduled = true;
            for job_spec in &config.job_specs {
                let applies = match job_spec.trigger {
                    Trigger::AnyBranch => true,
                    Trigger::MainOnly => {
                        let main = self.graph.main_branch_head(repo).map_err(to_sched)?;
                        self.graph.is_ancestor(repo, &hash, &main).map_err(to_sched)?
                    }
                    Trigger::Nightly | Trigger::Weekly | Trigger::OnDemand => false,
                };
                if !applies {
                    continue;
                }

                if self.job_already_scheduled(repo, &job_spec.name, &repo_state).await? {
                    continue;
                }

                all_scheduled = false;
                let job = self.cfg_cache.make_job(
                    &config,
                    repo_state.clone(),
                    &job_spec.name,
                    Utc::now(),
                    commit.timestamp,
                )?;
                out.push(job);
            }

            if all_scheduled {
                break;
            }
            if sentinel.map(|s| s == &hash).unwrap_or(false) {
                break;
            }
            cur = commit.parent;
        }
        Ok(())
    }

    async fn job_already_scheduled(
        &self,
        repo: &str,
        name: &str,
        repo_state: &RepoState,
    ) -> SchedResult<bool> {
        let start = self
            .window
            .start(repo)
            .map_err(|e| SchedError::not_found(e.to_string()))?;
        let existing = self.store.get_from_date_range(start, Utc::now(), Some(repo)).await?;
        Ok(existing
            .iter()
            .any(|j| j.name == name && &j.repo_state == repo_state && !j.is_force))
    }

    /// The repo-update pipeline's consumer step: `gatherNewJobs` →
    /// `PutJobsInChunks` → `Window.Update` → `TaskCfgCache.Cleanup` (§4.4).
    pub async fn run_update(&self, repo: &str) -> SchedResult<Vec<Job>> {
        let jobs = self.gather_new_jobs(repo).await?;
        let saved = self.store.put_in_chunks(jobs).await?;
        self.window
            .update(self.graph.as_ref(), Utc::now())
            .map_err(|e| SchedError::Internal(e.to_string()))?;
        if let Some(start) = self.window.earliest_start() {
            self.cfg_cache.cleanup(start).await;
        }
        Ok(saved)
    }

    /// `MaybeTriggerPeriodicJobs(triggerName)` (§4.4). Unknown trigger names
    /// are logged and treated as a no-op, never an error.
    pub async fn maybe_trigger_periodic_jobs(&self, trigger_name: &str) -> SchedResult<Vec<Job>> {
        let trigger = match trigger_name {
            "nightly" => Trigger::Nightly,
            "weekly" => Trigger::Weekly,
            other => {
                warn!(trigger = other, "unknown periodic trigger name, ignoring");
                return Ok(Vec::new());
            }
        };
        let debounce = match trigger {
            Trigger::Nightly => NIGHTLY_DEBOUNCE,
            Trigger::Weekly => WEEKLY_DEBOUNCE,
            _ => unreachable!(),
        };

        let now = Utc::now();
        let mut survivors = Vec::new();

        for repo in self.graph.repos() {
            let head = self.graph.main_branch_head(&repo).map_err(to_sched)?;
            let commit = self.graph.commit(&repo, &head).map_err(to_sched)?;
            let repo_state = RepoState {
                repo: repo.clone(),
                revision: head.clone(),
                patch: Patch::default(),
            };

            let config = match self.cfg_cache.get(&repo_state).await {
                CachedResult::Fresh(cfg) => cfg,
                CachedResult::Permanent(msg) => {
                    warn!(repo, error = %msg, "skipping periodic trigger for repo with invalid config");
                    continue;
                }
                CachedResult::Transient(msg) => {
                    return Err(SchedError::Transient(anyhow::anyhow!(msg)));
                }
            };

            let matching: Vec<_> = config
                .job_specs
                .iter()
                .filter(|spec| spec.trigger == trigger)
                .collect();
            if matching.is_empty() {
                continue;
            }

            let window_start = now - debounce;
            let existing = self
                .store
                .get_from_date_range(window_start, now, Some(&repo))
                .await?;

            for spec in matching {
                if let Some(prior) = existing
                    .iter()
                    .find(|j| j.name == spec.name && !j.is_force && !j.repo_state.is_try())
                {
                    debug!(name = %spec.name, prior = %prior.id, "skipping periodic trigger, prior job in debounce window");
                    continue;
                }
                let job = self
                    .cfg_cache
                    .make_job(&config, repo_state.clone(), &spec.name, now, commit.timestamp)?;
                survivors.push(job);
            }
        }

        self.store.put_in_chunks(survivors).await
    }
}

impl<St, G, Sy> JobCreator<St, G, Sy>
where
    St: Store<Job> + Send + Sync + 'static,
    G: RepoGraph + Send + Sync + 'static,
    Sy: Syncer + Send + Sync + 'static,
{
    /// Spawns the repo-update pipeline (§4.4): one consumer task per repo
    /// draining a bounded notification queue, plus one periodic ticker task
    /// that re-enqueues every repo every [`PERIODIC_SYNC_INTERVAL`].
    ///
    /// Returns the per-repo notification senders (for `handle_repo_update`)
    /// and the spawned task handles, which the caller joins/aborts using
    /// `cancel`.
    pub fn spawn_pipeline(
        self: Arc<Self>,
        repos: Vec<String>,
        cancel: CancellationToken,
    ) -> (HashMap<String, mpsc::Sender<()>>, Vec<tokio::task::JoinHandle<()>>) {
        let mut senders = HashMap::new();
        let mut handles = Vec::new();

        for repo in &repos {
            let (tx, mut rx) = mpsc::channel::<()>(64);
            let creator = Arc::clone(&self);
            let repo_name = repo.clone();
            let consumer_cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = consumer_cancel.cancelled() => break,
                        notice = rx.recv() => {
                            if notice.is_none() {
                                break;
                            }
                            match creator.run_update(&repo_name).await {
                                Ok(jobs) => {
                                    if !jobs.is_empty() {
                                        info!(repo = %repo_name, count = jobs.len(), "created jobs");
                                    }
                                }
                                Err(e) => warn!(repo = %repo_name, error = %e, "repo update failed"),
                            }
                        }
                    }
                }
            }));
            senders.insert(repo.clone(), tx);
        }

        let ticker_senders = senders.clone();
        let ticker_cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(PERIODIC_SYNC_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker_cancel.cancelled() => break,
                    _ = interval.tick() => {
                        for tx in ticker_senders.values() {
                            let _ = tx.try_send(());
                        }
                    }
                }
            }
        }));

        (senders, handles)
    }

    /// The producer side (`HandleRepoUpdate`): enqueues a notification for
    /// `repo`'s consumer. Non-blocking; if the queue is full the
    /// notification is dropped since the periodic ticker will re-sync.
    pub async fn handle_repo_update(senders: &HashMap<String, mpsc::Sender<()>>, repo: &str) {
        if let Some(tx) = senders.get(repo) {
            let _ = tx.try_send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_cfg_cache::{Config, SyncError};
    use async_trait::async_trait;
    use sched_lib::model::{JobSpec, TaskSpec};
    use sched_lib::repo_graph::Commit;
    use sched_tasks::mem::MemStore;
    use std::collections::HashMap as Map;

    struct FixedSyncer {
        config: Config,
    }

    #[async_trait]
    impl Syncer for FixedSyncer {
        async fn sync(&self, _repo_state: &RepoState) -> Result<Config, SyncError> {
            Ok(self.config.clone())
        }
    }

    struct FakeGraph {
        commits: Map<(String, String), Commit>,
        heads: Map<String, Vec<String>>,
        main: Map<String, String>,
    }

    impl RepoGraph for FakeGraph {
        fn repos(&self) -> Vec<String> {
            self.heads.keys().cloned().collect()
        }
        fn branch_heads(&self, repo: &str) -> Result<Vec<String>, RepoGraphError> {
            self.heads
                .get(repo)
                .cloned()
                .ok_or_else(|| RepoGraphError::UnknownRepo(repo.to_string()))
        }
        fn commit(&self, repo: &str, hash: &str) -> Result<Commit, RepoGraphError> {
            self.commits
                .get(&(repo.to_string(), hash.to_string()))
                .cloned()
                .ok_or_else(|| RepoGraphError::UnknownCommit(hash.to_string()))
        }
        fn is_ancestor(&self, _repo: &str, _ancestor: &str, _descendant: &str) -> Result<bool, RepoGraphError> {
            Ok(true)
        }
        fn branch_heads_named(&self, repo: &str, branch: &str) -> Result<Vec<String>, RepoGraphError> {
            if self.main.get(repo).map(|m| m == branch).unwrap_or(false) {
                self.branch_heads(repo)
            } else {
                Err(RepoGraphError::UnknownCommit(branch.to_string()))
            }
        }
    }

    fn two_commit_chain(repo: &str) -> FakeGraph {
        let now = Utc::now();
        let mut commits = Map::new();
        commits.insert(
            (repo.to_string(), "c1".to_string()),
            Commit { hash: "c1".into(), parent: None, timestamp: now - Duration::minutes(2) },
        );
        commits.insert(
            (repo.to_string(), "c2".to_string()),
            Commit { hash: "c2".into(), parent: Some("c1".into()), timestamp: now - Duration::minutes(1) },
        );
        let mut heads = Map::new();
        heads.insert(repo.to_string(), vec!["c2".to_string()]);
        let mut main = Map::new();
        main.insert(repo.to_string(), "main".to_string());
        FakeGraph { commits, heads, main }
    }

    fn two_spec_config() -> Config {
        Config {
            job_specs: vec![
                JobSpec { name: "build".into(), priority: 0.5, task_specs: vec!["compile".into()], trigger: Trigger::AnyBranch },
                JobSpec { name: "lint".into(), priority: 0.2, task_specs: vec![], trigger: Trigger::AnyBranch },
            ],
            task_specs: vec![TaskSpec {
                name: "compile".into(),
                dimensions: vec![],
                dependencies: vec![],
                execution_timeout_secs: 60,
                expiration_secs: 600,
                io_timeout_secs: 60,
                cas_spec: "cas://compile".into(),
                priority: 0.5,
            }],
        }
    }

    fn build_creator(graph: FakeGraph) -> JobCreator<MemStore, FakeGraph, FixedSyncer> {
        let store = Arc::new(MemStore::new());
        let window = Arc::new(Window::new(Duration::days(30), 1));
        window.update(&graph, Utc::now()).unwrap();
        let cfg_cache = Arc::new(TaskConfigCache::new(FixedSyncer { config: two_spec_config() }));
        JobCreator::new(store, window, cfg_cache, Arc::new(graph), Map::new(), Map::new())
    }

    #[tokio::test]
    async fn gather_new_jobs_creates_one_job_per_spec_per_commit() {
        let repo = "repo-a";
        let creator = build_creator(two_commit_chain(repo));
        let jobs = creator.gather_new_jobs(repo).await.unwrap();
        // 2 commits * 2 specs = 4 jobs, oldest-commit-first.
        assert_eq!(jobs.len(), 4);
        assert_eq!(jobs[0].repo_state.revision, "c1");
        assert_eq!(jobs[3].repo_state.revision, "c2");
    }

    #[tokio::test]
    async fn gather_new_jobs_is_idempotent() {
        let repo = "repo-a";
        let creator = build_creator(two_commit_chain(repo));
        let first = creator.gather_new_jobs(repo).await.unwrap();
        creator.store.put_in_chunks(first).await.unwrap();

        let second = creator.gather_new_jobs(repo).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn resumption_after_partial_insert_yields_remaining_jobs() {
        let repo = "repo-a";
        let creator = build_creator(two_commit_chain(repo));
        let mut first = creator.gather_new_jobs(repo).await.unwrap();
        assert_eq!(first.len(), 4);

        // Simulate only the first 2 of 4 landing.
        let remainder = first.split_off(2);
        creator.store.put_in_chunks(first).await.unwrap();

        let second = creator.gather_new_jobs(repo).await.unwrap();
        assert_eq!(second.len(), remainder.len());
    }

    #[tokio::test]
    async fn unknown_periodic_trigger_is_a_noop_not_an_error() {
        let repo = "repo-a";
        let creator = build_creator(two_commit_chain(repo));
        let jobs = creator.maybe_trigger_periodic_jobs("hourly").await.unwrap();
        assert!(jobs.is_empty());
    }
}
