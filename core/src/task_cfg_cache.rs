//! The Task-Config Cache (§3, §4.3): resolves a `RepoState` to the set of
//! job/task specs declared there, caching permanent (config) errors forever
//! and never caching transient (network/sync) ones.
//!
//! Grounded on the teacher's cached-vs-transient error split in
//! `core/src/interfaces.rs` (`ProverError` distinguishing a permanently
//! invalid proof request from a retryable one); generalized here into an
//! explicit three-way `CachedResult` so the two channels cannot be
//! conflated by construction, per §4.3's warning.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sched_lib::error::SchedError;
use sched_lib::id::IdGen;
use sched_lib::model::{Job, JobSpec, RepoState, TaskSpec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;

/// The parsed `tasks.json`-equivalent for one `RepoState`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub job_specs: Vec<JobSpec>,
    pub task_specs: Vec<TaskSpec>,
}

impl Config {
    pub fn job_spec(&self, name: &str) -> Option<&JobSpec> {
        self.job_specs.iter().find(|j| j.name == name)
    }
}

/// The external source-tree sync + config parse, kept abstract so tests can
/// supply a fixed `Config` without touching a real repo checkout.
#[async_trait]
pub trait Syncer: Send + Sync {
    async fn sync(&self, repo_state: &RepoState) -> Result<Config, SyncError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    /// Bad config or an unreachable revision: cached and returned to every
    /// subsequent caller.
    #[error("permanent config error: {0}")]
    Permanent(String),
    /// Network or other transient failure: never cached.
    #[error("transient sync error: {0}")]
    Transient(String),
}

/// The three-way result of `Get`, kept distinct so a caller can never treat
/// a permanent error as retryable or vice versa.
#[derive(Debug, Clone)]
pub enum CachedResult {
    Fresh(Config),
    Permanent(String),
    Transient(String),
}

enum Entry {
    Fresh(Config),
    Permanent(String),
}

fn cache_key(repo_state: &RepoState) -> String {
    format!(
        "{}@{}#{}:{}:{}:{}",
        repo_state.repo,
        repo_state.revision,
        repo_state.patch.issue,
        repo_state.patch.patch_set,
        repo_state.patch.patch_repo,
        repo_state.patch.server,
    )
}

struct CacheRow {
    entry: Entry,
    inserted: DateTime<Utc>,
}

pub struct TaskConfigCache<S> {
    syncer: S,
    rows: RwLock<HashMap<String, CacheRow>>,
    id_gen: IdGen,
}

impl<S: Syncer> TaskConfigCache<S> {
    pub fn new(syncer: S) -> Self {
        Self {
            syncer,
            rows: RwLock::new(HashMap::new()),
            id_gen: IdGen::default(),
        }
    }

    /// `Get` (§4.3): on a cache hit, returns the stored `Fresh`/`Permanent`
    /// result without touching the syncer. On a miss, syncs, then caches a
    /// `Fresh` or `Permanent` outcome; a `Transient` outcome is returned but
    /// never written to the cache.
    pub async fn get(&self, repo_state: &RepoState) -> CachedResult {
        let key = cache_key(repo_state);
        if let Some(row) = self.rows.read().await.get(&key) {
            return match &row.entry {
                Entry::Fresh(cfg) => CachedResult::Fresh(cfg.clone()),
                Entry::Permanent(msg) => CachedResult::Permanent(msg.clone()),
            };
        }

        match self.syncer.sync(repo_state).await {
            Ok(cfg) => {
                self.rows.write().await.insert(
                    key,
                    CacheRow {
                        entry: Entry::Fresh(cfg.clone()),
                        inserted: Utc::now(),
                    },
                );
                CachedResult::Fresh(cfg)
            }
            Err(SyncError::Permanent(msg)) => {
                self.rows.write().await.insert(
                    key,
                    CacheRow {
                        entry: Entry::Permanent(msg.clone()),
                        inserted: Utc::now(),
                    },
                );
                CachedResult::Permanent(msg)
            }
            Err(SyncError::Transient(msg)) => CachedResult::Transient(msg),
        }
    }

    /// Deletes cache rows inserted before `older_than` (§4.3 `Cleanup`),
    /// called after every `Window.Update` so the cache tracks the same
    /// sliding window the Job Creator walks.
    pub async fn cleanup(&self, older_than: DateTime<Utc>) {
        self.rows.write().await.retain(|_, row| row.inserted >= older_than);
    }

    /// `MakeJob` (§4.3): builds an unsaved `Job` whose `Dependencies` are the
    /// transitive closure over the task-spec graph rooted at
    /// `JobSpec.task_specs`.
    pub fn make_job(
        &self,
        config: &Config,
        repo_state: RepoState,
        job_name: &str,
        now: DateTime<Utc>,
        requested: DateTime<Utc>,
    ) -> Result<Job, SchedError> {
        let spec = config
            .job_spec(job_name)
            .ok_or_else(|| SchedError::not_found(format!("job spec {job_name}")))?;

        let by_name: HashMap<&str, &TaskSpec> =
            config.task_specs.iter().map(|t| (t.name.as_str(), t)).collect();

        let mut dependencies: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut stack: Vec<String> = spec.task_specs.clone();
        while let Some(name) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            let task_spec = by_name.get(name.as_str()).ok_or_else(|| {
                SchedError::invalid_argument(format!(
                    "job spec {job_name} references unknown task spec {name}"
                ))
            })?;
            dependencies.insert(name.clone(), task_spec.dependencies.clone());
            stack.extend(task_spec.dependencies.iter().cloned());
        }

        let created = now;
        let requested = Job::clamp_requested(created, requested);
        Ok(Job {
            id: self.id_gen.next(created),
            repo_state,
            name: spec.name.clone(),
            priority: spec.priority,
            dependencies,
            tasks: BTreeMap::new(),
            status: sched_lib::model::JobStatus::InProgress,
            created,
            requested,
            started: Some(created),
            finished: None,
            is_force: false,
            buildbucket_build_id: None,
            buildbucket_lease_key: None,
            db_modified: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sched_lib::model::Trigger;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn repo_state(rev: &str) -> RepoState {
        RepoState {
            repo: "repo-a".into(),
            revision: rev.into(),
            patch: Default::default(),
        }
    }

    fn config() -> Config {
        Config {
            job_specs: vec![JobSpec {
                name: "build".into(),
                priority: 0.5,
                task_specs: vec!["compile".into()],
                trigger: Trigger::AnyBranch,
            }],
            task_specs: vec![
                TaskSpec {
                    name: "compile".into(),
                    dimensions: vec![],
                    dependencies: vec!["fetch-deps".into()],
                    execution_timeout_secs: 60,
                    expiration_secs: 600,
                    io_timeout_secs: 60,
                    cas_spec: "cas://compile".into(),
                    priority: 0.5,
                },
                TaskSpec {
                    name: "fetch-deps".into(),
                    dimensions: vec![],
                    dependencies: vec![],
                    execution_timeout_secs: 60,
                    expiration_secs: 600,
                    io_timeout_secs: 60,
                    cas_spec: "cas://fetch".into(),
                    priority: 0.5,
                },
            ],
        }
    }

    struct CountingSyncer {
        calls: AtomicU32,
        outcome: fn() -> Result<Config, SyncError>,
    }

    #[async_trait]
    impl Syncer for CountingSyncer {
        async fn sync(&self, _repo_state: &RepoState) -> Result<Config, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()
        }
    }

    #[tokio::test]
    async fn fresh_result_is_cached_across_calls() {
        let syncer = CountingSyncer {
            calls: AtomicU32::new(0),
            outcome: || Ok(config()),
        };
        let cache = TaskConfigCache::new(syncer);
        let rs = repo_state("r1");

        matches!(cache.get(&rs).await, CachedResult::Fresh(_));
        matches!(cache.get(&rs).await, CachedResult::Fresh(_));
        assert_eq!(cache.syncer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn permanent_error_is_cached() {
        let syncer = CountingSyncer {
            calls: AtomicU32::new(0),
            outcome: || Err(SyncError::Permanent("bad tasks.json".into())),
        };
        let cache = TaskConfigCache::new(syncer);
        let rs = repo_state("r1");

        for _ in 0..3 {
            let result = cache.get(&rs).await;
            assert!(matches!(result, CachedResult::Permanent(_)));
        }
        assert_eq!(cache.syncer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_error_is_never_cached() {
        let syncer = CountingSyncer {
            calls: AtomicU32::new(0),
            outcome: || Err(SyncError::Transient("network blip".into())),
        };
        let cache = TaskConfigCache::new(syncer);
        let rs = repo_state("r1");

        for _ in 0..3 {
            let result = cache.get(&rs).await;
            assert!(matches!(result, CachedResult::Transient(_)));
        }
        assert_eq!(cache.syncer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cleanup_evicts_rows_older_than_cutoff() {
        let syncer = CountingSyncer {
            calls: AtomicU32::new(0),
            outcome: || Ok(config()),
        };
        let cache = TaskConfigCache::new(syncer);
        let rs = repo_state("r1");
        cache.get(&rs).await;

        let far_future = Utc::now() + chrono::Duration::days(1);
        cache.cleanup(far_future).await;
        assert_eq!(cache.rows.read().await.len(), 0);
    }

    #[test]
    fn make_job_derives_transitive_dependencies() {
        let syncer = CountingSyncer {
            calls: AtomicU32::new(0),
            outcome: || Ok(config()),
        };
        let cache = TaskConfigCache::new(syncer);
        let now = Utc::now();
        let job = cache
            .make_job(&config(), repo_state("r1"), "build", now, now)
            .unwrap();

        assert_eq!(job.name, "build");
        assert!(job.dependencies.contains_key("compile"));
        assert!(job.dependencies.contains_key("fetch-deps"));
        assert_eq!(job.dependencies["compile"], vec!["fetch-deps".to_string()]);
    }

    #[test]
    fn make_job_rejects_unknown_job_spec() {
        let syncer = CountingSyncer {
            calls: AtomicU32::new(0),
            outcome: || Ok(config()),
        };
        let cache = TaskConfigCache::new(syncer);
        let now = Utc::now();
        let err = cache
            .make_job(&config(), repo_state("r1"), "does-not-exist", now, now)
            .unwrap_err();
        assert!(matches!(err, SchedError::NotFound(_)));
    }
}
