//! The Skip-Rule Store (§3, §4.2): holds named patterns and commit sets,
//! and decides whether a (taskSpec, commit) pair is suppressed.
//!
//! The match path (`MatchRule`) must be lock-free for readers and O(rules *
//! patterns); grounded on `arc-swap` for the snapshot the way a hot-path
//! cache with an infrequent writer and many concurrent readers is modeled
//! throughout the pack (e.g. `ArcSwap`-backed routing tables), in place of
//! the teacher's `parking_lot::RwLock` since this path additionally wants
//! readers to never block behind a `GetRules` refresh in flight.

use arc_swap::ArcSwap;
use async_trait::async_trait;
use sched_lib::error::{SchedError, SchedResult};
use sched_lib::model::SkipRule;
use sched_lib::repo_graph::RepoGraph;
use sched_lib::skip_rule;
use sched_tasks::Store;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{debug, warn};

/// How often `GetRules` is refreshed from the backing store in the
/// background (§4.2: "auto-refreshed every minute").
pub const REFRESH_INTERVAL: StdDuration = StdDuration::from_secs(60);

/// `§6.1` names only `GetById`/`Put`/`PutInChunks`/`GetFromDateRange` as the
/// minimum store surface; `RemoveRule` needs an actual delete, which every
/// concrete backend (in-memory, SQLite) is expected to provide alongside
/// `Store<SkipRule>`.
#[async_trait]
pub trait SkipRuleBackend: Store<SkipRule> {
    async fn delete(&self, name: &str) -> SchedResult<()>;
}

pub struct SkipRuleStore<S> {
    store: Arc<S>,
    snapshot: ArcSwap<Vec<SkipRule>>,
}

impl<S: SkipRuleBackend> SkipRuleStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            snapshot: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Pulls the current rule set from the backing store into the snapshot.
    /// Called at construction, on a background interval, and eagerly after
    /// every `add_rule`/`remove_rule` so a caller's own write is visible to
    /// its own next read without waiting for the next tick.
    pub async fn refresh(&self) -> SchedResult<()> {
        let now = chrono::Utc::now();
        let rules = self
            .store
            .get_from_date_range(chrono::DateTime::<chrono::Utc>::MIN_UTC, now, None)
            .await?;
        self.snapshot.store(Arc::new(rules));
        Ok(())
    }

    /// A snapshot of the current rule set (§4.2 `GetRules`).
    pub fn get_rules(&self) -> Arc<Vec<SkipRule>> {
        self.snapshot.load_full()
    }

    /// Validates patterns, resolves a 2-element `commits` list as a commit
    /// range against `repos`, and writes the rule (§4.2 `AddRule`).
    pub async fn add_rule(
        &self,
        mut rule: SkipRule,
        graph: &dyn RepoGraph,
        repos: &[String],
    ) -> SchedResult<SkipRule> {
        if rule.task_spec_patterns.is_empty() {
            return Err(SchedError::invalid_argument(
                "skip rule must have at least one task-spec pattern",
            ));
        }
        if rule.task_spec_patterns.iter().any(|p| p.is_empty()) {
            return Err(SchedError::invalid_argument("empty task-spec pattern"));
        }

        if rule.commits.len() == 2 {
            let (start, end) = (rule.commits[0].clone(), rule.commits[1].clone());
            let mut resolved = None;
            for repo in repos {
                if let Ok(hashes) = graph.resolve_commit_range(repo, &start, &end) {
                    resolved = Some(hashes);
                    break;
                }
            }
            rule.commits = resolved.ok_or_else(|| {
                SchedError::invalid_argument(format!(
                    "commit range ({start}, {end}) did not resolve against any of {repos:?}"
                ))
            })?;
        }

        let saved = self.store.put(rule).await?;
        self.refresh().await?;
        Ok(saved)
    }

    pub async fn remove_rule(&self, name: &str) -> SchedResult<()> {
        self.store.delete(name).await?;
        debug!(name, "removed skip rule");
        self.refresh().await
    }

    /// O(rules * patterns), lock-free: reads the current `ArcSwap` snapshot
    /// without taking any lock (§4.2).
    pub fn match_rule(&self, task_spec: &str, commit: &str) -> bool {
        sched_metrics::inc_skip_rule_evaluations();
        skip_rule::matches(&self.snapshot.load(), task_spec, commit)
    }

    /// Spawns the background refresh loop (§4.2). The returned handle may be
    /// aborted on shutdown.
    pub fn spawn_refresh_loop(self: Arc<Self>) -> tokio::task::JoinHandle<()>
    where
        S: Send + Sync + 'static,
    {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(REFRESH_INTERVAL);
            loop {
                interval.tick().await;
                if let Err(e) = self.refresh().await {
                    warn!(error = %e, "skip-rule refresh failed");
                }
            }
        })
    }
}

#[async_trait]
impl SkipRuleBackend for sched_tasks::mem::MemStore {
    async fn delete(&self, name: &str) -> SchedResult<()> {
        self.remove_skip_rule(name).await
    }
}

#[cfg(feature = "sqlite")]
#[async_trait]
impl SkipRuleBackend for sched_tasks::sqlite::SqliteStore {
    async fn delete(&self, name: &str) -> SchedResult<()> {
        self.delete_skip_rule(name).await
    }
}
