//! The per-repo sliding time window (§4.1): bounds which commits are still
//! "in scope" for the Job Creator and the Task-Config Cache's cleanup pass.
//!
//! Grounded on `sched_lib::repo_graph::RepoGraph` as the only external
//! collaborator; the window itself holds no store dependency. Concurrent
//! reads proceed while `update` holds the write lock, the way the teacher's
//! hot-path caches (e.g. `core`'s preflight LRU) separate a cheap read path
//! from an infrequent refresh using `parking_lot::RwLock` rather than an
//! async mutex — window reads are synchronous, on the query path of every
//! RPC and gather pass.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use sched_lib::repo_graph::{RepoGraph, RepoGraphError};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    #[error("unknown repo: {0}")]
    UnknownRepo(String),
    #[error("unknown commit: {0}")]
    UnknownCommit(String),
}

impl From<RepoGraphError> for WindowError {
    fn from(e: RepoGraphError) -> Self {
        match e {
            RepoGraphError::UnknownRepo(r) => WindowError::UnknownRepo(r),
            RepoGraphError::UnknownCommit(c) => WindowError::UnknownCommit(c),
        }
    }
}

#[derive(Debug, Clone)]
struct Snapshot {
    start: HashMap<String, DateTime<Utc>>,
    earliest_start: Option<DateTime<Utc>>,
}

/// A repo-aware sliding window: the earliest commit time still "in scope"
/// given a duration and a minimum commit count (§4.1).
pub struct Window {
    duration: Duration,
    min_commits: u32,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl Window {
    pub fn new(duration: Duration, min_commits: u32) -> Self {
        Self {
            duration,
            min_commits,
            snapshot: RwLock::new(Arc::new(Snapshot {
                start: HashMap::new(),
                earliest_start: None,
            })),
        }
    }

    /// Recomputes `start[repo]` for every repo in `graph` as of `now` (§4.1
    /// steps 1-4). Holds the write lock only long enough to swap in the new
    /// snapshot; readers never block on a walk in progress.
    pub fn update(&self, graph: &dyn RepoGraph, now: DateTime<Utc>) -> Result<(), WindowError> {
        let base_start = now - self.duration;
        let mut start = HashMap::new();

        for repo in graph.repos() {
            let mut latest: Option<DateTime<Utc>> = None;
            for head in graph.branch_heads(&repo)? {
                let mut cur = Some(head);
                let mut steps_remaining = self.min_commits.saturating_sub(1);
                let mut head_latest: Option<DateTime<Utc>> = None;
                while let Some(hash) = cur {
                    let commit = graph.commit(&repo, &hash)?;
                    head_latest = Some(match head_latest {
                        Some(t) if t >= commit.timestamp => t,
                        _ => commit.timestamp,
                    });
                    if steps_remaining == 0 {
                        break;
                    }
                    steps_remaining -= 1;
                    cur = commit.parent;
                }
                if let Some(t) = head_latest {
                    latest = Some(match latest {
                        Some(l) if l >= t => l,
                        _ => t,
                    });
                }
            }

            let repo_start = match latest {
                Some(latest) => base_start.min(latest),
                None => base_start,
            };
            start.insert(repo, repo_start);
        }

        let earliest_start = start.values().min().copied();
        *self.snapshot.write() = Arc::new(Snapshot { start, earliest_start });
        Ok(())
    }

    pub fn start(&self, repo: &str) -> Result<DateTime<Utc>, WindowError> {
        self.snapshot
            .read()
            .start
            .get(repo)
            .copied()
            .ok_or_else(|| WindowError::UnknownRepo(repo.to_string()))
    }

    /// The minimum `start[repo]` across all known repos; used when no repo
    /// is specified (§4.1).
    pub fn earliest_start(&self) -> Option<DateTime<Utc>> {
        self.snapshot.read().earliest_start
    }

    /// `!start[repo].After(t)`, i.e. `start[repo] <= t`.
    pub fn test_time(&self, repo: &str, t: DateTime<Utc>) -> Result<bool, WindowError> {
        Ok(self.start(repo)? <= t)
    }

    pub fn test_commit_time(
        &self,
        repo: &str,
        commit_timestamp: DateTime<Utc>,
    ) -> Result<bool, WindowError> {
        self.test_time(repo, commit_timestamp)
    }

    pub fn test_commit_hash(
        &self,
        graph: &dyn RepoGraph,
        repo: &str,
        hash: &str,
    ) -> Result<bool, WindowError> {
        let commit = graph.commit(repo, hash).map_err(WindowError::from)?;
        self.test_time(repo, commit.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sched_lib::repo_graph::Commit;
    use std::collections::HashMap as Map;

    struct FakeGraph {
        commits: Map<(String, String), Commit>,
        heads: Map<String, Vec<String>>,
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
            Ok(false)
        }
        fn branch_heads_named(&self, repo: &str, branch: &str) -> Result<Vec<String>, RepoGraphError> {
            if branch == "main" {
                self.branch_heads(repo)
            } else {
                Err(RepoGraphError::UnknownCommit(branch.to_string()))
            }
        }
    }

    fn chain(repo: &str, n: usize, now: DateTime<Utc>) -> FakeGraph {
        let mut commits = Map::new();
        for i in 0..n {
            let hash = format!("c{i}");
            let parent = if i + 1 < n { Some(format!("c{}", i + 1)) } else { None };
            commits.insert(
                (repo.to_string(), hash.clone()),
                Commit {
                    hash,
                    parent,
                    timestamp: now - Duration::days(i as i64),
                },
            );
        }
        let mut heads = Map::new();
        heads.insert(repo.to_string(), vec!["c0".to_string()]);
        FakeGraph { commits, heads }
    }

    #[test]
    fn window_bounded_by_min_commits_when_duration_is_short() {
        let now = Utc::now();
        let graph = chain("r1", 20, now);
        // 1-hour duration but 10 min-commits: the window must still reach
        // back to the 10th-newest commit (9 days old).
        let window = Window::new(Duration::hours(1), 10);
        window.update(&graph, now).unwrap();
        let start = window.start("r1").unwrap();
        assert!(start <= now - Duration::days(9));
    }

    #[test]
    fn window_bounded_by_duration_when_min_commits_is_small() {
        let now = Utc::now();
        let graph = chain("r2", 20, now);
        let window = Window::new(Duration::days(5), 2);
        window.update(&graph, now).unwrap();
        let start = window.start("r2").unwrap();
        assert!(start <= now - Duration::days(5));
    }

    #[test]
    fn unknown_repo_is_an_error() {
        let now = Utc::now();
        let graph = chain("r3", 5, now);
        let window = Window::new(Duration::days(1), 1);
        window.update(&graph, now).unwrap();
        assert!(matches!(window.start("nope"), Err(WindowError::UnknownRepo(_))));
    }
}
