//! The Modified-Data Tracker (§4.7): `StartTrackingModifiedTasks` /
//! `GetModifiedTasks`, one independent cursor per token.
//!
//! Grounded in the teacher's `ApiKeyStore` rate-limit bookkeeping
//! (`server/auth.rs`): a per-key `Vec<DateTime<Utc>>` pruned on each
//! access. Here each token keeps a single `last_poll` cursor instead of a
//! window of timestamps, and "pruning" is "expire the whole cursor once
//! idle too long" rather than "drop entries older than the window".
//!
//! The minimum §6.1 store surface has no secondary index on `DbModified`,
//! so `GetModifiedTasks` falls back to `GetFromDateRange` over the full
//! `Created` range and filters on `DbModified` in memory; a production
//! store would maintain its own write-time index instead (see DESIGN.md).

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sched_lib::error::SchedError;
use sched_lib::id::IdGen;
use sched_lib::model::Task;
use sched_tasks::Store;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A token with no `GetModifiedTasks` call in this long is expired (§4.7:
/// "at most a bounded timeout (e.g., 30s)").
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("expired or unknown token")]
    ExpiredToken,
    #[error(transparent)]
    Store(#[from] SchedError),
}

struct TokenState {
    last_poll: DateTime<Utc>,
    last_access: Instant,
}

pub struct ModifiedTracker<St> {
    store: Arc<St>,
    tokens: DashMap<String, TokenState>,
    id_gen: IdGen,
}

impl<St: Store<Task>> ModifiedTracker<St> {
    pub fn new(store: Arc<St>) -> Self {
        Self {
            store,
            tokens: DashMap::new(),
            id_gen: IdGen::default(),
        }
    }

    /// `StartTrackingModifiedTasks` (§4.7): mints a fresh cursor starting
    /// "now", so the first `GetModifiedTasks` call only sees tasks modified
    /// after this call.
    pub fn start_tracking(&self) -> String {
        let token = self.id_gen.next(Utc::now()).to_string();
        self.tokens.insert(
            token.clone(),
            TokenState {
                last_poll: Utc::now(),
                last_access: Instant::now(),
            },
        );
        token
    }

    /// `GetModifiedTasks` (§4.7).
    pub async fn get_modified(&self, token: &str) -> Result<Vec<Task>, TrackerError> {
        let since = {
            let mut entry = self
                .tokens
                .get_mut(token)
                .ok_or(TrackerError::ExpiredToken)?;
            if entry.last_access.elapsed() > IDLE_TIMEOUT {
                drop(entry);
                self.tokens.remove(token);
                return Err(TrackerError::ExpiredToken);
            }
            entry.last_access = Instant::now();
            entry.last_poll
        };

        let now = Utc::now();
        let mut tasks = self
            .store
            .get_from_date_range(DateTime::<Utc>::MIN_UTC, now, None)
            .await?;
        tasks.retain(|t| t.db_modified.map(|m| m > since && m <= now).unwrap_or(false));

        if let Some(mut entry) = self.tokens.get_mut(token) {
            entry.last_poll = now;
        }
        Ok(tasks)
    }

    pub fn spawn_sweeper(self: Arc<Self>) -> tokio::task::JoinHandle<()>
    where
        St: Send + Sync + 'static,
    {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                self.tokens.retain(|_, state| state.last_access.elapsed() <= IDLE_TIMEOUT);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sched_lib::model::{Task, TaskKey, TaskStatus};
    use sched_tasks::mem::MemStore;

    fn task(name: &str, created: DateTime<Utc>) -> Task {
        Task {
            id: sched_lib::id::Id::new(created, name.len() as u64),
            task_key: TaskKey {
                repo_state: sched_lib::model::RepoState {
                    repo: "r1".into(),
                    revision: "abc".into(),
                    patch: Default::default(),
                },
                name: name.to_string(),
                forced_job_id: None,
            },
            commits: vec![],
            attempt: 0,
            max_attempts: 1,
            status: TaskStatus::Pending,
            created,
            started: None,
            finished: None,
            parent_task_ids: vec![],
            retry_of: None,
            jobs: vec![],
            properties: Default::default(),
            isolated_output: None,
            swarming_task_id: None,
            swarming_bot_id: None,
            db_modified: None,
        }
    }

    #[tokio::test]
    async fn only_tasks_modified_after_start_are_returned() {
        let store = Arc::new(MemStore::new());
        let before = task("ignored", Utc::now() - chrono::Duration::seconds(5));
        store.put(before).await.unwrap();

        let tracker = ModifiedTracker::new(store.clone());
        let token = tracker.start_tracking();

        let fresh = task("fresh", Utc::now());
        store.put(fresh.clone()).await.unwrap();

        let modified = tracker.get_modified(&token).await.unwrap();
        assert_eq!(modified.len(), 1);
        assert_eq!(modified[0].task_key.name, fresh.task_key.name);
    }

    #[tokio::test]
    async fn unknown_token_is_expired() {
        let store = Arc::new(MemStore::new());
        let tracker = ModifiedTracker::new(store);
        assert!(matches!(
            tracker.get_modified("no-such-token").await,
            Err(TrackerError::ExpiredToken)
        ));
    }
}
