//! In-memory `Store` implementation. Grounded on the teacher's
//! `InMemoryTaskManager`/`InMemoryTaskDb` (`Arc<Mutex<...>>`-guarded
//! `HashMap`), generalized from a single proof-task table to one table per
//! entity type and from "last write wins" to true CAS on `db_modified`.

use async_trait::async_trait;
use chrono::Utc;
use sched_lib::error::{SchedError, SchedResult};
use sched_lib::id::Id;
use sched_lib::model::{Job, SkipRule, Task};
use sched_lib::store::{Entity, Store};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemStore {
    jobs: Arc<Mutex<BTreeMap<Id, Job>>>,
    tasks: Arc<Mutex<BTreeMap<Id, Task>>>,
    skip_rules: Arc<Mutex<BTreeMap<String, SkipRule>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Shared compare-and-swap logic: on mismatch between `row.db_modified` and
/// the stored value's `db_modified`, fails with `ConcurrentUpdate` (§3
/// Invariant 2). On success, stamps `db_modified = now`.
fn cas_put<K, V>(map: &mut BTreeMap<K, V>, mut row: V, key: K) -> SchedResult<V>
where
    K: Ord + std::fmt::Display,
    V: Entity<Id = K> + Clone,
{
    match map.get(&key) {
        Some(existing) if existing.db_modified() != row.db_modified() => {
            return Err(SchedError::ConcurrentUpdate(key.to_string()));
        }
        _ => {}
    }
    row.set_db_modified(Utc::now());
    map.insert(key, row.clone());
    Ok(row)
}

#[async_trait]
impl Store<Job> for MemStore {
    async fn get_by_id(&self, id: &Id) -> SchedResult<Option<Job>> {
        Ok(self.jobs.lock().await.get(id).cloned())
    }

    async fn put(&self, row: Job) -> SchedResult<Job> {
        let key = row.id;
        cas_put(&mut *self.jobs.lock().await, row, key)
    }

    async fn get_from_date_range(
        &self,
        start: chrono::DateTime<Utc>,
        end: chrono::DateTime<Utc>,
        repo: Option<&str>,
    ) -> SchedResult<Vec<Job>> {
        let jobs = self.jobs.lock().await;
        let mut out: Vec<Job> = jobs
            .values()
            .filter(|j| j.created >= start && j.created <= end)
            .filter(|j| repo.map(|r| j.repo_state.repo == r).unwrap_or(true))
            .cloned()
            .collect();
        out.sort_by_key(|j| j.created);
        Ok(out)
    }
}

#[async_trait]
impl Store<Task> for MemStore {
    async fn get_by_id(&self, id: &Id) -> SchedResult<Option<Task>> {
        Ok(self.tasks.lock().await.get(id).cloned())
    }

    async fn put(&self, row: Task) -> SchedResult<Task> {
        row.validate_id_skew()?;
        let key = row.id;
        cas_put(&mut *self.tasks.lock().await, row, key)
    }

    async fn get_from_date_range(
        &self,
        start: chrono::DateTime<Utc>,
        end: chrono::DateTime<Utc>,
        repo: Option<&str>,
    ) -> SchedResult<Vec<Task>> {
        // Widen by the Id-vs-Created skew (§6.1) before filtering on the
        // real `created` field, since a Task's Id timestamp may precede
        // `created` by up to TASK_ID_SKEW.
        let widened_start = start - sched_lib::id::TASK_ID_SKEW;
        let widened_end = end + sched_lib::id::TASK_ID_SKEW;
        let tasks = self.tasks.lock().await;
        let mut out: Vec<Task> = tasks
            .values()
            .filter(|t| {
                t.id.timestamp >= widened_start
                    && t.id.timestamp <= widened_end
                    && t.created >= start
                    && t.created <= end
            })
            .filter(|t| {
                repo.map(|r| t.task_key.repo_state.repo == r)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        out.sort_by_key(|t| t.created);
        Ok(out)
    }
}

#[async_trait]
impl Store<SkipRule> for MemStore {
    async fn get_by_id(&self, id: &String) -> SchedResult<Option<SkipRule>> {
        Ok(self.skip_rules.lock().await.get(id).cloned())
    }

    async fn put(&self, row: SkipRule) -> SchedResult<SkipRule> {
        let key = row.name.clone();
        cas_put(&mut *self.skip_rules.lock().await, row, key)
    }

    async fn get_from_date_range(
        &self,
        _start: chrono::DateTime<Utc>,
        _end: chrono::DateTime<Utc>,
        _repo: Option<&str>,
    ) -> SchedResult<Vec<SkipRule>> {
        Ok(self.skip_rules.lock().await.values().cloned().collect())
    }
}

impl MemStore {
    pub async fn remove_skip_rule(&self, name: &str) -> SchedResult<()> {
        self.skip_rules.lock().await.remove(name);
        Ok(())
    }

    pub async fn all_skip_rules(&self) -> Vec<SkipRule> {
        self.skip_rules.lock().await.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sched_lib::model::{JobStatus, Patch, RepoState};
    use std::collections::BTreeMap as Map;

    fn new_job(seq: u64) -> Job {
        let now = Utc::now();
        Job {
            id: Id::new(now, seq),
            repo_state: RepoState {
                repo: "repo-a".into(),
                revision: "deadbeef".into(),
                patch: Patch::default(),
            },
            name: "build".into(),
            priority: 0.5,
            dependencies: Map::new(),
            tasks: Map::new(),
            status: JobStatus::InProgress,
            created: now,
            requested: now,
            started: Some(now),
            finished: None,
            is_force: false,
            buildbucket_build_id: None,
            buildbucket_lease_key: None,
            db_modified: None,
        }
    }

    #[tokio::test]
    async fn put_then_get() {
        let store = MemStore::new();
        let job = store.put(new_job(1)).await.unwrap();
        let fetched = store.get_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, job.id);
        assert!(fetched.db_modified.is_some());
    }

    #[tokio::test]
    async fn concurrent_update_rejected_on_stale_db_modified() {
        let store = MemStore::new();
        let job = store.put(new_job(2)).await.unwrap();

        // Simulate a second writer with a stale in-memory copy (db_modified
        // still None) racing a writer that already landed once.
        let mut stale = job.clone();
        stale.db_modified = None;
        stale.priority = 0.9;

        let err = store.put(stale).await.unwrap_err();
        assert!(matches!(err, SchedError::ConcurrentUpdate(_)));
    }

    #[tokio::test]
    async fn date_range_filters_by_created() {
        let store = MemStore::new();
        let job = store.put(new_job(3)).await.unwrap();
        let start = job.created - chrono::Duration::seconds(1);
        let end = job.created + chrono::Duration::seconds(1);
        let found = store.get_from_date_range(start, end, None).await.unwrap();
        assert_eq!(found.len(), 1);

        let none = store
            .get_from_date_range(
                job.created + chrono::Duration::hours(1),
                job.created + chrono::Duration::hours(2),
                None,
            )
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
