//! Best-effort de-dup for `TriggerJobs` (§4.6, §9 Open Question: "`TriggerJobs`
//! is not idempotent under retry... whether to deduplicate on `(jobName,
//! commitHash, submitter, within-small-window)` is left to the
//! implementer"). DESIGN.md records the decision: dedupe on `(job_name,
//! commit_hash)` within a short window, in-process only.
//!
//! Shaped like `host::auth::ApiKeyStore`'s rate-limit bookkeeping
//! (`DashMap` keyed by a string, pruned lazily on access) rather than a
//! durable store index.

use dashmap::DashMap;
use sched_lib::id::Id;
use std::time::{Duration, Instant};

/// A repeated `(job_name, commit_hash)` trigger within this window returns
/// the id of the job already created for the first request instead of
/// creating a second one.
pub const DEDUP_WINDOW: Duration = Duration::from_secs(60);

pub struct TriggerDedup {
    entries: DashMap<(String, String), (Id, Instant)>,
}

impl TriggerDedup {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    /// Returns the previously-created job id if `(job_name, commit_hash)` was
    /// triggered within [`DEDUP_WINDOW`], without recording anything. Callers
    /// use this to decide whether to skip building and persisting a new Job
    /// *before* doing either — by the time `dedup_or_insert` ran, a
    /// duplicate Job would already be durably in the store.
    pub fn existing(&self, job_name: &str, commit_hash: &str) -> Option<Id> {
        let key = (job_name.to_string(), commit_hash.to_string());
        let entry = self.entries.get(&key)?;
        (entry.1.elapsed() < DEDUP_WINDOW).then_some(entry.0)
    }

    /// Returns the previously-created job id if `(job_name, commit_hash)` was
    /// triggered within [`DEDUP_WINDOW`]; otherwise records `job_id` as the
    /// canonical id for this key and returns `None`.
    pub fn dedup_or_insert(&self, job_name: &str, commit_hash: &str, job_id: Id) -> Option<Id> {
        let key = (job_name.to_string(), commit_hash.to_string());
        if let Some(entry) = self.entries.get(&key) {
            if entry.1.elapsed() < DEDUP_WINDOW {
                return Some(entry.0);
            }
        }
        self.entries.insert(key, (job_id, Instant::now()));
        None
    }

    pub fn sweep(&self) {
        self.entries.retain(|_, (_, inserted)| inserted.elapsed() < DEDUP_WINDOW);
    }
}

impl Default for TriggerDedup {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn repeated_trigger_within_window_returns_prior_id() {
        let dedup = TriggerDedup::new();
        let id = Id::new(Utc::now(), 1);
        assert_eq!(dedup.dedup_or_insert("build", "deadbeef", id), None);
        let other = Id::new(Utc::now(), 2);
        assert_eq!(dedup.dedup_or_insert("build", "deadbeef", other), Some(id));
    }

    #[test]
    fn existing_peeks_without_inserting() {
        let dedup = TriggerDedup::new();
        assert_eq!(dedup.existing("build", "deadbeef"), None);
        assert_eq!(dedup.existing("build", "deadbeef"), None, "peeking must not register the key");

        let id = Id::new(Utc::now(), 1);
        assert_eq!(dedup.dedup_or_insert("build", "deadbeef", id), None);
        assert_eq!(dedup.existing("build", "deadbeef"), Some(id));
    }

    #[test]
    fn distinct_keys_do_not_collide() {
        let dedup = TriggerDedup::new();
        let id_a = Id::new(Utc::now(), 1);
        let id_b = Id::new(Utc::now(), 2);
        assert_eq!(dedup.dedup_or_insert("build", "aaa", id_a), None);
        assert_eq!(dedup.dedup_or_insert("build", "bbb", id_b), None);
        assert_eq!(dedup.dedup_or_insert("lint", "aaa", id_b), None);
    }
}
