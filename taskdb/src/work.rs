//! The two diff-calculation work tables (§3, §4.5, §6.1) and their
//! select-and-lease operations. In-memory implementation; the locking
//! discipline models the "single transaction" requirement from §4.5 by
//! holding the table's mutex across the select+lease pair.

use chrono::{DateTime, Duration, Utc};
use sched_lib::error::{SchedError, SchedResult};
use sched_lib::model::{
    GroupingId, PrimaryBranchDiffCalculationWork, SecondaryBranchDiffCalculationWork,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct WorkStore {
    primary: Arc<Mutex<BTreeMap<GroupingId, PrimaryBranchDiffCalculationWork>>>,
    secondary: Arc<Mutex<BTreeMap<(String, GroupingId), SecondaryBranchDiffCalculationWork>>>,
}

impl WorkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_primary(&self, row: PrimaryBranchDiffCalculationWork) {
        self.primary.lock().await.insert(row.grouping_id.clone(), row);
    }

    pub async fn upsert_secondary(&self, row: SecondaryBranchDiffCalculationWork) {
        self.secondary
            .lock()
            .await
            .insert((row.branch_name.clone(), row.grouping_id.clone()), row);
    }

    /// `SELECT ... WHERE calculation_lease_ends < now AND last_calculated_ts
    /// < now - staleness ORDER BY last_calculated_ts ASC LIMIT 1` followed by
    /// the lease `UPDATE`, as a single critical section (§4.5 primary-branch
    /// work). Returns `None` (`shouldSleep=true`) when no row qualifies.
    pub async fn select_and_lease_primary(
        &self,
        now: DateTime<Utc>,
        staleness_threshold: Duration,
        lease_timeout: Duration,
    ) -> SchedResult<Option<GroupingId>> {
        let mut table = self.primary.lock().await;
        let candidate = table
            .values()
            .filter(|row| {
                row.calculation_lease_ends < now && row.last_calculated_ts < now - staleness_threshold
            })
            .min_by_key(|row| row.last_calculated_ts)
            .map(|row| row.grouping_id.clone());

        if let Some(id) = &candidate {
            if let Some(row) = table.get_mut(id) {
                row.calculation_lease_ends = now + lease_timeout;
            }
        }
        Ok(candidate)
    }

    pub async fn mark_calculated_primary(&self, id: &GroupingId, now: DateTime<Utc>) -> SchedResult<()> {
        let mut table = self.primary.lock().await;
        let row = table
            .get_mut(id)
            .ok_or_else(|| SchedError::not_found(format!("primary work row {id:?}")))?;
        row.last_calculated_ts = now;
        Ok(())
    }

    /// Low-contention mode (default): same atomic select-and-lease pattern
    /// as primary, filtering on `last_calculated_ts < last_updated_ts`.
    pub async fn select_and_lease_secondary_low_contention(
        &self,
        now: DateTime<Utc>,
        lease_timeout: Duration,
    ) -> SchedResult<Option<(String, GroupingId)>> {
        let mut table = self.secondary.lock().await;
        let candidate = table
            .values()
            .filter(|row| {
                row.calculation_lease_ends < now && row.last_calculated_ts < row.last_updated_ts
            })
            .min_by_key(|row| row.last_calculated_ts)
            .map(|row| (row.branch_name.clone(), row.grouping_id.clone()));

        if let Some(key) = &candidate {
            if let Some(row) = table.get_mut(key) {
                row.calculation_lease_ends = now + lease_timeout;
            }
        }
        Ok(candidate)
    }

    /// High-contention mode: the select is a non-atomic "stale read" at
    /// `now - stale_read_age`, returning up to `limit` candidates; the
    /// caller picks one at random and leases it separately via
    /// [`Self::lease_secondary`] (§4.5). Two workers may race on the same
    /// row; the subsequent lease call serializes them.
    pub async fn list_secondary_candidates_stale(
        &self,
        stale_read_at: DateTime<Utc>,
        limit: usize,
    ) -> Vec<(String, GroupingId)> {
        let table = self.secondary.lock().await;
        table
            .values()
            .filter(|row| {
                row.calculation_lease_ends < stale_read_at
                    && row.last_calculated_ts < row.last_updated_ts
            })
            .take(limit)
            .map(|row| (row.branch_name.clone(), row.grouping_id.clone()))
            .collect()
    }

    /// Leases a specific row chosen from [`Self::list_secondary_candidates_stale`].
    /// Returns `Ok(false)` if another worker already leased it first (a
    /// tolerated race in high-contention mode, not an error).
    pub async fn lease_secondary(
        &self,
        key: &(String, GroupingId),
        now: DateTime<Utc>,
        lease_timeout: Duration,
    ) -> SchedResult<bool> {
        let mut table = self.secondary.lock().await;
        let row = table
            .get_mut(key)
            .ok_or_else(|| SchedError::not_found(format!("secondary work row {key:?}")))?;
        if row.calculation_lease_ends >= now {
            return Ok(false);
        }
        row.calculation_lease_ends = now + lease_timeout;
        Ok(true)
    }

    pub async fn mark_calculated_secondary(
        &self,
        key: &(String, GroupingId),
        now: DateTime<Utc>,
    ) -> SchedResult<()> {
        let mut table = self.secondary.lock().await;
        let row = table
            .get_mut(key)
            .ok_or_else(|| SchedError::not_found(format!("secondary work row {key:?}")))?;
        row.last_calculated_ts = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grouping(n: u8) -> GroupingId {
        GroupingId(format!("g{n}"))
    }

    #[tokio::test]
    async fn lease_expiry_allows_a_second_worker_to_pick_up_a_crashed_lease() {
        let store = WorkStore::new();
        let t0 = Utc::now();
        store
            .upsert_primary(PrimaryBranchDiffCalculationWork {
                grouping_id: grouping(1),
                last_calculated_ts: t0 - Duration::minutes(5),
                calculation_lease_ends: t0 - Duration::seconds(1),
            })
            .await;

        // P1 leases it.
        let leased = store
            .select_and_lease_primary(t0, Duration::minutes(1), Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(leased, Some(grouping(1)));

        // Immediately after, no second poll from the same instant re-picks it.
        let second = store
            .select_and_lease_primary(t0, Duration::minutes(1), Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(second, None);

        // P1 "crashes". At now + 10m + 1s, P2's poll finds it again.
        let later = t0 + Duration::minutes(10) + Duration::seconds(1);
        let relet = store
            .select_and_lease_primary(later, Duration::minutes(1), Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(relet, Some(grouping(1)));

        store.mark_calculated_primary(&grouping(1), later).await.unwrap();
    }

    #[tokio::test]
    async fn secondary_low_contention_requires_stale_calculation() {
        let store = WorkStore::new();
        let t0 = Utc::now();
        store
            .upsert_secondary(SecondaryBranchDiffCalculationWork {
                branch_name: "b1".into(),
                grouping_id: grouping(2),
                last_updated_ts: t0,
                digests: vec![],
                last_calculated_ts: t0 - Duration::seconds(1),
                calculation_lease_ends: t0 - Duration::seconds(1),
            })
            .await;

        let leased = store
            .select_and_lease_secondary_low_contention(t0, Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(leased, Some(("b1".into(), grouping(2))));
    }
}
