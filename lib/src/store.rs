//! The minimum store surface every table-backed entity needs (§6.1). Both
//! the in-memory store (`sched-tasks::mem`) and the optional SQLite-backed
//! store implement this trait per entity type.

use crate::error::SchedResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// The maximum number of rows a single `put_in_chunks` transaction may
/// contain; callers split larger batches (§6.1).
pub const MAX_CHUNK: usize = 500;

/// Entities with an identity and a store-assigned modification timestamp
/// used for compare-and-swap (§3).
pub trait Entity {
    type Id: Clone + Eq + std::fmt::Display;

    fn id(&self) -> &Self::Id;
    fn db_modified(&self) -> Option<DateTime<Utc>>;
    fn set_db_modified(&mut self, ts: DateTime<Utc>);
    fn created(&self) -> DateTime<Utc>;
}

#[async_trait]
pub trait Store<T: Entity + Send + Sync + Clone>: Send + Sync {
    async fn get_by_id(&self, id: &T::Id) -> SchedResult<Option<T>>;

    /// Compare-and-swap against the row's prior `db_modified`; on mismatch,
    /// fails with `ConcurrentUpdate`. On success, sets `db_modified = now`.
    async fn put(&self, row: T) -> SchedResult<T>;

    /// Splits `rows` into chunks of at most [`MAX_CHUNK`] and writes each
    /// chunk transactionally.
    async fn put_in_chunks(&self, rows: Vec<T>) -> SchedResult<Vec<T>> {
        let mut out = Vec::with_capacity(rows.len());
        for chunk in rows.into_iter().collect::<Vec<_>>().chunks(MAX_CHUNK) {
            for row in chunk.iter().cloned() {
                out.push(self.put(row).await?);
            }
        }
        Ok(out)
    }

    /// Ordered by `created`. `repo` narrows the scan when the entity
    /// carries a repo.
    async fn get_from_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        repo: Option<&str>,
    ) -> SchedResult<Vec<T>>;
}
