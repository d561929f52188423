//! An optional Redis-backed secondary store for the two diff-calculation
//! work tables (§3, §4.5). `sched_tasks::work::WorkStore` is the primary,
//! in-process implementation every single-binary deployment uses; this
//! store exists for deployments that run the dispatcher out-of-process from
//! the store owner and want a shared, TTL'd cache of work rows in front of
//! the real store.
//!
//! Grounded on the teacher's `reqpool::Pool`: the same `backoff`-wrapped
//! connection-open retry (`Pool::redis_conn`) and `Backend` enum switching
//! between a real Redis connection and an in-process `MemoryBackend` for
//! tests, generalized from a single proof-request pool keyed by
//! `RequestKey` to two work tables keyed by `GroupingId`.

use crate::{backend::Backend, impl_display_using_json_pretty, MemoryBackend, RedisPoolConfig};
use backoff::{exponential::ExponentialBackoff, SystemClock};
use redis::{Client, Commands};
use sched_lib::model::{
    GroupingId, PrimaryBranchDiffCalculationWork, SecondaryBranchDiffCalculationWork,
};
use sched_redis_derive::RedisValue;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Pool {
    client: Client,
    config: RedisPoolConfig,
}

/// Wire wrapper for a primary-branch row, serialized to a Redis string via
/// `RedisValue` the same way the teacher wraps its pool entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, RedisValue)]
struct PrimaryRow(PrimaryBranchDiffCalculationWork);
impl_display_using_json_pretty!(PrimaryRow);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, RedisValue)]
struct SecondaryRow(SecondaryBranchDiffCalculationWork);
impl_display_using_json_pretty!(SecondaryRow);

fn primary_key(id: &GroupingId) -> String {
    format!("sched:work:primary:{}", id.0)
}

fn secondary_key(branch: &str, id: &GroupingId) -> String {
    format!("sched:work:secondary:{branch}:{}", id.0)
}

impl Pool {
    pub fn open(config: RedisPoolConfig) -> Result<Self, redis::RedisError> {
        if config.enable_redis_pool {
            tracing::info!("Pool.open using redis: {}", config.redis_url);
        } else {
            tracing::info!("Pool.open using in-process memory backend");
        }

        let client = Client::open(config.redis_url.clone())?;
        Ok(Self { client, config })
    }

    pub fn conn(&mut self) -> Result<Backend, redis::RedisError> {
        if self.config.enable_redis_pool {
            Ok(Backend::Redis(self.redis_conn()?))
        } else {
            Ok(Backend::Memory(MemoryBackend::new(
                self.config.redis_url.clone(),
            )))
        }
    }

    fn redis_conn(&mut self) -> Result<redis::Connection, redis::RedisError> {
        let backoff: ExponentialBackoff<SystemClock> = ExponentialBackoff {
            initial_interval: Duration::from_secs(10),
            max_interval: Duration::from_secs(60),
            max_elapsed_time: Some(Duration::from_secs(300)),
            ..Default::default()
        };

        backoff::retry(backoff, || match self.client.get_connection() {
            Ok(conn) => Ok(conn),
            Err(e) => {
                tracing::error!("Pool.get_connection: failed to connect to redis: {e:?}, retrying...");
                self.client = redis::Client::open(self.config.redis_url.clone())?;
                Err(backoff::Error::Transient {
                    err: e,
                    retry_after: None,
                })
            }
        })
        .map_err(|e| match e {
            backoff::Error::Transient { err, retry_after: _ } | backoff::Error::Permanent(err) => err,
        })
    }

    pub fn put_primary(&mut self, row: PrimaryBranchDiffCalculationWork) -> Result<(), String> {
        let key = primary_key(&row.grouping_id);
        self.conn()
            .map_err(|e| e.to_string())?
            .set_ex(key, PrimaryRow(row), self.config.redis_ttl)
            .map_err(|e| e.to_string())
    }

    pub fn get_primary(
        &mut self,
        id: &GroupingId,
    ) -> Result<Option<PrimaryBranchDiffCalculationWork>, String> {
        let key = primary_key(id);
        let result: redis::RedisResult<PrimaryRow> = self.conn().map_err(|e| e.to_string())?.get(&key);
        match result {
            Ok(v) => Ok(Some(v.0)),
            Err(e) if e.kind() == redis::ErrorKind::TypeError => Ok(None),
            Err(e) => Err(e.to_string()),
        }
    }

    pub fn put_secondary(&mut self, row: SecondaryBranchDiffCalculationWork) -> Result<(), String> {
        let key = secondary_key(&row.branch_name, &row.grouping_id);
        self.conn()
            .map_err(|e| e.to_string())?
            .set_ex(key, SecondaryRow(row), self.config.redis_ttl)
            .map_err(|e| e.to_string())
    }

    pub fn get_secondary(
        &mut self,
        branch: &str,
        id: &GroupingId,
    ) -> Result<Option<SecondaryBranchDiffCalculationWork>, String> {
        let key = secondary_key(branch, id);
        let result: redis::RedisResult<SecondaryRow> = self.conn().map_err(|e| e.to_string())?.get(&key);
        match result {
            Ok(v) => Ok(Some(v.0)),
            Err(e) if e.kind() == redis::ErrorKind::TypeError => Ok(None),
            Err(e) => Err(e.to_string()),
        }
    }

    pub fn remove_primary(&mut self, id: &GroupingId) -> Result<(), String> {
        self.conn()
            .map_err(|e| e.to_string())?
            .del(primary_key(id))
            .map(|_: usize| ())
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_backend::memory_pool;
    use chrono::Utc;

    fn row(n: u8) -> PrimaryBranchDiffCalculationWork {
        let now = Utc::now();
        PrimaryBranchDiffCalculationWork {
            grouping_id: GroupingId(format!("g{n}")),
            last_calculated_ts: now,
            calculation_lease_ends: now,
        }
    }

    #[test]
    fn put_then_get_primary_round_trips_through_memory_backend() {
        let mut pool = memory_pool("reqpool_put_then_get_primary");
        pool.put_primary(row(1)).unwrap();
        let fetched = pool.get_primary(&GroupingId("g1".into())).unwrap().unwrap();
        assert_eq!(fetched.grouping_id, GroupingId("g1".into()));
    }

    #[test]
    fn missing_row_returns_none_not_error() {
        let mut pool = memory_pool("reqpool_missing_row");
        let fetched = pool.get_primary(&GroupingId("missing".into())).unwrap();
        assert!(fetched.is_none());
    }

    #[ignore = "requires a live redis instance"]
    #[test]
    fn round_trips_through_real_redis() {
        let config = RedisPoolConfig {
            enable_redis_pool: true,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            redis_ttl: 3600,
        };
        let mut pool = Pool::open(config).unwrap();
        pool.put_primary(row(2)).unwrap();
        let fetched = pool.get_primary(&GroupingId("g2".into())).unwrap().unwrap();
        assert_eq!(fetched.grouping_id, GroupingId("g2".into()));
    }
}
