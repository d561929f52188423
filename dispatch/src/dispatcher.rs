//! The main polling loop (§4.5). Per-work-item processing is sequential
//! within one dispatcher instance (§5) — horizontal scaling is by running
//! more dispatcher replicas and relying on the leasing protocol, not by
//! running items concurrently within one.

use crate::calculator::{DiffCalculator, Params};
use chrono::{Duration, Utc};
use rand::Rng;
use sched_ballot::{Ballot, Queue};
use sched_lib::error::SchedResult;
use sched_lib::model::GroupingId;
use sched_tasks::work::WorkStore;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const GROUPING_CACHE_SIZE: usize = 100_000;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Primary-branch staleness admission threshold (§4.5, §5): 1 min.
    pub primary_staleness_threshold: Duration,
    /// Diff-calculation work timeout (§4.5, §5): 10 min, applied both as
    /// the lease duration and the calculator call's deadline.
    pub lease_timeout: Duration,
    /// Dispatcher empty-queue backoff (§4.5, §5): 10 s.
    pub poll_backoff: Duration,
    /// Secondary-branch high-contention mode (§4.5): stale, non-atomic
    /// select followed by a separate lease call.
    pub high_contention_secondary: bool,
    /// The high-contention mode's stale-read age. Not justified in the
    /// source; treated as tunable (§9 Open Questions).
    pub stale_read_age: Duration,
    pub high_contention_candidates: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            primary_staleness_threshold: Duration::minutes(1),
            lease_timeout: Duration::minutes(10),
            poll_backoff: Duration::seconds(10),
            high_contention_secondary: false,
            stale_read_age: Duration::milliseconds(100),
            high_contention_candidates: 50,
        }
    }
}

pub struct Dispatcher {
    work: Arc<WorkStore>,
    ballot: Ballot,
    config: DispatcherConfig,
    grouping_cache: parking_lot::Mutex<lru::LruCache<GroupingId, Params>>,
    busy: AtomicBool,
}

impl Dispatcher {
    pub fn new(work: Arc<WorkStore>, ballot: Ballot, config: DispatcherConfig) -> Self {
        Self {
            work,
            ballot,
            config,
            grouping_cache: parking_lot::Mutex::new(lru::LruCache::new(
                NonZeroUsize::new(GROUPING_CACHE_SIZE).unwrap(),
            )),
            busy: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Relaxed)
    }

    async fn expand_grouping(
        &self,
        calculator: &Arc<dyn DiffCalculator>,
        id: &GroupingId,
    ) -> SchedResult<Params> {
        if let Some(params) = self.grouping_cache.lock().get(id).cloned() {
            return Ok(params);
        }
        let params = calculator
            .expand_grouping(id)
            .await
            .map_err(|e| sched_lib::error::SchedError::Transient(anyhow::anyhow!(e.to_string())))?;
        self.grouping_cache.lock().put(id.clone(), params.clone());
        Ok(params)
    }

    /// Runs one primary-branch work call. Returns `true` when the queue
    /// was empty (`shouldSleep=true` in §4.5).
    async fn do_primary(&self, calculator: &Arc<dyn DiffCalculator>) -> bool {
        let now = Utc::now();
        let leased = self
            .work
            .select_and_lease_primary(now, self.config.primary_staleness_threshold, self.config.lease_timeout)
            .await;

        let grouping_id = match leased {
            Ok(Some(id)) => id,
            Ok(None) => return true,
            Err(e) => {
                warn!(error = %e, "primary select-and-lease failed");
                return true;
            }
        };

        sched_metrics::inc_tasks_leased("primary");
        self.run_calculation(calculator, &grouping_id, &[]).await;
        if let Err(e) = self.work.mark_calculated_primary(&grouping_id, Utc::now()).await {
            warn!(error = %e, grouping = ?grouping_id, "failed to record primary completion");
        }
        false
    }

    /// Runs one secondary-branch work call, dispatching to low- or
    /// high-contention mode per config (§4.5).
    async fn do_secondary(&self, calculator: &Arc<dyn DiffCalculator>) -> bool {
        let now = Utc::now();
        let key = if self.config.high_contention_secondary {
            let stale_read_at = now - self.config.stale_read_age;
            let candidates = self
                .work
                .list_secondary_candidates_stale(stale_read_at, self.config.high_contention_candidates)
                .await;
            if candidates.is_empty() {
                return true;
            }
            let pick = candidates[rand::thread_rng().gen_range(0..candidates.len())].clone();
            match self.work.lease_secondary(&pick, now, self.config.lease_timeout).await {
                Ok(true) => Some(pick),
                // Another worker already leased it first; not an error.
                Ok(false) => None,
                Err(e) => {
                    warn!(error = %e, "secondary lease (high-contention) failed");
                    None
                }
            }
        } else {
            match self
                .work
                .select_and_lease_secondary_low_contention(now, self.config.lease_timeout)
                .await
            {
                Ok(key) => key,
                Err(e) => {
                    warn!(error = %e, "secondary select-and-lease failed");
                    None
                }
            }
        };

        let Some((branch, grouping_id)) = key else {
            return true;
        };

        sched_metrics::inc_tasks_leased("secondary");
        self.run_calculation(calculator, &grouping_id, &[]).await;
        if let Err(e) = self
            .work
            .mark_calculated_secondary(&(branch, grouping_id), Utc::now())
            .await
        {
            warn!(error = %e, "failed to record secondary completion");
        }
        false
    }

    async fn run_calculation(
        &self,
        calculator: &Arc<dyn DiffCalculator>,
        grouping_id: &GroupingId,
        additional_digests: &[String],
    ) {
        let started = std::time::Instant::now();
        let params = match self.expand_grouping(calculator, grouping_id).await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, grouping = ?grouping_id, "failed to expand grouping");
                return;
            }
        };

        // Each work call wraps its own deadline (§4.5 Cancellation): on
        // timeout, the context is dropped and the lease simply expires —
        // it will be re-picked on the next iteration.
        let deadline = self.config.lease_timeout.to_std().unwrap_or(std::time::Duration::from_secs(600));
        let outcome = tokio::time::timeout(
            deadline,
            calculator.calculate_diffs(&params, additional_digests),
        )
        .await;

        let label = match outcome {
            Ok(Ok(())) => "success",
            Ok(Err(_)) => "failure",
            Err(_) => "timeout",
        };
        sched_metrics::observe_task_lease_duration("dispatch", label, started.elapsed());
    }

    /// Runs the polling loop until `cancel` fires (§5 Cancellation: the
    /// dispatcher aborts mid-work and does not clear leases — they expire
    /// naturally, preventing double-execution).
    pub async fn run(self: Arc<Self>, calculator: Arc<dyn DiffCalculator>, cancel: CancellationToken) {
        let mut primary_sleep_until = Utc::now();
        let mut secondary_sleep_until = Utc::now();

        loop {
            if cancel.is_cancelled() {
                info!("dispatcher canceled, exiting poll loop");
                return;
            }

            let now = Utc::now();
            let primary_ready = now >= primary_sleep_until;
            let secondary_ready = now >= secondary_sleep_until;

            self.busy.store(primary_ready || secondary_ready, Ordering::Relaxed);
            sched_metrics::set_dispatcher_busy_workers(if self.is_busy() { 1.0 } else { 0.0 });

            let should_sleep_primary;
            let should_sleep_secondary;

            if primary_ready && secondary_ready {
                match self.ballot.draw() {
                    Queue::Secondary => {
                        should_sleep_secondary = self.do_secondary(&calculator).await;
                        should_sleep_primary = false;
                    }
                    Queue::Primary => {
                        should_sleep_primary = self.do_primary(&calculator).await;
                        should_sleep_secondary = false;
                    }
                }
            } else if secondary_ready {
                should_sleep_secondary = self.do_secondary(&calculator).await;
                should_sleep_primary = false;
            } else if primary_ready {
                should_sleep_primary = self.do_primary(&calculator).await;
                should_sleep_secondary = false;
            } else {
                self.busy.store(false, Ordering::Relaxed);
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_backoff.to_std().unwrap()) => {}
                    _ = cancel.cancelled() => return,
                }
                continue;
            }

            let now = Utc::now();
            if should_sleep_primary {
                primary_sleep_until = now + self.config.poll_backoff;
            }
            if should_sleep_secondary {
                secondary_sleep_until = now + self.config.poll_backoff;
            }
            debug!(primary_ready, secondary_ready, "dispatcher tick complete");
        }
    }
}
