//! The `sched-host` binary: wires config, the store, the repo graph, the
//! config syncer, the job-creation pipeline, the skip-rule refresh loop,
//! the modified-data tracker sweeper, the periodic nightly/weekly trigger
//! ticker, the Work Dispatcher, and the RPC server into one process.
//! Grounded on the teacher's `host/src/bin/main.rs` (`dotenv`, `parse_opts`,
//! `subscribe_log`, actor/pool wiring, `serve(...)`).

use clap::Parser;
use sched_ballot::Ballot;
use sched_dispatch::{Dispatcher, DispatcherConfig, NullCalculator};
use sched_host::auth::ApiKeyStore;
use sched_host::repo_graph::JsonRepoGraph;
use sched_host::server;
use sched_host::state::AppState;
use sched_host::syncer::JsonSyncer;
use sched_host::Cli;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How often the nightly/weekly periodic triggers are (re-)checked; each
/// call is itself debounced internally against `NIGHTLY_DEBOUNCE`/
/// `WEEKLY_DEBOUNCE` (§4.4), so polling faster than that window is
/// harmless, just wasted work.
const PERIODIC_TRIGGER_POLL: std::time::Duration = std::time::Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let mut opts = Cli::parse();
    if opts.config_path.exists() {
        opts.merge_from_file()?;
    }

    let _guard = sched_host::logging::subscribe_log(opts.log_path.as_deref(), opts.max_log, &opts.log_level)?;
    debug!(?opts, "starting sched-host");

    let graph = Arc::new(JsonRepoGraph::load(&opts.repo_graph_path)?);
    let syncer = JsonSyncer::new(opts.tasks_root.clone());
    let auth = Arc::new(ApiKeyStore::new(&opts.api_keys));
    let cancel = CancellationToken::new();

    cfg_if::cfg_if! {
        if #[cfg(feature = "sqlite")] {
            let store: Arc<sched_tasks::sqlite::SqliteStore> = match &opts.sqlite_path {
                Some(path) => Arc::new(sched_tasks::sqlite::SqliteStore::open(path)?),
                None => Arc::new(sched_tasks::sqlite::SqliteStore::open_in_memory()?),
            };
        } else {
            let store: Arc<sched_tasks::mem::MemStore> = Arc::new(sched_tasks::mem::MemStore::new());
        }
    }

    let state = AppState::new(store, graph.clone(), syncer, opts.window_days, opts.min_commits, auth.clone());

    state.skip_rules.refresh().await?;
    let _skip_refresh_handle = state.skip_rules.clone().spawn_refresh_loop();
    let _tracker_sweep_handle = state.tracker.clone().spawn_sweeper();

    if let Err(e) = state.window.update(graph.as_ref(), chrono::Utc::now()) {
        warn!(error = %e, "initial time-window update failed");
    }

    let repos = graph.repos();
    let (job_update_senders, mut job_creator_handles) = state.job_creator.clone().spawn_pipeline(repos.clone(), cancel.clone());
    for repo in &repos {
        // Prime each repo's consumer once at startup instead of waiting for
        // the first `PERIODIC_SYNC_INTERVAL` tick.
        if let Some(tx) = job_update_senders.get(repo) {
            let _ = tx.try_send(());
        }
    }

    let periodic_creator = state.job_creator.clone();
    let periodic_cancel = cancel.clone();
    job_creator_handles.push(tokio::spawn(async move {
        let mut interval = tokio::time::interval(PERIODIC_TRIGGER_POLL);
        loop {
            tokio::select! {
                _ = periodic_cancel.cancelled() => break,
                _ = interval.tick() => {
                    for trigger in ["nightly", "weekly"] {
                        match periodic_creator.maybe_trigger_periodic_jobs(trigger).await {
                            Ok(jobs) if !jobs.is_empty() => info!(trigger, count = jobs.len(), "periodic jobs created"),
                            Ok(_) => {}
                            Err(e) => warn!(trigger, error = %e, "periodic trigger failed"),
                        }
                    }
                }
            }
        }
    }));

    let work_store = Arc::new(sched_tasks::work::WorkStore::new());
    let ballot = Ballot::default();
    let dispatcher = Arc::new(Dispatcher::new(work_store, ballot, DispatcherConfig::default()));
    let dispatcher_cancel = cancel.clone();
    let dispatcher_handle = tokio::spawn(async move {
        dispatcher.run(Arc::new(NullCalculator), dispatcher_cancel).await;
    });

    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        info!("shutdown signal received");
        shutdown_cancel.cancel();
    });

    server::serve(&opts.address, opts.concurrency_limit, auth, state, cancel.clone()).await?;

    cancel.cancel();
    for handle in job_creator_handles {
        handle.abort();
    }
    dispatcher_handle.abort();

    Ok(())
}
