//! Tracing bootstrap (§2 ambient stack: "every component uses `tracing`
//! with `tracing-subscriber` (`EnvFilter` + `fmt` layer)"), directly
//! grounded on the teacher's `host/src/bin/main.rs::subscribe_log`.

use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs a stdout `fmt` layer filtered by `log_level`/`RUST_LOG`, plus
/// an optional rolling JSON file layer when `log_path` is set.
pub fn subscribe_log(
    log_path: Option<&Path>,
    max_log: usize,
    log_level: &str,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let stdout_layer = fmt::layer().with_target(true);

    match log_path {
        Some(path) => {
            let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
                .rotation(tracing_appender::rolling::Rotation::DAILY)
                .max_log_files(max_log)
                .filename_prefix("sched-host")
                .build(path)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = fmt::layer().json().with_writer(non_blocking);

            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .with(file_layer)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stdout_layer).init();
            Ok(None)
        }
    }
}
