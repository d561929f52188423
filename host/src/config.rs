//! The CLI / configuration surface (§6.3), generalizing the teacher's
//! `host/src/lib.rs` `Cli` struct: `clap::Parser` for the command line,
//! `serde` for the config-file overlay, `merge_from_file` to combine them.

use crate::error::HostResult;
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

fn default_address() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_concurrency_limit() -> usize {
    16
}
fn default_max_log() -> usize {
    7
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_config_path() -> PathBuf {
    PathBuf::from("host/config/config.json")
}
fn default_window_days() -> i64 {
    14
}
fn default_min_commits() -> u32 {
    100
}
fn default_repo_graph_path() -> PathBuf {
    PathBuf::from("host/config/repo_graph.json")
}
fn default_tasks_root() -> PathBuf {
    PathBuf::from("host/config/tasks")
}
/// `TracingProportion` (§6.3): fraction of spans to export. Recognized for
/// config-surface parity with the source system; sampling at this
/// granularity is left to the `tracing-subscriber` filter rather than
/// wired into a custom sampler.
fn default_tracing_proportion() -> f64 {
    1.0
}

#[derive(Clone, Serialize, Deserialize, Debug, Parser)]
#[command(name = "sched-host", about = "The CI task scheduler host", long_about = None)]
#[serde(default)]
pub struct Cli {
    /// Server bind address [default: 0.0.0.0:8080]
    #[arg(long, require_equals = true, default_value = "0.0.0.0:8080")]
    #[serde(default = "default_address")]
    pub address: String,

    /// Limit the max number of in-flight RPC requests
    #[arg(long, require_equals = true, default_value = "16")]
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    #[arg(long, require_equals = true)]
    pub log_path: Option<PathBuf>,

    #[arg(long, require_equals = true, default_value = "7")]
    #[serde(default = "default_max_log")]
    pub max_log: usize,

    /// Set the log level
    #[arg(long, require_equals = true, env = "RUST_LOG", default_value = "info")]
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Path to a config file whose contents are merged under the CLI args
    #[arg(long, require_equals = true, default_value = "host/config/config.json")]
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,

    /// `WindowSize` (§4.1, §6.3), in days
    #[arg(long, require_equals = true, default_value = "14")]
    #[serde(default = "default_window_days")]
    pub window_days: i64,

    /// The Time Window's minimum-commit-count floor (§4.1)
    #[arg(long, require_equals = true, default_value = "100")]
    #[serde(default = "default_min_commits")]
    pub min_commits: u32,

    /// Path to the file-backed repo graph (see `sched_host::repo_graph`)
    #[arg(long, require_equals = true, default_value = "host/config/repo_graph.json")]
    #[serde(default = "default_repo_graph_path")]
    pub repo_graph_path: PathBuf,

    /// Root directory holding `<repo>/tasks.json` config files
    #[arg(long, require_equals = true, default_value = "host/config/tasks")]
    #[serde(default = "default_tasks_root")]
    pub tasks_root: PathBuf,

    #[cfg(feature = "sqlite")]
    #[arg(long, require_equals = true)]
    pub sqlite_path: Option<PathBuf>,

    /// JSON object of `name -> {key, tier, rate_limit?}`; empty disables
    /// authorization
    #[arg(long, require_equals = true, env = "SCHED_API_KEYS", default_value = "")]
    #[serde(default)]
    pub api_keys: String,

    #[arg(long, require_equals = true, default_value = "1.0")]
    #[serde(default = "default_tracing_proportion")]
    pub tracing_proportion: f64,
}

impl Default for Cli {
    fn default() -> Self {
        // `clap::Parser::parse_from` with no args would also produce this,
        // but constructing it directly avoids parsing argv in tests.
        Self {
            address: default_address(),
            concurrency_limit: default_concurrency_limit(),
            log_path: None,
            max_log: default_max_log(),
            log_level: default_log_level(),
            config_path: default_config_path(),
            window_days: default_window_days(),
            min_commits: default_min_commits(),
            repo_graph_path: default_repo_graph_path(),
            tasks_root: default_tasks_root(),
            #[cfg(feature = "sqlite")]
            sqlite_path: None,
            api_keys: String::new(),
            tracing_proportion: default_tracing_proportion(),
        }
    }
}

impl Cli {
    /// Reads `config_path`, overlays the already-parsed CLI values on top
    /// (CLI wins over file, file wins over struct defaults), exactly as
    /// the teacher's `Cli::merge_from_file` does.
    pub fn merge_from_file(&mut self) -> HostResult<()> {
        let file = std::fs::File::open(&self.config_path)?;
        let reader = std::io::BufReader::new(file);
        let mut config: Value = serde_json::from_reader(reader)?;
        let this = serde_json::to_value(&self)?;
        merge(&mut config, &this);

        *self = serde_json::from_value(config)?;
        Ok(())
    }
}

/// Merges two JSON values together, overwriting `a` with the non-null
/// values of `b`.
fn merge(a: &mut Value, b: &Value) {
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => {
            for (k, v) in b {
                merge(a.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
        (a, b) if !b.is_null() => *a = b.clone(),
        _ => {}
    }
}
