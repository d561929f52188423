//! The scheduling brain: Time Window (§4.1), Skip-Rule Store (§4.2),
//! Task-Config Cache (§4.3), and Job Creator (§4.4, including the
//! nightly/weekly periodic triggers). The Work Dispatcher (§4.5) and RPC
//! Service (§4.6/§4.7) live in `sched-dispatch` and `sched-host`
//! respectively, which depend on this crate's types.

pub mod job_creator;
pub mod skip_rules;
pub mod task_cfg_cache;
pub mod window;

pub use job_creator::JobCreator;
pub use skip_rules::{SkipRuleBackend, SkipRuleStore};
pub use task_cfg_cache::{CachedResult, Config, SyncError, Syncer, TaskConfigCache};
pub use window::{Window, WindowError};
