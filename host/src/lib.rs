//! Process wiring for the RPC Service (§4.6) and Modified-Data Tracker
//! (§4.7): CLI/config surface, auth, state, and the axum router.

pub mod auth;
pub mod config;
pub mod error;
pub mod execution_backend;
pub mod logging;
pub mod modified_tracker;
pub mod repo_graph;
pub mod retry;
pub mod server;
pub mod state;
pub mod syncer;
pub mod trigger_dedup;

pub use config::Cli;
pub use error::{HostError, HostResult};
pub use state::AppState;
