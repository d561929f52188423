//! Persistence layer implementing the §6.1 Store interface for Jobs,
//! Tasks, Skip-Rules, and the two diff-calculation work tables.

pub mod mem;
pub mod work;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use sched_lib::error::{SchedError, SchedResult};
pub use sched_lib::model::*;
pub use sched_lib::store::{Entity, Store, MAX_CHUNK};
pub use sched_lib::Id;

/// Amount by which `GetFromDateRange` widens a Task query to account for
/// the Id-vs-Created skew tolerance (§6.1).
pub const TASK_DATE_RANGE_SKEW: chrono::Duration = sched_lib::id::TASK_ID_SKEW;
