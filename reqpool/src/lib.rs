//! Optional Redis-backed secondary store for the diff-calculation work
//! tables (§3, §4.5), sitting in front of `sched_tasks::work::WorkStore`.
//! Grounded on the teacher's `reqpool` crate: the `Backend` enum, the
//! LRU-backed `MemoryBackend` test double, and the `backoff`-wrapped
//! connection retry are kept nearly verbatim; the request/pool types they
//! wrap are generalized from proof requests to work-table rows.

mod backend;
mod config;
mod macros;
mod memory_backend;
mod pool;

pub use backend::Backend;
pub use config::RedisPoolConfig;
pub use memory_backend::{memory_pool, MemoryBackend};
pub use pool::Pool;
