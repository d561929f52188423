use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
/// The configuration for the optional Redis-backed secondary work store.
pub struct RedisPoolConfig {
    /// The URL of the Redis database, e.g. "redis://localhost:6379"
    pub redis_url: String,
    /// The TTL, in seconds, applied to every row this store writes.
    pub redis_ttl: u64,

    /// Whether to use the Redis backend, otherwise an in-process memory backend.
    pub enable_redis_pool: bool,
}
