//! Key-Value Store Config

use clap::Args;

/// Key-value store connection and pool settings.
#[derive(Debug, Args)]
pub struct RedisConfig {
    /// Store address as host:port
    #[arg(long, env = "REDIS_ADDR", default_value = "localhost:6379")]
    pub addr: String,

    /// Store password
    #[arg(long, env = "REDIS_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    /// Logical database index
    #[arg(long, env = "REDIS_DB", default_value_t = 0_u32)]
    pub db: u32,

    /// Per-operation read/write timeout in milliseconds
    #[arg(long, env = "REDIS_TIMEOUT_MS", default_value_t = 100_u64)]
    pub timeout_ms: u64,

    /// Maximum pooled connections; keep at or above expected concurrency
    #[arg(long, env = "REDIS_POOL_SIZE", default_value_t = 100_u32)]
    pub pool_size: u32,

    /// Idle connections kept warm
    #[arg(long, env = "REDIS_MIN_IDLE_CONNS", default_value_t = 10_u32)]
    pub min_idle_conns: u32,

    /// Maximum connection age in minutes
    #[arg(long, env = "REDIS_MAX_CONN_AGE_MIN", default_value_t = 5_u64)]
    pub max_conn_age_min: u64,

    /// Pool acquire timeout in seconds; exceeding it signals overload
    #[arg(long, env = "REDIS_POOL_TIMEOUT_SEC", default_value_t = 1_u64)]
    pub pool_timeout_sec: u64,

    /// Idle connection timeout in seconds
    #[arg(long, env = "REDIS_IDLE_TIMEOUT_SEC", default_value_t = 30_u64)]
    pub idle_timeout_sec: u64,

    /// Idle sweep cadence in seconds
    #[arg(long, env = "REDIS_IDLE_CHECK_FREQ_SEC", default_value_t = 60_u64)]
    pub idle_check_freq_sec: u64,
}

impl RedisConfig {
    /// Connection URL for the pool.
    #[must_use]
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}/{}", self.addr, self.db)
        } else {
            format!("redis://:{}@{}/{}", self.password, self.addr, self.db)
        }
    }
}
