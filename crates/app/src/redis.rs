//! Redis connection pool management.

use std::time::Duration;

use bb8_redis::{
    RedisConnectionManager,
    bb8::{Pool, PooledConnection, RunError},
    redis::RedisError,
};
use thiserror::Error;

pub type RedisPool = Pool<RedisConnectionManager>;
pub type RedisConnection<'a> = PooledConnection<'a, RedisConnectionManager>;

/// Connection pool settings for the key-value store.
#[derive(Debug, Clone)]
pub struct RedisPoolConfig {
    /// Connection URL, e.g. `redis://localhost:6379/0`.
    pub url: String,

    /// Maximum pooled connections. Should be at least the expected request
    /// concurrency.
    pub pool_size: u32,

    /// Idle connections kept warm.
    pub min_idle: u32,

    /// Maximum connection lifetime before recycling.
    pub max_conn_age: Duration,

    /// Maximum wait for a connection from the pool. Exceeding this is the
    /// overload signal.
    pub pool_timeout: Duration,

    /// Idle connections are closed after this long unused.
    pub idle_timeout: Duration,

    /// Cadence of the idle/stale connection sweep.
    pub idle_check_frequency: Duration,
}

impl RedisPoolConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool_size: 100,
            min_idle: 10,
            max_conn_age: Duration::from_secs(5 * 60),
            pool_timeout: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(30),
            idle_check_frequency: Duration::from_secs(60),
        }
    }
}

/// Error from a pooled Redis operation.
#[derive(Debug, Error)]
pub enum RedisOpError {
    #[error("redis pool unavailable")]
    Pool(#[source] RunError<RedisError>),

    #[error("redis command failed")]
    Command(#[from] RedisError),
}

/// Build the shared connection pool.
///
/// # Errors
///
/// Returns an error if the connection manager rejects the URL or the pool
/// cannot be constructed.
pub async fn connect(config: &RedisPoolConfig) -> Result<RedisPool, RedisError> {
    let manager = RedisConnectionManager::new(config.url.as_str())?;

    Pool::builder()
        .max_size(config.pool_size)
        .min_idle(Some(config.min_idle))
        .max_lifetime(Some(config.max_conn_age))
        .idle_timeout(Some(config.idle_timeout))
        .connection_timeout(config.pool_timeout)
        .reaper_rate(config.idle_check_frequency)
        .build(manager)
        .await
}

/// Check out a connection, classifying pool failures.
///
/// # Errors
///
/// Returns [`RedisOpError::Pool`] when no connection can be served.
pub async fn connection(pool: &RedisPool) -> Result<RedisConnection<'_>, RedisOpError> {
    pool.get().await.map_err(RedisOpError::Pool)
}

/// Round-trip a PING.
///
/// # Errors
///
/// Returns an error when the store is unreachable.
pub async fn ping(pool: &RedisPool) -> Result<(), RedisOpError> {
    let mut conn = connection(pool).await?;

    bb8_redis::redis::cmd("PING")
        .query_async::<()>(&mut *conn)
        .await
        .map_err(RedisOpError::Command)
}
