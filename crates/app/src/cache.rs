//! Scan result cache over pooled Redis.
//!
//! Pool starvation is converted into a distinguished [`CacheError::Overloaded`]
//! so the HTTP boundary can answer with the backpressure status instead of a
//! generic failure.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use bb8_redis::{
    bb8::RunError,
    redis::{AsyncCommands, RedisError},
};
use mockall::automock;
use thiserror::Error;
use tracing::{error, info, warn};
use veritag::ids::TagUuid;

use crate::redis::RedisPool;

/// Error text fragments that indicate pool exhaustion inside the client
/// rather than a store-side failure.
const POOL_EXHAUSTED_PATTERNS: &[&str] = &[
    "pool timeout",
    "connection pool exhausted",
    "no free connection",
    "all connections are busy",
];

#[derive(Debug, Error)]
pub enum CacheError {
    /// The connection pool could not serve the request in time.
    #[error("service overloaded: cache connection pool exhausted")]
    Overloaded,

    /// A command exceeded the per-operation read/write timeout.
    #[error("cache operation timed out")]
    Timeout,

    #[error("cache command failed")]
    Redis(#[source] RedisError),
}

#[automock]
#[async_trait]
pub trait ScanCache: Send + Sync {
    /// Fetch cached bytes for a tag. A missing key is `Ok(None)`.
    async fn get(&self, tag_id: TagUuid) -> Result<Option<Vec<u8>>, CacheError>;

    /// Cache serialized scan state under the tag with a TTL.
    async fn set(&self, tag_id: TagUuid, data: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;
}

/// Point-in-time pool statistics for observability.
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub timeouts: u64,
    pub total_conns: u32,
    pub idle_conns: u32,
}

#[derive(Debug)]
pub struct RedisScanCache {
    pool: RedisPool,
    op_timeout: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    timeouts: AtomicU64,
}

impl RedisScanCache {
    #[must_use]
    pub fn new(pool: RedisPool, op_timeout: Duration) -> Self {
        Self {
            pool,
            op_timeout,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = self.pool.state();

        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            total_conns: state.connections,
            idle_conns: state.idle_connections,
        }
    }

    pub fn log_stats(&self) {
        let stats = self.stats();

        info!(
            hits = stats.hits,
            misses = stats.misses,
            timeouts = stats.timeouts,
            total_conns = stats.total_conns,
            idle_conns = stats.idle_conns,
            "cache pool stats"
        );

        if stats.timeouts > 0 {
            warn!(
                timeouts = stats.timeouts,
                "cache pool timeouts detected - consider increasing REDIS_POOL_SIZE"
            );
        }
    }

    fn classify(&self, error: RunError<RedisError>) -> CacheError {
        match error {
            RunError::TimedOut => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                CacheError::Overloaded
            }
            RunError::User(error) if is_pool_exhausted(&error) => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                CacheError::Overloaded
            }
            RunError::User(error) => CacheError::Redis(error),
        }
    }
}

fn is_pool_exhausted(error: &RedisError) -> bool {
    let message = error.to_string();

    POOL_EXHAUSTED_PATTERNS
        .iter()
        .any(|pattern| message.contains(pattern))
}

fn scan_key(tag_id: TagUuid) -> String {
    format!("scan:{tag_id}")
}

#[async_trait]
impl ScanCache for RedisScanCache {
    async fn get(&self, tag_id: TagUuid) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(source) => {
                let classified = self.classify(source);

                if matches!(classified, CacheError::Overloaded) {
                    error!(%tag_id, "cache pool exhausted - signalling overload");
                }

                return Err(classified);
            }
        };

        let read = conn.get::<_, Option<Vec<u8>>>(scan_key(tag_id));

        let value = tokio::time::timeout(self.op_timeout, read)
            .await
            .map_err(|_elapsed| CacheError::Timeout)?
            .map_err(CacheError::Redis)?;

        match &value {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };

        Ok(value)
    }

    async fn set(&self, tag_id: TagUuid, data: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(source) => {
                let classified = self.classify(source);

                if matches!(classified, CacheError::Overloaded) {
                    error!(%tag_id, "cache pool exhausted - signalling overload");
                }

                return Err(classified);
            }
        };

        let write = conn.set_ex::<_, _, ()>(scan_key(tag_id), data, ttl.as_secs().max(1));

        tokio::time::timeout(self.op_timeout, write)
            .await
            .map_err(|_elapsed| CacheError::Timeout)?
            .map_err(CacheError::Redis)?;

        Ok(())
    }
}
