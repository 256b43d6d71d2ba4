//! Redis-backed atomic sliding-window rate limiter.
//!
//! Limits are regional: each region keeps independent counters, which
//! isolates regional failures at the cost of a cross-region bypass the
//! optional global check mitigates. Every script call is bounded by a hard
//! 50 ms timeout and passes through the rate-limit circuit breaker.

use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::redis::Script;
use jiff::Timestamp;
use mockall::automock;
use thiserror::Error;
use tracing::{info, warn};
use veritag::region::{RegionState, global_ip_key};

use crate::{
    ratelimit::breaker::RateLimitBreaker,
    redis::{RedisOpError, RedisPool, connection},
};

const SLIDING_WINDOW_SCRIPT: &str = include_str!("sliding_window.lua");

const WINDOW_MILLIS: i64 = 60_000;
const KEY_TTL_SECONDS: i64 = 120;
const SCRIPT_TIMEOUT: Duration = Duration::from_millis(50);

/// Rate limiter settings.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub ip_limit_per_minute: u32,
    pub key_limit_per_minute: u32,

    /// On limiter errors: `true` denies and surfaces the error, `false`
    /// admits with a warning.
    pub fail_closed: bool,

    /// Deployment region partitioning the keyspace.
    pub region: String,

    /// Evaluate the cross-region counter after a regional allow.
    pub enable_global_check: bool,
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("rate limit circuit breaker is open")]
    CircuitOpen,

    #[error("rate limit script timed out")]
    Timeout,

    #[error("rate limit backend error")]
    Backend(#[source] RedisOpError),
}

#[automock]
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Check the per-IP regional window. `Ok(false)` means deny.
    async fn check_ip(&self, ip: &str, request_id: &str) -> Result<bool, RateLimitError>;

    /// Check the per-API-key regional window.
    async fn check_api_key(&self, api_key: &str, request_id: &str)
    -> Result<bool, RateLimitError>;
}

pub struct RedisRateLimiter {
    pool: RedisPool,
    script: Script,
    region: RegionState,
    ip_limit_per_minute: u32,
    key_limit_per_minute: u32,
    fail_closed: bool,
    enable_global_check: bool,
    breaker: RateLimitBreaker,
}

impl RedisRateLimiter {
    #[must_use]
    pub fn new(pool: RedisPool, config: &RateLimitConfig) -> Self {
        Self::with_region_state(pool, config, RegionState::with_defaults(&config.region))
    }

    /// Construct with explicit region state; used when the cold window must
    /// differ from the defaults.
    #[must_use]
    pub fn with_region_state(
        pool: RedisPool,
        config: &RateLimitConfig,
        region: RegionState,
    ) -> Self {
        Self {
            pool,
            script: Script::new(SLIDING_WINDOW_SCRIPT),
            region,
            ip_limit_per_minute: config.ip_limit_per_minute,
            key_limit_per_minute: config.key_limit_per_minute,
            fail_closed: config.fail_closed,
            enable_global_check: config.enable_global_check,
            breaker: RateLimitBreaker::new(),
        }
    }

    #[must_use]
    pub fn breaker(&self) -> &RateLimitBreaker {
        &self.breaker
    }

    /// Preload the window script so the fast path can run by hash. The
    /// limiter still falls back to inline evaluation when the store reports
    /// the script missing.
    pub async fn preload_script(&self) {
        let load = async {
            let mut conn = connection(&self.pool).await?;

            bb8_redis::redis::cmd("SCRIPT")
                .arg("LOAD")
                .arg(SLIDING_WINDOW_SCRIPT)
                .query_async::<String>(&mut *conn)
                .await
                .map_err(RedisOpError::Command)
        };

        match tokio::time::timeout(Duration::from_secs(5), load).await {
            Ok(Ok(sha)) => info!(
                sha,
                region = self.region.region(),
                "rate limit script preloaded - regional limiting enabled"
            ),
            Ok(Err(source)) => warn!("failed to preload rate limit script: {source}"),
            Err(_elapsed) => warn!("rate limit script preload timed out"),
        }
    }

    /// One scripted window evaluation with the hard per-call deadline.
    async fn check_window(
        &self,
        key: &str,
        limit: u32,
        request_id: &str,
    ) -> Result<bool, RateLimitError> {
        let now = Timestamp::now().as_millisecond();
        let window_start = now - WINDOW_MILLIS;

        let invocation = async {
            let mut conn = connection(&self.pool).await.map_err(RateLimitError::Backend)?;

            let admitted: i64 = self
                .script
                .key(key)
                .arg(now)
                .arg(window_start)
                .arg(limit)
                .arg(format!("{now}:{request_id}"))
                .arg(KEY_TTL_SECONDS)
                .invoke_async(&mut *conn)
                .await
                .map_err(|source| RateLimitError::Backend(RedisOpError::Command(source)))?;

            Ok::<_, RateLimitError>(admitted == 1)
        };

        match tokio::time::timeout(SCRIPT_TIMEOUT, invocation).await {
            Ok(result) => result,
            Err(_elapsed) => Err(RateLimitError::Timeout),
        }
    }

    /// Breaker-guarded check with the fail-open/fail-closed policy applied.
    async fn check(
        &self,
        key: &str,
        limit: u32,
        request_id: &str,
    ) -> Result<bool, RateLimitError> {
        let outcome = self
            .breaker
            .call(|| self.check_window(key, limit, request_id))
            .await;

        match outcome {
            Err(_open) => {
                if self.fail_closed {
                    return Err(RateLimitError::CircuitOpen);
                }

                warn!(request_id, "rate limit circuit open - failing open");
                Ok(true)
            }
            Ok(Ok(allowed)) => {
                if !allowed {
                    warn!(request_id, key, limit, "rate limit exceeded");
                }

                Ok(allowed)
            }
            Ok(Err(source)) => {
                if self.fail_closed {
                    return Err(source);
                }

                warn!(request_id, "rate limit failed open - allowing request: {source}");
                Ok(true)
            }
        }
    }

    /// Cross-region check at twice the regional base limit. Never denies on
    /// its own errors.
    async fn check_global(&self, ip: &str, request_id: &str) -> bool {
        let key = global_ip_key(ip);
        let limit = self.ip_limit_per_minute * 2;

        match self.check_window(&key, limit, request_id).await {
            Ok(allowed) => {
                if !allowed {
                    warn!(
                        request_id,
                        ip, limit, "global rate limit exceeded - possible distributed abuse"
                    );
                }

                allowed
            }
            Err(source) => {
                warn!(request_id, "global rate limit check failed: {source}");
                true
            }
        }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check_ip(&self, ip: &str, request_id: &str) -> Result<bool, RateLimitError> {
        let key = self.region.ip_key(ip);
        let limit = self.region.effective_limit(self.ip_limit_per_minute);

        let allowed = self.check(&key, limit, request_id).await?;

        if allowed && self.enable_global_check && !self.check_global(ip, request_id).await {
            return Ok(false);
        }

        Ok(allowed)
    }

    async fn check_api_key(
        &self,
        api_key: &str,
        request_id: &str,
    ) -> Result<bool, RateLimitError> {
        let key = self.region.api_key_key(api_key);
        let limit = self.region.effective_limit(self.key_limit_per_minute);

        self.check(&key, limit, request_id).await
    }
}
