//! Antifraud counter engine.
//!
//! First line of defense on every scan: an hourly global counter and a
//! per-IP counter, both atomic server-side increments with a TTL set on
//! first write. This tier never blocks on infrastructure failure — counter
//! errors degrade to Medium.

use async_trait::async_trait;
use bb8_redis::redis::AsyncCommands;
use jiff::{Timestamp, tz::TimeZone};
use mockall::automock;
use tracing::warn;
use veritag::{ids::TagUuid, risk::RiskLevel};

use crate::redis::{RedisConnection, RedisPool};

const COUNTER_TTL_SECONDS: i64 = 3600;

/// Per-request antifraud admission decision.
#[automock]
#[async_trait]
pub trait AntifraudGate: Send + Sync {
    /// Evaluate a scan. High means block; Medium means the counters were
    /// unavailable and the request proceeds under caution.
    async fn evaluate(&self, tag_id: TagUuid, client_ip: &str) -> RiskLevel;
}

#[derive(Debug, Clone)]
pub struct CounterEngine {
    pool: RedisPool,
    enabled: bool,
    max_hourly: i64,
    block_threshold: i64,
}

impl CounterEngine {
    #[must_use]
    pub fn new(pool: RedisPool, enabled: bool, max_hourly: i64, block_threshold: i64) -> Self {
        Self {
            pool,
            enabled,
            max_hourly,
            block_threshold,
        }
    }

    async fn bump(&self, conn: &mut RedisConnection<'_>, key: &str) -> Option<i64> {
        let count: i64 = match conn.incr(key, 1).await {
            Ok(count) => count,
            Err(source) => {
                warn!(key, "antifraud incr failed: {source}");
                return None;
            }
        };

        // TTL set on first write; two racing writers both set the same
        // one-hour value, which is acceptable.
        match conn.ttl::<_, i64>(key).await {
            Ok(ttl) if ttl < 0 => {
                if let Err(source) = conn.expire::<_, ()>(key, COUNTER_TTL_SECONDS).await {
                    warn!(key, "antifraud expire failed: {source}");
                }
            }
            Ok(_) => {}
            Err(source) => warn!(key, "antifraud ttl check failed: {source}"),
        }

        Some(count)
    }
}

fn hour_key(now: Timestamp) -> String {
    let utc = now.to_zoned(TimeZone::UTC);

    format!("antifraud:hour:{}", utc.strftime("%Y%m%d%H"))
}

#[async_trait]
impl AntifraudGate for CounterEngine {
    async fn evaluate(&self, tag_id: TagUuid, client_ip: &str) -> RiskLevel {
        if !self.enabled {
            return RiskLevel::Low;
        }

        let mut conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(source) => {
                warn!(%tag_id, "antifraud store unavailable: {source}");
                return RiskLevel::Medium;
            }
        };

        let hour_key = hour_key(Timestamp::now());

        let Some(global_count) = self.bump(&mut conn, &hour_key).await else {
            return RiskLevel::Medium;
        };

        if global_count > self.max_hourly {
            warn!(count = global_count, "antifraud hourly limit exceeded");
            return RiskLevel::High;
        }

        let ip_key = format!("antifraud:ip:{client_ip}");

        let Some(ip_count) = self.bump(&mut conn, &ip_key).await else {
            return RiskLevel::Medium;
        };

        if ip_count > self.block_threshold {
            warn!(%tag_id, ip = client_ip, count = ip_count, "antifraud ip threshold exceeded");
            return RiskLevel::High;
        }

        RiskLevel::Low
    }
}
