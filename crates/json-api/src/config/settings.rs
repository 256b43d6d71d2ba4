//! Mapping from parsed configuration to application settings.

use std::time::Duration;

use tracing::warn;

use veritag_app::{
    context::{AntifraudSettings, AppSettings, EventBusSettings},
    database::DatabasePoolConfig,
    ratelimit::RateLimitConfig,
    redis::RedisPoolConfig,
};

use super::ServerConfig;

/// TTL for cached scan results.
const SCAN_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

impl ServerConfig {
    /// Build application-layer settings from the parsed configuration.
    #[must_use]
    pub fn app_settings(&self) -> AppSettings {
        if self.antifraud.token_secret.is_empty() {
            warn!("ANTIFRAUD_TOKEN_SECRET not set - verification tokens use an empty secret");
        }

        let redis = RedisPoolConfig {
            pool_size: self.redis.pool_size,
            min_idle: self.redis.min_idle_conns,
            max_conn_age: Duration::from_secs(self.redis.max_conn_age_min * 60),
            pool_timeout: Duration::from_secs(self.redis.pool_timeout_sec),
            idle_timeout: Duration::from_secs(self.redis.idle_timeout_sec),
            idle_check_frequency: Duration::from_secs(self.redis.idle_check_freq_sec),
            ..RedisPoolConfig::new(self.redis.url())
        };

        let database = self
            .database
            .database_url
            .as_ref()
            .map(|url| DatabasePoolConfig {
                max_conns: self.database.max_conns,
                min_conns: self.database.min_conns,
                ..DatabasePoolConfig::new(url.clone())
            });

        let antifraud = AntifraudSettings {
            enabled: self.antifraud.enabled,
            max_scans_per_hour: self.antifraud.max_scans_per_hour,
            block_threshold: self.antifraud.block_threshold,
            token_secret: self.antifraud.token_secret.clone(),
            token_ttl: (self.antifraud.token_ttl_seconds > 0)
                .then(|| Duration::from_secs(self.antifraud.token_ttl_seconds)),
        };

        let rate_limit = RateLimitConfig {
            ip_limit_per_minute: self.rate_limit.ip_per_minute,
            key_limit_per_minute: self.rate_limit.key_per_minute,
            fail_closed: self.rate_limit.fail_closed,
            region: self.rate_limit.region(),
            enable_global_check: self.rate_limit.global_check,
        };

        let events = self.events.project_id.as_ref().map(|project_id| {
            EventBusSettings {
                endpoint: self.events.endpoint.clone(),
                project_id: project_id.clone(),
                topic_id: self.events.topic_id.clone(),
                auth_token: self.events.auth_token.clone(),
            }
        });

        AppSettings {
            redis,
            redis_op_timeout: Duration::from_millis(self.redis.timeout_ms),
            database,
            antifraud,
            rate_limit,
            events,
            cache_ttl: SCAN_CACHE_TTL,
        }
    }
}
