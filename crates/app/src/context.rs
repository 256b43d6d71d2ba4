//! App Context

use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tracing::warn;
use veritag::{
    breaker::Breaker,
    fingerprint::FingerprintGenerator,
    risk::RiskModel,
    token::{TokenSecret, TokenSigner},
};

use crate::{
    antifraud::{
        CounterEngine, LedgerService, RiskService, VerificationService, VerificationsService,
    },
    cache::RedisScanCache,
    database::{self, DatabasePoolConfig},
    events::{NoopPublisher, PubSubPublisher, PublishError, ScanEventPublisher},
    health::{HealthService, InfraHealth},
    ratelimit::{RateLimitConfig, RateLimiter, RedisRateLimiter},
    redis::{self, RedisOpError, RedisPoolConfig},
    scans::{PgScanStore, ScanService, ScanStore, ScansService},
};

/// Breaker parameters shared by the cache and durable-store guards.
const BREAKER_FAILURE_THRESHOLD: u32 = 5;
const BREAKER_HALF_OPEN_MAX: u32 = 2;
const BREAKER_RESET_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct AntifraudSettings {
    pub enabled: bool,
    pub max_scans_per_hour: i64,
    pub block_threshold: i64,
    pub token_secret: String,
    pub token_ttl: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct EventBusSettings {
    pub endpoint: String,
    pub project_id: String,
    pub topic_id: String,
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub redis: RedisPoolConfig,

    /// Per-operation read/write timeout for cache commands.
    pub redis_op_timeout: Duration,

    /// Absent means the service runs cache-only.
    pub database: Option<DatabasePoolConfig>,

    pub antifraud: AntifraudSettings,
    pub rate_limit: RateLimitConfig,

    /// Absent means scan events are dropped.
    pub events: Option<EventBusSettings>,

    pub cache_ttl: Duration,
}

#[derive(Debug, Error)]
pub enum AppInitError {
    #[error("failed to connect to redis")]
    Redis(#[source] RedisOpError),

    #[error("failed to connect to database")]
    Database(#[source] sqlx::Error),

    #[error("failed to build event publisher")]
    Events(#[source] PublishError),
}

#[derive(Clone)]
pub struct AppContext {
    pub scans: Arc<dyn ScansService>,
    pub verifications: Arc<dyn VerificationsService>,
    pub rate_limits: Arc<dyn RateLimiter>,
    pub health: Arc<dyn HealthService>,
}

impl AppContext {
    /// Wire every service from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the cache is unreachable, a configured database
    /// cannot be connected, or the event publisher cannot be built.
    pub async fn from_settings(settings: AppSettings) -> Result<Self, AppInitError> {
        let pool = redis::connect(&settings.redis)
            .await
            .map_err(|source| AppInitError::Redis(RedisOpError::Command(source)))?;

        redis::ping(&pool).await.map_err(AppInitError::Redis)?;

        let cache = Arc::new(RedisScanCache::new(pool.clone(), settings.redis_op_timeout));
        cache.log_stats();

        let store: Option<Arc<dyn ScanStore>> = match &settings.database {
            Some(config) => {
                let pg = database::connect(config)
                    .await
                    .map_err(AppInitError::Database)?;

                Some(Arc::new(PgScanStore::new(pg)))
            }
            None => {
                warn!("DATABASE_URL not set - durable store fallback disabled");
                None
            }
        };

        let publisher: Arc<dyn ScanEventPublisher> = match &settings.events {
            Some(events) => Arc::new(
                PubSubPublisher::new(
                    &events.endpoint,
                    &events.project_id,
                    &events.topic_id,
                    events.auth_token.clone(),
                )
                .map_err(AppInitError::Events)?,
            ),
            None => {
                warn!("event bus not configured - scan events will be dropped");
                Arc::new(NoopPublisher)
            }
        };

        let cache_breaker = Arc::new(Breaker::new(
            BREAKER_FAILURE_THRESHOLD,
            BREAKER_HALF_OPEN_MAX,
            BREAKER_RESET_TIMEOUT,
        ));
        let store_breaker = Arc::new(Breaker::new(
            BREAKER_FAILURE_THRESHOLD,
            BREAKER_HALF_OPEN_MAX,
            BREAKER_RESET_TIMEOUT,
        ));

        let gate = Arc::new(CounterEngine::new(
            pool.clone(),
            settings.antifraud.enabled,
            settings.antifraud.max_scans_per_hour,
            settings.antifraud.block_threshold,
        ));

        let scans = Arc::new(ScanService::new(
            cache,
            store.clone(),
            gate,
            publisher,
            cache_breaker,
            store_breaker,
            settings.cache_ttl,
        ));

        let signer = TokenSigner::new(
            TokenSecret::new(settings.antifraud.token_secret.clone()),
            settings.antifraud.token_ttl,
        );
        let fingerprints = FingerprintGenerator::new();

        let verifications = Arc::new(VerificationService::new(
            signer,
            fingerprints.clone(),
            RiskService::new(pool.clone(), RiskModel::new(fingerprints)),
            LedgerService::new(pool.clone()),
        ));

        let rate_limits = Arc::new(RedisRateLimiter::new(pool.clone(), &settings.rate_limit));
        rate_limits.preload_script().await;

        let health = Arc::new(InfraHealth::new(pool, store));

        Ok(Self {
            scans,
            verifications,
            rate_limits,
            health,
        })
    }
}
