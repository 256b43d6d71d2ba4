//! Risk evaluation backed by historical counters.
//!
//! Populates the per-product history a [`veritag::risk::RiskModel`] scores
//! against: recent-minute scans, lifetime scans, distinct countries and
//! fingerprints, and the 30-second rapid-scan window. History errors degrade
//! gracefully — the context keeps zeroed counters and scoring proceeds.

use bb8_redis::redis::AsyncCommands;
use tracing::warn;
use veritag::risk::{RiskModel, RiskScore, VerificationContext};

use crate::redis::{RedisOpError, RedisPool, connection};

const RECENT_WINDOW_SECONDS: i64 = 60;
const RAPID_WINDOW_SECONDS: i64 = 30;

#[derive(Debug, Clone)]
pub struct RiskService {
    pool: RedisPool,
    model: RiskModel,
}

impl RiskService {
    #[must_use]
    pub fn new(pool: RedisPool, model: RiskModel) -> Self {
        Self { pool, model }
    }

    /// Populate history and score. Never fails: history errors are logged
    /// and scoring runs over whatever was gathered.
    pub async fn evaluate(&self, ctx: &mut VerificationContext) -> RiskScore {
        if let Err(source) = self.populate_history(ctx).await {
            warn!(
                product_id = %ctx.product_id,
                "failed to populate risk history, scoring with zeroed counters: {source}"
            );
        }

        self.model.score(ctx)
    }

    async fn populate_history(&self, ctx: &mut VerificationContext) -> Result<(), RedisOpError> {
        let mut conn = connection(&self.pool).await?;
        let product_key = format!("antifraud:product:{}", ctx.product_id);

        // Recent-minute scans: observed before this request is counted in.
        let recent_key = format!("{product_key}:recent");
        ctx.recent_scans = conn
            .get::<_, Option<u64>>(&recent_key)
            .await?
            .unwrap_or(0);
        conn.incr::<_, _, ()>(&recent_key, 1).await?;
        conn.expire::<_, ()>(&recent_key, RECENT_WINDOW_SECONDS).await?;

        // Lifetime scans, no TTL.
        let total_key = format!("{product_key}:total");
        ctx.total_scans = conn.get::<_, Option<u64>>(&total_key).await?.unwrap_or(0);
        conn.incr::<_, _, ()>(&total_key, 1).await?;

        // Distinct countries.
        let countries_key = format!("{product_key}:countries");
        conn.sadd::<_, _, ()>(&countries_key, &ctx.country).await?;
        ctx.unique_countries = conn.scard(&countries_key).await?;

        // Distinct device fingerprints.
        let fingerprints_key = format!("{product_key}:fingerprints");
        conn.sadd::<_, _, ()>(&fingerprints_key, &ctx.fingerprint.hash)
            .await?;
        ctx.unique_fingerprints = conn.scard(&fingerprints_key).await?;

        // Rapid-scan detector: the count includes this request.
        let rapid_key = format!("antifraud:rapid:{}", ctx.product_id);
        ctx.rapid_scans = conn.incr(&rapid_key, 1).await?;

        if ctx.rapid_scans == 1 {
            conn.expire::<_, ()>(&rapid_key, RAPID_WINDOW_SECONDS).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;
    use uuid::Uuid;
    use veritag::{
        fingerprint::FingerprintGenerator,
        ids::ProductUuid,
        risk::RiskLevel,
        token::VerificationToken,
    };

    use crate::test::redis::shared_pool;

    use super::*;

    fn context(product_id: ProductUuid, ip: &str, country: &str) -> VerificationContext {
        let fingerprints = FingerprintGenerator::new();

        VerificationContext {
            product_id,
            token: VerificationToken {
                product_id,
                timestamp: Timestamp::now().as_second(),
                nonce: Uuid::new_v4().to_string(),
                expires_at: None,
            },
            fingerprint: fingerprints.generate(ip, "Mozilla/5.0", "en", "gzip", "", "UTC"),
            client_ip: ip.to_owned(),
            country: country.to_owned(),
            timestamp: Timestamp::now(),
            recent_scans: 0,
            total_scans: 0,
            unique_countries: 0,
            unique_fingerprints: 0,
            rapid_scans: 0,
        }
    }

    #[tokio::test]
    async fn first_evaluation_sees_empty_history() {
        let service = RiskService::new(shared_pool().await, RiskModel::default());
        let product = ProductUuid::new();

        let mut ctx = context(product, "8.8.8.8", "BR");
        let score = service.evaluate(&mut ctx).await;

        assert_eq!(ctx.recent_scans, 0);
        assert_eq!(ctx.total_scans, 0);
        assert_eq!(ctx.unique_countries, 1);
        assert_eq!(ctx.rapid_scans, 1);
        assert_eq!(score.level, RiskLevel::Low);
    }

    #[tokio::test]
    async fn counters_accumulate_across_evaluations() {
        let service = RiskService::new(shared_pool().await, RiskModel::default());
        let product = ProductUuid::new();

        for _ in 0..3 {
            let mut ctx = context(product, "8.8.8.8", "BR");
            service.evaluate(&mut ctx).await;
        }

        let mut ctx = context(product, "8.8.8.8", "BR");
        service.evaluate(&mut ctx).await;

        assert_eq!(ctx.recent_scans, 3);
        assert_eq!(ctx.total_scans, 3);
        assert_eq!(ctx.rapid_scans, 4);
    }

    #[tokio::test]
    async fn distinct_countries_raise_country_factors() {
        let service = RiskService::new(shared_pool().await, RiskModel::default());
        let product = ProductUuid::new();

        for country in ["BR", "US", "DE", "JP", "FR"] {
            let mut ctx = context(product, "8.8.8.8", country);
            service.evaluate(&mut ctx).await;
        }

        let mut ctx = context(product, "8.8.8.8", "GB");
        let score = service.evaluate(&mut ctx).await;

        assert!(ctx.unique_countries >= 5);
        assert!(score.factors.contains_key("country_mismatch"));
        assert!(score.factors.contains_key("multiple_countries"));
    }

    #[tokio::test]
    async fn unreachable_store_scores_with_zeroed_counters() {
        let config = crate::redis::RedisPoolConfig {
            pool_timeout: std::time::Duration::from_millis(100),
            ..crate::redis::RedisPoolConfig::new("redis://127.0.0.1:1")
        };
        let pool = crate::redis::connect(&config).await.expect("pool builds lazily");

        let service = RiskService::new(pool, RiskModel::default());
        let mut ctx = context(ProductUuid::new(), "8.8.8.8", "BR");

        let score = service.evaluate(&mut ctx).await;

        assert_eq!(score.level, RiskLevel::Low);
        assert_eq!(ctx.rapid_scans, 0);
    }
}
