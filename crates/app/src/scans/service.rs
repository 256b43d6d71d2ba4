//! Scan orchestration.
//!
//! Composes the antifraud gate, the cache behind its breaker, the durable
//! store behind its own breaker, and the event publisher. The durable store
//! is the source of truth; cache writes and event publishes are best effort.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use jiff::Timestamp;
use mockall::automock;
use tracing::{error, warn};
use veritag::{
    breaker::{Breaker, BreakerError},
    ids::TagUuid,
    risk::RiskLevel,
};

use crate::{
    antifraud::AntifraudGate,
    cache::{CacheError, ScanCache},
    events::ScanEventPublisher,
    scans::{errors::ScansServiceError, models::ScanResult, store::ScanStore},
};

#[automock]
#[async_trait]
pub trait ScansService: Send + Sync {
    /// Resolve a tag scan. `Ok(None)` means the request was declined:
    /// antifraud block, unknown tag, or a degraded dependency that cannot
    /// be resolved right now. The HTTP boundary maps `None` to the
    /// backpressure status.
    async fn scan(
        &self,
        tag_id: TagUuid,
        client_ip: &str,
    ) -> Result<Option<ScanResult>, ScansServiceError>;
}

/// Where the scan was resolved from.
enum Resolution {
    CacheHit(ScanResult),
    CacheMiss,
}

pub struct ScanService {
    cache: Arc<dyn ScanCache>,
    store: Option<Arc<dyn ScanStore>>,
    antifraud: Arc<dyn AntifraudGate>,
    publisher: Arc<dyn ScanEventPublisher>,
    cache_breaker: Arc<Breaker>,
    store_breaker: Arc<Breaker>,
    cache_ttl: Duration,
}

impl ScanService {
    #[must_use]
    pub fn new(
        cache: Arc<dyn ScanCache>,
        store: Option<Arc<dyn ScanStore>>,
        antifraud: Arc<dyn AntifraudGate>,
        publisher: Arc<dyn ScanEventPublisher>,
        cache_breaker: Arc<Breaker>,
        store_breaker: Arc<Breaker>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            cache,
            store,
            antifraud,
            publisher,
            cache_breaker,
            store_breaker,
            cache_ttl,
        }
    }

    async fn resolve_from_cache(&self, tag_id: TagUuid) -> Result<Resolution, ScansServiceError> {
        let lookup = self
            .cache_breaker
            .execute_async(|| self.cache.get(tag_id))
            .await;

        let resolution = match lookup {
            Ok(Some(bytes)) => match serde_json::from_slice::<ScanResult>(&bytes) {
                Ok(result) => Resolution::CacheHit(result),
                Err(source) => {
                    warn!(%tag_id, "cached scan payload undecodable, falling back: {source}");
                    Resolution::CacheMiss
                }
            },
            Ok(None) => Resolution::CacheMiss,
            Err(BreakerError::Open) => {
                warn!(%tag_id, "cache circuit open - falling back to durable store");
                Resolution::CacheMiss
            }
            Err(BreakerError::Inner(CacheError::Overloaded)) => {
                return Err(ScansServiceError::Overloaded);
            }
            Err(BreakerError::Inner(source)) => {
                warn!(%tag_id, "cache get failed, falling back to durable store: {source}");
                Resolution::CacheMiss
            }
        };

        Ok(resolution)
    }

    async fn resolve_from_store(
        &self,
        tag_id: TagUuid,
    ) -> Result<Option<ScanResult>, ScansServiceError> {
        let Some(store) = &self.store else {
            error!(%tag_id, "durable store unavailable - cache miss cannot be resolved");
            return Ok(None);
        };

        let fetched = self
            .store_breaker
            .execute_async(|| store.get_by_tag_id(tag_id))
            .await;

        match fetched {
            Ok(Some(result)) => Ok(Some(self.finish_scan(tag_id, result).await)),
            Ok(None) => {
                warn!(%tag_id, "tag not found in durable store");
                Ok(None)
            }
            Err(BreakerError::Open) => {
                warn!(%tag_id, "durable store circuit open");
                Ok(None)
            }
            Err(BreakerError::Inner(source)) => Err(ScansServiceError::Store(source)),
        }
    }

    /// Apply the first-scan/increment update, re-cache, and publish. The
    /// returned count is the post-increment value.
    async fn finish_scan(&self, tag_id: TagUuid, mut result: ScanResult) -> ScanResult {
        let now = Timestamp::now();

        if result.first_scan_at.is_none() {
            result.first_scan_at = Some(now);

            if let Some(store) = &self.store
                && let Err(source) = store
                    .update_first_scan_and_count(tag_id, now, result.scan_count + 1)
                    .await
            {
                warn!(%tag_id, "failed to record first scan: {source}");
            }
        } else if let Some(store) = &self.store
            && let Err(source) = store.increment_scan_count(tag_id).await
        {
            warn!(%tag_id, "failed to increment scan count: {source}");
        }

        result.scan_count += 1;

        match serde_json::to_vec(&result) {
            Ok(bytes) => {
                if let Err(source) = self.cache.set(tag_id, bytes, self.cache_ttl).await {
                    warn!(%tag_id, "failed to re-cache scan result: {source}");
                }
            }
            Err(source) => warn!(%tag_id, "failed to serialize scan result for cache: {source}"),
        }

        let event = serde_json::json!({
            "tag_id": result.tag_id,
            "scan_count": result.scan_count,
            "first_scan_at": result.first_scan_at,
        });

        if let Err(source) = self
            .publisher
            .publish_scan_event(tag_id, event.to_string().into_bytes())
            .await
        {
            warn!(%tag_id, "failed to publish scan event: {source}");
        }

        result
    }
}

#[async_trait]
impl ScansService for ScanService {
    async fn scan(
        &self,
        tag_id: TagUuid,
        client_ip: &str,
    ) -> Result<Option<ScanResult>, ScansServiceError> {
        let risk = self.antifraud.evaluate(tag_id, client_ip).await;

        if risk == RiskLevel::High {
            warn!(%tag_id, ip = client_ip, "antifraud blocked scan");
            return Ok(None);
        }

        match self.resolve_from_cache(tag_id).await? {
            Resolution::CacheHit(result) => Ok(Some(self.finish_scan(tag_id, result).await)),
            Resolution::CacheMiss => self.resolve_from_store(tag_id).await,
        }
    }
}
