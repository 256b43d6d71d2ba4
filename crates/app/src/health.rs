//! Readiness probing for the cache and durable store.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;

use crate::{
    redis::{self, RedisOpError, RedisPool},
    scans::store::{ScanStore, StoreError},
};

const READINESS_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("cache unreachable")]
    Cache(#[source] RedisOpError),

    #[error("cache readiness check timed out")]
    CacheTimeout,

    #[error("durable store unreachable")]
    Store(#[source] StoreError),

    #[error("durable store readiness check timed out")]
    StoreTimeout,
}

impl ReadinessError {
    /// Component name for the readiness response body.
    #[must_use]
    pub fn component(&self) -> &'static str {
        match self {
            Self::Cache(_) | Self::CacheTimeout => "cache",
            Self::Store(_) | Self::StoreTimeout => "store",
        }
    }
}

#[automock]
#[async_trait]
pub trait HealthService: Send + Sync {
    /// Check that the cache and, when configured, the durable store answer
    /// within the readiness bound.
    async fn ready(&self) -> Result<(), ReadinessError>;
}

pub struct InfraHealth {
    pool: RedisPool,
    store: Option<Arc<dyn ScanStore>>,
}

impl InfraHealth {
    #[must_use]
    pub fn new(pool: RedisPool, store: Option<Arc<dyn ScanStore>>) -> Self {
        Self { pool, store }
    }
}

#[async_trait]
impl HealthService for InfraHealth {
    async fn ready(&self) -> Result<(), ReadinessError> {
        match tokio::time::timeout(READINESS_TIMEOUT, redis::ping(&self.pool)).await {
            Ok(Ok(())) => {}
            Ok(Err(source)) => return Err(ReadinessError::Cache(source)),
            Err(_elapsed) => return Err(ReadinessError::CacheTimeout),
        }

        if let Some(store) = &self.store {
            match tokio::time::timeout(READINESS_TIMEOUT, store.ping()).await {
                Ok(Ok(())) => {}
                Ok(Err(source)) => return Err(ReadinessError::Store(source)),
                Err(_elapsed) => return Err(ReadinessError::StoreTimeout),
            }
        }

        Ok(())
    }
}
