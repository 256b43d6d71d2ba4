//! Verification ledger persistence.
//!
//! Events append to a per-product list, are indexed by event id for direct
//! lookup, and the last-hash pointer is updated only after the append so a
//! crash in between leaves a fork that chain verification reports.

use bb8_redis::redis::AsyncCommands;
use jiff::Timestamp;
use thiserror::Error;
use tracing::{info, warn};
use veritag::{
    fingerprint::DeviceFingerprint,
    ids::{EventUuid, ProductUuid},
    ledger::{GENESIS_HASH, VerificationEvent, event_hash, hash_data, verify_chain},
    risk::RiskScore,
};

use crate::redis::{RedisOpError, RedisPool, connection};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger store error")]
    Redis(#[from] RedisOpError),

    #[error("event serialization failed")]
    Serialize(#[source] serde_json::Error),

    #[error("verification event not found")]
    NotFound,
}

#[derive(Debug, Clone)]
pub struct LedgerService {
    pool: RedisPool,
}

impl LedgerService {
    #[must_use]
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    /// Append an immutable verification record for `product_id`.
    ///
    /// # Errors
    ///
    /// Returns an error when the event cannot be serialized or the append
    /// itself fails. Secondary writes (event index, last-hash pointer) are
    /// best effort.
    pub async fn record_verification(
        &self,
        product_id: ProductUuid,
        risk: &RiskScore,
        fingerprint: &DeviceFingerprint,
        country: &str,
    ) -> Result<VerificationEvent, LedgerError> {
        let mut conn = connection(&self.pool).await?;

        let previous_hash: String = conn
            .get::<_, Option<String>>(last_hash_key(product_id))
            .await
            .map_err(RedisOpError::Command)?
            .unwrap_or_else(|| GENESIS_HASH.to_owned());

        let mut event = VerificationEvent {
            id: EventUuid::new(),
            product_id,
            timestamp: Timestamp::now(),
            risk_score: risk.score,
            risk_level: risk.level,
            ip_hash: hash_data(&fingerprint.ip),
            fingerprint_hash: fingerprint.hash.clone(),
            country: country.to_owned(),
            user_agent: fingerprint.user_agent.clone(),
            previous_hash,
            current_hash: String::new(),
            metadata: risk.metadata.clone(),
        };

        event.current_hash = event_hash(&event);

        let serialized = serde_json::to_vec(&event).map_err(LedgerError::Serialize)?;

        conn.rpush::<_, _, ()>(product_key(product_id), &serialized)
            .await
            .map_err(RedisOpError::Command)?;

        if let Err(source) = conn
            .set::<_, _, ()>(event_key(event.id), &serialized)
            .await
        {
            warn!(event_id = %event.id, "failed to index event by id: {source}");
        }

        // The pointer moves only after the append; see module docs.
        if let Err(source) = conn
            .set::<_, _, ()>(last_hash_key(product_id), &event.current_hash)
            .await
        {
            warn!(%product_id, "failed to update last hash pointer: {source}");
        }

        info!(
            event_id = %event.id,
            %product_id,
            hash = &event.current_hash[..16],
            risk_score = event.risk_score,
            "verification event recorded"
        );

        Ok(event)
    }

    /// Read the last `limit` events in append order; `0` reads the full
    /// chain. Undecodable entries are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error when the list cannot be read.
    pub async fn history(
        &self,
        product_id: ProductUuid,
        limit: usize,
    ) -> Result<Vec<VerificationEvent>, LedgerError> {
        let mut conn = connection(&self.pool).await?;

        let start = if limit == 0 {
            0
        } else {
            -(i64::try_from(limit).unwrap_or(i64::MAX))
        };

        let entries: Vec<Vec<u8>> = conn
            .lrange(product_key(product_id), start as isize, -1)
            .await
            .map_err(RedisOpError::Command)?;

        let mut events = Vec::with_capacity(entries.len());

        for entry in &entries {
            match serde_json::from_slice::<VerificationEvent>(entry) {
                Ok(event) => events.push(event),
                Err(source) => warn!(%product_id, "skipping undecodable ledger entry: {source}"),
            }
        }

        Ok(events)
    }

    /// Verify the full chain for a product: stored hashes must match
    /// recomputation and every link must point at its predecessor.
    ///
    /// # Errors
    ///
    /// Returns an error when the chain cannot be read.
    pub async fn verify_chain_integrity(
        &self,
        product_id: ProductUuid,
    ) -> Result<bool, LedgerError> {
        let events = self.history(product_id, 0).await?;

        Ok(verify_chain(&events))
    }

    /// Direct lookup by event id.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] when the event does not exist.
    pub async fn event_by_id(&self, event_id: EventUuid) -> Result<VerificationEvent, LedgerError> {
        let mut conn = connection(&self.pool).await?;

        let entry: Option<Vec<u8>> = conn
            .get(event_key(event_id))
            .await
            .map_err(RedisOpError::Command)?;

        let entry = entry.ok_or(LedgerError::NotFound)?;

        serde_json::from_slice(&entry).map_err(LedgerError::Serialize)
    }
}

fn product_key(product_id: ProductUuid) -> String {
    format!("ledger:product:{product_id}")
}

fn event_key(event_id: EventUuid) -> String {
    format!("ledger:event:{event_id}")
}

fn last_hash_key(product_id: ProductUuid) -> String {
    format!("ledger:lasthash:{product_id}")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use veritag::{fingerprint::FingerprintGenerator, risk::RiskLevel};

    use crate::test::redis::shared_pool;

    use super::*;

    fn risk_score() -> RiskScore {
        RiskScore {
            score: 25,
            level: RiskLevel::Low,
            factors: BTreeMap::new(),
            metadata: serde_json::Map::new(),
        }
    }

    fn fingerprint() -> DeviceFingerprint {
        FingerprintGenerator::new().generate("8.8.8.8", "Mozilla/5.0", "en", "gzip", "", "UTC")
    }

    #[tokio::test]
    async fn first_event_links_to_genesis() {
        let ledger = LedgerService::new(shared_pool().await);
        let product = ProductUuid::new();

        let event = ledger
            .record_verification(product, &risk_score(), &fingerprint(), "BR")
            .await
            .expect("event records");

        assert_eq!(event.previous_hash, GENESIS_HASH);
        assert_eq!(event.current_hash, event_hash(&event));
    }

    #[tokio::test]
    async fn chain_of_three_verifies() {
        let ledger = LedgerService::new(shared_pool().await);
        let product = ProductUuid::new();

        for _ in 0..3 {
            ledger
                .record_verification(product, &risk_score(), &fingerprint(), "BR")
                .await
                .expect("event records");
        }

        let events = ledger.history(product, 0).await.expect("history reads");

        assert_eq!(events.len(), 3);
        assert_eq!(events[1].previous_hash, events[0].current_hash);
        assert_eq!(events[2].previous_hash, events[1].current_hash);

        assert!(
            ledger
                .verify_chain_integrity(product)
                .await
                .expect("chain reads")
        );
    }

    #[tokio::test]
    async fn tampered_middle_event_fails_integrity() {
        let ledger = LedgerService::new(shared_pool().await);
        let pool = shared_pool().await;
        let product = ProductUuid::new();

        for _ in 0..3 {
            ledger
                .record_verification(product, &risk_score(), &fingerprint(), "BR")
                .await
                .expect("event records");
        }

        // Overwrite the middle event in place with mutated bytes.
        let mut events = ledger.history(product, 0).await.expect("history reads");
        events[1].country = "XX".to_owned();
        let forged = serde_json::to_vec(&events[1]).expect("event serializes");

        let mut conn = pool.get().await.expect("connection checks out");
        bb8_redis::redis::cmd("LSET")
            .arg(product_key(product))
            .arg(1)
            .arg(forged)
            .query_async::<()>(&mut *conn)
            .await
            .expect("lset succeeds");

        assert!(
            !ledger
                .verify_chain_integrity(product)
                .await
                .expect("chain reads")
        );
    }

    #[tokio::test]
    async fn events_are_indexed_by_id() {
        let ledger = LedgerService::new(shared_pool().await);
        let product = ProductUuid::new();

        let recorded = ledger
            .record_verification(product, &risk_score(), &fingerprint(), "BR")
            .await
            .expect("event records");

        let fetched = ledger
            .event_by_id(recorded.id)
            .await
            .expect("event fetches");

        assert_eq!(fetched, recorded);
    }

    #[tokio::test]
    async fn missing_event_is_not_found() {
        let ledger = LedgerService::new(shared_pool().await);

        let result = ledger.event_by_id(EventUuid::new()).await;

        assert!(matches!(result, Err(LedgerError::NotFound)));
    }

    #[tokio::test]
    async fn history_limit_returns_tail() {
        let ledger = LedgerService::new(shared_pool().await);
        let product = ProductUuid::new();

        let mut recorded = Vec::new();

        for _ in 0..4 {
            recorded.push(
                ledger
                    .record_verification(product, &risk_score(), &fingerprint(), "BR")
                    .await
                    .expect("event records"),
            );
        }

        let tail = ledger.history(product, 2).await.expect("history reads");

        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].id, recorded[2].id);
        assert_eq!(tail[1].id, recorded[3].id);
    }
}
