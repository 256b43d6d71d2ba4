//! Verification ledger events and their hash chain.
//!
//! Each event links to its predecessor through `previous_hash`; the head of
//! a chain links to the literal [`GENESIS_HASH`]. Persistence lives in the
//! application layer — this module owns the event shape, the canonical hash,
//! and chain verification.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::{
    hex,
    ids::{EventUuid, ProductUuid},
    risk::RiskLevel,
};

/// Previous-hash value carried by the first event of a product's chain.
pub const GENESIS_HASH: &str = "GENESIS";

/// One immutable verification record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationEvent {
    pub id: EventUuid,
    pub product_id: ProductUuid,
    pub timestamp: Timestamp,
    pub risk_score: u32,
    pub risk_level: RiskLevel,

    /// SHA-256 of the client IP; the raw address is never persisted.
    pub ip_hash: String,

    pub fingerprint_hash: String,
    pub country: String,
    pub user_agent: String,
    pub previous_hash: String,
    pub current_hash: String,
    pub metadata: Map<String, Value>,
}

/// SHA-256 of sensitive request data, lowercase hex.
#[must_use]
pub fn hash_data(data: &str) -> String {
    hex::encode(&Sha256::digest(data.as_bytes()))
}

/// Canonical event hash: SHA-256 over the `|`-joined tuple of id, product,
/// unix timestamp, previous hash, IP hash, fingerprint hash, country, and
/// risk level.
#[must_use]
pub fn event_hash(event: &VerificationEvent) -> String {
    let canonical = format!(
        "{}|{}|{}|{}|{}|{}|{}|{}",
        event.id,
        event.product_id,
        event.timestamp.as_second(),
        event.previous_hash,
        event.ip_hash,
        event.fingerprint_hash,
        event.country,
        event.risk_level.as_str(),
    );

    hex::encode(&Sha256::digest(canonical.as_bytes()))
}

/// Verify a product chain read in append order: every stored hash must match
/// recomputation and every link must point at its predecessor. Returns
/// `false` at the first discrepancy.
#[must_use]
pub fn verify_chain(events: &[VerificationEvent]) -> bool {
    for (index, event) in events.iter().enumerate() {
        if event_hash(event) != event.current_hash {
            return false;
        }

        if index > 0 && event.previous_hash != events[index - 1].current_hash {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(product_id: ProductUuid, previous_hash: &str) -> VerificationEvent {
        let mut event = VerificationEvent {
            id: EventUuid::new(),
            product_id,
            timestamp: Timestamp::now(),
            risk_score: 25,
            risk_level: RiskLevel::Low,
            ip_hash: hash_data("203.0.113.9"),
            fingerprint_hash: hash_data("fingerprint"),
            country: "BR".to_owned(),
            user_agent: "Mozilla/5.0".to_owned(),
            previous_hash: previous_hash.to_owned(),
            current_hash: String::new(),
            metadata: Map::new(),
        };

        event.current_hash = event_hash(&event);
        event
    }

    fn chain(length: usize) -> Vec<VerificationEvent> {
        let product_id = ProductUuid::new();
        let mut events: Vec<VerificationEvent> = Vec::with_capacity(length);

        for _ in 0..length {
            let previous = events
                .last()
                .map_or(GENESIS_HASH.to_owned(), |prior| prior.current_hash.clone());
            events.push(event(product_id, &previous));
        }

        events
    }

    #[test]
    fn empty_chain_verifies() {
        assert!(verify_chain(&[]));
    }

    #[test]
    fn intact_chain_verifies() {
        assert!(verify_chain(&chain(5)));
    }

    #[test]
    fn tampered_middle_event_fails_verification() {
        let mut events = chain(3);
        events[1].country = "XX".to_owned();

        assert!(!verify_chain(&events));
    }

    #[test]
    fn broken_link_fails_verification() {
        let mut events = chain(3);
        events[2].previous_hash = hash_data("forged");
        events[2].current_hash = event_hash(&events[2]);

        assert!(!verify_chain(&events));
    }

    #[test]
    fn hash_covers_risk_level() {
        let mut events = chain(1);
        events[0].risk_level = RiskLevel::High;

        assert!(!verify_chain(&events));
    }

    #[test]
    fn event_serialization_round_trips() {
        let events = chain(1);
        let json = serde_json::to_string(&events[0]).expect("event serializes");
        let decoded: VerificationEvent = serde_json::from_str(&json).expect("event deserializes");

        assert_eq!(decoded, events[0]);
        assert!(verify_chain(&[decoded]));
    }
}
