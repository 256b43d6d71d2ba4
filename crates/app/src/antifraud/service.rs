//! Token verification pipeline.
//!
//! Verify the signed token, fingerprint the device, score the request
//! against product history, and append the outcome to the verification
//! ledger.

use std::collections::BTreeMap;

use async_trait::async_trait;
use jiff::Timestamp;
use mockall::automock;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info, warn};
use veritag::{
    fingerprint::{FingerprintGenerator, UNKNOWN_COUNTRY},
    ids::{EventUuid, ProductUuid},
    risk::{RiskLevel, VerificationContext},
    token::{TokenError, TokenSigner},
};

use crate::antifraud::{LedgerError, LedgerService, RiskService};

/// Request attributes collected by the HTTP layer for fingerprinting.
#[derive(Debug, Clone, Default)]
pub struct RequestAttributes {
    pub user_agent: String,
    pub accept_language: String,
    pub accept_encoding: String,
    pub screen_resolution: String,
    pub timezone: String,

    /// Country resolved upstream (e.g. by the edge proxy), when known.
    pub country: Option<String>,
}

/// Outcome of a token verification.
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub valid: bool,
    pub product_id: Option<ProductUuid>,
    pub risk_score: u32,
    pub risk_level: RiskLevel,
    pub risk_factors: BTreeMap<String, u32>,
    pub verification_id: Option<EventUuid>,
    pub timestamp: Timestamp,
    pub message: String,
    pub metadata: Map<String, Value>,

    /// Set when the token failed specifically because it expired; the
    /// boundary may use a distinct status for this case.
    pub expired: bool,
}

/// Token failures share one user-visible message so callers cannot probe
/// whether a token failed on format or signature.
const INVALID_TOKEN_MESSAGE: &str = "Invalid or expired verification token";

#[derive(Debug, Error)]
pub enum VerificationsServiceError {
    #[error("ledger error")]
    Ledger(#[from] LedgerError),
}

#[automock]
#[async_trait]
pub trait VerificationsService: Send + Sync {
    /// Run the full verification pipeline for a presented token.
    async fn verify(
        &self,
        token: &str,
        client_ip: &str,
        attributes: RequestAttributes,
    ) -> Result<VerificationOutcome, VerificationsServiceError>;

    /// Verify the ledger hash chain for a product.
    async fn chain_integrity(
        &self,
        product_id: ProductUuid,
    ) -> Result<bool, VerificationsServiceError>;
}

pub struct VerificationService {
    signer: TokenSigner,
    fingerprints: FingerprintGenerator,
    risk: RiskService,
    ledger: LedgerService,
}

impl VerificationService {
    #[must_use]
    pub fn new(
        signer: TokenSigner,
        fingerprints: FingerprintGenerator,
        risk: RiskService,
        ledger: LedgerService,
    ) -> Self {
        Self {
            signer,
            fingerprints,
            risk,
            ledger,
        }
    }

    /// Mint a complete QR verification URL for a product.
    ///
    /// # Errors
    ///
    /// Propagates token generation failures.
    pub fn verification_url(
        &self,
        base_url: &str,
        product_id: ProductUuid,
    ) -> Result<String, TokenError> {
        self.signer.verification_url(base_url, product_id)
    }

    fn rejected(expired: bool) -> VerificationOutcome {
        VerificationOutcome {
            valid: false,
            product_id: None,
            risk_score: 0,
            risk_level: RiskLevel::High,
            risk_factors: BTreeMap::new(),
            verification_id: None,
            timestamp: Timestamp::now(),
            message: INVALID_TOKEN_MESSAGE.to_owned(),
            metadata: Map::new(),
            expired,
        }
    }
}

fn outcome_message(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Low => "Product verified successfully",
        RiskLevel::Medium => "Verification completed with warnings",
        RiskLevel::High => "High risk detected - verification flagged for review",
    }
}

#[async_trait]
impl VerificationsService for VerificationService {
    async fn verify(
        &self,
        token: &str,
        client_ip: &str,
        attributes: RequestAttributes,
    ) -> Result<VerificationOutcome, VerificationsServiceError> {
        let token = match self.signer.verify(token) {
            Ok(token) => token,
            Err(source) => {
                warn!(ip = client_ip, "token verification failed: {source}");
                return Ok(Self::rejected(source == TokenError::Expired));
            }
        };

        let fingerprint = self.fingerprints.generate(
            client_ip,
            &attributes.user_agent,
            &attributes.accept_language,
            &attributes.accept_encoding,
            &attributes.screen_resolution,
            &attributes.timezone,
        );

        let country = attributes
            .country
            .filter(|country| !country.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_COUNTRY.to_owned());

        let product_id = token.product_id;

        let mut ctx = VerificationContext {
            product_id,
            token,
            fingerprint,
            client_ip: client_ip.to_owned(),
            country: country.clone(),
            timestamp: Timestamp::now(),
            recent_scans: 0,
            total_scans: 0,
            unique_countries: 0,
            unique_fingerprints: 0,
            rapid_scans: 0,
        };

        let risk = self.risk.evaluate(&mut ctx).await;

        let (verification_id, timestamp) = match self
            .ledger
            .record_verification(product_id, &risk, &ctx.fingerprint, &country)
            .await
        {
            Ok(event) => (Some(event.id), event.timestamp),
            Err(source) => {
                error!(%product_id, "failed to record verification event: {source}");
                (None, Timestamp::now())
            }
        };

        info!(
            %product_id,
            risk_score = risk.score,
            risk_level = risk.level.as_str(),
            ip = client_ip,
            "verification completed"
        );

        Ok(VerificationOutcome {
            valid: true,
            product_id: Some(product_id),
            risk_score: risk.score,
            risk_level: risk.level,
            risk_factors: risk.factors,
            verification_id,
            timestamp,
            message: outcome_message(risk.level).to_owned(),
            metadata: risk.metadata,
            expired: false,
        })
    }

    async fn chain_integrity(
        &self,
        product_id: ProductUuid,
    ) -> Result<bool, VerificationsServiceError> {
        Ok(self.ledger.verify_chain_integrity(product_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use veritag::{risk::RiskModel, token::TokenSecret};

    use crate::test::redis::shared_pool;

    use super::*;

    async fn service() -> VerificationService {
        let pool = shared_pool().await;

        VerificationService::new(
            TokenSigner::new(TokenSecret::new("verification-test-secret"), Some(Duration::from_secs(3600))),
            FingerprintGenerator::new(),
            RiskService::new(pool.clone(), RiskModel::default()),
            LedgerService::new(pool),
        )
    }

    fn signer() -> TokenSigner {
        TokenSigner::new(
            TokenSecret::new("verification-test-secret"),
            Some(Duration::from_secs(3600)),
        )
    }

    #[tokio::test]
    async fn valid_token_verifies_and_records_event() {
        let service = service().await;
        let product = ProductUuid::new();

        let token = signer().generate(product).expect("token generates");

        let outcome = service
            .verify(&token, "8.8.8.8", RequestAttributes::default())
            .await
            .expect("verification runs");

        assert!(outcome.valid);
        assert_eq!(outcome.product_id, Some(product));
        assert!(outcome.verification_id.is_some());

        assert!(
            service
                .chain_integrity(product)
                .await
                .expect("chain verifies")
        );
    }

    #[tokio::test]
    async fn forged_token_is_rejected_with_shared_message() {
        let service = service().await;

        let forged = TokenSigner::new(TokenSecret::new("wrong-secret"), None)
            .generate(ProductUuid::new())
            .expect("token generates");

        let outcome = service
            .verify(&forged, "8.8.8.8", RequestAttributes::default())
            .await
            .expect("verification runs");

        assert!(!outcome.valid);
        assert!(!outcome.expired);
        assert_eq!(outcome.message, INVALID_TOKEN_MESSAGE);

        // Structurally invalid input produces the identical message.
        let garbage = service
            .verify("@@garbage@@", "8.8.8.8", RequestAttributes::default())
            .await
            .expect("verification runs");

        assert_eq!(garbage.message, outcome.message);
    }

    #[tokio::test]
    async fn suspicious_client_accumulates_risk_factors() {
        let service = service().await;
        let product = ProductUuid::new();

        let token = signer().generate(product).expect("token generates");

        let attributes = RequestAttributes {
            user_agent: "curl/8.4.0".to_owned(),
            ..RequestAttributes::default()
        };

        // Tor/VPN-classified source plus automation user agent.
        let outcome = service
            .verify(&token, "10.0.0.9", attributes)
            .await
            .expect("verification runs");

        assert!(outcome.valid);
        assert!(outcome.risk_factors.contains_key("suspicious_user_agent"));
        assert!(outcome.risk_factors.contains_key("tor_vpn_detected"));
        assert!(outcome.risk_level >= RiskLevel::Medium);
    }

    #[tokio::test]
    async fn verification_url_round_trips_through_verify() {
        let service = service().await;
        let product = ProductUuid::new();

        let url = service
            .verification_url("https://v.example.com", product)
            .expect("url mints");

        let token = url
            .strip_prefix("https://v.example.com/r/")
            .expect("url carries token");

        let outcome = service
            .verify(token, "8.8.8.8", RequestAttributes::default())
            .await
            .expect("verification runs");

        assert_eq!(outcome.product_id, Some(product));
    }
}
