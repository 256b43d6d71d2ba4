//! Weighted multi-factor risk scoring.
//!
//! Scoring is pure: the historical counters a verification depends on are
//! populated by the caller before [`RiskModel::score`] runs, so scoring
//! itself cannot fail.

use std::collections::BTreeMap;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    fingerprint::{DeviceFingerprint, FingerprintGenerator},
    ids::ProductUuid,
    token::VerificationToken,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Level mapping: ≥ 71 high, 41–70 medium, otherwise low.
    #[must_use]
    pub const fn from_score(score: u32) -> Self {
        match score {
            71.. => Self::High,
            41..=70 => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// Everything a risk evaluation sees about one verification.
#[derive(Debug, Clone)]
pub struct VerificationContext {
    pub product_id: ProductUuid,
    pub token: VerificationToken,
    pub fingerprint: DeviceFingerprint,
    pub client_ip: String,
    pub country: String,
    pub timestamp: Timestamp,

    /// Scans of this product in the last minute.
    pub recent_scans: u64,

    /// Lifetime scans of this product.
    pub total_scans: u64,

    /// Distinct countries this product has been scanned from.
    pub unique_countries: u64,

    /// Distinct device fingerprints seen for this product.
    pub unique_fingerprints: u64,

    /// Scans of this product inside the 30-second rapid window.
    pub rapid_scans: u64,
}

/// Risk assessment result.
#[derive(Debug, Clone, Serialize)]
pub struct RiskScore {
    pub score: u32,
    pub level: RiskLevel,

    /// Matched factor name → weight.
    pub factors: BTreeMap<String, u32>,

    pub metadata: Map<String, Value>,
}

struct RiskFactor {
    name: &'static str,
    weight: u32,
    check: fn(&RiskModel, &VerificationContext) -> bool,
}

const FACTORS: &[RiskFactor] = &[
    RiskFactor {
        name: "country_mismatch",
        weight: 20,
        check: |_, ctx| ctx.unique_countries > 3,
    },
    RiskFactor {
        name: "high_frequency",
        weight: 30,
        check: |_, ctx| ctx.recent_scans >= 5,
    },
    RiskFactor {
        name: "tor_vpn_detected",
        weight: 40,
        check: |model, ctx| model.fingerprints.is_tor_or_vpn(&ctx.fingerprint.ip),
    },
    RiskFactor {
        name: "suspicious_user_agent",
        weight: 25,
        check: |model, ctx| {
            model
                .fingerprints
                .is_suspicious_user_agent(&ctx.fingerprint.user_agent)
        },
    },
    RiskFactor {
        name: "unusual_repetition",
        weight: 15,
        check: |_, ctx| ctx.total_scans > 10,
    },
    RiskFactor {
        name: "multiple_countries",
        weight: 20,
        check: |_, ctx| ctx.unique_countries >= 5,
    },
    RiskFactor {
        name: "rapid_scans",
        weight: 35,
        check: |_, ctx| ctx.rapid_scans >= 3,
    },
];

/// Evaluates the weighted factor table over a [`VerificationContext`].
#[derive(Debug, Clone, Default)]
pub struct RiskModel {
    fingerprints: FingerprintGenerator,
}

impl RiskModel {
    #[must_use]
    pub fn new(fingerprints: FingerprintGenerator) -> Self {
        Self { fingerprints }
    }

    #[must_use]
    pub fn score(&self, ctx: &VerificationContext) -> RiskScore {
        let mut score = 0;
        let mut factors = BTreeMap::new();

        for factor in FACTORS {
            if (factor.check)(self, ctx) {
                score += factor.weight;
                factors.insert(factor.name.to_owned(), factor.weight);
            }
        }

        let mut metadata = Map::new();
        metadata.insert("total_scans".to_owned(), ctx.total_scans.into());
        metadata.insert("recent_scans".to_owned(), ctx.recent_scans.into());
        metadata.insert("unique_countries".to_owned(), ctx.unique_countries.into());
        metadata.insert("country".to_owned(), ctx.country.clone().into());

        RiskScore {
            score,
            level: RiskLevel::from_score(score),
            factors,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn context(ip: &str, user_agent: &str) -> VerificationContext {
        let fingerprints = FingerprintGenerator::new();
        let fingerprint = fingerprints.generate(ip, user_agent, "en", "gzip", "", "UTC");

        VerificationContext {
            product_id: ProductUuid::new(),
            token: VerificationToken {
                product_id: ProductUuid::new(),
                timestamp: Timestamp::now().as_second(),
                nonce: Uuid::new_v4().to_string(),
                expires_at: None,
            },
            fingerprint,
            client_ip: ip.to_owned(),
            country: "BR".to_owned(),
            timestamp: Timestamp::now(),
            recent_scans: 0,
            total_scans: 0,
            unique_countries: 1,
            unique_fingerprints: 1,
            rapid_scans: 0,
        }
    }

    #[test]
    fn clean_context_scores_low_with_no_factors() {
        let model = RiskModel::default();
        let score = model.score(&context("8.8.8.8", "Mozilla/5.0"));

        assert_eq!(score.score, 0);
        assert_eq!(score.level, RiskLevel::Low);
        assert!(score.factors.is_empty());
    }

    #[test]
    fn accumulates_matched_factor_weights() {
        let model = RiskModel::default();

        let mut ctx = context("8.8.8.8", "curl/8.4.0");
        ctx.recent_scans = 7;

        let score = model.score(&ctx);

        // suspicious_user_agent (25) + high_frequency (30)
        assert_eq!(score.score, 55);
        assert_eq!(score.level, RiskLevel::Medium);
        assert_eq!(score.factors.get("suspicious_user_agent"), Some(&25));
        assert_eq!(score.factors.get("high_frequency"), Some(&30));
    }

    #[test]
    fn tor_vpn_and_rapid_scans_reach_high() {
        let model = RiskModel::default();

        let mut ctx = context("10.1.2.3", "Mozilla/5.0");
        ctx.rapid_scans = 4;

        let score = model.score(&ctx);

        // tor_vpn_detected (40) + rapid_scans (35)
        assert_eq!(score.score, 75);
        assert_eq!(score.level, RiskLevel::High);
    }

    #[test]
    fn country_factors_stack_at_five_countries() {
        let model = RiskModel::default();

        let mut ctx = context("8.8.8.8", "Mozilla/5.0");
        ctx.unique_countries = 5;

        let score = model.score(&ctx);

        // country_mismatch (20) + multiple_countries (20)
        assert_eq!(score.score, 40);
        assert_eq!(score.level, RiskLevel::Low);
    }

    #[test]
    fn level_thresholds_match_boundaries() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(40), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(41), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(70), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(71), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(200), RiskLevel::High);
    }

    #[test]
    fn metadata_reflects_context_counters() {
        let model = RiskModel::default();

        let mut ctx = context("8.8.8.8", "Mozilla/5.0");
        ctx.total_scans = 42;

        let score = model.score(&ctx);

        assert_eq!(score.metadata.get("total_scans"), Some(&42_u64.into()));
        assert_eq!(score.metadata.get("country"), Some(&"BR".into()));
    }
}
