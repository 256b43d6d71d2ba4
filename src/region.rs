//! Regional rate-limit state and keyspace.
//!
//! Limits are enforced per region. A freshly started region serves with a
//! dampened limit for its cold period so an attacker cannot reset their
//! budget by steering traffic onto a new replica.

use std::time::{Duration, Instant};

/// Region used when no deployment region is configured.
pub const DEFAULT_REGION: &str = "default";

/// Cold window applied to a freshly started region.
pub const DEFAULT_COLD_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Fraction of the base limit admitted during the cold window.
pub const DEFAULT_COLD_START_FACTOR: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct RegionState {
    region: String,
    started_at: Instant,
    cold_period: Duration,
    cold_start_factor: f64,
}

impl RegionState {
    /// Create state for `region`, falling back to [`DEFAULT_REGION`] when
    /// the name is empty. The cold window starts now.
    #[must_use]
    pub fn new(region: &str, cold_period: Duration, cold_start_factor: f64) -> Self {
        let region = if region.trim().is_empty() {
            DEFAULT_REGION.to_owned()
        } else {
            region.trim().to_owned()
        };

        Self {
            region,
            started_at: Instant::now(),
            cold_period,
            cold_start_factor,
        }
    }

    #[must_use]
    pub fn with_defaults(region: &str) -> Self {
        Self::new(region, DEFAULT_COLD_PERIOD, DEFAULT_COLD_START_FACTOR)
    }

    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Whether the cold window is still in effect.
    #[must_use]
    pub fn is_cold(&self) -> bool {
        self.started_at.elapsed() < self.cold_period
    }

    /// Effective limit for `base`: `floor(base × cold_start_factor)` inside
    /// the cold window, `base` afterwards.
    #[must_use]
    pub fn effective_limit(&self, base: u32) -> u32 {
        if self.is_cold() {
            let dampened = (f64::from(base) * self.cold_start_factor).floor();

            // The factor lives in (0, 1], so the product fits u32.
            dampened as u32
        } else {
            base
        }
    }

    /// Regional sliding-window key for a client IP.
    #[must_use]
    pub fn ip_key(&self, ip: &str) -> String {
        format!("ratelimit:{}:ip:{ip}", self.region)
    }

    /// Regional sliding-window key for an API key.
    #[must_use]
    pub fn api_key_key(&self, api_key: &str) -> String {
        format!("ratelimit:{}:key:{api_key}", self.region)
    }
}

/// Cross-region sliding-window key for a client IP.
#[must_use]
pub fn global_ip_key(ip: &str) -> String {
    format!("ratelimit:global:ip:{ip}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_region_falls_back_to_default() {
        let state = RegionState::with_defaults("");

        assert_eq!(state.region(), DEFAULT_REGION);
        assert_eq!(state.ip_key("1.2.3.4"), "ratelimit:default:ip:1.2.3.4");
    }

    #[test]
    fn cold_window_halves_limit_with_default_factor() {
        let state = RegionState::with_defaults("us-central1");

        assert!(state.is_cold());
        assert_eq!(state.effective_limit(100), 50);
    }

    #[test]
    fn dampened_limit_floors() {
        let state = RegionState::new("us", DEFAULT_COLD_PERIOD, 0.5);

        assert_eq!(state.effective_limit(5), 2);
        assert_eq!(state.effective_limit(1), 0);
    }

    #[test]
    fn warm_region_uses_base_limit() {
        let state = RegionState::new("eu", Duration::ZERO, 0.5);

        assert!(!state.is_cold());
        assert_eq!(state.effective_limit(100), 100);
    }

    #[test]
    fn key_formats_are_stable() {
        let state = RegionState::with_defaults("eu-west1");

        assert_eq!(state.ip_key("1.2.3.4"), "ratelimit:eu-west1:ip:1.2.3.4");
        assert_eq!(state.api_key_key("abc"), "ratelimit:eu-west1:key:abc");
        assert_eq!(global_ip_key("1.2.3.4"), "ratelimit:global:ip:1.2.3.4");
    }
}
