//! Rate Limit Config

use clap::Args;

/// Sliding-window rate limiter settings.
#[derive(Debug, Args)]
pub struct RateLimitArgs {
    /// Per-IP admissions per minute per region
    #[arg(long, env = "RATE_LIMIT_IP_PER_MINUTE", default_value_t = 100_u32)]
    pub ip_per_minute: u32,

    /// Per-API-key admissions per minute per region
    #[arg(long, env = "RATE_LIMIT_KEY_PER_MINUTE", default_value_t = 1_000_u32)]
    pub key_per_minute: u32,

    /// Deny requests when the limiter itself fails
    #[arg(long, env = "RATE_LIMIT_FAIL_CLOSED", default_value_t = true)]
    pub fail_closed: bool,

    /// Evaluate the cross-region window after a regional allow
    #[arg(long, env = "RATE_LIMIT_GLOBAL_CHECK", default_value_t = false)]
    pub global_check: bool,

    /// Deployment region partitioning the rate-limit keyspace
    #[arg(long, env = "CLOUD_RUN_REGION")]
    pub cloud_run_region: Option<String>,

    /// Fallback region name when `CLOUD_RUN_REGION` is unset
    #[arg(long, env = "GCP_REGION")]
    pub gcp_region: Option<String>,
}

impl RateLimitArgs {
    /// Region tag for rate-limit keys; falls back to the literal `default`.
    #[must_use]
    pub fn region(&self) -> String {
        self.cloud_run_region
            .clone()
            .or_else(|| self.gcp_region.clone())
            .filter(|region| !region.trim().is_empty())
            .unwrap_or_else(|| "default".to_owned())
    }
}
