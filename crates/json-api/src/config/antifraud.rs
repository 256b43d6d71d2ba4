//! Antifraud Config

use clap::Args;

/// Antifraud counter and token settings.
#[derive(Debug, Args)]
pub struct AntifraudConfig {
    /// Enable the antifraud counter gate
    #[arg(long, env = "ANTIFRAUD_ENABLED", default_value_t = true)]
    pub enabled: bool,

    /// Hourly global scan ceiling
    #[arg(long, env = "ANTIFRAUD_MAX_SCANS_PER_HOUR", default_value_t = 1_000_i64)]
    pub max_scans_per_hour: i64,

    /// Per-IP hourly block threshold
    #[arg(long, env = "ANTIFRAUD_BLOCK_THRESHOLD", default_value_t = 100_i64)]
    pub block_threshold: i64,

    /// Secret for signing verification tokens
    #[arg(long, env = "ANTIFRAUD_TOKEN_SECRET", default_value = "", hide_env_values = true)]
    pub token_secret: String,

    /// Token lifetime in seconds; 0 mints tokens without expiry
    #[arg(long, env = "ANTIFRAUD_TOKEN_TTL_SECONDS", default_value_t = 86_400_u64)]
    pub token_ttl_seconds: u64,
}
