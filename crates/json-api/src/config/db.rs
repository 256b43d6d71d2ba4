//! Database Config

use clap::Args;

/// Durable store settings. Without a URL the service runs cache-only.
#[derive(Debug, Args)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection string
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Maximum pooled connections
    #[arg(long, env = "PG_MAX_CONNS", default_value_t = 20_u32)]
    pub max_conns: u32,

    /// Minimum pooled connections
    #[arg(long, env = "PG_MIN_CONNS", default_value_t = 5_u32)]
    pub min_conns: u32,
}
