//! Database connection management

use std::time::Duration;

use sqlx::{PgPool, postgres::PgPoolOptions};

/// Connection pool settings for the durable store.
#[derive(Debug, Clone)]
pub struct DatabasePoolConfig {
    pub url: String,
    pub max_conns: u32,
    pub min_conns: u32,
    pub max_lifetime: Duration,
    pub idle_timeout: Duration,
}

impl DatabasePoolConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_conns: 20,
            min_conns: 5,
            max_lifetime: Duration::from_secs(30 * 60),
            idle_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Connect to `PostgreSQL` with the configured pool limits.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(config: &DatabasePoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_conns)
        .min_connections(config.min_conns)
        .max_lifetime(config.max_lifetime)
        .idle_timeout(config.idle_timeout)
        .connect(&config.url)
        .await
}
