//! Server configuration module

use clap::{Parser, Subcommand};

use crate::config::{
    antifraud::AntifraudConfig,
    db::DatabaseConfig,
    events::EventsConfig,
    observability::{LoggingConfig, ObservabilityConfig},
    ratelimit::RateLimitArgs,
    redis::RedisConfig,
    server::ServerRuntimeConfig,
};

pub(crate) mod antifraud;
pub(crate) mod db;
pub(crate) mod events;
pub(crate) mod observability;
pub(crate) mod ratelimit;
pub(crate) mod redis;
pub(crate) mod server;

mod settings;

pub(crate) use observability::LogFormat;

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ServerCommand {
    /// Probe `/v1/health` on the local server and exit 0 on HTTP 200, 1
    /// otherwise.
    Healthcheck,
}

/// Veritag scan API server configuration
#[derive(Debug, Parser)]
#[command(name = "veritag-json-api", about = "Veritag scan API server", long_about = None)]
pub struct ServerConfig {
    #[command(subcommand)]
    pub command: Option<ServerCommand>,

    /// Server network settings.
    #[command(flatten)]
    pub server: ServerRuntimeConfig,

    /// Logging output settings.
    #[command(flatten)]
    pub logging: LoggingConfig,

    /// Observability (traces/metrics) settings.
    #[command(flatten)]
    pub observability: ObservabilityConfig,

    /// Key-value store settings.
    #[command(flatten)]
    pub redis: RedisConfig,

    /// Durable store settings.
    #[command(flatten)]
    pub database: DatabaseConfig,

    /// Antifraud settings.
    #[command(flatten)]
    pub antifraud: AntifraudConfig,

    /// Rate limiter settings.
    #[command(flatten)]
    pub rate_limit: RateLimitArgs,

    /// Event bus settings.
    #[command(flatten)]
    pub events: EventsConfig,
}

impl ServerConfig {
    /// Load configuration from environment and CLI arguments
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be parsed
    pub fn load() -> Result<Self, clap::Error> {
        // Load .env file if present (ignore if missing)
        _ = dotenvy::dotenv();

        Self::try_parse()
    }

    /// Get the socket address for binding
    #[must_use]
    pub fn socket_addr(&self) -> String {
        self.server.socket_addr()
    }
}
