//! Server Config

use std::time::Duration;

use clap::Args;

/// Server runtime network settings.
#[derive(Debug, Args)]
pub struct ServerRuntimeConfig {
    /// Server host address
    #[arg(short = 'H', long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port
    #[arg(short, long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Read timeout in seconds
    #[arg(long, env = "READ_TIMEOUT", default_value_t = 5_u64)]
    pub read_timeout: u64,

    /// Write timeout in seconds
    #[arg(long, env = "WRITE_TIMEOUT", default_value_t = 10_u64)]
    pub write_timeout: u64,

    /// Graceful shutdown timeout in seconds
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 10_u64)]
    pub shutdown_timeout: u64,

    /// Per-request context timeout in seconds
    #[arg(long, env = "CONTEXT_TIMEOUT", default_value_t = 5_u64)]
    pub context_timeout: u64,
}

impl ServerRuntimeConfig {
    /// Get the socket address for binding.
    #[must_use]
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }

    #[must_use]
    pub fn context_timeout(&self) -> Duration {
        Duration::from_secs(self.context_timeout)
    }
}
