//! Event Bus Config

use clap::Args;

/// Scan event bus settings. Without a project id events are dropped.
#[derive(Debug, Args)]
pub struct EventsConfig {
    /// Project owning the scan events topic
    #[arg(long, env = "GCP_PROJECT_ID")]
    pub project_id: Option<String>,

    /// Scan events topic
    #[arg(long, env = "PUBSUB_TOPIC_SCAN_EVENTS", default_value = "scan-events")]
    pub topic_id: String,

    /// Publish endpoint; point at an emulator for local runs
    #[arg(long, env = "PUBSUB_ENDPOINT", default_value = "https://pubsub.googleapis.com")]
    pub endpoint: String,

    /// Bearer token for the hosted service
    #[arg(long, env = "PUBSUB_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,
}
