//! Scan event publishing.
//!
//! Publishes `{tag_id, scan_count, first_scan_at}` payloads to the scan
//! events topic and awaits broker confirmation with a bounded wait. A no-op
//! implementation stands in when no bus is configured.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use mockall::automock;
use opentelemetry::propagation::Injector;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::json;
use thiserror::Error;
use tracing::debug;
use tracing_opentelemetry::OpenTelemetrySpanExt as _;
use veritag::ids::TagUuid;

/// Bound on waiting for broker confirmation.
const PUBLISH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("event bus request failed")]
    Http(#[from] reqwest::Error),

    #[error("event bus rejected publish with status {status}")]
    Rejected { status: u16 },

    #[error("event bus client could not be built")]
    Client(#[source] reqwest::Error),
}

#[automock]
#[async_trait]
pub trait ScanEventPublisher: Send + Sync {
    /// Publish a scan event and wait for confirmation.
    async fn publish_scan_event(&self, tag_id: TagUuid, event: Vec<u8>)
    -> Result<(), PublishError>;
}

/// Publisher for deployments without a configured event bus.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

#[async_trait]
impl ScanEventPublisher for NoopPublisher {
    async fn publish_scan_event(
        &self,
        tag_id: TagUuid,
        _event: Vec<u8>,
    ) -> Result<(), PublishError> {
        debug!(%tag_id, "event bus not configured - dropping scan event");
        Ok(())
    }
}

/// Publishes over the Pub/Sub JSON API. Works against the hosted service
/// with a bearer token or against an emulator endpoint without one.
#[derive(Debug, Clone)]
pub struct PubSubPublisher {
    http: reqwest::Client,
    publish_url: String,
    auth_token: Option<String>,
}

impl PubSubPublisher {
    /// Build a publisher for `projects/{project_id}/topics/{topic_id}`.
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn new(
        endpoint: &str,
        project_id: &str,
        topic_id: &str,
        auth_token: Option<String>,
    ) -> Result<Self, PublishError> {
        let http = reqwest::Client::builder()
            .timeout(PUBLISH_TIMEOUT)
            .build()
            .map_err(PublishError::Client)?;

        let endpoint = endpoint.trim_end_matches('/');

        Ok(Self {
            http,
            publish_url: format!("{endpoint}/v1/projects/{project_id}/topics/{topic_id}:publish"),
            auth_token,
        })
    }
}

#[async_trait]
impl ScanEventPublisher for PubSubPublisher {
    async fn publish_scan_event(
        &self,
        tag_id: TagUuid,
        event: Vec<u8>,
    ) -> Result<(), PublishError> {
        let body = json!({
            "messages": [{
                "data": STANDARD.encode(&event),
                "attributes": { "tag_id": tag_id.to_string() },
            }]
        });

        let mut request = self
            .http
            .post(&self.publish_url)
            .headers(trace_headers())
            .json(&body);

        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(PublishError::Rejected {
                status: response.status().as_u16(),
            });
        }

        // The broker acknowledged with message ids; nothing further to do.
        Ok(())
    }
}

/// W3C trace-context headers for the outbound publish, carried over the
/// request header map.
fn trace_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();

    opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.inject_context(
            &tracing::Span::current().context(),
            &mut HeaderInjector(&mut headers),
        );
    });

    headers
}

struct HeaderInjector<'a>(&'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            self.0.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_publisher_accepts_events() {
        let publisher = NoopPublisher;

        publisher
            .publish_scan_event(TagUuid::new(), b"{}".to_vec())
            .await
            .expect("noop publish succeeds");
    }

    #[test]
    fn publish_url_targets_the_topic() {
        let publisher =
            PubSubPublisher::new("http://localhost:8085/", "veritag-prod", "scan-events", None)
                .expect("publisher builds");

        assert_eq!(
            publisher.publish_url,
            "http://localhost:8085/v1/projects/veritag-prod/topics/scan-events:publish"
        );
    }

    #[tokio::test]
    async fn unreachable_bus_surfaces_an_error() {
        let publisher = PubSubPublisher::new("http://127.0.0.1:1", "p", "t", None)
            .expect("publisher builds");

        let result = publisher
            .publish_scan_event(TagUuid::new(), b"{}".to_vec())
            .await;

        assert!(matches!(result, Err(PublishError::Http(_))));
    }
}
