//! W3C trace-context extraction from inbound request headers.

use opentelemetry::{Context, global, propagation::Extractor, trace::TraceContextExt as _};
use salvo::http::{HeaderMap, HeaderName};

/// Extract a remote parent context when the caller sent valid trace
/// headers. Extraction starts from an empty context so an absent or broken
/// `traceparent` never inherits whatever span happens to be active locally.
pub(super) fn inbound_trace_context(headers: &HeaderMap) -> Option<Context> {
    let carrier = HeaderCarrier { headers };

    let extracted = global::get_text_map_propagator(|propagator| {
        propagator.extract_with_context(&Context::new(), &carrier)
    });

    let linked = extracted.span().span_context().is_valid();

    linked.then_some(extracted)
}

/// Carrier interface over the request header map.
struct HeaderCarrier<'a> {
    headers: &'a HeaderMap,
}

impl Extractor for HeaderCarrier<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.headers.keys().map(HeaderName::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use opentelemetry_sdk::propagation::TraceContextPropagator;
    use salvo::http::header::HeaderValue;

    use super::*;

    fn headers_with(traceparent: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Some(traceparent) = traceparent {
            headers.insert(
                "traceparent",
                HeaderValue::from_str(traceparent).expect("traceparent header encodes"),
            );
        }

        headers
    }

    #[test]
    fn valid_traceparent_yields_a_parent_context() {
        global::set_text_map_propagator(TraceContextPropagator::new());

        let headers = headers_with(Some(
            "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
        ));

        assert!(inbound_trace_context(&headers).is_some());
    }

    #[test]
    fn missing_or_malformed_traceparent_yields_none() {
        global::set_text_map_propagator(TraceContextPropagator::new());

        assert!(inbound_trace_context(&headers_with(None)).is_none());
        assert!(inbound_trace_context(&headers_with(Some("not-a-traceparent"))).is_none());
    }
}
