//! Scan handlers and their shared resolution flow.

pub(crate) mod get;
pub(crate) mod post;
pub(crate) mod report;

use std::sync::Arc;

use salvo::{
    Depot, Request, Response,
    http::{StatusCode, header::RETRY_AFTER},
    writing::Json,
};
use tracing::error;
use veritag::ids::TagUuid;
use veritag_app::scans::ScansServiceError;

use crate::{
    extensions::DepotExt,
    middleware::client_ip,
    observability::{ScanOutcome, observe_scan_outcome},
    state::State,
};

/// Resolve a presented tag and write the response. Shared by the GET and
/// POST surfaces.
pub(crate) async fn resolve_scan(
    req: &mut Request,
    depot: &Depot,
    res: &mut Response,
    tag_id: &str,
) {
    let Ok(state) = depot.obtain_or_500::<Arc<State>>() else {
        res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
        return;
    };

    let Ok(tag_id) = tag_id.trim().parse::<TagUuid>() else {
        res.status_code(StatusCode::BAD_REQUEST);
        res.render(Json(serde_json::json!({ "error": "invalid_tag_id" })));
        return;
    };

    if tag_id.is_nil() {
        res.status_code(StatusCode::BAD_REQUEST);
        res.render(Json(serde_json::json!({ "error": "invalid_tag_id" })));
        return;
    }

    let ip = client_ip(req);

    match state.app.scans.scan(tag_id, &ip).await {
        Ok(Some(result)) => {
            observe_scan_outcome(ScanOutcome::Resolved);
            res.render(Json(result));
        }
        Ok(None) => {
            observe_scan_outcome(ScanOutcome::Declined);
            res.status_code(StatusCode::TOO_MANY_REQUESTS);
        }
        Err(ScansServiceError::Overloaded) => {
            observe_scan_outcome(ScanOutcome::Overloaded);
            res.headers_mut()
                .insert(RETRY_AFTER, salvo::http::header::HeaderValue::from_static("5"));
            res.status_code(StatusCode::TOO_MANY_REQUESTS);
            res.render(Json(serde_json::json!({
                "error": "service_overloaded",
                "message": "Service temporarily overloaded, please retry",
            })));
        }
        Err(ScansServiceError::Store(source)) => {
            observe_scan_outcome(ScanOutcome::Error);
            error!(%tag_id, "scan resolution failed: {source}");
            res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
}
