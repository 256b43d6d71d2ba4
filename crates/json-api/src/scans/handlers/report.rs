//! Irregularity Report Handler

use salvo::prelude::*;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::middleware::client_ip;

const DEFAULT_REPORT_TYPE: &str = "irregularity";

#[derive(Debug, Deserialize)]
struct ReportBody {
    #[serde(default)]
    code: String,

    #[serde(default)]
    reason: String,

    #[serde(default)]
    details: String,

    #[serde(default, rename = "report_type")]
    report_type: String,
}

/// Accept a consumer report about a suspicious or irregular product.
#[endpoint(tags("scans"), summary = "Report an irregularity")]
pub(crate) async fn handler(req: &mut Request, res: &mut Response) {
    let Ok(body) = req.parse_json::<ReportBody>().await else {
        res.status_code(StatusCode::BAD_REQUEST);
        return;
    };

    if body.code.trim().is_empty() || body.reason.trim().is_empty() {
        res.status_code(StatusCode::BAD_REQUEST);
        res.render(Json(json!({ "error": "code and reason required" })));
        return;
    }

    let report_type = if body.report_type.trim().is_empty() {
        DEFAULT_REPORT_TYPE
    } else {
        body.report_type.trim()
    };

    info!(
        code = body.code,
        reason = body.reason,
        details = body.details,
        report_type,
        ip = client_ip(req),
        "irregularity report received"
    );

    res.render(Json(json!({
        "success": true,
        "message": "Report received. Thank you for helping us maintain product authenticity.",
    })));
}
