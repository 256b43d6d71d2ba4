//! Token Verification Handlers

use std::{collections::BTreeMap, sync::Arc};

use salvo::{oapi::extract::PathParam, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{error, warn};
use uuid::Uuid;
use veritag::risk::RiskLevel;
use veritag_app::antifraud::{RequestAttributes, VerificationOutcome};

use crate::{extensions::DepotExt, middleware::client_ip, state::State};

/// Verification response for a valid token.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct VerifyResponse {
    pub valid: bool,

    /// Consumer-facing status derived from the risk level.
    pub status: String,

    pub risk_score: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<Uuid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_id: Option<Uuid>,

    pub timestamp: String,
    pub message: String,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub risk_factors: BTreeMap<String, u32>,

    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl From<VerificationOutcome> for VerifyResponse {
    fn from(outcome: VerificationOutcome) -> Self {
        Self {
            valid: outcome.valid,
            status: risk_status(outcome.risk_level).to_owned(),
            risk_score: outcome.risk_score,
            product_id: outcome.product_id.map(Into::into),
            verification_id: outcome.verification_id.map(Into::into),
            timestamp: outcome.timestamp.to_string(),
            message: outcome.message,
            risk_factors: outcome.risk_factors,
            metadata: outcome.metadata,
        }
    }
}

fn risk_status(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Low => "authentic",
        RiskLevel::Medium => "warning",
        RiskLevel::High => "high_risk",
    }
}

fn request_attributes(req: &Request) -> RequestAttributes {
    RequestAttributes {
        user_agent: req.header::<String>("user-agent").unwrap_or_default(),
        accept_language: req.header::<String>("accept-language").unwrap_or_default(),
        accept_encoding: req.header::<String>("accept-encoding").unwrap_or_default(),
        screen_resolution: req.header::<String>("x-screen-resolution").unwrap_or_default(),
        timezone: req.header::<String>("x-timezone").unwrap_or_default(),
        country: req.header::<String>("cf-ipcountry"),
    }
}

/// Verify a signed QR token.
#[endpoint(tags("verify"), summary = "Verify a product token")]
pub(crate) async fn verify(
    token: PathParam<String>,
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) {
    let Ok(state) = depot.obtain_or_500::<Arc<State>>() else {
        res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
        return;
    };

    let token = token.into_inner();

    if token.trim().is_empty() {
        res.status_code(StatusCode::BAD_REQUEST);
        res.render(Json(json!({
            "error": "missing_token",
            "message": "Verification token required",
        })));
        return;
    }

    let client_ip = client_ip(req);
    let attributes = request_attributes(req);

    match state
        .app
        .verifications
        .verify(&token, &client_ip, attributes)
        .await
    {
        Ok(outcome) if outcome.valid => {
            res.render(Json(VerifyResponse::from(outcome)));
        }
        Ok(outcome) => {
            // Expired tokens may be distinguished by status alone; the
            // message never separates signature failures from format ones.
            let status = if outcome.expired {
                StatusCode::GONE
            } else {
                StatusCode::BAD_REQUEST
            };

            res.status_code(status);
            res.render(Json(json!({
                "error": "invalid_token",
                "message": outcome.message,
            })));
        }
        Err(source) => {
            error!(ip = client_ip, "verification failed: {source}");
            res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
            res.render(Json(json!({
                "error": "verification_error",
                "message": "Verification temporarily unavailable",
            })));
        }
    }
}

#[derive(Debug, Deserialize)]
struct FraudReportBody {
    #[serde(default)]
    verification_id: String,

    #[serde(default)]
    reason: String,

    #[serde(default)]
    details: String,
}

/// Accept a fraud report tied to a prior verification.
#[endpoint(tags("verify"), summary = "Report suspected fraud")]
pub(crate) async fn fraud_report(req: &mut Request, res: &mut Response) {
    let Ok(body) = req.parse_json::<FraudReportBody>().await else {
        res.status_code(StatusCode::BAD_REQUEST);
        res.render(Json(json!({
            "error": "invalid_request",
            "message": "Invalid request body",
        })));
        return;
    };

    if body.verification_id.trim().is_empty() || body.reason.trim().is_empty() {
        res.status_code(StatusCode::BAD_REQUEST);
        res.render(Json(json!({
            "error": "missing_fields",
            "message": "Verification ID and reason are required",
        })));
        return;
    }

    warn!(
        verification_id = body.verification_id,
        reason = body.reason,
        details = body.details,
        ip = client_ip(req),
        "fraud report received"
    );

    res.render(Json(json!({
        "success": true,
        "message": "Report received. Thank you for helping us maintain product authenticity.",
    })));
}
