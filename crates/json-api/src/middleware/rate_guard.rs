//! Distributed rate-limit enforcement for scan routes.
//!
//! Checks the regional per-IP window and, when the caller presents an API
//! key, the per-key window. Denials and fail-closed limiter errors both
//! answer with the backpressure status.

use std::sync::Arc;

use salvo::{
    Depot, FlowCtrl, Handler, Request, Response, async_trait, http::StatusCode, writing::Json,
};
use tracing::warn;

use crate::{extensions::DepotExt, middleware::client_ip, state::State};

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RateLimitGuard;

#[async_trait]
impl Handler for RateLimitGuard {
    async fn handle(
        &self,
        req: &mut Request,
        depot: &mut Depot,
        res: &mut Response,
        ctrl: &mut FlowCtrl,
    ) {
        let Ok(state) = depot.obtain::<Arc<State>>() else {
            res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
            ctrl.skip_rest();
            return;
        };

        let ip = client_ip(req);
        let request_id = depot.request_id();

        let ip_allowed = match state.app.rate_limits.check_ip(&ip, &request_id).await {
            Ok(allowed) => allowed,
            Err(source) => {
                warn!(request_id, "rate limit check failed closed: {source}");
                false
            }
        };

        if !ip_allowed {
            deny(res, ctrl);
            return;
        }

        if let Some(api_key) = req.header::<String>(API_KEY_HEADER) {
            let key_allowed = match state.app.rate_limits.check_api_key(&api_key, &request_id).await
            {
                Ok(allowed) => allowed,
                Err(source) => {
                    warn!(request_id, "api key rate limit check failed closed: {source}");
                    false
                }
            };

            if !key_allowed {
                deny(res, ctrl);
                return;
            }
        }

        ctrl.call_next(req, depot, res).await;
    }
}

fn deny(res: &mut Response, ctrl: &mut FlowCtrl) {
    res.status_code(StatusCode::TOO_MANY_REQUESTS);
    res.render(Json(serde_json::json!({ "error": "rate_limit_exceeded" })));
    ctrl.skip_rest();
}
