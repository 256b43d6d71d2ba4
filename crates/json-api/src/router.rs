//! App Router

use salvo::Router;

use crate::{
    healthcheck,
    middleware::{RateLimitGuard, normalize_scan_timing, security_headers},
    observability::metrics_handler,
    scans::handlers as scans,
    verify::handlers as verify,
};

pub(crate) fn app_router() -> Router {
    Router::new()
        .push(
            Router::with_path("v1")
                .push(Router::with_path("health").get(healthcheck::health))
                .push(Router::with_path("ready").get(healthcheck::ready))
                .push(
                    // Timing normalization is the outermost hoop: rate-limit
                    // denials are padded like every other scan exit path.
                    Router::with_path("scan")
                        .hoop(normalize_scan_timing)
                        .hoop(RateLimitGuard)
                        .get(scans::get::by_query)
                        .post(scans::post::handler)
                        .push(Router::with_path("{tag_id}").get(scans::get::by_path)),
                )
                .push(Router::with_path("report").post(scans::report::handler)),
        )
        .push(Router::with_path("metrics").get(metrics_handler))
        .push(
            Router::with_path("api")
                .push(
                    Router::with_path("verify/{token}")
                        .hoop(security_headers)
                        .post(verify::verify),
                )
                .push(
                    Router::with_path("fraud/report")
                        .hoop(security_headers)
                        .post(verify::fraud_report),
                ),
        )
}
