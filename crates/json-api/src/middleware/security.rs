//! Security headers for verification endpoints.

use salvo::{
    Request, handler,
    http::header::HeaderValue,
    prelude::{Depot, FlowCtrl, Response},
};

const HEADERS: &[(&str, &str)] = &[
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("x-xss-protection", "1; mode=block"),
    (
        "strict-transport-security",
        "max-age=31536000; includeSubDomains",
    ),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    (
        "content-security-policy",
        "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; \
         img-src 'self' data: https:; font-src 'self'; connect-src 'self'; \
         frame-ancestors 'none'",
    ),
    ("permissions-policy", "camera=(), microphone=(), geolocation=()"),
];

#[handler]
pub(crate) async fn security_headers(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
    ctrl: &mut FlowCtrl,
) {
    for (name, value) in HEADERS {
        if let Ok(value) = HeaderValue::from_str(value) {
            res.headers_mut().insert(*name, value);
        }
    }

    ctrl.call_next(req, depot, res).await;
}
