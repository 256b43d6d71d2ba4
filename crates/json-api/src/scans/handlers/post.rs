//! Submit Scan Handler (POST surface)

use salvo::prelude::*;
use serde::Deserialize;
use serde_json::json;

use super::resolve_scan;

#[derive(Debug, Deserialize)]
struct ScanBody {
    #[serde(default)]
    code: String,
}

/// Resolve a tag presented in a JSON body as `{"code": "<tag id>"}`.
#[endpoint(tags("scans"), summary = "Submit scan")]
pub(crate) async fn handler(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let body = match req.parse_json::<ScanBody>().await {
        Ok(body) if !body.code.trim().is_empty() => body,
        _ => {
            res.status_code(StatusCode::BAD_REQUEST);
            res.render(Json(json!({ "error": "code required" })));
            return;
        }
    };

    resolve_scan(req, depot, res, &body.code).await;
}

#[cfg(test)]
mod tests {
    use salvo::{http::StatusCode, test::TestClient};
    use veritag::ids::TagUuid;
    use veritag_app::scans::MockScansService;

    use crate::test_helpers::{make_scan_result, scans_service};

    use super::*;

    fn make_service(scans: MockScansService) -> Service {
        scans_service(scans, Router::with_path("v1/scan").post(handler))
    }

    #[tokio::test]
    async fn resolves_tag_from_json_body() {
        let tag = TagUuid::new();

        let mut scans = MockScansService::new();
        scans
            .expect_scan()
            .once()
            .withf(move |scanned, _| *scanned == tag)
            .returning(|tag_id, _| Ok(Some(make_scan_result(tag_id, 2))));

        let res = TestClient::post("http://example.com/v1/scan")
            .json(&serde_json::json!({ "code": tag.to_string() }))
            .send(&make_service(scans))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn missing_code_is_rejected_with_400() {
        let mut scans = MockScansService::new();
        scans.expect_scan().never();

        let res = TestClient::post("http://example.com/v1/scan")
            .json(&serde_json::json!({}))
            .send(&make_service(scans))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn malformed_body_is_rejected_with_400() {
        let mut scans = MockScansService::new();
        scans.expect_scan().never();

        let res = TestClient::post("http://example.com/v1/scan")
            .text("not json")
            .send(&make_service(scans))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::BAD_REQUEST));
    }
}
