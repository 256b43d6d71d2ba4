//! Resolve Scan Handlers (GET surface)

use salvo::{oapi::extract::PathParam, prelude::*};

use super::resolve_scan;

/// Resolve a tag presented in the URL path.
#[endpoint(tags("scans"), summary = "Resolve scan by tag id")]
pub(crate) async fn by_path(
    tag_id: PathParam<String>,
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) {
    resolve_scan(req, depot, res, &tag_id.into_inner()).await;
}

/// Resolve a tag presented as a `tag_id` query parameter.
#[endpoint(tags("scans"), summary = "Resolve scan by query parameter")]
pub(crate) async fn by_query(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let tag_id = req.query::<String>("tag_id").unwrap_or_default();

    resolve_scan(req, depot, res, &tag_id).await;
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use salvo::{
        http::StatusCode,
        test::{ResponseExt, TestClient},
    };
    use testresult::TestResult;
    use veritag::ids::TagUuid;
    use veritag_app::scans::{MockScansService, ScanResult, ScansServiceError, StoreError};

    use crate::test_helpers::{make_scan_result, scans_service, timed_scans_service};

    use super::*;

    fn make_service(scans: MockScansService) -> Service {
        scans_service(
            scans,
            Router::with_path("v1/scan")
                .get(by_query)
                .push(Router::with_path("{tag_id}").get(by_path)),
        )
    }

    #[tokio::test]
    async fn resolves_tag_by_path_with_post_increment_count() -> TestResult {
        let tag = TagUuid::new();

        let mut scans = MockScansService::new();
        scans
            .expect_scan()
            .once()
            .withf(move |scanned, _ip| *scanned == tag)
            .returning(|tag_id, _| Ok(Some(make_scan_result(tag_id, 6))));

        let res = TestClient::get(format!("http://example.com/v1/scan/{tag}"))
            .send(&make_service(scans))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::OK));

        let mut res = res;
        let body: ScanResult = res.take_json().await?;

        assert_eq!(body.tag_id, tag);
        assert_eq!(body.scan_count, 6);

        Ok(())
    }

    #[tokio::test]
    async fn resolves_tag_by_query_parameter() {
        let tag = TagUuid::new();

        let mut scans = MockScansService::new();
        scans
            .expect_scan()
            .once()
            .returning(|tag_id, _| Ok(Some(make_scan_result(tag_id, 1))));

        let res = TestClient::get(format!("http://example.com/v1/scan?tag_id={tag}"))
            .send(&make_service(scans))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn malformed_tag_is_rejected_with_400() {
        let mut scans = MockScansService::new();
        scans.expect_scan().never();

        let res = TestClient::get("http://example.com/v1/scan/not-a-uuid")
            .send(&make_service(scans))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn nil_tag_is_rejected_with_400() {
        let mut scans = MockScansService::new();
        scans.expect_scan().never();

        let res = TestClient::get(format!("http://example.com/v1/scan/{}", TagUuid::nil()))
            .send(&make_service(scans))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn declined_scan_maps_to_429() {
        let mut scans = MockScansService::new();
        scans.expect_scan().once().returning(|_, _| Ok(None));

        let res = TestClient::get(format!("http://example.com/v1/scan/{}", TagUuid::new()))
            .send(&make_service(scans))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::TOO_MANY_REQUESTS));
    }

    #[tokio::test]
    async fn overload_maps_to_429_with_retry_after() -> TestResult {
        let mut scans = MockScansService::new();
        scans
            .expect_scan()
            .once()
            .returning(|_, _| Err(ScansServiceError::Overloaded));

        let mut res = TestClient::get(format!("http://example.com/v1/scan/{}", TagUuid::new()))
            .send(&make_service(scans))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::TOO_MANY_REQUESTS));
        assert_eq!(
            res.headers().get("retry-after").map(|v| v.to_str().unwrap_or_default()),
            Some("5")
        );

        let body: serde_json::Value = res.take_json().await?;

        assert_eq!(body["error"], "service_overloaded");

        Ok(())
    }

    #[tokio::test]
    async fn store_failure_maps_to_500() {
        let mut scans = MockScansService::new();
        scans
            .expect_scan()
            .once()
            .returning(|_, _| Err(ScansServiceError::Store(StoreError::Sql(sqlx::Error::PoolClosed))));

        let res = TestClient::get(format!("http://example.com/v1/scan/{}", TagUuid::new()))
            .send(&make_service(scans))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn client_ip_prefers_forwarded_header() {
        let mut scans = MockScansService::new();
        scans
            .expect_scan()
            .once()
            .withf(|_, ip| ip == "203.0.113.9")
            .returning(|tag_id, _| Ok(Some(make_scan_result(tag_id, 1))));

        let res = TestClient::get(format!("http://example.com/v1/scan/{}", TagUuid::new()))
            .add_header("x-forwarded-for", "203.0.113.9, 10.0.0.1", true)
            .send(&make_service(scans))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn every_exit_path_takes_at_least_the_timing_floor() {
        // Validation failures must be as slow as successful resolutions so
        // latency cannot be used to enumerate tags.
        let mut scans = MockScansService::new();
        scans.expect_scan().never();

        let service = timed_scans_service(
            scans,
            Router::with_path("v1/scan/{tag_id}").get(by_path),
        );

        let started = Instant::now();

        let res = TestClient::get("http://example.com/v1/scan/not-a-uuid")
            .send(&service)
            .await;

        assert_eq!(res.status_code, Some(StatusCode::BAD_REQUEST));
        assert!(
            started.elapsed() >= Duration::from_millis(70),
            "response returned before the timing floor"
        );
    }
}
