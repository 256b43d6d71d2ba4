//! Test helpers.

use std::sync::Arc;

use salvo::{Router, Service, affix_state::inject};
use veritag::ids::{BatchUuid, ProductUuid, TagUuid};
use veritag_app::{
    antifraud::MockVerificationsService,
    context::AppContext,
    health::MockHealthService,
    ratelimit::MockRateLimiter,
    scans::{MockScansService, ScanResult},
};

use crate::{middleware::normalize_scan_timing, state::State};

fn strict_scans_mock() -> MockScansService {
    let mut scans = MockScansService::new();

    scans.expect_scan().never();

    scans
}

fn strict_verifications_mock() -> MockVerificationsService {
    let mut verifications = MockVerificationsService::new();

    verifications.expect_verify().never();
    verifications.expect_chain_integrity().never();

    verifications
}

fn strict_rate_limits_mock() -> MockRateLimiter {
    let mut rate_limits = MockRateLimiter::new();

    rate_limits.expect_check_ip().never();
    rate_limits.expect_check_api_key().never();

    rate_limits
}

fn strict_health_mock() -> MockHealthService {
    let mut health = MockHealthService::new();

    health.expect_ready().never();

    health
}

pub(crate) fn state_with(
    scans: MockScansService,
    verifications: MockVerificationsService,
    rate_limits: MockRateLimiter,
    health: MockHealthService,
) -> Arc<State> {
    Arc::new(State::new(AppContext {
        scans: Arc::new(scans),
        verifications: Arc::new(verifications),
        rate_limits: Arc::new(rate_limits),
        health: Arc::new(health),
    }))
}

pub(crate) fn state_with_scans(scans: MockScansService) -> Arc<State> {
    state_with(
        scans,
        strict_verifications_mock(),
        strict_rate_limits_mock(),
        strict_health_mock(),
    )
}

pub(crate) fn state_with_verifications(verifications: MockVerificationsService) -> Arc<State> {
    state_with(
        strict_scans_mock(),
        verifications,
        strict_rate_limits_mock(),
        strict_health_mock(),
    )
}

pub(crate) fn state_with_health(health: MockHealthService) -> Arc<State> {
    state_with(
        strict_scans_mock(),
        strict_verifications_mock(),
        strict_rate_limits_mock(),
        health,
    )
}

pub(crate) fn scans_service(scans: MockScansService, route: Router) -> Service {
    Service::new(
        Router::new()
            .hoop(inject(state_with_scans(scans)))
            .push(route),
    )
}

/// Scan route wrapped in the timing-normalization hoop, for tests that
/// assert the response-time floor.
pub(crate) fn timed_scans_service(scans: MockScansService, route: Router) -> Service {
    Service::new(
        Router::new()
            .hoop(inject(state_with_scans(scans)))
            .hoop(normalize_scan_timing)
            .push(route),
    )
}

pub(crate) fn verifications_service(
    verifications: MockVerificationsService,
    route: Router,
) -> Service {
    Service::new(
        Router::new()
            .hoop(inject(state_with_verifications(verifications)))
            .push(route),
    )
}

pub(crate) fn health_service(health: MockHealthService, route: Router) -> Service {
    Service::new(
        Router::new()
            .hoop(inject(state_with_health(health)))
            .push(route),
    )
}

pub(crate) fn make_scan_result(tag_id: TagUuid, scan_count: i64) -> ScanResult {
    ScanResult {
        tag_id,
        product_id: ProductUuid::new(),
        batch_id: BatchUuid::new(),
        first_scan_at: Some(jiff::Timestamp::UNIX_EPOCH),
        scan_count,
        valid: true,
    }
}
