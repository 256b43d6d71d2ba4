//! Response timing normalization for scan routes.
//!
//! Every scan response, including validation failures, takes at least
//! 80 ms ± 10 ms of OS-random jitter so response latency cannot be used to
//! enumerate which tags exist.

use std::time::{Duration, Instant};

use rand::{RngCore, rngs::OsRng};
use salvo::{
    Request, handler,
    prelude::{Depot, FlowCtrl, Response},
};

const MIN_RESPONSE_TIME: Duration = Duration::from_millis(80);
const MAX_JITTER_MS: u64 = 10;

#[handler]
pub(crate) async fn normalize_scan_timing(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
    ctrl: &mut FlowCtrl,
) {
    let started = Instant::now();

    ctrl.call_next(req, depot, res).await;

    let target = target_response_time();
    let elapsed = started.elapsed();

    if elapsed < target {
        tokio::time::sleep(target - elapsed).await;
    }
}

fn target_response_time() -> Duration {
    let jitter_ms = (OsRng.next_u64() % (MAX_JITTER_MS * 2)) as i64 - MAX_JITTER_MS as i64;

    if jitter_ms >= 0 {
        MIN_RESPONSE_TIME + Duration::from_millis(jitter_ms.unsigned_abs())
    } else {
        MIN_RESPONSE_TIME - Duration::from_millis(jitter_ms.unsigned_abs())
    }
}
