//! In-memory per-IP limiter for the HTTP layer.
//!
//! A coarse fixed-window counter in front of the Redis-backed limiter. The
//! window map is swept once a minute by a background task that stops on
//! shutdown so its timer is not leaked.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, Weak},
    time::{Duration, Instant},
};

use salvo::{
    Depot, FlowCtrl, Handler, Request, Response, async_trait, http::StatusCode, writing::Json,
};
use tokio::sync::watch;

use crate::middleware::client_ip;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Window {
    count: u32,
    until: Instant,
}

#[derive(Debug)]
struct LimiterInner {
    counts: Mutex<HashMap<String, Window>>,
    limit: u32,
    window: Duration,
    shutdown: watch::Sender<bool>,
}

#[derive(Debug, Clone)]
pub(crate) struct HttpRateLimiter {
    inner: Arc<LimiterInner>,
}

impl HttpRateLimiter {
    #[must_use]
    pub(crate) fn new(limit: u32, window: Duration) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(LimiterInner {
            counts: Mutex::new(HashMap::new()),
            limit,
            window,
            shutdown,
        });

        spawn_sweeper(Arc::downgrade(&inner), shutdown_rx);

        Self { inner }
    }

    /// Stop the background sweep task.
    pub(crate) fn stop(&self) {
        let _ = self.inner.shutdown.send(true);
    }

    fn allow(&self, key: &str) -> bool {
        let mut counts = lock_counts(&self.inner);
        let now = Instant::now();

        match counts.get_mut(key) {
            Some(window) if window.until > now => {
                if window.count >= self.inner.limit {
                    return false;
                }

                window.count += 1;
                true
            }
            _ => {
                counts.insert(
                    key.to_owned(),
                    Window {
                        count: 1,
                        until: now + self.inner.window,
                    },
                );

                true
            }
        }
    }
}

fn lock_counts(inner: &LimiterInner) -> std::sync::MutexGuard<'_, HashMap<String, Window>> {
    inner
        .counts
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn spawn_sweeper(inner: Weak<LimiterInner>, mut shutdown_rx: watch::Receiver<bool>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(inner) = inner.upgrade() else {
                        return;
                    };

                    let now = Instant::now();
                    lock_counts(&inner).retain(|_, window| window.until > now);
                }
                _ = shutdown_rx.changed() => {
                    return;
                }
            }
        }
    });
}

#[async_trait]
impl Handler for HttpRateLimiter {
    async fn handle(
        &self,
        req: &mut Request,
        depot: &mut Depot,
        res: &mut Response,
        ctrl: &mut FlowCtrl,
    ) {
        let key = client_ip(req);

        if !self.allow(&key) {
            res.status_code(StatusCode::TOO_MANY_REQUESTS);
            res.render(Json(serde_json::json!({ "error": "rate_limit_exceeded" })));
            ctrl.skip_rest();
            return;
        }

        ctrl.call_next(req, depot, res).await;
    }
}
