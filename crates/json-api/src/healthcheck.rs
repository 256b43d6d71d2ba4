//! Health and readiness handlers.

use std::sync::Arc;

use salvo::{oapi::ToSchema, prelude::*};
use serde::{Deserialize, Serialize};

use crate::{extensions::DepotExt, state::State};

/// Healthcheck response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
}

/// Liveness handler
#[endpoint(tags("health"), summary = "Health check endpoint")]
pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness handler
///
/// Answers 200 only when the cache and the configured durable store are
/// reachable within the readiness bound.
#[endpoint(tags("health"), summary = "Readiness check endpoint")]
pub(crate) async fn ready(depot: &mut Depot, res: &mut Response) {
    let Ok(state) = depot.obtain_or_500::<Arc<State>>() else {
        res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
        return;
    };

    match state.app.health.ready().await {
        Ok(()) => {
            res.render(Json(HealthResponse {
                status: "ready".to_string(),
            }));
        }
        Err(source) => {
            res.status_code(StatusCode::SERVICE_UNAVAILABLE);
            res.render(Json(HealthResponse {
                status: format!("{}_down", source.component()),
            }));
        }
    }
}
