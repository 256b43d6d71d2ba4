//! Depot helper extensions.

use std::any::Any;

use salvo::prelude::{Depot, StatusError};
use uuid::Uuid;

use crate::observability::REQUEST_ID_DEPOT_KEY;

/// Helpers for mapping depot extraction failures to HTTP errors.
pub(crate) trait DepotExt {
    fn obtain_or_500<T: Any + Send + Sync>(&self) -> Result<&T, StatusError>;

    /// Request id assigned by the request middleware, or a fresh one when
    /// the middleware did not run (e.g. in isolated handler tests).
    fn request_id(&self) -> String;
}

impl DepotExt for Depot {
    fn obtain_or_500<T: Any + Send + Sync>(&self) -> Result<&T, StatusError> {
        self.obtain::<T>()
            .map_err(|_ignored| StatusError::internal_server_error())
    }

    fn request_id(&self) -> String {
        self.get::<String>(REQUEST_ID_DEPOT_KEY)
            .ok()
            .cloned()
            .unwrap_or_else(|| Uuid::now_v7().to_string())
    }
}
