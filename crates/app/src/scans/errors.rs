//! Scans service errors.

use thiserror::Error;

use crate::scans::store::StoreError;

#[derive(Debug, Error)]
pub enum ScansServiceError {
    /// The cache connection pool could not serve the request; mapped to the
    /// backpressure status at the HTTP boundary.
    #[error("service overloaded")]
    Overloaded,

    /// The durable store failed while resolving a cache miss.
    #[error("durable store error")]
    Store(#[source] StoreError),
}
