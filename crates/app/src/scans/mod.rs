//! Scan resolution: models, durable store, and the orchestrating service.

pub mod errors;
pub mod models;
pub mod service;
pub mod store;

pub use errors::ScansServiceError;
pub use models::ScanResult;
pub use service::*;
pub use store::*;
