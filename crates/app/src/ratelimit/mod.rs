//! Sliding-window rate limiting with circuit-breaker protection.

pub mod breaker;
pub mod service;

pub use breaker::*;
pub use service::*;
