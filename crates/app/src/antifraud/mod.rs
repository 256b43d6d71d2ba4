//! Antifraud: counter gate, risk history, verification ledger, and the
//! token verification pipeline.

pub mod engine;
pub mod ledger;
pub mod risk;
pub mod service;

pub use engine::*;
pub use ledger::*;
pub use risk::*;
pub use service::*;
