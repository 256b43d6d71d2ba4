//! Shared application services and persistence for the Veritag scan
//! pipeline.

pub mod antifraud;
pub mod cache;
pub mod context;
pub mod database;
pub mod events;
pub mod health;
pub mod ratelimit;
pub mod redis;
pub mod scans;

#[cfg(test)]
mod test;
