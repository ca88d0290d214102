//! Chat message delivery and tiered storage: optimistic broadcast with
//! compensating tombstones, chunked inbox fan-out, unread counters, and a
//! hot ledger that ages into monthly cold-storage blobs behind a merged
//! read path.

pub mod archive;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod store;
pub mod tasks;
pub mod workers;
