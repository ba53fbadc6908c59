//! Reference collector: accepts station uploads over HTTP, validates them
//! and keeps the latest one for display.

pub mod errors;
pub mod ingest;
pub mod metrics;
pub mod rest;
pub mod validate;

pub use ingest::LatestStore;
pub use rest::create_router;
