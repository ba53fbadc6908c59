//! Resilient telemetry uplink for a field sensor station.
//!
//! A collection loop samples the local sensors on a fixed interval and
//! hands each reading set to the uplink client, which retries with
//! exponential backoff and keeps anything it could not deliver in a
//! durable spill queue until the collector is reachable again.

pub mod collection;
pub mod config;
pub mod dashboard;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod model;
pub mod mqtt;
pub mod payload;
pub mod sampler;
pub mod shutdown;
pub mod spill;
pub mod transport;
pub mod uplink;

#[cfg(test)]
mod testing;

pub use collection::{CollectionLoop, LoopState, RunStats};
pub use config::StationConfig;
pub use errors::{Error, Result};
pub use model::{Reading, ReadingSet, SensorKind};
pub use spill::SpillQueue;
pub use transport::{Ack, HttpTransport, Transport};
pub use uplink::{DeliveryOutcome, DeliveryResult, RetryPolicy, UplinkClient};
