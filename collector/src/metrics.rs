use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Opts, Registry, TextEncoder};
use std::sync::Once;
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref UPLOADS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "collector_uploads_total",
        "Total upload requests received"
    ))
    .unwrap();
    pub static ref ACCEPTED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "collector_accepted_total",
        "Total uploads that passed validation"
    ))
    .unwrap();
    pub static ref REJECTED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "collector_rejected_total",
        "Total uploads answered with ok=false"
    ))
    .unwrap();
    pub static ref MALFORMED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "collector_malformed_total",
        "Total uploads whose body was not a valid payload"
    ))
    .unwrap();
}

static INIT: Once = Once::new();

pub fn init_metrics() {
    INIT.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(UPLOADS_TOTAL.clone()),
            Box::new(ACCEPTED_TOTAL.clone()),
            Box::new(REJECTED_TOTAL.clone()),
            Box::new(MALFORMED_TOTAL.clone()),
        ];

        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                error!("Failed to register metric: {}", e);
            }
        }
    });
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
