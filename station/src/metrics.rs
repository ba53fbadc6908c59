use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::sync::Once;
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref COLLECTIONS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "station_collections_total",
        "Total collection ticks that produced a reading set"
    ))
    .unwrap();
    pub static ref DELIVERY_ATTEMPTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "station_delivery_attempts_total",
        "Total delivery attempts, including retries and drain attempts"
    ))
    .unwrap();
    pub static ref DELIVERIES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "station_deliveries_total",
        "Total fresh reading sets acknowledged by the collector"
    ))
    .unwrap();
    pub static ref DELIVERY_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "station_delivery_failures_total",
        "Total fresh reading sets that were not acknowledged"
    ))
    .unwrap();
    pub static ref REJECTIONS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "station_rejections_total",
        "Total reading sets the collector refused (ok=false)"
    ))
    .unwrap();
    pub static ref DRAINED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "station_drained_total",
        "Total spilled reading sets delivered from the queue"
    ))
    .unwrap();
    pub static ref SPILL_QUEUE_DEPTH: Gauge = Gauge::with_opts(Opts::new(
        "station_spill_queue_depth",
        "Reading sets waiting in the spill queue"
    ))
    .unwrap();
    pub static ref DELIVERY_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "station_delivery_latency_seconds",
            "Time from first attempt to final outcome of a fresh delivery"
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0])
    )
    .unwrap();
}

static INIT: Once = Once::new();

/// Register all station metrics; safe to call more than once
pub fn init_metrics() {
    INIT.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(COLLECTIONS_TOTAL.clone()),
            Box::new(DELIVERY_ATTEMPTS_TOTAL.clone()),
            Box::new(DELIVERIES_TOTAL.clone()),
            Box::new(DELIVERY_FAILURES_TOTAL.clone()),
            Box::new(REJECTIONS_TOTAL.clone()),
            Box::new(DRAINED_TOTAL.clone()),
            Box::new(SPILL_QUEUE_DEPTH.clone()),
            Box::new(DELIVERY_LATENCY_SECONDS.clone()),
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
