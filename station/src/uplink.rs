use crate::errors::{Error, ErrorClass};
use crate::events::EventSender;
use crate::metrics::{
    DELIVERIES_TOTAL, DELIVERY_ATTEMPTS_TOTAL, DELIVERY_FAILURES_TOTAL, DELIVERY_LATENCY_SECONDS,
    DRAINED_TOTAL, REJECTIONS_TOTAL,
};
use crate::model::ReadingSet;
use crate::shutdown::Shutdown;
use crate::spill::SpillQueue;
use crate::transport::{Ack, Transport};
use chrono::{TimeZone, Utc};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

// Keeps 2^k from overflowing on absurd attempt counts
const MAX_BACKOFF_EXPONENT: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base: Duration::from_secs(1),
        }
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Wait between attempt `attempt` and attempt `attempt + 1`: base * 2^attempt
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.pow(attempt.min(MAX_BACKOFF_EXPONENT))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Acknowledged by the collector
    Delivered,
    /// Refused by the collector; not retried, appended to the spill queue
    Rejected(String),
    /// Attempts exhausted; appended to the spill queue
    Spilled,
    /// Stop signal arrived during backoff; appended to the spill queue
    Interrupted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub attempted: u32,
    pub delivered: u32,
    pub remaining: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    pub success: bool,
    pub attempts: u32,
    pub outcome: DeliveryOutcome,
    pub drain: DrainReport,
}

/// Delivers reading sets with bounded retry and keeps undelivered ones
/// in the spill queue until a later success drains them.
pub struct UplinkClient<T> {
    transport: T,
    queue: SpillQueue,
    retry: RetryPolicy,
    events: EventSender,
    shutdown: Shutdown,
}

impl<T: Transport> UplinkClient<T> {
    pub fn new(
        transport: T,
        queue: SpillQueue,
        retry: RetryPolicy,
        events: EventSender,
        shutdown: Shutdown,
    ) -> Self {
        info!(
            "Uplink to {} with up to {} attempts, {} reading sets queued",
            transport.target(),
            retry.max_attempts,
            queue.len()
        );

        Self {
            transport,
            queue,
            retry,
            events,
            shutdown,
        }
    }

    pub fn queue(&self) -> &SpillQueue {
        &self.queue
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Retry a spill store write that failed earlier
    pub fn flush_queue(&mut self) {
        if let Err(e) = self.queue.flush() {
            error!("Spill store still not writable at shutdown: {}", e);
        }
    }

    /// Attempt delivery of a fresh reading set. On success the spill queue
    /// is drained oldest-first; any set that was not acknowledged is queued.
    pub async fn deliver(&mut self, set: ReadingSet) -> DeliveryResult {
        let started = Instant::now();
        let max_attempts = self.retry.max_attempts;
        let mut attempts = 0;

        let outcome = loop {
            attempts += 1;
            DELIVERY_ATTEMPTS_TOTAL.inc();

            if attempts > 1 {
                info!("Retrying upload (attempt {}/{})", attempts, max_attempts);
            }

            match self.transport.send(&set).await {
                Ok(ack) => {
                    info!("Upload succeeded (TS: {})", describe_ts(&ack));
                    self.mark_success(ack);
                    break DeliveryOutcome::Delivered;
                }
                Err(e) if e.class() == ErrorClass::Application => {
                    error!("Collector rejected reading set: {}", e);
                    break DeliveryOutcome::Rejected(rejection_reason(e));
                }
                Err(e) if !e.is_retryable() => {
                    error!("Upload failed with non-retryable error: {}", e);
                    break DeliveryOutcome::Spilled;
                }
                Err(e) => {
                    warn!(
                        "Upload failed (attempt {}/{}): {}",
                        attempts, max_attempts, e
                    );

                    if attempts >= max_attempts {
                        error!("Upload failed after {} attempts", attempts);
                        break DeliveryOutcome::Spilled;
                    }

                    let wait = self.retry.backoff(attempts);
                    info!("Waiting {}s before retrying", wait.as_secs_f64());

                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = self.shutdown.wait() => {
                            warn!("Stop requested, abandoning remaining attempts");
                            break DeliveryOutcome::Interrupted;
                        }
                    }
                }
            }
        };

        DELIVERY_LATENCY_SECONDS.observe(started.elapsed().as_secs_f64());

        let mut drain = DrainReport {
            remaining: self.queue.len(),
            ..DrainReport::default()
        };

        match &outcome {
            DeliveryOutcome::Delivered => {
                DELIVERIES_TOTAL.inc();
                drain = self.drain().await;
            }
            DeliveryOutcome::Rejected(_) => {
                REJECTIONS_TOTAL.inc();
                DELIVERY_FAILURES_TOTAL.inc();
                self.spill(set);
                drain.remaining = self.queue.len();
            }
            DeliveryOutcome::Spilled | DeliveryOutcome::Interrupted => {
                DELIVERY_FAILURES_TOTAL.inc();
                self.spill(set);
                drain.remaining = self.queue.len();
            }
        }

        DeliveryResult {
            success: outcome == DeliveryOutcome::Delivered,
            attempts,
            outcome,
            drain,
        }
    }

    /// Deliver queued sets oldest-first, one attempt each, stopping at the
    /// first failure so order is kept and an outage is not amplified.
    pub async fn drain(&mut self) -> DrainReport {
        let mut report = DrainReport::default();

        if !self.queue.is_empty() {
            info!("Uploading {} cached reading sets", self.queue.len());
        }

        loop {
            if self.shutdown.is_triggered() {
                debug!("Stop requested, leaving remaining cached sets queued");
                break;
            }

            let Some(head) = self.queue.peek_oldest() else {
                break;
            };

            report.attempted += 1;
            DELIVERY_ATTEMPTS_TOTAL.inc();

            let result = self.transport.send(head).await;
            match result {
                Ok(ack) => {
                    if let Err(e) = self.queue.remove_oldest() {
                        error!("Delivered cached set but could not rewrite spill store: {}", e);
                    }
                    report.delivered += 1;
                    DRAINED_TOTAL.inc();
                    self.mark_success(ack);
                }
                Err(e) => {
                    warn!("Cached upload failed, stopping drain: {}", e);
                    break;
                }
            }
        }

        report.remaining = self.queue.len();
        if report.delivered > 0 {
            info!(
                "Uploaded {} cached reading sets, {} still queued",
                report.delivered, report.remaining
            );
        }
        report
    }

    fn spill(&mut self, set: ReadingSet) {
        match self.queue.append(set) {
            Ok(()) => info!("Reading set cached locally ({} queued)", self.queue.len()),
            Err(e) => error!(
                "Reading set kept in memory only ({} queued): {}",
                self.queue.len(),
                e
            ),
        }
    }

    fn mark_success(&self, ack: Ack) {
        let at = ack
            .server_ts
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(Utc::now);
        self.events.upload_marked(at);
    }
}

fn describe_ts(ack: &Ack) -> String {
    ack.server_ts
        .map(|ts| ts.to_string())
        .unwrap_or_else(|| "n/a".to_string())
}

fn rejection_reason(e: Error) -> String {
    match e {
        Error::Rejected(reason) => reason,
        other => other.to_string(),
    }
}
