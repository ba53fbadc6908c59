//! The periodic collection loop.
//!
//! Each tick samples, delivers, then fans the outcome out to the data
//! logger and the dashboard. Neither side channel can fail the tick. The
//! only thing that ends the loop is the stop signal.

use crate::dashboard::DashboardHandle;
use crate::events::EventSender;
use crate::metrics::COLLECTIONS_TOTAL;
use crate::sampler::Sampler;
use crate::shutdown::Shutdown;
use crate::transport::Transport;
use crate::uplink::{DeliveryOutcome, DeliveryResult, UplinkClient};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Sampling,
    Delivering,
    Stopping,
    Stopped,
}

/// Counters accumulated over one run of the loop
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub collections: u64,
    pub sampler_errors: u64,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub rejected: u64,
    pub drained: u64,
    pub started: Option<Instant>,
}

impl RunStats {
    /// Percentage of fresh deliveries that were acknowledged
    pub fn success_rate(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            return 0.0;
        }
        self.successes as f64 / total as f64 * 100.0
    }

    pub fn runtime(&self) -> Duration {
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    fn record(&mut self, result: &DeliveryResult) {
        self.attempts += u64::from(result.attempts) + u64::from(result.drain.attempted);
        self.drained += u64::from(result.drain.delivered);

        if result.success {
            self.successes += 1;
        } else {
            self.failures += 1;
            if matches!(result.outcome, DeliveryOutcome::Rejected(_)) {
                self.rejected += 1;
            }
        }
    }

    pub fn report(&self) {
        let secs = self.runtime().as_secs();

        info!("Run statistics:");
        info!("  Collections: {}", self.collections);
        info!("  Sampler errors: {}", self.sampler_errors);
        info!("  Delivered: {}", self.successes);
        info!("  Failed: {} ({} rejected)", self.failures, self.rejected);
        info!("  Drained from spill queue: {}", self.drained);
        info!("  Delivery attempts: {}", self.attempts);
        info!("  Success rate: {:.1}%", self.success_rate());
        info!("  Runtime: {}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60);
    }
}

pub struct CollectionLoop<S, T> {
    sampler: S,
    uplink: UplinkClient<T>,
    events: EventSender,
    dashboard: Option<DashboardHandle>,
    interval: Duration,
    state: LoopState,
    stats: RunStats,
}

impl<S: Sampler, T: Transport> CollectionLoop<S, T> {
    pub fn new(sampler: S, uplink: UplinkClient<T>, events: EventSender, interval: Duration) -> Self {
        Self {
            sampler,
            uplink,
            events,
            dashboard: None,
            interval,
            state: LoopState::Idle,
            stats: RunStats::default(),
        }
    }

    pub fn with_dashboard(mut self, dashboard: DashboardHandle) -> Self {
        self.dashboard = Some(dashboard);
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    fn set_state(&mut self, state: LoopState) {
        if self.state != state {
            debug!("Collection loop {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn uplink(&self) -> &UplinkClient<T> {
        &self.uplink
    }

    /// Run ticks until `shutdown` fires, then persist what is left and
    /// return the counters.
    pub async fn run(&mut self, shutdown: Shutdown) -> RunStats {
        self.stats.started = Some(Instant::now());
        info!("Collection loop started, interval {}s", self.interval.as_secs_f64());

        loop {
            if shutdown.is_triggered() {
                break;
            }

            self.tick().await;

            if shutdown.is_triggered() {
                break;
            }

            self.set_state(LoopState::Idle);
            debug!("Waiting {}s for next collection", self.interval.as_secs_f64());

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.wait() => break,
            }
        }

        self.set_state(LoopState::Stopping);
        info!("Stopping collection loop");
        self.uplink.flush_queue();

        if !self.uplink.queue().is_empty() {
            info!(
                "{} reading sets remain queued for the next run",
                self.uplink.queue().len()
            );
        }

        self.stats.report();
        self.set_state(LoopState::Stopped);
        self.stats.clone()
    }

    /// One collection: sample, deliver, notify. Returns `None` when the
    /// sampler produced nothing to deliver.
    pub async fn tick(&mut self) -> Option<DeliveryResult> {
        self.set_state(LoopState::Sampling);
        self.stats.collections += 1;
        COLLECTIONS_TOTAL.inc();

        info!("Collection #{}", self.stats.collections);

        let set = match self.sampler.read_all() {
            Ok(set) => set,
            Err(e) => {
                error!("Sampling failed, skipping this tick: {}", e);
                self.stats.sampler_errors += 1;
                return None;
            }
        };

        self.set_state(LoopState::Delivering);
        let result = self.uplink.deliver(set.clone()).await;
        self.stats.record(&result);

        self.events.collected(&set, result.success);
        if let Some(dashboard) = &self.dashboard {
            dashboard.notify(&set);
        }

        Some(result)
    }
}
