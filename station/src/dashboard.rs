//! Local dashboard backend.
//!
//! Receives reading sets over a bounded channel and serves the latest
//! values and a short history for a display to poll. The collection loop
//! only ever `try_send`s into it, so a slow or dead dashboard never holds
//! up delivery.

use crate::metrics::gather_metrics;
use crate::model::{ReadingSet, SensorKind};
use crate::payload::{Scores, Uav, Usv};
use crate::shutdown::Shutdown;
use axum::{extract::State, routing::get, Json, Router};
use chrono::{Local, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct Meta {
    pub last_update_ts: i64,
    pub source: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub uav: Uav,
    pub usv: Usv,
    pub scores: Scores,
    pub meta: Meta,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            uav: Uav {
                lng: 120.6550,
                lat: 36.1250,
                alt: 55.2,
                status: "Ready".to_string(),
            },
            usv: Usv {
                lng: 120.6620,
                lat: 36.1180,
                temp: 22.5,
                humidity: 55.0,
                pressure: 1013.2,
                light: 1200.0,
                status: "Active".to_string(),
            },
            scores: Scores {
                water_quality: 0.0,
                dam_safety: 0.0,
            },
            meta: Meta {
                last_update_ts: 0,
                source: "none".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct History {
    pub timestamps: VecDeque<String>,
    pub temperature: VecDeque<f64>,
    pub humidity: VecDeque<f64>,
    pub pressure: VecDeque<f64>,
    pub light: VecDeque<f64>,
}

impl History {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    fn push(&mut self, set: &ReadingSet, max_points: usize) {
        let value = |kind| set.value_of(kind).unwrap_or(0.0);

        self.timestamps.push_back(
            set.timestamp
                .with_timezone(&Local)
                .format("%H:%M:%S")
                .to_string(),
        );
        self.temperature.push_back(value(SensorKind::Temperature));
        self.humidity.push_back(value(SensorKind::Humidity));
        self.pressure.push_back(value(SensorKind::Pressure));
        self.light.push_back(value(SensorKind::Light));

        while self.timestamps.len() > max_points {
            self.timestamps.pop_front();
            self.temperature.pop_front();
            self.humidity.pop_front();
            self.pressure.pop_front();
            self.light.pop_front();
        }
    }
}

#[derive(Debug)]
pub struct DashboardState {
    latest: Snapshot,
    history: History,
    history_len: usize,
}

impl DashboardState {
    pub fn new(history_len: usize) -> Self {
        Self {
            latest: Snapshot::default(),
            history: History::default(),
            history_len: history_len.max(1),
        }
    }

    pub fn latest(&self) -> &Snapshot {
        &self.latest
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn apply(&mut self, set: &ReadingSet) {
        let usv = &mut self.latest.usv;
        for reading in &set.readings {
            match reading.name {
                SensorKind::Temperature => usv.temp = reading.value,
                SensorKind::Humidity => usv.humidity = reading.value,
                SensorKind::Pressure => usv.pressure = reading.value,
                SensorKind::Light => usv.light = reading.value,
            }
        }

        self.latest.meta.last_update_ts = Utc::now().timestamp();
        self.latest.meta.source = "station".to_string();
        self.history.push(set, self.history_len);
    }
}

type SharedState = Arc<RwLock<DashboardState>>;

/// Best-effort push side held by the collection loop
#[derive(Debug, Clone)]
pub struct DashboardHandle {
    tx: mpsc::Sender<ReadingSet>,
}

impl DashboardHandle {
    pub fn notify(&self, set: &ReadingSet) {
        match self.tx.try_send(set.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Dashboard busy, skipping update");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Dashboard is not running, update dropped");
            }
        }
    }
}

pub struct Dashboard {
    state: SharedState,
    rx: mpsc::Receiver<ReadingSet>,
}

impl Dashboard {
    pub fn new(history_len: usize, capacity: usize) -> (Dashboard, DashboardHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let dashboard = Dashboard {
            state: Arc::new(RwLock::new(DashboardState::new(history_len))),
            rx,
        };
        (dashboard, DashboardHandle { tx })
    }

    /// Serve HTTP on `listener` and apply updates until shutdown
    pub async fn serve(self, listener: TcpListener, shutdown: Shutdown) {
        let Dashboard { state, mut rx } = self;

        let updater_state = state.clone();
        let updater = tokio::spawn(async move {
            while let Some(set) = rx.recv().await {
                updater_state.write().await.apply(&set);
            }
        });

        if let Ok(addr) = listener.local_addr() {
            info!("Dashboard listening on http://{}", addr);
        }

        let app = create_router(state);
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await;

        if let Err(e) = result {
            error!("Dashboard server error: {}", e);
        }

        updater.abort();
        info!("Dashboard stopped");
    }
}

pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/data", get(get_data))
        .route("/api/history", get(get_history))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn get_data(State(state): State<SharedState>) -> Json<Snapshot> {
    Json(state.read().await.latest().clone())
}

async fn get_history(State(state): State<SharedState>) -> Json<History> {
    Json(state.read().await.history().clone())
}

async fn metrics_handler() -> String {
    gather_metrics()
}
