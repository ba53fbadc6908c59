//! One-way notifications from the collection core to the data logger.

use crate::model::ReadingSet;
use chrono::{DateTime, Local, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum StationEvent {
    /// A tick finished; `success` is whether the fresh set was acknowledged
    Collected { set: ReadingSet, success: bool },
    /// The collector acknowledged a delivery at `at`
    UploadMarked { at: DateTime<Utc> },
}

/// Sending half handed to the loop and the uplink client
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Option<mpsc::UnboundedSender<StationEvent>>,
}

impl EventSender {
    pub fn channel() -> (EventSender, mpsc::UnboundedReceiver<StationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSender { tx: Some(tx) }, rx)
    }

    /// Sender whose events go nowhere
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    pub fn collected(&self, set: &ReadingSet, success: bool) {
        self.emit(StationEvent::Collected {
            set: set.clone(),
            success,
        });
    }

    pub fn upload_marked(&self, at: DateTime<Utc>) {
        self.emit(StationEvent::UploadMarked { at });
    }

    fn emit(&self, event: StationEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                debug!("Event receiver gone, dropping event");
            }
        }
    }
}

/// Records readings and upload outcomes
#[derive(Debug)]
pub struct DataLogger {
    backup_dir: Option<PathBuf>,
    last_successful_upload: Option<DateTime<Utc>>,
    logged: u64,
}

impl DataLogger {
    pub fn new(backup_dir: Option<PathBuf>) -> Self {
        Self {
            backup_dir,
            last_successful_upload: None,
            logged: 0,
        }
    }

    pub fn last_successful_upload(&self) -> Option<DateTime<Utc>> {
        self.last_successful_upload
    }

    pub fn logged(&self) -> u64 {
        self.logged
    }

    /// Consume events until every sender is dropped
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<StationEvent>) -> Self {
        while let Some(event) = rx.recv().await {
            self.handle(event);
        }
        debug!("Data logger stopped");
        self
    }

    pub fn handle(&mut self, event: StationEvent) {
        match event {
            StationEvent::Collected { set, success } => {
                self.log_reading_set(&set, success);
                if let Some(dir) = &self.backup_dir {
                    if let Err(e) = backup(dir, &set) {
                        error!("Failed to back up reading set: {}", e);
                    }
                }
                self.logged += 1;
            }
            StationEvent::UploadMarked { at } => {
                self.last_successful_upload = Some(at);
                info!("Upload marked successful (TS: {})", at.timestamp());
            }
        }
    }

    fn log_reading_set(&self, set: &ReadingSet, success: bool) {
        info!("Collected at: {}", set.timestamp.to_rfc3339());
        for reading in &set.readings {
            info!("  {}: {} {}", reading.name, reading.value, reading.unit);
        }

        if success {
            info!("  Upload status: delivered");
        } else {
            warn!("  Upload status: failed");
        }
    }
}

/// Append one JSON line to the day's backup file
fn backup(dir: &Path, set: &ReadingSet) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let file = dir.join(format!("{}.jsonl", Local::now().format("%Y-%m-%d")));

    let mut line = serde_json::to_vec(set)?;
    line.push(b'\n');

    let mut out = OpenOptions::new().create(true).append(true).open(&file)?;
    out.write_all(&line)?;
    debug!("Reading set backed up to {}", file.display());
    Ok(())
}
