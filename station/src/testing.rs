//! Test doubles shared by the unit tests.

use crate::errors::Result;
use crate::model::ReadingSet;
use crate::transport::{Ack, Transport};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::time::Instant;

/// Replays scripted outcomes, succeeding once the script runs out
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<Ack>>>,
    sent: Mutex<Vec<(Instant, ReadingSet)>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<Ack>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent_sets(&self) -> Vec<ReadingSet> {
        self.sent.lock().unwrap().iter().map(|(_, s)| s.clone()).collect()
    }

    pub fn sent_at(&self) -> Vec<Instant> {
        self.sent.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }
}

impl Transport for ScriptedTransport {
    async fn send(&self, set: &ReadingSet) -> Result<Ack> {
        self.sent.lock().unwrap().push((Instant::now(), set.clone()));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Ack { server_ts: None }))
    }

    fn target(&self) -> String {
        "scripted".to_string()
    }
}
