//! Durable FIFO of reading sets that could not be delivered.
//!
//! The whole queue is rewritten on every mutation as a JSON array, via a
//! temporary file renamed over the store so an abrupt exit never leaves a
//! half-written file behind. Write failures leave the in-memory queue
//! authoritative; the next mutation (or `flush`) writes it out again.

use crate::errors::{Error, Result};
use crate::metrics::SPILL_QUEUE_DEPTH;
use crate::model::ReadingSet;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub struct SpillQueue {
    path: Option<PathBuf>,
    entries: VecDeque<ReadingSet>,
    dirty: bool,
}

impl SpillQueue {
    /// Queue that is never persisted
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: VecDeque::new(),
            dirty: false,
        }
    }

    /// Reload the queue from `path`. A missing or unreadable store yields
    /// an empty queue rather than an error.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match read_store(&path) {
            Ok(Some(entries)) => {
                if !entries.is_empty() {
                    info!(
                        "Loaded {} undelivered reading sets from {}",
                        entries.len(),
                        path.display()
                    );
                }
                entries
            }
            Ok(None) => {
                debug!("No spill store at {}, starting empty", path.display());
                VecDeque::new()
            }
            Err(e) => {
                warn!(
                    "Failed to load spill store {}: {}. Starting with an empty queue",
                    path.display(),
                    e
                );
                VecDeque::new()
            }
        };

        let queue = Self {
            path: Some(path),
            entries,
            dirty: false,
        };
        queue.update_gauge();
        queue
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when the last write to the store failed
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReadingSet> {
        self.entries.iter()
    }

    /// Add to the tail and persist before returning. The entry is kept in
    /// memory even if persisting fails.
    pub fn append(&mut self, set: ReadingSet) -> Result<()> {
        self.entries.push_back(set);
        self.update_gauge();
        self.persist()
    }

    pub fn peek_oldest(&self) -> Option<&ReadingSet> {
        self.entries.front()
    }

    /// Remove the head and persist. Only call after the head was delivered.
    pub fn remove_oldest(&mut self) -> Result<Option<ReadingSet>> {
        let removed = self.entries.pop_front();
        if removed.is_none() {
            return Ok(None);
        }
        self.update_gauge();
        self.persist()?;
        Ok(removed)
    }

    /// Retry a write that previously failed
    pub fn flush(&mut self) -> Result<()> {
        if self.dirty {
            self.persist()
        } else {
            Ok(())
        }
    }

    fn persist(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        match write_store(path, &self.entries) {
            Ok(()) => {
                if self.dirty {
                    info!("Spill store {} written again after earlier failure", path.display());
                }
                self.dirty = false;
                debug!("Persisted {} entries to {}", self.entries.len(), path.display());
                Ok(())
            }
            Err(e) => {
                self.dirty = true;
                error!("Failed to persist spill store {}: {}", path.display(), e);
                Err(Error::Persistence(format!("{}: {}", path.display(), e)))
            }
        }
    }

    fn update_gauge(&self) {
        SPILL_QUEUE_DEPTH.set(self.entries.len() as f64);
    }
}

fn read_store(path: &Path) -> Result<Option<VecDeque<ReadingSet>>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Some(VecDeque::new()));
    }

    let entries: VecDeque<ReadingSet> = serde_json::from_slice(&bytes)?;
    Ok(Some(entries))
}

fn write_store(path: &Path, entries: &VecDeque<ReadingSet>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let encoded = serde_json::to_vec_pretty(entries)?;
    let tmp = tmp_path(path);
    fs::write(&tmp, encoded)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
