use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use pushmon_common::types::{Metric, MetricValue};

use crate::error::StorageError;
use crate::MetricStore;

/// In-memory metric store with optional JSON snapshot durability.
///
/// The map and the snapshot file handle live behind one mutex, so a flush
/// always observes a fully-applied mutation and the file has exactly one
/// writer. With `sync_save`, every successful mutation rewrites the snapshot
/// before returning; otherwise the server's periodic ticker calls [`save`].
///
/// [`save`]: MetricStore::save
pub struct MemoryStore {
    sync_save: bool,
    inner: Mutex<Inner>,
}

struct Inner {
    metrics: HashMap<String, Metric>,
    snapshot: Option<File>,
}

impl MemoryStore {
    /// Opens the store over `initial` state. When `path` is set, the snapshot
    /// file is created (and truncated) up front; restore the previous
    /// contents with [`restore_snapshot`] *before* constructing the store.
    pub fn new(
        initial: HashMap<String, Metric>,
        sync_save: bool,
        path: Option<&Path>,
    ) -> Result<Self, StorageError> {
        let snapshot = match path {
            Some(path) => Some(open_snapshot(path)?),
            None => None,
        };
        Ok(Self {
            sync_save,
            inner: Mutex::new(Inner {
                metrics: initial,
                snapshot,
            }),
        })
    }
}

fn open_snapshot(path: &Path) -> Result<File, StorageError> {
    let mut options = OpenOptions::new();
    options.create(true).truncate(true).read(true).write(true);
    match options.open(path) {
        Ok(file) => Ok(file),
        Err(err) => {
            let Some(dir) = path.parent() else {
                return Err(err.into());
            };
            tracing::info!(path = %path.display(), error = %err, "snapshot open failed, creating parent directory");
            fs::create_dir_all(dir)?;
            Ok(options.open(path)?)
        }
    }
}

/// Reads a snapshot file into an initial metric map.
///
/// A missing, empty, or corrupt file is logged and yields an empty map; a
/// broken snapshot must never keep the server from starting.
pub fn restore_snapshot(path: &Path) -> HashMap<String, Metric> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "snapshot not readable, starting empty");
            return HashMap::new();
        }
    };
    if data.is_empty() {
        tracing::warn!(path = %path.display(), "snapshot is empty, starting empty");
        return HashMap::new();
    }
    match serde_json::from_slice(&data) {
        Ok(metrics) => {
            tracing::info!(path = %path.display(), "metrics restored from snapshot");
            metrics
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "snapshot is corrupt, starting empty");
            HashMap::new()
        }
    }
}

impl Inner {
    fn merge(&mut self, metric: Metric) {
        match metric.value {
            MetricValue::Gauge(_) => {
                self.metrics.insert(metric.id.clone(), metric);
            }
            MetricValue::Counter(delta) => match self.metrics.get_mut(&metric.id) {
                Some(Metric {
                    value: MetricValue::Counter(total),
                    ..
                }) => *total = total.saturating_add(delta),
                // Absent, or the stored entry was a gauge: the incoming
                // metric becomes the stored entry verbatim.
                _ => {
                    self.metrics.insert(metric.id.clone(), metric);
                }
            },
        }
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        let Some(file) = self.snapshot.as_mut() else {
            return Ok(());
        };
        // Truncate-and-rewrite: the file is the full state in one object.
        file.seek(SeekFrom::Start(0))?;
        file.set_len(0)?;
        serde_json::to_writer(&mut *file, &self.metrics)?;
        file.flush()?;
        Ok(())
    }
}

impl MetricStore for MemoryStore {
    fn get(&self, id: &str) -> Option<Metric> {
        self.inner.lock().unwrap().metrics.get(id).cloned()
    }

    fn get_all(&self) -> HashMap<String, Metric> {
        self.inner.lock().unwrap().metrics.clone()
    }

    fn set(&self, metric: Metric) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        inner.merge(metric);
        if self.sync_save {
            inner.flush()?;
        }
        Ok(())
    }

    fn set_all(&self, batch: &[Metric]) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        for metric in batch {
            inner.merge(metric.clone());
        }
        if self.sync_save {
            inner.flush()?;
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.inner.lock().unwrap().metrics.remove(id);
        Ok(())
    }

    fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn save(&self) -> Result<(), StorageError> {
        self.inner.lock().unwrap().flush()
    }
}
