//! Durable key-value object storage per named partition.
//!
//! Each partition is a directory of one JSON file per record. The
//! in-memory index is authoritative: `insert`/`update`/`delete` mutate it
//! synchronously and enqueue the durable write on a background worker, so
//! callers never block on disk. A crash between update and flush loses at
//! most the unflushed tail; records are stored independently, so other keys
//! are never corrupted.
//!
//! Single owning process assumed. Multiple processes sharing a partition
//! would race last-writer-wins.

pub mod overrides;

pub use overrides::OverrideStore;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A record that can live in an object store partition.
pub trait StoredObject: Clone + Serialize + DeserializeOwned + Send + 'static {
    /// Unique id within the partition.
    fn object_id(&self) -> &str;
}

enum FlushOp {
    Write { id: String, json: String },
    Delete { id: String },
}

pub struct ObjectStore<T: StoredObject> {
    partition: String,
    index: RwLock<HashMap<String, T>>,
    flush_tx: mpsc::UnboundedSender<FlushOp>,
}

impl<T: StoredObject> ObjectStore<T> {
    /// Open a partition under `dir`, loading any previously flushed records
    /// into the index and starting the flush worker.
    ///
    /// Must be called within a tokio runtime.
    pub fn open(dir: &Path, partition: &str) -> Result<Self> {
        let partition_dir = dir.join(partition);
        std::fs::create_dir_all(&partition_dir)
            .with_context(|| format!("Failed to create partition dir: {}", partition))?;

        let mut index = HashMap::new();
        for entry in std::fs::read_dir(&partition_dir)
            .with_context(|| format!("Failed to read partition dir: {}", partition))?
        {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::load_record(&path) {
                Ok(obj) => {
                    index.insert(obj.object_id().to_string(), obj);
                }
                Err(e) => {
                    // A torn or malformed file only loses that one record.
                    warn!(partition = partition, path = %path.display(), error = %e,
                          "Skipping unreadable record");
                }
            }
        }
        debug!(partition = partition, records = index.len(), "Opened partition");

        let (flush_tx, flush_rx) = mpsc::unbounded_channel();
        tokio::spawn(flush_worker(partition.to_string(), partition_dir, flush_rx));

        Ok(Self {
            partition: partition.to_string(),
            index: RwLock::new(index),
            flush_tx,
        })
    }

    fn load_record(path: &Path) -> Result<T> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.index.read().expect("store index poisoned").get(id).cloned()
    }

    pub fn get_all(&self) -> Vec<T> {
        self.index
            .read()
            .expect("store index poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        self.index
            .read()
            .expect("store index poisoned")
            .values()
            .filter(|o| pred(o))
            .cloned()
            .collect()
    }

    /// Insert or replace a record. The index is updated synchronously; the
    /// durable write completes asynchronously.
    pub fn insert(&self, obj: T) {
        let id = obj.object_id().to_string();
        match serde_json::to_string_pretty(&obj) {
            Ok(json) => {
                self.index
                    .write()
                    .expect("store index poisoned")
                    .insert(id.clone(), obj);
                self.enqueue(FlushOp::Write { id, json });
            }
            Err(e) => {
                // Keep the index authoritative even if the record cannot flush.
                warn!(partition = %self.partition, id = %id, error = %e,
                      "Failed to serialize record; kept in memory only");
                self.index
                    .write()
                    .expect("store index poisoned")
                    .insert(id, obj);
            }
        }
    }

    pub fn update(&self, obj: T) {
        self.insert(obj);
    }

    pub fn delete(&self, id: &str) {
        self.index.write().expect("store index poisoned").remove(id);
        self.enqueue(FlushOp::Delete { id: id.to_string() });
    }

    pub fn len(&self) -> usize {
        self.index.read().expect("store index poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn enqueue(&self, op: FlushOp) {
        if self.flush_tx.send(op).is_err() {
            warn!(partition = %self.partition, "Flush worker gone; write not persisted");
        }
    }
}

/// Map a record id to a safe file name.
fn file_name(id: &str) -> String {
    let safe: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}.json", safe)
}

async fn flush_worker(
    partition: String,
    dir: PathBuf,
    mut rx: mpsc::UnboundedReceiver<FlushOp>,
) {
    while let Some(op) = rx.recv().await {
        match op {
            FlushOp::Write { id, json } => {
                let path = dir.join(file_name(&id));
                if let Err(e) = std::fs::write(&path, &json) {
                    warn!(partition = %partition, id = %id, error = %e,
                          "Failed to flush record");
                }
            }
            FlushOp::Delete { id } => {
                let path = dir.join(file_name(&id));
                if let Err(e) = std::fs::remove_file(&path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(partition = %partition, id = %id, error = %e,
                              "Failed to delete record");
                    }
                }
            }
        }
    }
    debug!(partition = %partition, "Flush worker stopped");
}
