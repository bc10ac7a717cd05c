#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Task progression channel shared by the MODL crates.
//!
//! Long-running computations (class statistics, benchmarks) report their main
//! label, current label, progression percentage and user messages through a
//! [`ProgressPublisher`]. Front ends subscribe to the in-memory bus or tail the
//! JSON-lines file written by [`FileProgressPublisher`].

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::broadcast};

/// Kind of progression update.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    /// Title of the running task.
    MainLabel,
    /// Current step inside the task.
    Label,
    /// Progression percentage in `[0, 100]`.
    Progression,
    /// Free-form user message.
    Message,
}

/// Progress record encoded as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Unique identifier (uuid).
    pub id: String,
    /// Component producing the event.
    pub source: String,
    /// Update kind.
    pub kind: ProgressKind,
    /// ISO timestamp.
    pub timestamp: String,
    /// Arbitrary JSON payload (`{"label": ..}` or `{"percent": ..}`).
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ProgressEvent {
    /// Text label carried by label-like events.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.payload.get("label").and_then(serde_json::Value::as_str)
    }

    /// Percentage carried by progression events.
    #[must_use]
    pub fn percent(&self) -> Option<f64> {
        self.payload
            .get("percent")
            .and_then(serde_json::Value::as_f64)
    }
}

/// Progress publisher interface.
#[async_trait]
pub trait ProgressPublisher: Send + Sync {
    /// Publishes a progress event.
    async fn publish(&self, event: ProgressEvent) -> Result<()>;
}

/// Progress subscriber interface.
#[async_trait]
pub trait ProgressSubscriber: Send + Sync {
    /// Returns a receiver streaming the events published after the call.
    async fn subscribe(&self) -> Result<broadcast::Receiver<ProgressEvent>>;
}

/// In-memory broadcast bus keeping a bounded backlog.
#[derive(Debug, Clone)]
pub struct MemoryProgressBus {
    sender: broadcast::Sender<ProgressEvent>,
    backlog: Arc<Mutex<VecDeque<ProgressEvent>>>,
    capacity: usize,
}

impl MemoryProgressBus {
    /// Creates a new bus with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            backlog: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Snapshot of recent events retained in memory.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ProgressEvent> {
        self.backlog.lock().iter().cloned().collect()
    }

    /// Last published event of the given kind.
    #[must_use]
    pub fn last_of(&self, kind: ProgressKind) -> Option<ProgressEvent> {
        self.backlog
            .lock()
            .iter()
            .rev()
            .find(|event| event.kind == kind)
            .cloned()
    }
}

/// File-backed publisher appending JSON lines.
#[derive(Debug, Clone)]
pub struct FileProgressPublisher {
    path: PathBuf,
}

impl FileProgressPublisher {
    /// Creates a publisher that appends JSON lines to the given path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    /// Target file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ProgressPublisher for MemoryProgressBus {
    async fn publish(&self, event: ProgressEvent) -> Result<()> {
        {
            let mut backlog = self.backlog.lock();
            backlog.push_back(event.clone());
            while backlog.len() > self.capacity {
                backlog.pop_front();
            }
        }
        // No receiver is not an error.
        let _ = self.sender.send(event);
        Ok(())
    }
}

#[async_trait]
impl ProgressSubscriber for MemoryProgressBus {
    async fn subscribe(&self) -> Result<broadcast::Receiver<ProgressEvent>> {
        Ok(self.sender.subscribe())
    }
}

#[async_trait]
impl ProgressPublisher for FileProgressPublisher {
    async fn publish(&self, event: ProgressEvent) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let data = serde_json::to_vec(&event)?;
        file.write_all(&data).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }
}
