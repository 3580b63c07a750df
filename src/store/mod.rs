//! Keyed real-time store abstraction and backends

pub mod memory;
pub mod path;
pub mod rest;

pub use memory::MemoryStore;
pub use path::StorePath;
pub use rest::RestStore;

use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// A keyed real-time store with push/subscribe semantics.
///
/// Writes are last-write-wins per path. `Ok` from a write means the store
/// accepted the operation; backends that complete writes asynchronously log
/// later failures instead of reporting them. There are no retries.
pub trait StateStore: Send + Sync {
    /// Overwrite the value at `path`
    fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError>;

    /// Overwrite only the given child fields of `path`
    fn update(&self, path: &StorePath, fields: Map<String, Value>) -> Result<(), StoreError>;

    /// Append `value` under a fresh store-assigned key and return the key
    fn push(&self, path: &StorePath, value: Value) -> Result<String, StoreError>;

    /// Delete `path`; deleting a missing path succeeds
    fn remove(&self, path: &StorePath) -> Result<(), StoreError>;

    /// Watch `path`; the current value is delivered first, then every change
    fn subscribe(&self, path: &StorePath) -> Result<Subscription, StoreError>;
}

/// Value of a watched path after a change (`None` when the path is empty)
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEvent {
    pub path: StorePath,
    pub value: Option<Value>,
}

/// Handle to an active subscription.
///
/// Events queue until drained. Dropping the handle unsubscribes.
pub struct Subscription {
    path: StorePath,
    rx: mpsc::UnboundedReceiver<StoreEvent>,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        path: StorePath,
        rx: mpsc::UnboundedReceiver<StoreEvent>,
        cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            path,
            rx,
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn path(&self) -> &StorePath {
        &self.path
    }

    /// Next queued event, if any
    pub fn try_next(&mut self) -> Option<StoreEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain the queue and keep only the newest event.
    ///
    /// Each event carries the whole watched subtree, so older ones are
    /// superseded.
    pub fn drain_latest(&mut self) -> Option<StoreEvent> {
        let mut latest = None;
        while let Some(event) = self.try_next() {
            latest = Some(event);
        }
        latest
    }

    /// Wait for the next event
    pub async fn next(&mut self) -> Option<StoreEvent> {
        self.rx.recv().await
    }

    /// Stop receiving events
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("path", &self.path)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid store path: {0}")]
    InvalidPath(String),

    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("No async runtime available for store I/O")]
    NoRuntime,
}
