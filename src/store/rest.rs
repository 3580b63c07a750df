//! REST backend for a Firebase-compatible realtime database
//!
//! Writes go onto a per-store queue and are never awaited by the caller. One
//! task sends them in the order they were queued, so a client's own writes
//! cannot overtake each other; a failed write is logged and dropped.
//! Subscriptions poll the watched path and deliver the value whenever it
//! changes.

use parking_lot::Mutex;
use reqwest::{Client, RequestBuilder};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::util::push_id::PushIdGenerator;
use crate::util::time::unix_millis;

use super::{StateStore, StoreError, StoreEvent, StorePath, Subscription};

/// Realtime database client over its REST interface
#[derive(Clone)]
pub struct RestStore {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
    poll_interval: Duration,
    runtime: Handle,
    ids: Arc<Mutex<PushIdGenerator>>,
    writes: mpsc::UnboundedSender<PendingWrite>,
}

/// A write waiting its turn on the queue
struct PendingWrite {
    op: &'static str,
    path: StorePath,
    request: RequestBuilder,
}

impl RestStore {
    /// Must be called from within a tokio runtime
    pub fn new(
        base_url: &str,
        auth_token: Option<String>,
        poll_interval: Duration,
    ) -> Result<Self, StoreError> {
        let runtime = Handle::try_current().map_err(|_| StoreError::NoRuntime)?;
        let (writes, queue) = mpsc::unbounded_channel();
        runtime.spawn(drain_in_order(queue, |write: PendingWrite| async move {
            match send(write.request).await {
                Ok(_) => debug!(op = write.op, path = %write.path, "Store write completed"),
                Err(e) => warn!(op = write.op, path = %write.path, error = %e, "Store write failed, dropping"),
            }
        }));
        Ok(Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
            poll_interval,
            runtime,
            ids: Arc::new(Mutex::new(PushIdGenerator::new())),
            writes,
        })
    }

    /// Get the JSON endpoint for a path
    fn node_url(&self, path: &StorePath) -> String {
        match &self.auth_token {
            Some(token) => format!("{}/{}.json?auth={}", self.base_url, path, token),
            None => format!("{}/{}.json", self.base_url, path),
        }
    }

    /// Read the current value at a path
    pub async fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        let response = send(self.client.get(self.node_url(path))).await?;
        let value: Value = response.json().await.map_err(StoreError::Request)?;
        Ok((!value.is_null()).then_some(value))
    }

    /// Queue a write behind every earlier one without waiting for it
    fn queue_write(&self, op: &'static str, path: &StorePath, request: RequestBuilder) -> Result<(), StoreError> {
        let write = PendingWrite {
            op,
            path: path.clone(),
            request,
        };
        self.writes
            .send(write)
            .map_err(|_| StoreError::Unavailable("write queue closed".into()))
    }
}

/// Run queued items one at a time, in the order they were queued
async fn drain_in_order<T, F, Fut>(mut queue: mpsc::UnboundedReceiver<T>, mut run: F)
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = ()>,
{
    while let Some(item) = queue.recv().await {
        run(item).await;
    }
}

/// Send a request and map non-success statuses to errors
async fn send(request: RequestBuilder) -> Result<reqwest::Response, StoreError> {
    let response = request.send().await.map_err(StoreError::Request)?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::Api {
            status: status.as_u16(),
            body,
        });
    }

    Ok(response)
}

impl StateStore for RestStore {
    fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        let request = self.client.put(self.node_url(path)).json(&value);
        self.queue_write("set", path, request)
    }

    fn update(&self, path: &StorePath, fields: Map<String, Value>) -> Result<(), StoreError> {
        let request = self.client.patch(self.node_url(path)).json(&fields);
        self.queue_write("update", path, request)
    }

    fn push(&self, path: &StorePath, value: Value) -> Result<String, StoreError> {
        // Keys are minted client-side so the caller learns the id immediately
        let key = self.ids.lock().next_id(unix_millis());
        let child = path.child(&key)?;
        let request = self.client.put(self.node_url(&child)).json(&value);
        self.queue_write("push", &child, request)?;
        Ok(key)
    }

    fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        let request = self.client.delete(self.node_url(path));
        self.queue_write("remove", path, request)
    }

    fn subscribe(&self, path: &StorePath) -> Result<Subscription, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = self.clone();
        let watched = path.clone();

        let task = self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(store.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last: Option<Option<Value>> = None;

            loop {
                ticker.tick().await;
                match store.get(&watched).await {
                    Ok(value) => {
                        if last.as_ref() == Some(&value) {
                            continue;
                        }
                        last = Some(value.clone());
                        let event = StoreEvent {
                            path: watched.clone(),
                            value,
                        };
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(path = %watched, error = %e, "Store poll failed"),
                }
            }
        });

        let abort = task.abort_handle();
        Ok(Subscription::new(path.clone(), rx, move || abort.abort()))
    }
}
