//! In-process store with the same write/subscribe semantics as the REST backend
//!
//! Every client holding a clone sees the same tree. Subscribers receive the
//! whole watched subtree after each overlapping write, in write order.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::util::push_id::PushIdGenerator;
use crate::util::time::unix_millis;

use super::{StateStore, StoreError, StoreEvent, StorePath, Subscription};

struct Subscriber {
    path: StorePath,
    tx: mpsc::UnboundedSender<StoreEvent>,
}

struct Inner {
    root: Mutex<Value>,
    subscribers: DashMap<u64, Subscriber>,
    next_subscriber: AtomicU64,
    ids: Mutex<PushIdGenerator>,
    failing: AtomicBool,
}

/// Shared in-memory store
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_ids(PushIdGenerator::new())
    }

    /// Store with deterministic push keys
    pub fn seeded(seed: u64) -> Self {
        Self::with_ids(PushIdGenerator::seeded(seed))
    }

    fn with_ids(ids: PushIdGenerator) -> Self {
        Self {
            inner: Arc::new(Inner {
                root: Mutex::new(Value::Object(Map::new())),
                subscribers: DashMap::new(),
                next_subscriber: AtomicU64::new(1),
                ids: Mutex::new(ids),
                failing: AtomicBool::new(false),
            }),
        }
    }

    /// Make every write fail until switched back, as a dropped connection would
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::Relaxed);
    }

    /// Current value at `path`
    pub fn read(&self, path: &StorePath) -> Option<Value> {
        let root = self.inner.root.lock();
        lookup(&root, path).cloned()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.inner.failing.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("write rejected".to_string()));
        }
        Ok(())
    }

    /// Apply a mutation to the tree, then fan out to overlapping watchers
    fn mutate(&self, path: &StorePath, op: impl FnOnce(&mut Value)) {
        let events: Vec<(u64, StoreEvent)> = {
            let mut root = self.inner.root.lock();
            op(&mut root);
            self.inner
                .subscribers
                .iter()
                .filter(|entry| entry.value().path.overlaps(path))
                .map(|entry| {
                    let watched = entry.value().path.clone();
                    let value = lookup(&root, &watched).cloned();
                    (*entry.key(), StoreEvent { path: watched, value })
                })
                .collect()
        };

        let mut closed = Vec::new();
        for (id, event) in events {
            if let Some(subscriber) = self.inner.subscribers.get(&id) {
                if subscriber.tx.send(event).is_err() {
                    closed.push(id);
                }
            }
        }
        for id in closed {
            self.inner.subscribers.remove(&id);
        }
        trace!(path = %path, "Store write applied");
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for MemoryStore {
    fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        self.check_available()?;
        self.mutate(path, |root| write_at(root, path, value));
        Ok(())
    }

    fn update(&self, path: &StorePath, fields: Map<String, Value>) -> Result<(), StoreError> {
        self.check_available()?;
        let children = fields
            .into_iter()
            .map(|(key, value)| Ok((path.child(&key)?, value)))
            .collect::<Result<Vec<_>, StoreError>>()?;
        self.mutate(path, |root| {
            for (child, value) in children {
                write_at(root, &child, value);
            }
        });
        Ok(())
    }

    fn push(&self, path: &StorePath, value: Value) -> Result<String, StoreError> {
        self.check_available()?;
        let key = self.inner.ids.lock().next_id(unix_millis());
        let child = path.child(&key)?;
        self.mutate(&child, |root| write_at(root, &child, value));
        Ok(key)
    }

    fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        self.check_available()?;
        self.mutate(path, |root| {
            let segments: Vec<&str> = path.segments().collect();
            remove_at(root, &segments);
        });
        Ok(())
    }

    fn subscribe(&self, path: &StorePath) -> Result<Subscription, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);

        // Current value first, like a fresh listener attach. The tree stays
        // locked until the subscriber is registered so no write falls between.
        {
            let root = self.inner.root.lock();
            let _ = tx.send(StoreEvent {
                path: path.clone(),
                value: lookup(&root, path).cloned(),
            });
            self.inner.subscribers.insert(
                id,
                Subscriber {
                    path: path.clone(),
                    tx,
                },
            );
        }
        debug!(path = %path, subscriber = id, "Subscribed");

        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        Ok(Subscription::new(path.clone(), rx, move || {
            if let Some(inner) = inner.upgrade() {
                inner.subscribers.remove(&id);
            }
        }))
    }
}

fn lookup<'a>(root: &'a Value, path: &StorePath) -> Option<&'a Value> {
    path.segments()
        .try_fold(root, |node, segment| node.as_object()?.get(segment))
}

/// Write `value` at `path`, creating parents; `null` deletes
fn write_at(root: &mut Value, path: &StorePath, value: Value) {
    let segments: Vec<&str> = path.segments().collect();
    if value.is_null() {
        remove_at(root, &segments);
        return;
    }
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut node = root;
    for segment in parents {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        node = match node {
            Value::Object(map) => map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => return,
        };
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        map.insert(last.to_string(), value);
    }
}

/// Delete a key and prune parents left empty. Missing keys are a no-op.
fn remove_at(node: &mut Value, segments: &[&str]) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return false;
    };
    let Some(map) = node.as_object_mut() else {
        return false;
    };
    if rest.is_empty() {
        return map.remove(*first).is_some();
    }
    let Some(child) = map.get_mut(*first) else {
        return false;
    };
    let removed = remove_at(child, rest);
    if child.as_object().is_some_and(Map::is_empty) {
        map.remove(*first);
    }
    removed
}
