//! Throttled outbound replication of the local player

use std::sync::Arc;
use tracing::{debug, warn};

use crate::protocol::{PlayerRecord, ProjectileId, ProjectileRecord};
use crate::store::{path, StateStore, StoreError, StorePath};
use crate::util::time::publish_interval_ms;

use super::combat::CombatSystem;

/// Publishes the local player record at a fixed cadence.
///
/// Every publish is a full-record overwrite. `last_update` never moves
/// backwards and `version` grows by one per write.
pub struct ReplicationPublisher {
    store: Arc<dyn StateStore>,
    path: StorePath,
    /// Minimum time between throttled publishes
    interval_ms: f64,
    last_publish_ms: Option<u64>,
    forced: bool,
    version: u64,
    last_update: u64,
    /// Version and health of the last record this client wrote
    last_written: (u64, i32),
    publish_count: u64,
}

impl ReplicationPublisher {
    /// Start publishing for a record the session has just written
    pub fn new(store: Arc<dyn StateStore>, publish_tps: u32, joined: &PlayerRecord) -> Result<Self, StoreError> {
        Ok(Self {
            store,
            path: path::player(&joined.id)?,
            interval_ms: publish_interval_ms(publish_tps),
            last_publish_ms: Some(joined.last_update),
            forced: false,
            version: joined.version,
            last_update: joined.last_update,
            last_written: (joined.version, joined.health),
            publish_count: 0,
        })
    }

    /// Check if the throttle window allows a publish at `now_ms`
    pub fn should_publish(&self, now_ms: u64) -> bool {
        if self.forced {
            return true;
        }
        match self.last_publish_ms {
            Some(last) => now_ms.saturating_sub(last) as f64 >= self.interval_ms,
            None => true,
        }
    }

    /// Publish if the throttle window allows it. Returns whether it did.
    pub fn maybe_publish(&mut self, now_ms: u64, player: &mut PlayerRecord) -> bool {
        if !self.should_publish(now_ms) {
            return false;
        }
        self.publish(now_ms, player);
        true
    }

    /// Publish immediately, outside the throttle (health changes, death, respawn)
    pub fn publish_now(&mut self, now_ms: u64, player: &mut PlayerRecord) {
        self.publish(now_ms, player);
    }

    /// Force a publish on next check
    pub fn force_next(&mut self) {
        self.forced = true;
    }

    /// Move the version counter past a version another client wrote
    pub fn observe_version(&mut self, version: u64) {
        if version > self.version {
            self.version = version;
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether an observed `(version, health)` pair came from someone else.
    ///
    /// Our own echo matches the last write exactly. A pair older than our
    /// last write is a stale read and is not foreign either.
    pub fn is_foreign_write(&self, version: u64, health: i32) -> bool {
        let (own_version, own_health) = self.last_written;
        version > self.version || (version >= own_version && health != own_health)
    }

    pub fn publish_count(&self) -> u64 {
        self.publish_count
    }

    fn publish(&mut self, now_ms: u64, player: &mut PlayerRecord) {
        self.version += 1;
        self.last_update = self.last_update.max(now_ms);
        self.last_publish_ms = Some(now_ms);
        self.forced = false;
        self.publish_count += 1;

        player.version = self.version;
        player.last_update = self.last_update;
        player.health = CombatSystem::apply_damage(player.health, 0, player.max_health).0;
        self.last_written = (self.version, player.health);

        let result = serde_json::to_value(&*player)
            .map_err(StoreError::from)
            .and_then(|value| self.store.set(&self.path, value));
        match result {
            Ok(()) => debug!(player_id = %player.id, version = self.version, "Published player"),
            Err(e) => warn!(player_id = %player.id, error = %e, "Player publish failed, dropping"),
        }
    }

    /// Append a new projectile record; the store assigns its id
    pub fn fire(&self, projectile: &ProjectileRecord) -> Result<ProjectileId, StoreError> {
        let value = serde_json::to_value(projectile)?;
        self.store.push(&path::projectiles(), value)
    }
}
