//! Projectile lifecycle - spawn, dead reckoning, retirement
//!
//! Every client tracks every projectile and may retire any of them. Deletion
//! is first-writer-wins: whoever sees a projectile leave the playfield or hit
//! something removes its record, and everyone else treats the vanished id as
//! retired. A retired id is tombstoned so a late snapshot cannot bring it back.

use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::protocol::{PlayerId, ProjectileId, ProjectilePatch, ProjectileRecord};
use crate::store::{path, StateStore};
use crate::util::time::{elapsed_secs, FORGET_AFTER_MS};

use super::physics::{dead_reckon, heading_velocity, Playfield};

/// Lifecycle phase of a projectile as seen by this client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectilePhase {
    /// Created this frame, locally or from a first snapshot
    Spawned,
    /// Advanced by dead reckoning
    Tracked,
    /// Gone; only the tombstone remains
    Retired,
}

/// Why a projectile was retired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetireReason {
    OutOfBounds,
    Hit,
    /// Record disappeared from the store
    Vanished,
    Reset,
}

#[derive(Debug, Clone)]
pub struct TrackedProjectile {
    pub id: ProjectileId,
    pub record: ProjectileRecord,
    pub phase: ProjectilePhase,
    /// Spawned by this client
    pub owned: bool,
    /// Seen in a store snapshot at least once
    confirmed: bool,
    last_sync_ms: u64,
}

impl TrackedProjectile {
    /// Dead-reckoned position at `now_ms`
    pub fn position_at(&self, now_ms: u64) -> (f32, f32) {
        dead_reckon(
            (self.record.x, self.record.y),
            heading_velocity(self.record.angle, self.record.speed),
            elapsed_secs(self.record.last_update, now_ms),
        )
    }
}

/// Outcome of one ingestion pass
#[derive(Debug, Default)]
pub struct ProjectileReport {
    pub spawned: Vec<ProjectileId>,
    pub vanished: Vec<ProjectileId>,
    /// Tombstoned ids found back in the store and removed again
    pub purged: Vec<ProjectileId>,
}

pub struct ProjectileLifecycle {
    store: Arc<dyn StateStore>,
    playfield: Playfield,
    sync_interval_ms: u64,
    default_damage: i32,
    local_id: Option<PlayerId>,
    live: HashMap<ProjectileId, TrackedProjectile>,
    /// Retired ids and when each was last retired or seen in the store
    tombstones: HashMap<ProjectileId, u64>,
    /// Latest time passed to `ingest` or `advance`
    clock_ms: u64,
}

impl ProjectileLifecycle {
    pub fn new(
        store: Arc<dyn StateStore>,
        playfield: Playfield,
        sync_interval_ms: u64,
        default_damage: i32,
    ) -> Self {
        Self {
            store,
            playfield,
            sync_interval_ms,
            default_damage,
            local_id: None,
            live: HashMap::new(),
            tombstones: HashMap::new(),
            clock_ms: 0,
        }
    }

    pub fn set_local_id(&mut self, local_id: Option<PlayerId>) {
        self.local_id = local_id;
    }

    /// Track a projectile this client just pushed
    pub fn spawn_local(&mut self, id: ProjectileId, record: ProjectileRecord, now_ms: u64) {
        debug!(projectile_id = %id, angle = record.angle, "Projectile fired");
        self.live.insert(
            id.clone(),
            TrackedProjectile {
                id,
                record,
                phase: ProjectilePhase::Spawned,
                owned: true,
                confirmed: false,
                last_sync_ms: now_ms,
            },
        );
    }

    /// Apply the `projectiles` map of a game-state snapshot
    pub fn ingest(&mut self, projectiles: Option<&Map<String, Value>>, now_ms: u64) -> ProjectileReport {
        let mut report = ProjectileReport::default();
        let empty = Map::new();
        let projectiles = projectiles.unwrap_or(&empty);
        self.clock_ms = self.clock_ms.max(now_ms);

        for (id, value) in projectiles {
            if let Some(seen) = self.tombstones.get_mut(id) {
                // A refresh racing the delete recreated a partial record
                *seen = now_ms;
                self.delete_record(id);
                report.purged.push(id.clone());
                continue;
            }

            let patch: ProjectilePatch = match serde_json::from_value(value.clone()) {
                Ok(patch) => patch,
                Err(e) => {
                    warn!(projectile_id = %id, error = %e, "Ignoring malformed projectile record");
                    continue;
                }
            };

            match self.live.get_mut(id) {
                Some(tracked) => {
                    tracked.confirmed = true;
                    // The owner's copy is authoritative; remote refreshes only move forward
                    let newer = patch.last_update.map_or(false, |t| t >= tracked.record.last_update);
                    if !tracked.owned && newer {
                        patch.merge_into(&mut tracked.record);
                    }
                }
                None => match patch.into_record(self.default_damage) {
                    Some(record) => {
                        let owned = self.local_id.as_deref() == Some(record.owner_id.as_str());
                        debug!(projectile_id = %id, owner = %record.owner_id, "Remote projectile appeared");
                        self.live.insert(
                            id.clone(),
                            TrackedProjectile {
                                id: id.clone(),
                                record,
                                phase: ProjectilePhase::Spawned,
                                owned,
                                confirmed: true,
                                last_sync_ms: now_ms,
                            },
                        );
                        report.spawned.push(id.clone());
                    }
                    None => debug!(projectile_id = %id, "Skipping projectile without trajectory"),
                },
            }
        }

        // Only ids the store has shown us can vanish from it
        let vanished: Vec<ProjectileId> = self
            .live
            .values()
            .filter(|p| p.confirmed && !projectiles.contains_key(p.id.as_str()))
            .map(|p| p.id.clone())
            .collect();
        for id in vanished {
            self.forget(&id, RetireReason::Vanished);
            report.vanished.push(id);
        }

        let before = self.tombstones.len();
        self.tombstones
            .retain(|id, seen| projectiles.contains_key(id) || now_ms.saturating_sub(*seen) < FORGET_AFTER_MS);
        if self.tombstones.len() < before {
            debug!(count = before - self.tombstones.len(), "Forgot old tombstones");
        }

        report
    }

    /// Advance every projectile to `now_ms`. Returns ids retired for leaving the playfield.
    pub fn advance(&mut self, now_ms: u64) -> Vec<ProjectileId> {
        let mut out_of_bounds = Vec::new();
        self.clock_ms = self.clock_ms.max(now_ms);

        for tracked in self.live.values_mut() {
            if tracked.phase == ProjectilePhase::Spawned {
                tracked.phase = ProjectilePhase::Tracked;
            }

            let (x, y) = tracked.position_at(now_ms);
            if !self.playfield.contains(x, y) {
                out_of_bounds.push(tracked.id.clone());
                continue;
            }

            if tracked.owned && now_ms.saturating_sub(tracked.last_sync_ms) >= self.sync_interval_ms {
                tracked.record.x = x;
                tracked.record.y = y;
                tracked.record.last_update = tracked.record.last_update.max(now_ms);
                tracked.last_sync_ms = now_ms;

                let mut fields = Map::new();
                fields.insert("x".into(), json!(x));
                fields.insert("y".into(), json!(y));
                fields.insert("lastUpdate".into(), json!(tracked.record.last_update));
                let result = path::projectile(&tracked.id).and_then(|p| self.store.update(&p, fields));
                if let Err(e) = result {
                    warn!(projectile_id = %tracked.id, error = %e, "Projectile refresh failed, dropping");
                }
            }
        }

        for id in &out_of_bounds {
            self.retire(id, RetireReason::OutOfBounds);
        }
        out_of_bounds
    }

    /// Retire a projectile and delete its record.
    ///
    /// Returns false when the id is unknown or already retired; that case
    /// touches nothing.
    pub fn retire(&mut self, id: &str, reason: RetireReason) -> bool {
        if self.tombstones.contains_key(id) || !self.live.contains_key(id) {
            return false;
        }
        self.forget(id, reason);
        self.delete_record(id);
        true
    }

    fn forget(&mut self, id: &str, reason: RetireReason) {
        if self.live.remove(id).is_some() {
            debug!(projectile_id = %id, ?reason, "Projectile retired");
        }
        self.tombstones.insert(id.to_string(), self.clock_ms);
    }

    fn delete_record(&self, id: &str) {
        let result = path::projectile(id).and_then(|p| self.store.remove(&p));
        if let Err(e) = result {
            warn!(projectile_id = %id, error = %e, "Projectile delete failed, dropping");
        }
    }

    pub fn get(&self, id: &str) -> Option<&TrackedProjectile> {
        self.live.get(id)
    }

    /// Phase of any id this client has seen
    pub fn phase(&self, id: &str) -> Option<ProjectilePhase> {
        match self.live.get(id) {
            Some(tracked) => Some(tracked.phase),
            None if self.tombstones.contains_key(id) => Some(ProjectilePhase::Retired),
            None => None,
        }
    }

    pub fn live(&self) -> impl Iterator<Item = &TrackedProjectile> {
        self.live.values()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Drop everything after the aggregate was reset
    pub fn clear(&mut self) {
        if !self.live.is_empty() {
            info!(count = self.live.len(), reason = ?RetireReason::Reset, "Dropping tracked projectiles");
        }
        self.live.clear();
        self.tombstones.clear();
    }
}
