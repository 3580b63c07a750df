//! Remote player ingestion and dead reckoning
//!
//! Each remote player is mirrored by a shadow. A first sighting is drawn
//! verbatim. Every later snapshot becomes the new extrapolation baseline:
//! position runs forward along the published velocity, rotation is taken as
//! published. There is no smoothing between baselines.

use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

use crate::protocol::{PlayerId, PlayerPatch, PlayerRecord};
use crate::util::time::elapsed_secs;

use super::physics::dead_reckon;

/// Render-only copy of a remote player
#[derive(Debug, Clone)]
pub struct Shadow {
    pub record: PlayerRecord,
    /// False until a second snapshot arrives
    extrapolate: bool,
}

impl Shadow {
    /// Position to draw at `now_ms`
    pub fn position_at(&self, now_ms: u64) -> (f32, f32) {
        if !self.extrapolate {
            return self.record.position();
        }
        dead_reckon(
            self.record.position(),
            self.record.velocity(),
            elapsed_secs(self.record.last_update, now_ms),
        )
    }

    pub fn is_extrapolating(&self) -> bool {
        self.extrapolate
    }
}

/// What the store says about the local player's own record
#[derive(Debug, Clone, PartialEq)]
pub enum LocalObservation {
    /// Snapshot carried no player map entry for us
    Missing,
    Present(PlayerPatch),
}

/// Outcome of one ingestion pass
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub spawned: Vec<PlayerId>,
    pub updated: Vec<PlayerId>,
    pub removed: Vec<PlayerId>,
    pub stale: Vec<PlayerId>,
    pub local: Option<LocalObservation>,
}

pub struct EntityReconciler {
    local_id: Option<PlayerId>,
    shadows: HashMap<PlayerId, Shadow>,
    /// First sightings still missing required fields
    pending: HashMap<PlayerId, PlayerPatch>,
    version_guard: bool,
    default_max_health: i32,
}

impl EntityReconciler {
    pub fn new(version_guard: bool, default_max_health: i32) -> Self {
        Self {
            local_id: None,
            shadows: HashMap::new(),
            pending: HashMap::new(),
            version_guard,
            default_max_health,
        }
    }

    /// The local player's own record is never shadowed
    pub fn set_local_id(&mut self, local_id: Option<PlayerId>) {
        if let Some(id) = &local_id {
            self.shadows.remove(id);
            self.pending.remove(id);
        }
        self.local_id = local_id;
    }

    /// Apply the `players` map of a game-state snapshot
    pub fn ingest(&mut self, players: Option<&Map<String, Value>>) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let empty = Map::new();
        let players = players.unwrap_or(&empty);

        if self.local_id.is_some() {
            report.local = Some(LocalObservation::Missing);
        }

        for (id, value) in players {
            let patch: PlayerPatch = match serde_json::from_value(value.clone()) {
                Ok(patch) => patch,
                Err(e) => {
                    warn!(player_id = %id, error = %e, "Ignoring malformed player record");
                    continue;
                }
            };

            if self.local_id.as_deref() == Some(id.as_str()) {
                report.local = Some(LocalObservation::Present(patch));
                continue;
            }

            match self.shadows.get_mut(id) {
                Some(shadow) => {
                    if self.version_guard {
                        if let Some(version) = patch.version {
                            if version <= shadow.record.version {
                                trace!(player_id = %id, version, "Dropping stale snapshot");
                                report.stale.push(id.clone());
                                continue;
                            }
                        }
                    }
                    let before = shadow.record.clone();
                    patch.merge_into(&mut shadow.record);
                    shadow.extrapolate = true;
                    if shadow.record != before {
                        report.updated.push(id.clone());
                    }
                }
                None => {
                    let mut merged = self.pending.remove(id).unwrap_or_default();
                    merged.absorb(patch);
                    if !merged.is_complete() {
                        debug!(player_id = %id, "Deferring incomplete first sighting");
                        self.pending.insert(id.clone(), merged);
                        continue;
                    }
                    if let Some(record) = merged.into_record(id, self.default_max_health) {
                        debug!(player_id = %id, team = %record.team, "Remote player appeared");
                        self.shadows.insert(
                            id.clone(),
                            Shadow {
                                record,
                                extrapolate: false,
                            },
                        );
                        report.spawned.push(id.clone());
                    }
                }
            }
        }

        let vanished: Vec<PlayerId> = self
            .shadows
            .keys()
            .filter(|id| !players.contains_key(id.as_str()))
            .cloned()
            .collect();
        for id in vanished {
            self.shadows.remove(&id);
            debug!(player_id = %id, "Remote player left");
            report.removed.push(id);
        }
        self.pending.retain(|id, _| players.contains_key(id.as_str()));

        report
    }

    pub fn get(&self, id: &str) -> Option<&Shadow> {
        self.shadows.get(id)
    }

    pub fn shadows(&self) -> impl Iterator<Item = &Shadow> {
        self.shadows.values()
    }

    pub fn len(&self) -> usize {
        self.shadows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shadows.is_empty()
    }

    /// Last known health of a remote player, from the local cache only
    pub fn cached_health(&self, id: &str) -> Option<i32> {
        self.shadows.get(id).map(|shadow| shadow.record.health)
    }

    /// Show a locally computed hit before the victim's publish arrives
    pub fn apply_optimistic_health(&mut self, id: &str, health: i32) {
        if let Some(shadow) = self.shadows.get_mut(id) {
            shadow.record.health = health.clamp(0, shadow.record.max_health);
            if shadow.record.health == 0 {
                shadow.record.alive = false;
            }
        }
    }

    pub fn clear(&mut self) {
        self.shadows.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn players(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn remote(x: f32, vx: f32, last_update: u64, version: u64) -> Value {
        json!({
            "id": "r1", "x": x, "y": 50.0, "rotation": 1.5, "vx": vx, "vy": 0.0,
            "team": "blob", "health": 100, "maxHealth": 100, "alive": true,
            "lastUpdate": last_update, "version": version
        })
    }

    #[test]
    fn test_first_sighting_is_verbatim() {
        let mut reconciler = EntityReconciler::new(true, 100);
        let report = reconciler.ingest(Some(&players(json!({ "r1": remote(100.0, 50.0, 1_000, 1) }))));
        assert_eq!(report.spawned, vec!["r1".to_string()]);

        let shadow = reconciler.get("r1").unwrap();
        assert!(!shadow.is_extrapolating());
        assert_eq!(shadow.position_at(3_000), (100.0, 50.0));
    }

    #[test]
    fn test_known_entity_dead_reckons() {
        let mut reconciler = EntityReconciler::new(true, 100);
        reconciler.ingest(Some(&players(json!({ "r1": remote(100.0, 50.0, 1_000, 1) }))));
        reconciler.ingest(Some(&players(json!({ "r1": remote(120.0, 50.0, 1_400, 2) }))));

        let shadow = reconciler.get("r1").unwrap();
        assert!(shadow.is_extrapolating());
        // 120 + 50 * 0.5
        assert_eq!(shadow.position_at(1_900), (145.0, 50.0));
        assert_eq!(shadow.record.rotation, 1.5);
    }

    #[test]
    fn test_partial_snapshot_keeps_previous_fields() {
        let mut reconciler = EntityReconciler::new(true, 100);
        reconciler.ingest(Some(&players(json!({ "r1": remote(100.0, 0.0, 1_000, 1) }))));
        reconciler.ingest(Some(&players(json!({ "r1": { "x": 130.0, "health": 70 } }))));

        let record = &reconciler.get("r1").unwrap().record;
        assert_eq!(record.x, 130.0);
        assert_eq!(record.y, 50.0);
        assert_eq!(record.health, 70);
        assert_eq!(record.team, crate::protocol::Team::Blob);
    }

    #[test]
    fn test_version_guard_drops_stale() {
        let mut reconciler = EntityReconciler::new(true, 100);
        reconciler.ingest(Some(&players(json!({ "r1": remote(100.0, 0.0, 1_000, 5) }))));
        let report = reconciler.ingest(Some(&players(json!({ "r1": remote(10.0, 0.0, 900, 4) }))));
        assert_eq!(report.stale, vec!["r1".to_string()]);
        assert_eq!(reconciler.get("r1").unwrap().record.x, 100.0);

        let mut unguarded = EntityReconciler::new(false, 100);
        unguarded.ingest(Some(&players(json!({ "r1": remote(100.0, 0.0, 1_000, 5) }))));
        unguarded.ingest(Some(&players(json!({ "r1": remote(10.0, 0.0, 900, 4) }))));
        assert_eq!(unguarded.get("r1").unwrap().record.x, 10.0);
    }

    #[test]
    fn test_incomplete_first_sighting_deferred() {
        let mut reconciler = EntityReconciler::new(true, 100);
        let report = reconciler.ingest(Some(&players(json!({ "r1": { "x": 1.0, "y": 2.0 } }))));
        assert!(report.spawned.is_empty());
        assert!(reconciler.get("r1").is_none());

        let report = reconciler.ingest(Some(&players(json!({ "r1": { "team": "earthling" } }))));
        assert_eq!(report.spawned, vec!["r1".to_string()]);
        assert_eq!(reconciler.get("r1").unwrap().record.x, 1.0);
    }

    #[test]
    fn test_vanished_player_removed() {
        let mut reconciler = EntityReconciler::new(true, 100);
        reconciler.ingest(Some(&players(json!({ "r1": remote(100.0, 0.0, 1_000, 1) }))));
        let report = reconciler.ingest(None);
        assert_eq!(report.removed, vec!["r1".to_string()]);
        assert!(reconciler.is_empty());
    }

    #[test]
    fn test_local_record_reported_not_shadowed() {
        let mut reconciler = EntityReconciler::new(true, 100);
        reconciler.set_local_id(Some("r1".into()));
        let report = reconciler.ingest(Some(&players(json!({ "r1": remote(100.0, 0.0, 1_000, 1) }))));
        assert!(reconciler.is_empty());
        assert!(matches!(report.local, Some(LocalObservation::Present(_))));

        let report = reconciler.ingest(None);
        assert_eq!(report.local, Some(LocalObservation::Missing));
    }

    #[test]
    fn test_health_applied_immediately_and_cached() {
        let mut reconciler = EntityReconciler::new(true, 100);
        reconciler.ingest(Some(&players(json!({ "r1": remote(100.0, 0.0, 1_000, 1) }))));
        reconciler.ingest(Some(&players(json!({ "r1": { "health": 35, "version": 2 } }))));
        assert_eq!(reconciler.cached_health("r1"), Some(35));

        reconciler.apply_optimistic_health("r1", -10);
        assert_eq!(reconciler.cached_health("r1"), Some(0));
        assert!(!reconciler.get("r1").unwrap().record.alive);
    }
}
