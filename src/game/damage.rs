//! Damage resolution for overlap events
//!
//! Damage is client-authoritative: whichever client detects an overlap
//! computes the result. Against another player it is written either as a hit
//! entry keyed by projectile id (ledger mode) or straight into the victim's
//! health field (overwrite mode, last write wins). The victim's client applies
//! ledger entries once each, so hits commute and duplicates are harmless.

use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{DamageMode, SyncConfig};
use crate::protocol::{HitRecord, PlayerRecord, ProjectileId, ProjectileRecord, Team, OBJECTIVE_ID};
use crate::store::{path, StateStore, StoreError};
use crate::util::time::FORGET_AFTER_MS;

use super::combat::{CombatSystem, HitResult, HitTarget};
use super::reconciler::EntityReconciler;

/// Why an overlap produced no damage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Projectile unknown here or already retired
    UnknownProjectile,
    OwnProjectile,
    FriendlyFire,
    UnknownTarget,
    /// Target already at zero health
    TargetDown,
    /// This projectile already damaged this target
    AlreadyApplied,
}

/// Result of resolving one overlap
#[derive(Debug, Clone, PartialEq)]
pub enum DamageOutcome {
    Applied(HitResult),
    Ignored(IgnoreReason),
}

pub struct DamageResolver {
    store: Arc<dyn StateStore>,
    mode: DamageMode,
    friendly_fire: bool,
    /// Projectiles that already damaged the local player, with when each
    /// was applied or last seen in the ledger
    applied: HashMap<ProjectileId, u64>,
}

impl DamageResolver {
    pub fn new(store: Arc<dyn StateStore>, config: &SyncConfig) -> Self {
        Self {
            store,
            mode: config.damage_mode,
            friendly_fire: config.friendly_fire,
            applied: HashMap::new(),
        }
    }

    pub fn mode(&self) -> DamageMode {
        self.mode
    }

    /// Map an overlap target id onto who it refers to
    pub fn classify(target_id: &str, local_id: Option<&str>) -> HitTarget {
        if target_id == OBJECTIVE_ID {
            HitTarget::Objective
        } else if local_id == Some(target_id) {
            HitTarget::LocalPlayer
        } else {
            HitTarget::RemotePlayer(target_id.to_string())
        }
    }

    /// Owner and team rules shared by every target kind
    pub fn check_eligible(
        &self,
        projectile: &ProjectileRecord,
        target_id: &str,
        target_team: Team,
    ) -> Result<(), IgnoreReason> {
        if projectile.owner_id == target_id {
            return Err(IgnoreReason::OwnProjectile);
        }
        if !CombatSystem::may_damage(projectile.team, target_team, self.friendly_fire) {
            return Err(IgnoreReason::FriendlyFire);
        }
        Ok(())
    }

    /// Damage the local player. The caller publishes the record right after.
    pub fn damage_local(
        &mut self,
        projectile_id: &str,
        projectile: &ProjectileRecord,
        local: &mut PlayerRecord,
        now_ms: u64,
    ) -> Result<HitResult, IgnoreReason> {
        self.check_eligible(projectile, &local.id, local.team)?;
        if !local.alive {
            return Err(IgnoreReason::TargetDown);
        }
        if self.applied.insert(projectile_id.to_string(), now_ms).is_some() {
            return Err(IgnoreReason::AlreadyApplied);
        }
        Ok(self.apply_to_local(projectile_id, &projectile.owner_id, projectile.damage, local))
    }

    fn apply_to_local(
        &self,
        projectile_id: &str,
        attacker_id: &str,
        damage: i32,
        local: &mut PlayerRecord,
    ) -> HitResult {
        let (health, killed) = CombatSystem::apply_damage(local.health, damage, local.max_health);
        local.health = health;
        if killed {
            local.alive = false;
            local.vx = 0.0;
            local.vy = 0.0;
            info!(player_id = %local.id, attacker_id = %attacker_id, "Local player down");
        }
        HitResult {
            projectile_id: projectile_id.to_string(),
            attacker_id: attacker_id.to_string(),
            target: HitTarget::LocalPlayer,
            damage,
            health_after: health,
            target_killed: killed,
        }
    }

    /// Damage a remote player from the locally cached health
    pub fn damage_remote(
        &self,
        projectile_id: &str,
        projectile: &ProjectileRecord,
        target_id: &str,
        reconciler: &mut EntityReconciler,
        now_ms: u64,
    ) -> Result<HitResult, IgnoreReason> {
        let shadow = reconciler.get(target_id).ok_or(IgnoreReason::UnknownTarget)?;
        self.check_eligible(projectile, target_id, shadow.record.team)?;
        if !shadow.record.alive || shadow.record.health == 0 {
            return Err(IgnoreReason::TargetDown);
        }

        let cached = shadow.record.health;
        let max_health = shadow.record.max_health;
        let next_version = shadow.record.version + 1;
        let (health, killed) = CombatSystem::apply_damage(cached, projectile.damage, max_health);

        let written = match self.mode {
            DamageMode::Ledger => self.write_hit(target_id, projectile_id, projectile, now_ms),
            DamageMode::Overwrite => {
                let mut fields = Map::new();
                fields.insert("health".into(), json!(health));
                fields.insert("alive".into(), json!(!killed));
                fields.insert("version".into(), json!(next_version));
                path::player(target_id).and_then(|p| self.store.update(&p, fields))
            }
        };
        if let Err(e) = written {
            warn!(target_id = %target_id, error = %e, "Damage write failed, dropping");
        }

        reconciler.apply_optimistic_health(target_id, health);
        debug!(target_id = %target_id, projectile_id = %projectile_id, health, "Remote player hit");

        Ok(HitResult {
            projectile_id: projectile_id.to_string(),
            attacker_id: projectile.owner_id.clone(),
            target: HitTarget::RemotePlayer(target_id.to_string()),
            damage: projectile.damage,
            health_after: health,
            target_killed: killed,
        })
    }

    /// Damage the shared objective, which belongs to the earthlings
    pub fn damage_objective(
        &self,
        projectile_id: &str,
        projectile: &ProjectileRecord,
        current_health: i32,
        max_health: i32,
        now_ms: u64,
    ) -> Result<HitResult, IgnoreReason> {
        self.check_eligible(projectile, OBJECTIVE_ID, Team::Earthling)?;
        if current_health <= 0 {
            return Err(IgnoreReason::TargetDown);
        }
        if let Err(e) = self.write_hit(OBJECTIVE_ID, projectile_id, projectile, now_ms) {
            warn!(error = %e, "Objective hit write failed, dropping");
        }
        let (health, destroyed) = CombatSystem::apply_damage(current_health, projectile.damage, max_health);
        Ok(HitResult {
            projectile_id: projectile_id.to_string(),
            attacker_id: projectile.owner_id.clone(),
            target: HitTarget::Objective,
            damage: projectile.damage,
            health_after: health,
            target_killed: destroyed,
        })
    }

    fn write_hit(
        &self,
        target_id: &str,
        projectile_id: &str,
        projectile: &ProjectileRecord,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        let hit = HitRecord {
            damage: projectile.damage,
            attacker_id: projectile.owner_id.clone(),
            at: now_ms,
        };
        let value = serde_json::to_value(&hit)?;
        self.store.set(&path::hit(target_id, projectile_id)?, value)
    }

    /// Apply ledger entries addressed to the local player, each exactly once,
    /// and remove them from the store.
    ///
    /// An applied id is forgotten once it has been out of the ledger for
    /// `FORGET_AFTER_MS`.
    pub fn consume_ledger(
        &mut self,
        hits: Option<&Map<String, Value>>,
        local: &mut PlayerRecord,
        now_ms: u64,
    ) -> Vec<HitResult> {
        let mut results = Vec::new();
        let empty = Map::new();
        let hits = hits.unwrap_or(&empty);

        for (projectile_id, value) in hits {
            let first_time = self.applied.insert(projectile_id.clone(), now_ms).is_none();
            if first_time && local.alive {
                match serde_json::from_value::<HitRecord>(value.clone()) {
                    Ok(hit) => {
                        results.push(self.apply_to_local(projectile_id, &hit.attacker_id, hit.damage, local));
                    }
                    Err(e) => warn!(projectile_id = %projectile_id, error = %e, "Ignoring malformed hit entry"),
                }
            }

            let cleared = path::hit(&local.id, projectile_id).and_then(|p| self.store.remove(&p));
            if let Err(e) = cleared {
                warn!(projectile_id = %projectile_id, error = %e, "Hit entry cleanup failed");
            }
        }

        self.applied
            .retain(|id, seen| hits.contains_key(id) || now_ms.saturating_sub(*seen) < FORGET_AFTER_MS);
        results
    }

    /// Objective health: maximum minus every recorded hit, clamped.
    /// Entries are peer-written, so each one counts for at most `max_health`.
    pub fn objective_health(hits: Option<&Map<String, Value>>, max_health: i32) -> i32 {
        let max_health = i64::from(max_health.max(0));
        let total = hits
            .into_iter()
            .flat_map(|hits| hits.values())
            .filter_map(|v| v.get("damage").and_then(Value::as_i64))
            .map(|d| d.clamp(0, max_health))
            .fold(0i64, i64::saturating_add);
        (max_health - total).clamp(0, max_health) as i32
    }

    /// Forget applied hits when the aggregate is reset
    pub fn clear(&mut self) {
        self.applied.clear();
    }
}
