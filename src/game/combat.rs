//! Combat rules - weapons, damage, friendly fire

use crate::config::SyncConfig;
use crate::protocol::{PlayerId, ProjectileId, Team};

/// Weapon stats shared by every player
#[derive(Debug, Clone, Copy)]
pub struct WeaponStats {
    /// Damage per hit
    pub damage: i32,
    /// Projectile speed
    pub projectile_speed: f32,
    /// Cooldown between shots (milliseconds)
    pub cooldown_ms: u64,
}

impl WeaponStats {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            damage: config.projectile_damage.max(0),
            projectile_speed: config.projectile_speed,
            cooldown_ms: config.fire_cooldown_ms,
        }
    }
}

/// Combat system for cooldowns and damage
pub struct CombatSystem;

impl CombatSystem {
    /// Check if a player can fire (cooldown check)
    pub fn can_fire(last_fired_ms: Option<u64>, now_ms: u64, stats: &WeaponStats) -> bool {
        match last_fired_ms {
            Some(last) => now_ms.saturating_sub(last) >= stats.cooldown_ms,
            None => true,
        }
    }

    /// Apply damage to health, returns (new_health, is_dead).
    ///
    /// The result always lies in `0..=max_health`, whatever the inputs.
    pub fn apply_damage(current_health: i32, damage: i32, max_health: i32) -> (i32, bool) {
        let max_health = max_health.max(1);
        let new_health = current_health
            .clamp(0, max_health)
            .saturating_sub(damage.max(0))
            .clamp(0, max_health);
        (new_health, new_health == 0)
    }

    /// Whether a projectile from `attacker` may damage a target on `target`
    pub fn may_damage(attacker: Team, target: Team, friendly_fire: bool) -> bool {
        friendly_fire || attacker != target
    }
}

/// Who an overlap event hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HitTarget {
    LocalPlayer,
    RemotePlayer(PlayerId),
    Objective,
}

/// Hit result from damage resolution
#[derive(Debug, Clone, PartialEq)]
pub struct HitResult {
    pub projectile_id: ProjectileId,
    pub attacker_id: PlayerId,
    pub target: HitTarget,
    pub damage: i32,
    /// Target health after the hit, as far as this client knows
    pub health_after: i32,
    pub target_killed: bool,
}
