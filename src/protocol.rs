//! Store record definitions
//! These are the JSON shapes written under `gameState/` and read back by peers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Player identifier, generated by the client on join
pub type PlayerId = String;

/// Projectile identifier, assigned by the store on push
pub type ProjectileId = String;

/// Target id of the shared objective in overlap events and the hit ledger
pub const OBJECTIVE_ID: &str = "earth";

/// Teams available in the game
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    /// Defenders of the objective
    #[default]
    Earthling,
    /// Invaders
    Blob,
}

impl Team {
    pub const ALL: [Team; 2] = [Team::Earthling, Team::Blob];

    pub fn as_str(self) -> &'static str {
        match self {
            Team::Earthling => "earthling",
            Team::Blob => "blob",
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown team: {0}")]
pub struct UnknownTeam(pub String);

impl FromStr for Team {
    type Err = UnknownTeam;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "earthling" => Ok(Team::Earthling),
            "blob" => Ok(Team::Blob),
            other => Err(UnknownTeam(other.to_string())),
        }
    }
}

/// Full player record at `gameState/players/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub id: PlayerId,
    /// Position X
    pub x: f32,
    /// Position Y
    pub y: f32,
    /// Rotation in radians
    pub rotation: f32,
    /// Velocity X (units per second)
    pub vx: f32,
    /// Velocity Y (units per second)
    pub vy: f32,
    pub team: Team,
    /// Health (0..=max_health)
    pub health: i32,
    pub max_health: i32,
    pub alive: bool,
    /// Publish time in Unix millis, never decreases for a given writer
    pub last_update: u64,
    /// Logical write counter
    pub version: u64,
}

impl PlayerRecord {
    pub fn position(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    pub fn velocity(&self) -> (f32, f32) {
        (self.vx, self.vy)
    }
}

/// Player record as read from the store, every field optional.
///
/// A record can be observed half-written (a partial `update` racing a
/// delete, or fields landing in separate writes), so ingestion merges
/// whatever is present over the last known values.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPatch {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub rotation: Option<f32>,
    pub vx: Option<f32>,
    pub vy: Option<f32>,
    pub team: Option<Team>,
    pub health: Option<i32>,
    pub max_health: Option<i32>,
    pub alive: Option<bool>,
    pub last_update: Option<u64>,
    pub version: Option<u64>,
}

impl PlayerPatch {
    /// Fields without which a first sighting cannot be drawn
    pub fn is_complete(&self) -> bool {
        self.x.is_some() && self.y.is_some() && self.team.is_some()
    }

    /// Overlay `newer` on top of this patch
    pub fn absorb(&mut self, newer: PlayerPatch) {
        self.x = newer.x.or(self.x);
        self.y = newer.y.or(self.y);
        self.rotation = newer.rotation.or(self.rotation);
        self.vx = newer.vx.or(self.vx);
        self.vy = newer.vy.or(self.vy);
        self.team = newer.team.or(self.team);
        self.health = newer.health.or(self.health);
        self.max_health = newer.max_health.or(self.max_health);
        self.alive = newer.alive.or(self.alive);
        self.last_update = newer.last_update.or(self.last_update);
        self.version = newer.version.or(self.version);
    }

    /// Build a full record from a complete patch
    pub fn into_record(self, id: &str, default_max_health: i32) -> Option<PlayerRecord> {
        let max_health = self.max_health.unwrap_or(default_max_health).max(1);
        let health = self.health.unwrap_or(max_health).clamp(0, max_health);
        Some(PlayerRecord {
            id: id.to_string(),
            x: self.x?,
            y: self.y?,
            rotation: self.rotation.unwrap_or(0.0),
            vx: self.vx.unwrap_or(0.0),
            vy: self.vy.unwrap_or(0.0),
            team: self.team?,
            health,
            max_health,
            alive: self.alive.unwrap_or(health > 0),
            last_update: self.last_update.unwrap_or(0),
            version: self.version.unwrap_or(0),
        })
    }

    /// Merge present fields into a known record, keeping the rest
    pub fn merge_into(&self, record: &mut PlayerRecord) {
        if let Some(x) = self.x {
            record.x = x;
        }
        if let Some(y) = self.y {
            record.y = y;
        }
        if let Some(rotation) = self.rotation {
            record.rotation = rotation;
        }
        if let Some(vx) = self.vx {
            record.vx = vx;
        }
        if let Some(vy) = self.vy {
            record.vy = vy;
        }
        if let Some(team) = self.team {
            record.team = team;
        }
        if let Some(max_health) = self.max_health {
            record.max_health = max_health.max(1);
        }
        if let Some(health) = self.health {
            record.health = health.clamp(0, record.max_health);
        }
        if let Some(alive) = self.alive {
            record.alive = alive;
        }
        if let Some(last_update) = self.last_update {
            record.last_update = last_update;
        }
        if let Some(version) = self.version {
            record.version = version;
        }
    }
}

/// Projectile record at `gameState/projectiles/{id}`; the id is the key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectileRecord {
    /// Position X at `last_update`
    pub x: f32,
    /// Position Y at `last_update`
    pub y: f32,
    /// Heading in radians
    pub angle: f32,
    /// Units per second, fixed after spawn
    pub speed: f32,
    pub damage: i32,
    pub team: Team,
    pub owner_id: PlayerId,
    /// Spawn time in Unix millis
    pub timestamp: u64,
    /// Time the position baseline was taken
    pub last_update: u64,
}

/// Projectile record as read from the store
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectilePatch {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub angle: Option<f32>,
    pub speed: Option<f32>,
    pub damage: Option<i32>,
    pub team: Option<Team>,
    pub owner_id: Option<PlayerId>,
    pub timestamp: Option<u64>,
    pub last_update: Option<u64>,
}

impl ProjectilePatch {
    /// Build a full record; a projectile without a trajectory cannot be tracked
    pub fn into_record(self, default_damage: i32) -> Option<ProjectileRecord> {
        let timestamp = self.timestamp.or(self.last_update)?;
        Some(ProjectileRecord {
            x: self.x?,
            y: self.y?,
            angle: self.angle?,
            speed: self.speed?,
            damage: self.damage.unwrap_or(default_damage).max(0),
            team: self.team?,
            owner_id: self.owner_id.unwrap_or_default(),
            timestamp,
            last_update: self.last_update.unwrap_or(timestamp),
        })
    }

    /// Rebase a known projectile on a position refresh
    pub fn merge_into(&self, record: &mut ProjectileRecord) {
        if let Some(x) = self.x {
            record.x = x;
        }
        if let Some(y) = self.y {
            record.y = y;
        }
        if let Some(last_update) = self.last_update {
            record.last_update = last_update;
        }
    }
}

/// Damage ledger entry at `gameState/hits/{targetId}/{projectileId}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HitRecord {
    pub damage: i32,
    pub attacker_id: PlayerId,
    /// Detection time in Unix millis
    pub at: u64,
}

/// Shared objective at `gameState/earth`; health is derived from its hits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveRecord {
    pub x: f32,
    pub y: f32,
    pub max_health: i32,
}
