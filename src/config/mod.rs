//! Configuration module - environment variable parsing

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::game::physics::Playfield;
use crate::util::time::{PROJECTILE_SYNC_MS, PUBLISH_TPS};

/// How damage against another player's record is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageMode {
    /// Attackers append hit entries keyed by projectile; the victim's client
    /// applies each exactly once. Concurrent hits never overwrite each other.
    Ledger,
    /// Attackers overwrite the victim's health field directly. Last write wins.
    Overwrite,
}

impl FromStr for DamageMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ledger" => Ok(Self::Ledger),
            "overwrite" => Ok(Self::Overwrite),
            _ => Err(ConfigError::Invalid("DAMAGE_MODE")),
        }
    }
}

/// Tunables of the synchronization core
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Throttled player publishes per second
    pub publish_tps: u32,
    /// Owner refresh interval for projectile positions (milliseconds)
    pub projectile_sync_ms: u64,
    /// Minimum time between two shots (milliseconds)
    pub fire_cooldown_ms: u64,
    pub playfield: Playfield,
    pub max_health: i32,
    /// Health of the shared objective
    pub objective_health: i32,
    pub projectile_speed: f32,
    pub projectile_damage: i32,
    /// Whether projectiles damage players (and the objective) of their own team
    pub friendly_fire: bool,
    /// Drop player snapshots whose version is not newer than the last applied
    pub version_guard: bool,
    pub damage_mode: DamageMode,
    /// Seed for spawn positions; random when unset
    pub spawn_seed: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            publish_tps: PUBLISH_TPS,
            projectile_sync_ms: PROJECTILE_SYNC_MS,
            fire_cooldown_ms: 250,
            playfield: Playfield::default(),
            max_health: 100,
            objective_health: 1000,
            projectile_speed: 400.0,
            projectile_damage: 20,
            friendly_fire: true,
            version_guard: true,
            damage_mode: DamageMode::Ledger,
            spawn_seed: None,
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Realtime database URL; the in-memory store is used when unset
    pub store_url: Option<String>,
    /// Database auth token appended to REST requests
    pub store_auth: Option<String>,
    /// Poll interval for REST subscriptions
    pub store_poll: Duration,
    /// How long the demo runs
    pub demo_duration: Duration,
    pub sync: SyncConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = SyncConfig::default();

        let sync = SyncConfig {
            publish_tps: parse_var("PUBLISH_HZ", defaults.publish_tps)?,
            projectile_sync_ms: parse_var("PROJECTILE_SYNC_MS", defaults.projectile_sync_ms)?,
            fire_cooldown_ms: parse_var("FIRE_COOLDOWN_MS", defaults.fire_cooldown_ms)?,
            playfield: Playfield::new(
                parse_var("PLAYFIELD_WIDTH", defaults.playfield.width)?,
                parse_var("PLAYFIELD_HEIGHT", defaults.playfield.height)?,
            ),
            max_health: parse_var("MAX_HEALTH", defaults.max_health)?,
            objective_health: parse_var("OBJECTIVE_HEALTH", defaults.objective_health)?,
            projectile_speed: parse_var("PROJECTILE_SPEED", defaults.projectile_speed)?,
            projectile_damage: parse_var("PROJECTILE_DAMAGE", defaults.projectile_damage)?,
            friendly_fire: parse_var("FRIENDLY_FIRE", defaults.friendly_fire)?,
            version_guard: parse_var("VERSION_GUARD", defaults.version_guard)?,
            damage_mode: parse_var("DAMAGE_MODE", defaults.damage_mode)?,
            spawn_seed: optional_var("SPAWN_SEED")?,
        };

        if sync.publish_tps == 0 {
            return Err(ConfigError::Invalid("PUBLISH_HZ"));
        }
        if sync.max_health <= 0 {
            return Err(ConfigError::Invalid("MAX_HEALTH"));
        }
        if sync.objective_health <= 0 {
            return Err(ConfigError::Invalid("OBJECTIVE_HEALTH"));
        }

        Ok(Self {
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            store_url: env::var("STORE_URL").ok().filter(|url| !url.is_empty()),
            store_auth: env::var("STORE_AUTH").ok().filter(|token| !token.is_empty()),
            store_poll: Duration::from_millis(parse_var("STORE_POLL_MS", 100u64)?),
            demo_duration: Duration::from_secs(parse_var("DEMO_SECS", 10u64)?),
            sync,
        })
    }
}

/// Read a variable, falling back to `default` when unset
fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    Ok(optional_var(name)?.unwrap_or(default))
}

fn optional_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(name)),
        _ => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.publish_tps, 60);
        assert_eq!(config.damage_mode, DamageMode::Ledger);
        assert!(config.friendly_fire);
        assert!(config.version_guard);
    }

    #[test]
    fn test_damage_mode_parse() {
        assert_eq!("Overwrite".parse::<DamageMode>().unwrap(), DamageMode::Overwrite);
        assert!("merge".parse::<DamageMode>().is_err());
    }
}
