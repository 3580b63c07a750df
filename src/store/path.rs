//! Store paths and the `gameState` schema layout

use std::fmt;

use super::StoreError;

/// Root of the shared aggregate
pub const GAME_STATE: &str = "gameState";

/// A validated, slash-separated store path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorePath(String);

impl StorePath {
    /// Parse a path such as `gameState/players/abc`
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Err(StoreError::InvalidPath(raw.to_string()));
        }
        for segment in trimmed.split('/') {
            validate_segment(segment).map_err(|_| StoreError::InvalidPath(raw.to_string()))?;
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Append one key segment
    pub fn child(&self, segment: &str) -> Result<Self, StoreError> {
        validate_segment(segment)?;
        Ok(Self(format!("{}/{}", self.0, segment)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// True if `self` equals `other` or lies beneath it
    pub fn starts_with(&self, other: &StorePath) -> bool {
        self.0 == other.0
            || (self.0.starts_with(&other.0) && self.0.as_bytes().get(other.0.len()) == Some(&b'/'))
    }

    /// True if a write at one path can change the value at the other
    pub fn overlaps(&self, other: &StorePath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keys may not be empty or contain characters the REST backend reserves
fn validate_segment(segment: &str) -> Result<(), StoreError> {
    let forbidden = ['.', '#', '$', '[', ']', '/'];
    if segment.is_empty() || segment.contains(&forbidden[..]) || segment.chars().any(char::is_control) {
        return Err(StoreError::InvalidPath(segment.to_string()));
    }
    Ok(())
}

pub fn game_state() -> StorePath {
    StorePath(GAME_STATE.to_string())
}

pub fn players() -> StorePath {
    StorePath(format!("{}/players", GAME_STATE))
}

pub fn player(id: &str) -> Result<StorePath, StoreError> {
    players().child(id)
}

pub fn projectiles() -> StorePath {
    StorePath(format!("{}/projectiles", GAME_STATE))
}

pub fn projectile(id: &str) -> Result<StorePath, StoreError> {
    projectiles().child(id)
}

pub fn hits(target_id: &str) -> Result<StorePath, StoreError> {
    StorePath(format!("{}/hits", GAME_STATE)).child(target_id)
}

pub fn hit(target_id: &str, projectile_id: &str) -> Result<StorePath, StoreError> {
    hits(target_id)?.child(projectile_id)
}

pub fn objective() -> StorePath {
    StorePath(format!("{}/earth", GAME_STATE))
}

pub fn game_started() -> StorePath {
    StorePath(format!("{}/gameStarted", GAME_STATE))
}
