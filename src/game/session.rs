//! Local participant identity and its record in the store

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::protocol::{ObjectiveRecord, PlayerId, PlayerRecord, Team};
use crate::store::{path, StateStore, StoreError};

use super::physics::Playfield;

/// Owns the local player's identity, team and last known record
pub struct SessionManager {
    store: Arc<dyn StateStore>,
    playfield: Playfield,
    max_health: i32,
    rng: ChaCha8Rng,
    local: Option<PlayerRecord>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn StateStore>, config: &SyncConfig) -> Self {
        let rng = match config.spawn_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            store,
            playfield: config.playfield,
            max_health: config.max_health.max(1),
            rng,
            local: None,
        }
    }

    pub fn player_id(&self) -> Option<&str> {
        self.local.as_ref().map(|p| p.id.as_str())
    }

    pub fn is_joined(&self) -> bool {
        self.local.is_some()
    }

    pub fn local(&self) -> Option<&PlayerRecord> {
        self.local.as_ref()
    }

    pub fn local_mut(&mut self) -> Option<&mut PlayerRecord> {
        self.local.as_mut()
    }

    /// Random point in the team's spawn region
    pub fn respawn_position(&mut self, team: Team) -> (f32, f32) {
        self.playfield.random_spawn(team, &mut self.rng)
    }

    /// Create the local player's record. A failed write is logged, not retried.
    pub fn join(&mut self, team: Team, now_ms: u64) -> PlayerId {
        if let Some(existing) = &self.local {
            warn!(player_id = %existing.id, "Already joined");
            return existing.id.clone();
        }

        let (x, y) = self.respawn_position(team);
        let record = PlayerRecord {
            id: Uuid::new_v4().to_string(),
            x,
            y,
            rotation: 0.0,
            vx: 0.0,
            vy: 0.0,
            team,
            health: self.max_health,
            max_health: self.max_health,
            alive: true,
            last_update: now_ms,
            version: 1,
        };
        let id = record.id.clone();

        match self.write_record(&record) {
            Ok(()) => info!(player_id = %id, team = %team, x, y, "Joined game"),
            Err(e) => warn!(player_id = %id, error = %e, "Join write failed, continuing offline"),
        }

        self.local = Some(record);
        id
    }

    fn write_record(&self, record: &PlayerRecord) -> Result<(), StoreError> {
        let value = serde_json::to_value(record)?;
        self.store.set(&path::player(&record.id)?, value)
    }

    /// Delete the local player's record. No-op when not joined.
    pub fn leave(&mut self) -> Option<PlayerRecord> {
        let record = self.local.take()?;
        let result = path::player(&record.id).and_then(|p| self.store.remove(&p));
        match result {
            Ok(()) => info!(player_id = %record.id, "Left game"),
            Err(e) => warn!(player_id = %record.id, error = %e, "Leave write failed, record may linger"),
        }
        Some(record)
    }

    /// Drop the local session without touching the store
    pub fn end_session(&mut self) -> Option<PlayerRecord> {
        self.local.take()
    }

    /// Clear the whole aggregate for everyone, ending this session too
    pub fn reset(&mut self) {
        match self.store.remove(&path::game_state()) {
            Ok(()) => info!("Game state reset"),
            Err(e) => warn!(error = %e, "Reset failed"),
        }
        self.local = None;
    }

    /// Mark the round started and place the objective at the center
    pub fn start_game(&self, objective_max_health: i32) {
        let (x, y) = self.playfield.center();
        let objective = ObjectiveRecord {
            x,
            y,
            max_health: objective_max_health.max(1),
        };
        let result = serde_json::to_value(&objective)
            .map_err(StoreError::from)
            .and_then(|value| self.store.set(&path::objective(), value))
            .and_then(|()| self.store.set(&path::game_started(), json!(true)));
        match result {
            Ok(()) => info!("Game started"),
            Err(e) => warn!(error = %e, "Start write failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn session(store: &MemoryStore) -> SessionManager {
        let config = SyncConfig {
            spawn_seed: Some(42),
            ..SyncConfig::default()
        };
        SessionManager::new(Arc::new(store.clone()), &config)
    }

    #[test]
    fn test_join_writes_full_record() {
        let store = MemoryStore::new();
        let mut session = session(&store);
        let id = session.join(Team::Blob, 1_000);

        let stored: PlayerRecord =
            serde_json::from_value(store.read(&path::player(&id).unwrap()).unwrap()).unwrap();
        assert_eq!(stored.team, Team::Blob);
        assert_eq!(stored.health, 100);
        assert_eq!((stored.vx, stored.vy), (0.0, 0.0));
        assert!(stored.x >= 1280.0 * 2.0 / 3.0 && stored.x <= 1280.0);
        assert!(stored.y >= 0.0 && stored.y <= 720.0);
    }

    #[test]
    fn test_join_then_leave_leaves_nothing() {
        let store = MemoryStore::new();
        let mut session = session(&store);
        let id = session.join(Team::Earthling, 1_000);
        assert!(session.leave().is_some());
        assert!(store.read(&path::player(&id).unwrap()).is_none());
        assert!(store.read(&path::game_state()).is_none());
        assert!(session.leave().is_none());
    }

    #[test]
    fn test_ids_never_reused() {
        let store = MemoryStore::new();
        let mut session = session(&store);
        let first = session.join(Team::Earthling, 1_000);
        assert_eq!(session.join(Team::Blob, 1_001), first);
        session.leave();
        let second = session.join(Team::Earthling, 1_002);
        assert_ne!(first, second);
    }

    #[test]
    fn test_join_failure_is_silent() {
        let store = MemoryStore::new();
        store.set_failing(true);
        let mut session = session(&store);
        let id = session.join(Team::Earthling, 1_000);
        assert!(session.is_joined());
        store.set_failing(false);
        assert!(store.read(&path::player(&id).unwrap()).is_none());
    }

    #[test]
    fn test_reset_clears_everything() {
        let store = MemoryStore::new();
        let mut session = session(&store);
        session.join(Team::Earthling, 1_000);
        session.start_game(500);
        assert!(store.read(&path::objective()).is_some());

        session.reset();
        assert!(!session.is_joined());
        assert!(store.read(&path::game_state()).is_none());
    }
}
