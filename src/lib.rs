//! Arena Sync - client-side state synchronization for a multiplayer arena shooter
//!
//! Each participant runs a [`GameClient`] against a shared keyed real-time
//! store. The client publishes its own player, mirrors everyone else with
//! dead reckoning, tracks projectiles through their lifecycle and resolves
//! damage from overlap events reported by the rendering shell.

pub mod app;
pub mod config;
pub mod game;
pub mod protocol;
pub mod store;
pub mod util;

pub use app::GameClient;
pub use config::{Config, DamageMode, SyncConfig};
pub use game::{DamageOutcome, LocalInputs, RenderSnapshot};
pub use protocol::{PlayerId, ProjectileId, Team};
pub use store::{MemoryStore, RestStore, StateStore, StoreError};
