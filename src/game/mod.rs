//! Synchronization core

pub mod combat;
pub mod damage;
pub mod physics;
pub mod projectile;
pub mod publisher;
pub mod reconciler;
pub mod session;
pub mod snapshot;

pub use damage::{DamageOutcome, DamageResolver, IgnoreReason};
pub use projectile::{ProjectileLifecycle, ProjectilePhase, RetireReason};
pub use publisher::ReplicationPublisher;
pub use reconciler::EntityReconciler;
pub use session::SessionManager;
pub use snapshot::{ObjectiveView, PlayerView, ProjectileView, RenderSnapshot};

/// Local control state supplied by the shell each frame
#[derive(Debug, Clone, Default)]
pub struct LocalInputs {
    pub x: f32,
    pub y: f32,
    /// Rotation in radians
    pub rotation: f32,
    pub vx: f32,
    pub vy: f32,
    /// Health override (pickups, scripted effects)
    pub health: Option<i32>,
    /// Fire this frame at the given angle in radians
    pub fire: Option<f32>,
}
