//! Render snapshot building for the shell

use super::projectile::{ProjectileLifecycle, ProjectilePhase};
use super::reconciler::EntityReconciler;
use crate::protocol::{PlayerId, PlayerRecord, ProjectileId, Team};

/// Player as the shell should draw it
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerView {
    pub id: PlayerId,
    pub team: Team,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub health: i32,
    pub max_health: i32,
    /// Dead players are hidden until they respawn
    pub alive: bool,
    pub is_local: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectileView {
    pub id: ProjectileId,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub team: Team,
    pub phase: ProjectilePhase,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveView {
    pub x: f32,
    pub y: f32,
    pub health: i32,
    pub max_health: i32,
}

/// Everything drawable at one instant
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderSnapshot {
    pub local: Option<PlayerView>,
    /// Remote players, ordered by id
    pub players: Vec<PlayerView>,
    /// Projectiles, ordered by id
    pub projectiles: Vec<ProjectileView>,
    pub objective: Option<ObjectiveView>,
    pub started: bool,
}

impl RenderSnapshot {
    pub fn player(&self, id: &str) -> Option<&PlayerView> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn projectile(&self, id: &str) -> Option<&ProjectileView> {
        self.projectiles.iter().find(|p| p.id == id)
    }
}

/// Builds render snapshots from the core's tracked state
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    pub fn build(
        now_ms: u64,
        local: Option<&PlayerRecord>,
        reconciler: &EntityReconciler,
        projectiles: &ProjectileLifecycle,
        objective: Option<ObjectiveView>,
        started: bool,
    ) -> RenderSnapshot {
        let local = local.map(|p| PlayerView {
            id: p.id.clone(),
            team: p.team,
            x: p.x,
            y: p.y,
            rotation: p.rotation,
            health: p.health,
            max_health: p.max_health,
            alive: p.alive,
            is_local: true,
        });

        let mut players: Vec<PlayerView> = reconciler
            .shadows()
            .map(|shadow| {
                let (x, y) = shadow.position_at(now_ms);
                let p = &shadow.record;
                PlayerView {
                    id: p.id.clone(),
                    team: p.team,
                    x,
                    y,
                    rotation: p.rotation,
                    health: p.health,
                    max_health: p.max_health,
                    alive: p.alive,
                    is_local: false,
                }
            })
            .collect();
        players.sort_by(|a, b| a.id.cmp(&b.id));

        let mut projectile_views: Vec<ProjectileView> = projectiles
            .live()
            .map(|tracked| {
                let (x, y) = tracked.position_at(now_ms);
                ProjectileView {
                    id: tracked.id.clone(),
                    x,
                    y,
                    angle: tracked.record.angle,
                    team: tracked.record.team,
                    phase: tracked.phase,
                }
            })
            .collect();
        projectile_views.sort_by(|a, b| a.id.cmp(&b.id));

        RenderSnapshot {
            local,
            players,
            projectiles: projectile_views,
            objective,
            started,
        }
    }
}
