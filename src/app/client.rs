//! Per-client facade driven by the shell once per frame

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{DamageMode, SyncConfig};
use crate::game::combat::{CombatSystem, HitTarget, WeaponStats};
use crate::game::damage::{DamageOutcome, DamageResolver, IgnoreReason};
use crate::game::projectile::{ProjectileLifecycle, RetireReason};
use crate::game::publisher::ReplicationPublisher;
use crate::game::reconciler::{EntityReconciler, LocalObservation};
use crate::game::session::SessionManager;
use crate::game::snapshot::{ObjectiveView, RenderSnapshot, SnapshotBuilder};
use crate::game::LocalInputs;
use crate::protocol::{ObjectiveRecord, PlayerId, PlayerPatch, ProjectileId, ProjectileRecord, Team, OBJECTIVE_ID};
use crate::store::{path, StateStore, StoreError, Subscription};

/// One participant's view of the shared game state.
///
/// All store traffic goes through the injected [`StateStore`]. Incoming
/// snapshots queue on the subscription and are applied at the start of the
/// next [`GameClient::on_tick`].
pub struct GameClient {
    config: SyncConfig,
    weapon: WeaponStats,
    store: Arc<dyn StateStore>,
    session: SessionManager,
    team: Option<Team>,
    publisher: Option<ReplicationPublisher>,
    reconciler: EntityReconciler,
    projectiles: ProjectileLifecycle,
    damage: DamageResolver,
    subscription: Subscription,
    /// The local record has been seen in a snapshot since joining
    local_confirmed: bool,
    objective: Option<ObjectiveRecord>,
    objective_health: i32,
    started: bool,
    last_fired_ms: Option<u64>,
    /// Time of the latest tick
    now_ms: u64,
}

impl GameClient {
    pub fn new(store: Arc<dyn StateStore>, config: SyncConfig) -> Result<Self, StoreError> {
        let subscription = store.subscribe(&path::game_state())?;
        Ok(Self {
            weapon: WeaponStats::from_config(&config),
            session: SessionManager::new(store.clone(), &config),
            team: None,
            publisher: None,
            reconciler: EntityReconciler::new(config.version_guard, config.max_health),
            projectiles: ProjectileLifecycle::new(
                store.clone(),
                config.playfield,
                config.projectile_sync_ms,
                config.projectile_damage,
            ),
            damage: DamageResolver::new(store.clone(), &config),
            subscription,
            local_confirmed: false,
            objective: None,
            objective_health: 0,
            started: false,
            last_fired_ms: None,
            now_ms: 0,
            store,
            config,
        })
    }

    /// Record the team picked in the menu. Only the first choice counts.
    pub fn on_team_chosen(&mut self, team: Team) -> bool {
        if let Some(chosen) = self.team {
            debug!(chosen = %chosen, ignored = %team, "Team already chosen");
            return false;
        }
        self.team = Some(team);
        true
    }

    pub fn team(&self) -> Option<Team> {
        self.team
    }

    pub fn player_id(&self) -> Option<&str> {
        self.session.player_id()
    }

    pub fn is_alive(&self) -> bool {
        self.session.local().map_or(false, |p| p.alive)
    }

    /// Join with the chosen team. Returns `None` until a team is chosen.
    pub fn join(&mut self, now_ms: u64) -> Option<PlayerId> {
        let Some(team) = self.team else {
            warn!("Join requested before a team was chosen");
            return None;
        };
        if let Some(id) = self.session.player_id() {
            return Some(id.to_string());
        }

        self.now_ms = self.now_ms.max(now_ms);
        let id = self.session.join(team, now_ms);
        self.publisher = self.session.local().and_then(|local| {
            ReplicationPublisher::new(self.store.clone(), self.config.publish_tps, local)
                .map_err(|e| warn!(player_id = %local.id, error = %e, "Cannot publish for player"))
                .ok()
        });
        self.reconciler.set_local_id(Some(id.clone()));
        self.projectiles.set_local_id(Some(id.clone()));
        self.local_confirmed = false;
        self.last_fired_ms = None;
        Some(id)
    }

    /// Advance one frame: apply remote changes, then local inputs, then publish.
    pub fn on_tick(&mut self, now_ms: u64, inputs: &LocalInputs) {
        self.now_ms = now_ms;

        if let Some(event) = self.subscription.drain_latest() {
            self.apply_snapshot(event.value.as_ref(), now_ms);
        }

        let health_changed = self.apply_inputs(inputs);

        if let Some(angle) = inputs.fire {
            self.fire(angle);
        }

        if let (Some(publisher), Some(local)) = (self.publisher.as_mut(), self.session.local_mut()) {
            if health_changed {
                publisher.publish_now(now_ms, local);
            } else {
                publisher.maybe_publish(now_ms, local);
            }
        }

        self.projectiles.advance(now_ms);
    }

    fn apply_snapshot(&mut self, state: Option<&Value>, now_ms: u64) {
        let state = state.and_then(Value::as_object);

        let report = self.reconciler.ingest(section(state, "players"));
        match report.local {
            Some(LocalObservation::Present(patch)) => {
                self.local_confirmed = true;
                self.adopt_cross_write(&patch);
            }
            Some(LocalObservation::Missing) if self.local_confirmed => {
                warn!(player_id = ?self.session.player_id(), "Own record removed from store, ending session");
                self.evict();
            }
            _ => {}
        }

        let projectiles = self.projectiles.ingest(section(state, "projectiles"), now_ms);
        if !projectiles.purged.is_empty() {
            debug!(count = projectiles.purged.len(), "Purged resurrected projectiles");
        }

        let hits = section(state, "hits");
        if let Some(local) = self.session.local_mut() {
            let own_hits = hits.and_then(|h| h.get(&local.id)).and_then(Value::as_object);
            let applied = self.damage.consume_ledger(own_hits, local, now_ms);
            if !applied.is_empty() {
                if let Some(publisher) = self.publisher.as_mut() {
                    publisher.publish_now(now_ms, local);
                }
            }
        }

        self.objective = state
            .and_then(|s| s.get(OBJECTIVE_ID))
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        if let Some(objective) = &self.objective {
            let objective_hits = hits.and_then(|h| h.get(OBJECTIVE_ID)).and_then(Value::as_object);
            self.objective_health = DamageResolver::objective_health(objective_hits, objective.max_health);
        }

        self.started = state
            .and_then(|s| s.get("gameStarted"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
    }

    /// In overwrite mode attackers write our health directly; take over any
    /// health we did not write ourselves.
    fn adopt_cross_write(&mut self, patch: &PlayerPatch) {
        if self.damage.mode() != DamageMode::Overwrite {
            return;
        }
        let (Some(publisher), Some(local)) = (self.publisher.as_mut(), self.session.local_mut()) else {
            return;
        };
        let (Some(version), Some(health)) = (patch.version, patch.health) else {
            return;
        };
        if !publisher.is_foreign_write(version, health) {
            return;
        }

        publisher.observe_version(version);
        let (health, down) = CombatSystem::apply_damage(health, 0, local.max_health);
        local.health = health;
        if down && local.alive {
            local.alive = false;
            local.vx = 0.0;
            local.vy = 0.0;
            info!(player_id = %local.id, "Local player down");
        }
        debug!(player_id = %local.id, version, health = local.health, "Adopted remote health write");
    }

    /// Drop all per-session state after our record was removed by someone else
    fn evict(&mut self) {
        self.session.end_session();
        self.forget_session();
        self.projectiles.clear();
        self.damage.clear();
    }

    fn forget_session(&mut self) {
        self.publisher = None;
        self.local_confirmed = false;
        self.reconciler.set_local_id(None);
        self.projectiles.set_local_id(None);
    }

    /// Copy shell inputs onto the local record. Returns whether health changed.
    fn apply_inputs(&mut self, inputs: &LocalInputs) -> bool {
        let playfield = self.config.playfield;
        let Some(local) = self.session.local_mut() else {
            return false;
        };
        if !local.alive {
            return false;
        }

        let (x, y) = playfield.clamp(inputs.x, inputs.y);
        local.x = x;
        local.y = y;
        local.rotation = inputs.rotation;
        local.vx = inputs.vx;
        local.vy = inputs.vy;

        let Some(health) = inputs.health else {
            return false;
        };
        let (health, down) = CombatSystem::apply_damage(health, 0, local.max_health);
        if health == local.health {
            return false;
        }
        local.health = health;
        if down {
            local.alive = false;
            local.vx = 0.0;
            local.vy = 0.0;
            info!(player_id = %local.id, "Local player down");
        }
        true
    }

    /// Fire from the local position. `None` while dead, on cooldown, or when
    /// the store refuses the push.
    pub fn fire(&mut self, angle: f32) -> Option<ProjectileId> {
        let now_ms = self.now_ms;
        let local = self.session.local().filter(|p| p.alive)?;
        let publisher = self.publisher.as_ref()?;
        if !CombatSystem::can_fire(self.last_fired_ms, now_ms, &self.weapon) {
            return None;
        }

        let record = ProjectileRecord {
            x: local.x,
            y: local.y,
            angle,
            speed: self.weapon.projectile_speed,
            damage: self.weapon.damage,
            team: local.team,
            owner_id: local.id.clone(),
            timestamp: now_ms,
            last_update: now_ms,
        };
        match publisher.fire(&record) {
            Ok(id) => {
                self.last_fired_ms = Some(now_ms);
                self.projectiles.spawn_local(id.clone(), record, now_ms);
                Some(id)
            }
            Err(e) => {
                warn!(player_id = %local.id, error = %e, "Fire failed, dropping shot");
                None
            }
        }
    }

    /// Resolve an overlap reported by the shell. The projectile is retired
    /// whenever it hit something that could take the hit.
    pub fn on_overlap(&mut self, projectile_id: &str, target_id: &str) -> DamageOutcome {
        let now_ms = self.now_ms;
        let Some(tracked) = self.projectiles.get(projectile_id) else {
            return DamageOutcome::Ignored(IgnoreReason::UnknownProjectile);
        };
        let projectile = tracked.record.clone();

        let target = DamageResolver::classify(target_id, self.session.player_id());
        let result = match target {
            HitTarget::LocalPlayer => match self.session.local_mut() {
                Some(local) => {
                    let hit = self.damage.damage_local(projectile_id, &projectile, local, now_ms);
                    if hit.is_ok() {
                        if let Some(publisher) = self.publisher.as_mut() {
                            publisher.publish_now(now_ms, local);
                        }
                    }
                    hit
                }
                None => Err(IgnoreReason::UnknownTarget),
            },
            HitTarget::RemotePlayer(id) => {
                self.damage
                    .damage_remote(projectile_id, &projectile, &id, &mut self.reconciler, now_ms)
            }
            HitTarget::Objective => match &self.objective {
                Some(objective) => {
                    let hit = self.damage.damage_objective(
                        projectile_id,
                        &projectile,
                        self.objective_health,
                        objective.max_health,
                        now_ms,
                    );
                    if let Ok(hit) = &hit {
                        self.objective_health = hit.health_after;
                    }
                    hit
                }
                None => Err(IgnoreReason::UnknownTarget),
            },
        };

        match result {
            Ok(hit) => {
                self.projectiles.retire(projectile_id, RetireReason::Hit);
                DamageOutcome::Applied(hit)
            }
            Err(IgnoreReason::AlreadyApplied) => {
                self.projectiles.retire(projectile_id, RetireReason::Hit);
                DamageOutcome::Ignored(IgnoreReason::AlreadyApplied)
            }
            Err(reason) => {
                debug!(projectile_id = %projectile_id, target_id = %target_id, ?reason, "Overlap ignored");
                DamageOutcome::Ignored(reason)
            }
        }
    }

    /// Bring a dead local player back at full health in the team's spawn region
    pub fn respawn(&mut self, now_ms: u64) -> bool {
        self.now_ms = self.now_ms.max(now_ms);
        let Some(team) = self.session.local().filter(|p| !p.alive).map(|p| p.team) else {
            return false;
        };
        let (x, y) = self.session.respawn_position(team);
        let (Some(publisher), Some(local)) = (self.publisher.as_mut(), self.session.local_mut()) else {
            return false;
        };

        local.x = x;
        local.y = y;
        local.vx = 0.0;
        local.vy = 0.0;
        local.health = local.max_health;
        local.alive = true;
        publisher.publish_now(now_ms, local);
        info!(player_id = %local.id, x, y, "Respawned");
        true
    }

    /// Remove the local record and stop publishing
    pub fn leave(&mut self) {
        if self.session.leave().is_some() {
            self.forget_session();
        }
    }

    /// Wipe the shared game state for every participant
    pub fn reset(&mut self) {
        self.session.reset();
        self.forget_session();
        self.reconciler.clear();
        self.projectiles.clear();
        self.damage.clear();
        self.objective = None;
        self.started = false;
    }

    pub fn start_game(&mut self) {
        self.session.start_game(self.config.objective_health);
    }

    pub fn renderable_snapshot(&self, now_ms: u64) -> RenderSnapshot {
        let objective = self.objective.as_ref().map(|o| ObjectiveView {
            x: o.x,
            y: o.y,
            health: self.objective_health,
            max_health: o.max_health,
        });
        SnapshotBuilder::build(
            now_ms,
            self.session.local(),
            &self.reconciler,
            &self.projectiles,
            objective,
            self.started,
        )
    }

    /// Leave and stop listening to the store
    pub fn shutdown(mut self) {
        self.leave();
        let Self { subscription, .. } = self;
        subscription.unsubscribe();
    }
}

fn section<'a>(state: Option<&'a Map<String, Value>>, key: &str) -> Option<&'a Map<String, Value>> {
    state.and_then(|s| s.get(key)).and_then(Value::as_object)
}
