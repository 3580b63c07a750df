//! Multi-client scenarios over a shared in-memory store
//!
//! Every client gets its own `GameClient` and subscription on the same
//! `MemoryStore`, the way separate browser tabs share one database. Clocks
//! are explicit so dead reckoning can be checked exactly.

use std::collections::HashSet;
use std::f32::consts::PI;
use std::sync::Arc;

use arena_sync::config::{DamageMode, SyncConfig};
use arena_sync::game::combat::HitTarget;
use arena_sync::game::physics::Playfield;
use arena_sync::game::{DamageOutcome, IgnoreReason, LocalInputs};
use arena_sync::protocol::{PlayerId, PlayerRecord, OBJECTIVE_ID};
use arena_sync::store::{path, MemoryStore};
use arena_sync::{GameClient, Team};

const T0: u64 = 10_000;

fn config(seed: u64) -> SyncConfig {
    SyncConfig {
        playfield: Playfield::new(4000.0, 720.0),
        spawn_seed: Some(seed),
        ..SyncConfig::default()
    }
}

fn join(store: &MemoryStore, team: Team, config: SyncConfig) -> (GameClient, PlayerId) {
    let mut client = GameClient::new(Arc::new(store.clone()), config).unwrap();
    assert!(client.on_team_chosen(team));
    let id = client.join(T0).unwrap();
    (client, id)
}

/// Inputs that keep the local player where it is
fn hold(client: &GameClient) -> LocalInputs {
    match client.renderable_snapshot(0).local {
        Some(local) => LocalInputs {
            x: local.x,
            y: local.y,
            rotation: local.rotation,
            ..LocalInputs::default()
        },
        None => LocalInputs::default(),
    }
}

fn tick_all(clients: &mut [&mut GameClient], now_ms: u64) {
    for client in clients.iter_mut() {
        let inputs = hold(client);
        client.on_tick(now_ms, &inputs);
    }
}

fn stored(store: &MemoryStore, id: &str) -> Option<PlayerRecord> {
    store
        .read(&path::player(id).unwrap())
        .and_then(|v| serde_json::from_value(v).ok())
}

fn projectile_count(store: &MemoryStore) -> usize {
    store
        .read(&path::projectiles())
        .and_then(|v| v.as_object().map(|m| m.len()))
        .unwrap_or(0)
}

#[test]
fn test_remote_projectile_dead_reckoned() {
    let store = MemoryStore::seeded(1);
    let (mut blob, _) = join(&store, Team::Blob, config(1));
    let (mut earthling, _) = join(&store, Team::Earthling, config(2));

    let inputs = hold(&blob);
    let spawn_x = inputs.x;
    let spawn_y = inputs.y;
    blob.on_tick(T0, &LocalInputs { fire: Some(0.0), ..inputs });

    let fired = blob.renderable_snapshot(T0);
    assert_eq!(fired.projectiles.len(), 1);
    let id = fired.projectiles[0].id.clone();

    tick_all(&mut [&mut earthling], T0);
    let seen = earthling.renderable_snapshot(T0 + 500);
    let projectile = seen.projectile(&id).unwrap();
    assert!((projectile.x - (spawn_x + 200.0)).abs() < 1e-3);
    assert!((projectile.y - spawn_y).abs() < 1e-3);
    assert_eq!(projectile.team, Team::Blob);
}

#[test]
fn test_remote_player_dead_reckoned() {
    let store = MemoryStore::new();
    let (mut mover, mover_id) = join(&store, Team::Earthling, config(3));
    let (mut watcher, _) = join(&store, Team::Blob, config(4));

    let start = hold(&mover);
    let moving = LocalInputs { vx: 100.0, ..start.clone() };
    mover.on_tick(T0 + 20, &moving);
    tick_all(&mut [&mut watcher], T0 + 20);
    // First sighting is drawn where it was published
    assert_eq!(watcher.renderable_snapshot(T0 + 520).player(&mover_id).unwrap().x, start.x);

    mover.on_tick(T0 + 40, &moving);
    tick_all(&mut [&mut watcher], T0 + 40);
    let view = watcher.renderable_snapshot(T0 + 540);
    let expected = start.x + 100.0 * 0.5;
    assert!((view.player(&mover_id).unwrap().x - expected).abs() < 1e-3);
}

#[test]
fn test_out_of_order_hits_commute() {
    let store = MemoryStore::new();
    let (mut victim, victim_id) = join(&store, Team::Earthling, config(5));
    let (mut first, _) = join(&store, Team::Blob, config(6));
    let (mut second, _) = join(&store, Team::Blob, config(7));

    tick_all(&mut [&mut victim, &mut first, &mut second], T0 + 20);
    let p1 = first.fire(PI).unwrap();
    let p2 = second.fire(PI).unwrap();
    tick_all(&mut [&mut victim, &mut first, &mut second], T0 + 40);

    // The later shot lands first, and the victim also sees the earlier one itself
    assert!(matches!(second.on_overlap(&p2, &victim_id), DamageOutcome::Applied(_)));
    match victim.on_overlap(&p1, &victim_id) {
        DamageOutcome::Applied(hit) => {
            assert_eq!(hit.target, HitTarget::LocalPlayer);
            assert_eq!(hit.health_after, 80);
        }
        other => panic!("expected local hit, got {other:?}"),
    }
    assert!(matches!(first.on_overlap(&p1, &victim_id), DamageOutcome::Applied(_)));

    tick_all(&mut [&mut victim, &mut first, &mut second], T0 + 60);
    assert_eq!(victim.renderable_snapshot(T0 + 60).local.unwrap().health, 60);
    assert_eq!(stored(&store, &victim_id).unwrap().health, 60);
    assert!(store.read(&path::hits(&victim_id).unwrap()).is_none());

    tick_all(&mut [&mut victim, &mut first, &mut second], T0 + 80);
    assert_eq!(first.renderable_snapshot(T0 + 80).player(&victim_id).unwrap().health, 60);
    assert_eq!(projectile_count(&store), 0);
}

#[test]
fn test_join_then_leave_leaves_no_record() {
    let store = MemoryStore::new();
    let (mut leaver, leaver_id) = join(&store, Team::Blob, config(8));
    let (mut stayer, _) = join(&store, Team::Earthling, config(9));
    tick_all(&mut [&mut leaver, &mut stayer], T0 + 20);
    assert!(stayer.renderable_snapshot(T0 + 20).player(&leaver_id).is_some());

    leaver.leave();
    assert!(stored(&store, &leaver_id).is_none());
    assert!(leaver.player_id().is_none());

    // Ticking after leaving publishes nothing
    tick_all(&mut [&mut leaver, &mut stayer], T0 + 40);
    assert!(stored(&store, &leaver_id).is_none());
    assert!(stayer.renderable_snapshot(T0 + 40).player(&leaver_id).is_none());
}

#[test]
fn test_fires_yield_distinct_independent_projectiles() {
    let store = MemoryStore::seeded(10);
    let (mut shooter, _) = join(&store, Team::Earthling, config(11));
    let (mut target, target_id) = join(&store, Team::Blob, config(12));

    let mut ids = Vec::new();
    for shot in 0..8u64 {
        let now = T0 + shot * 250;
        tick_all(&mut [&mut shooter, &mut target], now);
        ids.push(shooter.fire(0.0).unwrap());
    }
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 8);
    assert_eq!(projectile_count(&store), 8);

    let now = T0 + 8 * 250;
    tick_all(&mut [&mut shooter, &mut target], now);
    let before = target.renderable_snapshot(now);
    assert_eq!(before.projectiles.len(), 8);

    assert!(matches!(target.on_overlap(&ids[3], &target_id), DamageOutcome::Applied(_)));
    tick_all(&mut [&mut shooter, &mut target], now);

    for client in [&shooter, &target] {
        let after = client.renderable_snapshot(now);
        assert_eq!(after.projectiles.len(), 7);
        assert!(after.projectile(&ids[3]).is_none());
    }
    let after = target.renderable_snapshot(now);
    for id in ids.iter().filter(|id| *id != &ids[3]) {
        assert_eq!(after.projectile(id), before.projectile(id));
    }
}

#[test]
fn test_double_retirement_across_clients() {
    let store = MemoryStore::new();
    let (mut attacker, _) = join(&store, Team::Blob, config(13));
    let (mut victim, victim_id) = join(&store, Team::Earthling, config(14));
    let (mut bystander, _) = join(&store, Team::Earthling, config(15));

    tick_all(&mut [&mut attacker, &mut victim, &mut bystander], T0 + 20);
    let shot = attacker.fire(PI).unwrap();
    tick_all(&mut [&mut attacker, &mut victim, &mut bystander], T0 + 40);

    // Both detect the same overlap before either sees the other's delete
    assert!(matches!(victim.on_overlap(&shot, &victim_id), DamageOutcome::Applied(_)));
    assert!(matches!(bystander.on_overlap(&shot, &victim_id), DamageOutcome::Applied(_)));
    assert_eq!(
        victim.on_overlap(&shot, &victim_id),
        DamageOutcome::Ignored(IgnoreReason::UnknownProjectile)
    );

    tick_all(&mut [&mut attacker, &mut victim, &mut bystander], T0 + 60);
    assert_eq!(victim.renderable_snapshot(T0 + 60).local.unwrap().health, 80);
    assert_eq!(projectile_count(&store), 0);
    assert!(attacker.renderable_snapshot(T0 + 60).projectile(&shot).is_none());
}

#[test]
fn test_reset_evicts_other_clients() {
    let store = MemoryStore::new();
    let (mut resetter, _) = join(&store, Team::Earthling, config(16));
    let (mut other, other_id) = join(&store, Team::Blob, config(17));
    tick_all(&mut [&mut resetter, &mut other], T0 + 20);

    resetter.reset();
    assert!(resetter.player_id().is_none());
    assert!(store.read(&path::game_state()).is_none());

    tick_all(&mut [&mut resetter, &mut other], T0 + 40);
    assert!(other.player_id().is_none());
    assert!(stored(&store, &other_id).is_none());
    assert!(store.read(&path::game_state()).is_none());

    // Both can join again with fresh ids
    let rejoined = other.join(T0 + 60).unwrap();
    assert_ne!(rejoined, other_id);
}

#[test]
fn test_overwrite_mode_adopts_attacker_write() {
    let store = MemoryStore::new();
    let overwrite = |seed| SyncConfig {
        damage_mode: DamageMode::Overwrite,
        ..config(seed)
    };
    let (mut victim, victim_id) = join(&store, Team::Earthling, overwrite(18));
    let (mut attacker, _) = join(&store, Team::Blob, overwrite(19));

    tick_all(&mut [&mut victim, &mut attacker], T0 + 20);
    let shot = attacker.fire(PI).unwrap();
    tick_all(&mut [&mut victim, &mut attacker], T0 + 40);

    assert!(matches!(attacker.on_overlap(&shot, &victim_id), DamageOutcome::Applied(_)));
    assert_eq!(stored(&store, &victim_id).unwrap().health, 80);
    assert!(store.read(&path::hits(&victim_id).unwrap()).is_none());

    tick_all(&mut [&mut victim, &mut attacker], T0 + 60);
    assert_eq!(victim.renderable_snapshot(T0 + 60).local.unwrap().health, 80);
    assert_eq!(stored(&store, &victim_id).unwrap().health, 80);
}

#[test]
fn test_overwrite_mode_adopts_write_over_newer_own_publish() {
    let store = MemoryStore::new();
    let overwrite = |seed| SyncConfig {
        damage_mode: DamageMode::Overwrite,
        ..config(seed)
    };
    let (mut victim, victim_id) = join(&store, Team::Earthling, overwrite(22));
    let (mut attacker, _) = join(&store, Team::Blob, overwrite(23));

    tick_all(&mut [&mut victim, &mut attacker], T0 + 20);
    let shot = attacker.fire(PI).unwrap();

    // The victim publishes again before the attacker's cache catches up
    tick_all(&mut [&mut victim], T0 + 40);
    let before_hit = stored(&store, &victim_id).unwrap().version;

    assert!(matches!(attacker.on_overlap(&shot, &victim_id), DamageOutcome::Applied(_)));
    let written = stored(&store, &victim_id).unwrap();
    assert_eq!(written.health, 80);
    assert!(written.version <= before_hit);

    tick_all(&mut [&mut victim], T0 + 60);
    assert_eq!(victim.renderable_snapshot(T0 + 60).local.unwrap().health, 80);
    let republished = stored(&store, &victim_id).unwrap();
    assert_eq!(republished.health, 80);
    assert!(republished.version > before_hit);
}

#[test]
fn test_death_blocks_inputs_until_respawn() {
    let store = MemoryStore::new();
    let (mut victim, victim_id) = join(&store, Team::Earthling, config(20));
    let (mut attacker, _) = join(&store, Team::Blob, config(21));

    let low = LocalInputs { health: Some(20), ..hold(&victim) };
    victim.on_tick(T0 + 20, &low);
    tick_all(&mut [&mut attacker], T0 + 20);
    let shot = attacker.fire(PI).unwrap();
    tick_all(&mut [&mut victim, &mut attacker], T0 + 40);

    match attacker.on_overlap(&shot, &victim_id) {
        DamageOutcome::Applied(hit) => assert!(hit.target_killed),
        other => panic!("expected kill, got {other:?}"),
    }
    tick_all(&mut [&mut victim, &mut attacker], T0 + 60);
    let dead = victim.renderable_snapshot(T0 + 60).local.unwrap();
    assert!(!dead.alive);
    assert_eq!(dead.health, 0);

    // Inputs and fire are ignored while dead
    let push = LocalInputs { x: dead.x + 50.0, fire: Some(0.0), ..hold(&victim) };
    victim.on_tick(T0 + 80, &push);
    let still = victim.renderable_snapshot(T0 + 80).local.unwrap();
    assert_eq!(still.x, dead.x);
    assert!(victim.fire(0.0).is_none());

    assert!(victim.respawn(T0 + 100));
    let record = stored(&store, &victim_id).unwrap();
    assert!(record.alive);
    assert_eq!(record.health, record.max_health);
    assert!(record.x <= 4000.0 / 3.0);

    tick_all(&mut [&mut victim, &mut attacker], T0 + 120);
    let seen = attacker.renderable_snapshot(T0 + 120);
    let view = seen.player(&victim_id).unwrap();
    assert!(view.alive);
    assert_eq!(view.health, 100);
}

#[test]
fn test_objective_damage_shared() {
    let store = MemoryStore::new();
    let (mut attacker, _) = join(&store, Team::Blob, config(22));
    let (mut defender, _) = join(&store, Team::Earthling, config(23));
    attacker.start_game();

    tick_all(&mut [&mut attacker, &mut defender], T0 + 20);
    let shot = attacker.fire(PI).unwrap();
    tick_all(&mut [&mut attacker, &mut defender], T0 + 40);

    match attacker.on_overlap(&shot, OBJECTIVE_ID) {
        DamageOutcome::Applied(hit) => {
            assert_eq!(hit.target, HitTarget::Objective);
            assert_eq!(hit.health_after, 980);
        }
        other => panic!("expected objective hit, got {other:?}"),
    }

    tick_all(&mut [&mut attacker, &mut defender], T0 + 60);
    let view = defender.renderable_snapshot(T0 + 60);
    assert!(view.started);
    assert_eq!(view.objective.unwrap().health, 980);
}

#[test]
fn test_write_failures_are_swallowed() {
    let store = MemoryStore::new();
    store.set_failing(true);
    let (mut client, id) = join(&store, Team::Earthling, config(24));

    tick_all(&mut [&mut client], T0 + 20);
    assert!(client.fire(0.0).is_none());
    assert!(stored(&store, &id).is_none());

    // Writes resume with the next publish once the store recovers
    store.set_failing(false);
    tick_all(&mut [&mut client], T0 + 40);
    let record = stored(&store, &id).unwrap();
    assert_eq!(record.team, Team::Earthling);
    assert!(client.fire(0.0).is_some());
}
