//! Arena Sync demo - headless clients sharing one store
//!
//! Runs scripted players against the in-memory store, or a single player
//! against a realtime database when `STORE_URL` is set. The loop plays the
//! part of the rendering shell: it feeds inputs every frame, reports
//! overlaps, and logs what a renderer would draw.

use std::f32::consts::PI;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arena_sync::config::Config;
use arena_sync::game::{DamageOutcome, LocalInputs, RenderSnapshot};
use arena_sync::protocol::OBJECTIVE_ID;
use arena_sync::store::{MemoryStore, RestStore, StateStore};
use arena_sync::util::time::{publish_interval_ms, unix_millis};
use arena_sync::{GameClient, Team};

/// Overlap distance between a projectile and a player or the objective
const HIT_RADIUS: f32 = 24.0;

/// How often the demo logs a render snapshot
const REPORT_EVERY_MS: u64 = 1_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    info!("Starting Arena Sync demo");

    let (store, teams): (Arc<dyn StateStore>, Vec<Team>) = match &config.store_url {
        Some(url) => {
            info!(url = %url, "Using realtime database");
            let store = RestStore::new(url, config.store_auth.clone(), config.store_poll)?;
            (Arc::new(store), vec![Team::Earthling])
        }
        None => {
            info!("Using in-memory store");
            (Arc::new(MemoryStore::new()), Team::ALL.to_vec())
        }
    };

    let start_ms = unix_millis();
    let mut pilots = Vec::with_capacity(teams.len());
    for (seat, team) in teams.into_iter().enumerate() {
        let mut client = GameClient::new(store.clone(), config.sync.clone())?;
        client.on_team_chosen(team);
        if let Some(id) = client.join(start_ms) {
            info!(player_id = %id, team = %team, "Pilot joined");
        }
        pilots.push(Pilot::new(client, seat));
    }
    if let Some(host) = pilots.first_mut() {
        host.client.start_game();
    }

    let frame = Duration::from_micros((publish_interval_ms(config.sync.publish_tps) * 1000.0) as u64);
    let mut ticker = interval(frame);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let deadline = tokio::time::sleep(config.demo_duration);
    tokio::pin!(deadline);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut last_report_ms = start_ms;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now_ms = unix_millis();
                for pilot in pilots.iter_mut() {
                    pilot.step(now_ms, start_ms);
                }
                if now_ms.saturating_sub(last_report_ms) >= REPORT_EVERY_MS {
                    last_report_ms = now_ms;
                    for pilot in &pilots {
                        report(&pilot.client.renderable_snapshot(now_ms));
                    }
                }
            }
            _ = &mut deadline => {
                info!("Demo finished");
                break;
            }
            _ = &mut shutdown => break,
        }
    }

    for pilot in pilots {
        pilot.client.shutdown();
    }

    // Let spawned store writes drain before the runtime goes away
    tokio::time::sleep(Duration::from_millis(200)).await;

    info!("Shutdown complete");
    Ok(())
}

/// Scripted stand-in for a human player and the renderer around them
struct Pilot {
    client: GameClient,
    seat: usize,
}

impl Pilot {
    fn new(client: GameClient, seat: usize) -> Self {
        Self { client, seat }
    }

    fn step(&mut self, now_ms: u64, start_ms: u64) {
        let before = self.client.renderable_snapshot(now_ms);
        let inputs = match &before.local {
            Some(local) if local.alive => self.script(now_ms, start_ms, local.x, local.y, local.team),
            Some(_) => {
                if self.client.respawn(now_ms) {
                    info!(seat = self.seat, "Pilot respawned");
                }
                LocalInputs::default()
            }
            None => LocalInputs::default(),
        };

        self.client.on_tick(now_ms, &inputs);
        self.detect_overlaps(now_ms);
    }

    /// Drift up and down, fire toward the other side every so often
    fn script(&self, now_ms: u64, start_ms: u64, x: f32, y: f32, team: Team) -> LocalInputs {
        let t = now_ms.saturating_sub(start_ms) as f32 / 1000.0;
        let vy = (t + self.seat as f32).sin() * 120.0;
        let heading = match team {
            Team::Earthling => 0.0,
            Team::Blob => PI,
        };
        LocalInputs {
            x,
            y: y + vy / 60.0,
            rotation: heading,
            vx: 0.0,
            vy,
            health: None,
            fire: Some(heading + (t * 0.7).sin() * 0.2),
        }
    }

    /// The naive overlap test a renderer would run on its sprites
    fn detect_overlaps(&mut self, now_ms: u64) {
        let view = self.client.renderable_snapshot(now_ms);
        let mut targets: Vec<(String, f32, f32)> = view
            .local
            .iter()
            .chain(view.players.iter())
            .filter(|p| p.alive)
            .map(|p| (p.id.clone(), p.x, p.y))
            .collect();
        if let Some(objective) = &view.objective {
            targets.push((OBJECTIVE_ID.to_string(), objective.x, objective.y));
        }

        for projectile in &view.projectiles {
            let hit = targets
                .iter()
                .find(|(_, x, y)| (projectile.x - x).hypot(projectile.y - y) <= HIT_RADIUS);
            let Some((target_id, _, _)) = hit else {
                continue;
            };
            match self.client.on_overlap(&projectile.id, target_id) {
                DamageOutcome::Applied(result) => {
                    debug!(
                        seat = self.seat,
                        target_id = %target_id,
                        health = result.health_after,
                        killed = result.target_killed,
                        "Hit"
                    );
                }
                DamageOutcome::Ignored(reason) => {
                    debug!(seat = self.seat, ?reason, "Overlap ignored");
                }
            }
        }
    }
}

/// Log what a renderer would draw this frame
fn report(snapshot: &RenderSnapshot) {
    let Some(local) = &snapshot.local else {
        warn!("Client has no local player");
        return;
    };
    info!(
        player_id = %local.id,
        team = %local.team,
        x = local.x,
        y = local.y,
        health = local.health,
        alive = local.alive,
        remote_players = snapshot.players.len(),
        projectiles = snapshot.projectiles.len(),
        objective_health = ?snapshot.objective.as_ref().map(|o| o.health),
        started = snapshot.started,
        "Frame"
    );
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
