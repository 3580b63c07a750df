//! Time utilities for replication and dead reckoning

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Publish rate configuration
pub const PUBLISH_TPS: u32 = 60; // 60 player publishes per second
pub const PROJECTILE_SYNC_MS: u64 = 100;

/// How long a retired projectile id is remembered after it was last seen
pub const FORGET_AFTER_MS: u64 = 10_000;

/// Interval between throttled publishes for a given rate, in milliseconds
pub fn publish_interval_ms(publish_tps: u32) -> f64 {
    1000.0 / publish_tps.max(1) as f64
}

/// Seconds elapsed between two millisecond timestamps.
///
/// Clock skew between clients can put `since` in the future; that reads as
/// zero elapsed rather than negative.
pub fn elapsed_secs(since_ms: u64, now_ms: u64) -> f32 {
    now_ms.saturating_sub(since_ms) as f32 / 1000.0
}
