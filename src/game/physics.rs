//! Playfield bounds and dead reckoning

use rand::Rng;

use crate::protocol::Team;

/// Rectangular playfield anchored at the origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Playfield {
    pub width: f32,
    pub height: f32,
}

impl Playfield {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width: width.max(1.0),
            height: height.max(1.0),
        }
    }

    /// Check if a point is inside the playfield (edges included)
    pub fn contains(&self, x: f32, y: f32) -> bool {
        (0.0..=self.width).contains(&x) && (0.0..=self.height).contains(&y)
    }

    /// Pull a point back inside the playfield
    pub fn clamp(&self, x: f32, y: f32) -> (f32, f32) {
        (x.clamp(0.0, self.width), y.clamp(0.0, self.height))
    }

    pub fn center(&self) -> (f32, f32) {
        (self.width / 2.0, self.height / 2.0)
    }

    /// Spawn area for a team: earthlings on the left third, blobs on the right
    pub fn spawn_region(&self, team: Team) -> ((f32, f32), (f32, f32)) {
        let third = self.width / 3.0;
        let x_range = match team {
            Team::Earthling => (0.0, third),
            Team::Blob => (self.width - third, self.width),
        };
        (x_range, (0.0, self.height))
    }

    /// Pick a random spawn point for a team
    pub fn random_spawn<R: Rng>(&self, team: Team, rng: &mut R) -> (f32, f32) {
        let ((x_min, x_max), (y_min, y_max)) = self.spawn_region(team);
        (rng.gen_range(x_min..=x_max), rng.gen_range(y_min..=y_max))
    }
}

impl Default for Playfield {
    fn default() -> Self {
        Self::new(1280.0, 720.0)
    }
}

/// Extrapolate a position from its last known velocity
pub fn dead_reckon(position: (f32, f32), velocity: (f32, f32), elapsed_secs: f32) -> (f32, f32) {
    (
        position.0 + velocity.0 * elapsed_secs,
        position.1 + velocity.1 * elapsed_secs,
    )
}

/// Velocity vector for a heading and speed
pub fn heading_velocity(angle: f32, speed: f32) -> (f32, f32) {
    (angle.cos() * speed, angle.sin() * speed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_contains_edges() {
        let field = Playfield::new(100.0, 50.0);
        assert!(field.contains(0.0, 0.0));
        assert!(field.contains(100.0, 50.0));
        assert!(!field.contains(100.1, 10.0));
        assert!(!field.contains(10.0, -0.1));
    }

    #[test]
    fn test_spawn_regions_by_team() {
        let field = Playfield::new(900.0, 600.0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..50 {
            let (x, y) = field.random_spawn(Team::Earthling, &mut rng);
            assert!((0.0..=300.0).contains(&x));
            assert!((0.0..=600.0).contains(&y));
            let (x, _) = field.random_spawn(Team::Blob, &mut rng);
            assert!((600.0..=900.0).contains(&x));
        }
    }

    #[test]
    fn test_heading_velocity_along_x() {
        assert_eq!(heading_velocity(0.0, 400.0), (400.0, 0.0));
    }

    proptest! {
        #[test]
        fn dead_reckoning_is_linear(
            x in -1.0e4f32..1.0e4,
            y in -1.0e4f32..1.0e4,
            vx in -1.0e3f32..1.0e3,
            vy in -1.0e3f32..1.0e3,
            elapsed in 0.0f32..10.0,
        ) {
            let (px, py) = dead_reckon((x, y), (vx, vy), elapsed);
            prop_assert_eq!(px, x + vx * elapsed);
            prop_assert_eq!(py, y + vy * elapsed);
        }
    }
}
