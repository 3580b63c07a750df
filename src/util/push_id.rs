//! Store-assigned keys for appended records
//!
//! Keys are 20 characters: 8 encode the creation time, 12 are random. Keys
//! sort lexicographically in creation order, and two keys minted in the same
//! millisecond differ by an incremented random tail, so a generator never
//! hands out the same key twice.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const ALPHABET: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// Generator for sortable, collision-resistant record keys
#[derive(Debug)]
pub struct PushIdGenerator {
    rng: ChaCha8Rng,
    last_millis: u64,
    last_random: [u8; 12],
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self::from_rng(ChaCha8Rng::from_entropy())
    }

    /// Deterministic generator for tests
    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(ChaCha8Rng::seed_from_u64(seed))
    }

    fn from_rng(rng: ChaCha8Rng) -> Self {
        Self {
            rng,
            last_millis: 0,
            last_random: [0; 12],
        }
    }

    /// Mint a new key for the given timestamp
    pub fn next_id(&mut self, now_millis: u64) -> String {
        if now_millis == self.last_millis {
            // Same millisecond: increment the random tail so ordering holds
            for digit in self.last_random.iter_mut().rev() {
                if *digit < 63 {
                    *digit += 1;
                    break;
                }
                *digit = 0;
            }
        } else {
            self.last_millis = now_millis;
            for digit in self.last_random.iter_mut() {
                *digit = self.rng.gen_range(0..64);
            }
        }

        let mut id = String::with_capacity(20);
        let mut time_chars = [0u8; 8];
        let mut t = now_millis;
        for slot in time_chars.iter_mut().rev() {
            *slot = ALPHABET[(t % 64) as usize];
            t /= 64;
        }
        id.extend(time_chars.iter().map(|&c| c as char));
        id.extend(self.last_random.iter().map(|&d| ALPHABET[d as usize] as char));
        id
    }
}

impl Default for PushIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
