//! Seeded Randomness
//!
//! Every draw the engine makes (bite rolls, fish weights, behavior changes,
//! hook shakes) comes from one of these, owned by the session. Seed it the
//! same way and a session plays out the same way.

use sha2::{Sha256, Digest};

/// Xorshift128+ generator.
///
/// ```
/// use angler::core::rng::DeterministicRng;
///
/// let mut rng = DeterministicRng::new(12345);
/// assert_eq!(rng.next_u64(), 6233086606872742541);
/// ```
#[derive(Clone, Debug)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Seed the generator. The seed is spread over both state words with
    /// SplitMix64, so small or sequential seeds are fine.
    pub fn new(seed: u64) -> Self {
        let mut cursor = seed;
        let high = splitmix64(&mut cursor);
        let low = splitmix64(&mut cursor);

        // All-zero state would only ever yield zeros.
        let state = if (high | low) == 0 { [1, 1] } else { [high, low] };
        Self { state }
    }

    /// Create the RNG for a fishing session.
    pub fn for_session(player_id: &[u8; 16], session_id: &[u8; 16], entropy: u64) -> Self {
        Self::new(derive_session_seed(player_id, session_id, entropy))
    }

    /// Next raw 64-bit output.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let [a, b] = self.state;
        let out = a.wrapping_add(b);

        let mixed = b ^ a;
        self.state = [a.rotate_left(24) ^ mixed ^ (mixed << 16), mixed.rotate_left(37)];
        out
    }

    /// Generate a float uniformly in [0, 1).
    ///
    /// Takes the top 53 bits so every value is exactly representable.
    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Generate a float uniformly in [min, max).
    ///
    /// Returns `min` when the range is empty or inverted.
    #[inline]
    pub fn range_f64(&mut self, min: f64, max: f64) -> f64 {
        if max <= min {
            return min;
        }
        min + self.next_f64() * (max - min)
    }

    /// Return true with the given probability.
    ///
    /// Values <= 0 never succeed, values >= 1 always do.
    #[inline]
    pub fn chance(&mut self, probability: f64) -> bool {
        self.next_f64() < probability
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> [u64; 2] {
        self.state
    }
}

#[inline]
fn splitmix64(cursor: &mut u64) -> u64 {
    *cursor = cursor.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *cursor;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Derive a session seed from the player, the session and a caller entropy value.
///
/// The server passes wall-clock nanoseconds as `entropy`; tests pass a constant
/// to get a reproducible session.
pub fn derive_session_seed(player_id: &[u8; 16], session_id: &[u8; 16], entropy: u64) -> u64 {
    let digest = Sha256::new()
        .chain_update(b"ANGLER_SESSION_SEED_V1")
        .chain_update(player_id)
        .chain_update(session_id)
        .chain_update(entropy.to_le_bytes())
        .finalize();

    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = DeterministicRng::new(777);
        let mut b = DeterministicRng::new(777);
        let mut other = DeterministicRng::new(778);

        let first: Vec<u64> = (0..500).map(|_| a.next_u64()).collect();
        let second: Vec<u64> = (0..500).map(|_| b.next_u64()).collect();
        assert_eq!(first, second);
        assert_ne!(first[0], other.next_u64());
    }

    #[test]
    fn test_rng_known_values() {
        // Regression values: changing these breaks reproducible test sessions.
        let mut rng = DeterministicRng::new(42);
        assert_eq!(rng.next_u64(), 16629283624882167704);
        assert_eq!(rng.next_u64(), 1420492921613871959);
        assert_eq!(rng.next_u64(), 9768315062676884790);
    }

    #[test]
    fn test_next_f64_unit_interval() {
        let mut rng = DeterministicRng::new(9999);

        for _ in 0..10_000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn test_range_f64() {
        let mut rng = DeterministicRng::new(5678);

        for _ in 0..1000 {
            let v = rng.range_f64(-60.0, 60.0);
            assert!((-60.0..60.0).contains(&v));
        }

        // Empty range collapses to min
        assert_eq!(rng.range_f64(5.0, 5.0), 5.0);
        assert_eq!(rng.range_f64(7.0, 3.0), 7.0);
    }

    #[test]
    fn test_chance_extremes() {
        let mut rng = DeterministicRng::new(1);

        for _ in 0..1000 {
            assert!(!rng.chance(0.0));
            assert!(rng.chance(1.0));
        }
    }

    #[test]
    fn test_derive_session_seed() {
        let player = [2u8; 16];
        let session = [1u8; 16];

        let seed1 = derive_session_seed(&player, &session, 7);
        let seed2 = derive_session_seed(&player, &session, 7);
        assert_eq!(seed1, seed2);

        assert_ne!(seed1, derive_session_seed(&player, &[9u8; 16], 7));
        assert_ne!(seed1, derive_session_seed(&player, &session, 8));
    }

    #[test]
    fn test_clone_continues_stream() {
        let mut rng = DeterministicRng::new(31);
        rng.next_u64();

        let mut fork = rng.clone();
        assert_eq!(fork.state(), rng.state());
        assert_eq!(fork.next_f64(), rng.next_f64());
    }
}
