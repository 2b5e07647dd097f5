//! xorshift64* random number generator
//!
//! This is a fast, high-quality PRNG that is deterministic and suitable
//! for simulation purposes.
//!
//! # Algorithm
//!
//! xorshift64* is a variant of xorshift that passes TestU01's BigCrush
//! statistical tests. It uses 64-bit state and produces 64-bit output.
//!
//! # Determinism
//!
//! Same seed → same sequence of random numbers. This is CRITICAL for:
//! - Debugging (reproduce exact simulation)
//! - Testing (verify behavior)
//! - Scoring (agents compete against identical factories)

use serde::{Deserialize, Serialize};

/// Deterministic random number generator using xorshift64*
///
/// # Example
/// ```
/// use factory_simulator_core_rs::RngManager;
///
/// let mut rng = RngManager::new(12345);
/// let value = rng.next();
/// let seconds = rng.uniform_f64(30.0, 60.0); // order interval sample
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngManager {
    /// Internal state (64-bit)
    state: u64,
}

impl RngManager {
    /// Create a new RNG with given seed
    ///
    /// # Arguments
    /// * `seed` - Initial seed value (u64)
    pub fn new(seed: u64) -> Self {
        // Ensure seed is never zero (xorshift requirement)
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Generate next random u64 value
    ///
    /// This advances the internal state and returns a random value.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> u64 {
        // xorshift64* algorithm
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Generate random value in range [min, max)
    ///
    /// # Panics
    /// Panics if min >= max
    pub fn range(&mut self, min: i64, max: i64) -> i64 {
        assert!(min < max, "min must be less than max");

        let value = self.next();
        let range_size = (max - min) as u64;
        min + (value % range_size) as i64
    }

    /// Generate random f64 in range [0.0, 1.0)
    ///
    /// Useful for sampling from probability distributions.
    pub fn next_f64(&mut self) -> f64 {
        let value = self.next();
        // Convert to [0.0, 1.0) using the top 53 bits
        (value >> 11) as f64 * (1.0 / ((1u64 << 53) as f64))
    }

    /// Generate random f64 uniformly distributed in [min, max)
    ///
    /// Processing times, fault durations and order intervals are all
    /// sampled with this.
    ///
    /// # Panics
    /// Panics if min > max
    pub fn uniform_f64(&mut self, min: f64, max: f64) -> f64 {
        assert!(min <= max, "min must not exceed max");
        min + self.next_f64() * (max - min)
    }

    /// Bernoulli draw: returns true with probability `p`
    ///
    /// # Example
    /// ```
    /// use factory_simulator_core_rs::RngManager;
    ///
    /// let mut rng = RngManager::new(7);
    /// let failed = rng.bernoulli(0.06); // P1 quality failure rate
    /// let _ = failed;
    /// ```
    pub fn bernoulli(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Weighted categorical choice: returns an index into `weights`
    ///
    /// Weights need not be normalized. Zero-weight entries are never
    /// selected (unless all weights are zero, in which case index 0 is
    /// returned).
    ///
    /// # Panics
    /// Panics if `weights` is empty or any weight is negative
    pub fn weighted_choice(&mut self, weights: &[f64]) -> usize {
        assert!(!weights.is_empty(), "weights must not be empty");
        assert!(
            weights.iter().all(|w| *w >= 0.0),
            "weights must be non-negative"
        );

        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return 0;
        }

        let mut draw = self.next_f64() * total;
        for (idx, w) in weights.iter().enumerate() {
            if draw < *w {
                return idx;
            }
            draw -= w;
        }
        weights.len() - 1
    }

    /// Generate an 8-character lowercase hex suffix for entity IDs
    ///
    /// Product and order identifiers use this instead of a UUID so the
    /// whole simulation stays reproducible from one seed.
    pub fn hex_id(&mut self) -> String {
        format!("{:08x}", (self.next() as u32))
    }

    /// Get current RNG state (for replay)
    pub fn get_state(&self) -> u64 {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_seed_converted_to_nonzero() {
        let rng = RngManager::new(0);
        assert_ne!(rng.get_state(), 0, "Zero seed should be converted to 1");
    }

    #[test]
    #[should_panic(expected = "min must be less than max")]
    fn test_range_invalid_bounds() {
        let mut rng = RngManager::new(12345);
        rng.range(100, 50);
    }

    #[test]
    fn test_uniform_f64_in_bounds() {
        let mut rng = RngManager::new(12345);

        for _ in 0..1000 {
            let val = rng.uniform_f64(30.0, 60.0);
            assert!(
                (30.0..60.0).contains(&val),
                "uniform_f64 produced value {} outside [30, 60)",
                val
            );
        }
    }

    #[test]
    fn test_bernoulli_extremes() {
        let mut rng = RngManager::new(99);
        for _ in 0..100 {
            assert!(!rng.bernoulli(0.0));
            assert!(rng.bernoulli(1.0));
        }
    }

    #[test]
    fn test_weighted_choice_respects_zero_weights() {
        let mut rng = RngManager::new(4242);
        for _ in 0..1000 {
            let idx = rng.weighted_choice(&[0.0, 1.0, 0.0]);
            assert_eq!(idx, 1);
        }
    }

    #[test]
    fn test_weighted_choice_deterministic() {
        let mut a = RngManager::new(77);
        let mut b = RngManager::new(77);
        let weights = [0.6, 0.3, 0.1];

        for _ in 0..500 {
            assert_eq!(a.weighted_choice(&weights), b.weighted_choice(&weights));
        }
    }

    #[test]
    fn test_hex_id_format() {
        let mut rng = RngManager::new(1);
        let id = rng.hex_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
