//! xorshift64* random number generator
//!
//! This is a fast, high-quality PRNG that is deterministic and suitable
//! for seeding fallback model weights and driving the optimization learner.
//!
//! # Determinism
//!
//! Same seed → same sequence of random numbers. This is CRITICAL for:
//! - Fallback artifacts (every process builds the same default predictor)
//! - Testing (two runs of the same request agree)
//! - Reproducing an optimization outcome from its config seed

use serde::{Deserialize, Serialize};

/// Deterministic random number generator using xorshift64*
///
/// # Example
/// ```
/// use policy_simulator_core_rs::RngManager;
///
/// let mut rng = RngManager::new(12345);
/// let value = rng.next();
/// let range_value = rng.range(0, 100); // [0, 100)
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngManager {
    /// Internal state (64-bit)
    state: u64,
}

impl RngManager {
    /// Create a new RNG with given seed
    ///
    /// # Example
    /// ```
    /// use policy_simulator_core_rs::RngManager;
    ///
    /// let rng = RngManager::new(12345);
    /// ```
    pub fn new(seed: u64) -> Self {
        // Ensure seed is never zero (xorshift requirement)
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Create an RNG whose stream is keyed by a label as well as a seed
    ///
    /// Used to give every artifact id its own reproducible stream without
    /// the streams of two ids overlapping at the start.
    ///
    /// # Example
    /// ```
    /// use policy_simulator_core_rs::RngManager;
    ///
    /// let mut a = RngManager::derived(42, "impact_congestion");
    /// let mut b = RngManager::derived(42, "impact_congestion");
    /// assert_eq!(a.next(), b.next());
    /// ```
    pub fn derived(seed: u64, label: &str) -> Self {
        // FNV-1a over the label, folded into the seed
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in label.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        Self::new(seed ^ hash)
    }

    /// Generate next random u64 value
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

    /// Get current RNG state (for replay)
    pub fn get_state(&self) -> u64 {
        self.state
    }

    /// Generate random f64 in range [0.0, 1.0)
    ///
    /// # Example
    /// ```
    /// use policy_simulator_core_rs::RngManager;
    ///
    /// let mut rng = RngManager::new(12345);
    /// let probability = rng.next_f64();
    /// assert!(probability >= 0.0 && probability < 1.0);
    /// ```
    pub fn next_f64(&mut self) -> f64 {
        let value = self.next();
        // Convert to [0.0, 1.0) by dividing by 2^53
        (value >> 11) as f64 * (1.0 / ((1u64 << 53) as f64))
    }

    /// Generate random f64 in range [min, max)
    pub fn uniform(&mut self, min: f64, max: f64) -> f64 {
        min + (max - min) * self.next_f64()
    }

    /// Sample from the standard normal distribution (Box-Muller)
    pub fn standard_normal(&mut self) -> f64 {
        // 1 - u keeps the log argument inside (0, 1]
        let u1 = 1.0 - self.next_f64();
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
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
    fn test_next_f64_in_range() {
        let mut rng = RngManager::new(12345);

        for _ in 0..1000 {
            let val = rng.next_f64();
            assert!(
                (0.0..1.0).contains(&val),
                "next_f64() produced value {} outside [0.0, 1.0)",
                val
            );
        }
    }

    #[test]
    fn test_uniform_respects_bounds() {
        let mut rng = RngManager::new(7);
        for _ in 0..1000 {
            let val = rng.uniform(5.0, 15.0);
            assert!((5.0..15.0).contains(&val));
        }
    }

    #[test]
    fn test_standard_normal_is_finite_and_centered() {
        let mut rng = RngManager::new(99);
        let n = 5000;
        let mut sum = 0.0;
        for _ in 0..n {
            let val = rng.standard_normal();
            assert!(val.is_finite());
            sum += val;
        }
        let mean = sum / n as f64;
        assert!(mean.abs() < 0.1, "sample mean {} too far from 0", mean);
    }

    #[test]
    fn test_derived_streams_differ_by_label() {
        let mut a = RngManager::derived(42, "impact_congestion");
        let mut b = RngManager::derived(42, "impact_energy");
        assert_ne!(a.next(), b.next());
    }
}
