//! Seeded random number generation.
//!
//! Every stochastic operation in the engine (weight initialisation, dropout masks,
//! epsilon-greedy exploration, replay sampling) draws from an explicit [`SeededRng`]
//! passed in by the caller. There is no global source, so a run is fully
//! reproducible from its seed.

use ndarray::Array2;
use ndarray_rand::rand_distr::{StandardNormal, Uniform};
use ndarray_rand::RandomExt;
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Deterministic RNG backed by ChaCha8.
///
/// Implements [`RngCore`], so it can be handed to anything expecting a `rand::Rng`.
#[derive(Debug, Clone)]
pub struct SeededRng {
    inner: ChaCha8Rng,
}

impl SeededRng {
    /// Create a new RNG from an explicit seed.
    pub fn new(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Uniform sample in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        self.inner.gen::<f64>()
    }

    /// Uniform sample in [low, high).
    pub fn gen_range_f64(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.next_f64()
    }

    /// Integer sample in [0, upper). Returns 0 when `upper` is 0.
    pub fn gen_usize(&mut self, upper: usize) -> usize {
        if upper == 0 {
            0
        } else {
            self.inner.gen_range(0..upper)
        }
    }

    /// `true` with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Matrix of independent standard normal draws.
    pub fn standard_normal(&mut self, rows: usize, cols: usize) -> Array2<f64> {
        Array2::random_using((rows, cols), StandardNormal, &mut self.inner)
    }

    /// Inverted-dropout mask: each entry is `1 / keep_prob` with probability
    /// `keep_prob`, otherwise `0`.
    pub fn bernoulli_mask(&mut self, rows: usize, cols: usize, keep_prob: f64) -> Array2<f64> {
        let uniform = Array2::random_using((rows, cols), Uniform::new(0.0, 1.0), &mut self.inner);
        uniform.mapv(|u| if u < keep_prob { 1.0 / keep_prob } else { 0.0 })
    }

    /// `amount` distinct indices drawn from `0..len`, in random order.
    pub fn sample_indices(&mut self, len: usize, amount: usize) -> Vec<usize> {
        rand::seq::index::sample(&mut self.inner, len, amount.min(len)).into_vec()
    }

    /// Index drawn with probability proportional to `weights[i]`.
    ///
    /// Returns `None` when the weights are empty, negative, or sum to zero.
    pub fn weighted_index(&mut self, weights: &[f64]) -> Option<usize> {
        let dist = WeightedIndex::new(weights).ok()?;
        Some(dist.sample(&mut self.inner))
    }
}

impl RngCore for SeededRng {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.inner.try_fill_bytes(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rng_deterministic() {
        let mut rng1 = SeededRng::new(42);
        let mut rng2 = SeededRng::new(42);

        for _ in 0..100 {
            assert_eq!(rng1.next_u32(), rng2.next_u32());
        }
    }

    #[test]
    fn test_rng_next_f64_range() {
        let mut rng = SeededRng::new(12345);

        for _ in 0..1000 {
            let val = rng.next_f64();
            assert!((0.0..1.0).contains(&val));
        }
    }

    #[test]
    fn test_rng_gen_usize_zero() {
        let mut rng = SeededRng::new(22222);
        assert_eq!(rng.gen_usize(0), 0);
    }

    #[test]
    fn test_bernoulli_mask_values() {
        let mut rng = SeededRng::new(7);
        let mask = rng.bernoulli_mask(20, 20, 0.5);

        for &value in mask.iter() {
            assert!(value == 0.0 || (value - 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_sample_indices_distinct() {
        let mut rng = SeededRng::new(33333);
        let mut picked = rng.sample_indices(10, 5);
        picked.sort_unstable();
        picked.dedup();
        assert_eq!(picked.len(), 5);
        assert!(picked.iter().all(|&i| i < 10));
    }

    #[test]
    fn test_weighted_index_skips_zero_weights() {
        let mut rng = SeededRng::new(44444);
        for _ in 0..200 {
            let idx = rng.weighted_index(&[0.0, 1.0, 0.0]);
            assert_eq!(idx, Some(1));
        }
        assert_eq!(rng.weighted_index(&[]), None);
        assert_eq!(rng.weighted_index(&[0.0, 0.0]), None);
    }
}
