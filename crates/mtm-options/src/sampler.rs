//! # Standard Normal CDF Sampler
//!
//! Order-statistic estimator of the standard normal cumulative distribution.
//!
//! ## Description
//! Rather than approximating Φ(x) analytically, the sampler draws N values from
//! N(0, 1) once, sorts them, and answers `P(Z ≤ x)` as the fraction of samples not
//! greater than `x`. Construction costs O(N log N); each lookup is a binary search,
//! O(log N). Accuracy improves with N (standard error ≈ 0.5/√N at the median).
//!
//! The sorted samples are never mutated after construction, so one sampler can be
//! shared through an `Arc` by any number of pricing calls without locking.

use mtm_models::ValuationError;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rand_pcg::Pcg64;

/// Sorted standard-normal draws used to estimate Φ.
#[derive(Debug, Clone)]
pub struct DistributionSampler {
    sorted_samples: Box<[f64]>,
}

impl DistributionSampler {
    /// Draws and sorts `sample_count` standard-normal values from `rng`.
    ///
    /// # Parameters
    /// * `sample_count` - Number of draws N, must be positive
    /// * `rng` - Pseudo-random source; pass a seeded generator for reproducible runs
    ///
    /// # Returns
    /// [`ValuationError::Configuration`] when `sample_count` is zero.
    pub fn new<R: Rng + ?Sized>(sample_count: usize, rng: &mut R) -> Result<Self, ValuationError> {
        if sample_count == 0 {
            return Err(ValuationError::Configuration(
                "distribution sampler needs at least one sample".to_string(),
            ));
        }
        let mut samples: Vec<f64> = (0..sample_count).map(|_| rng.sample(StandardNormal)).collect();
        samples.sort_unstable_by(f64::total_cmp);
        Ok(Self {
            sorted_samples: samples.into_boxed_slice(),
        })
    }

    /// Convenience constructor backed by a [`Pcg64`] seeded with `seed`.
    pub fn seeded(sample_count: usize, seed: u64) -> Result<Self, ValuationError> {
        let mut rng = Pcg64::seed_from_u64(seed);
        Self::new(sample_count, &mut rng)
    }

    /// Estimates `P(Z ≤ x)` as `count(samples ≤ x) / N`.
    ///
    /// Saturates to 0.0 below the smallest sample and to 1.0 at or above the largest.
    /// NaN compares false against every sample and therefore maps to 0.0.
    pub fn odds_less_than(&self, x: f64) -> f64 {
        let rank = self.sorted_samples.partition_point(|sample| *sample <= x);
        rank as f64 / self.sorted_samples.len() as f64
    }

    pub fn sample_count(&self) -> usize {
        self.sorted_samples.len()
    }
}
