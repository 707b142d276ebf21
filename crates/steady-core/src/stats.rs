//! Incremental statistics engine
//!
//! `StreamAccumulator` keeps a running mean and sum of squared deviations (M2)
//! using Welford's recurrence, so month-to-month totals that differ by orders of
//! magnitude never go through the cancellation-prone `E[x²] - E[x]²` form.
//!
//! Two extensions are used by the analyzers:
//! - `retract` / `replace` undo a previous observation, which lets a "one value
//!   per calendar month" stream absorb a growing month total without a rescan
//! - `ingest_weighted` accepts a positive weight (e.g. a half-life decay) so
//!   stale months can be down-weighted without being discarded

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Running mean/variance over a stream of observations
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StreamAccumulator {
    /// Number of observations
    pub count: u64,
    pub mean: f64,
    /// Sum of squared deviations from the mean (M2)
    pub sum_sq_dev: f64,
    /// Total weight ingested (equals `count` when every weight is 1)
    pub decay_weight_sum: f64,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an accumulator from a sequence of unit-weight values
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let mut acc = Self::new();
        for v in values {
            acc.ingest(v);
        }
        acc
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Add one observation with weight 1
    pub fn ingest(&mut self, x: f64) {
        self.count += 1;
        self.decay_weight_sum += 1.0;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = x - self.mean;
        self.sum_sq_dev += delta * delta2;
    }

    /// Add one observation with an arbitrary positive weight
    pub fn ingest_weighted(&mut self, x: f64, weight: f64) -> Result<()> {
        if !weight.is_finite() || weight <= 0.0 {
            return Err(Error::InvalidWeight(weight));
        }

        self.count += 1;
        self.decay_weight_sum += weight;
        let delta = x - self.mean;
        self.mean += (weight / self.decay_weight_sum) * delta;
        let delta2 = x - self.mean;
        self.sum_sq_dev += weight * delta * delta2;
        Ok(())
    }

    /// Remove a previously ingested unit-weight observation
    ///
    /// Retracting a value that was never ingested leaves the accumulator in an
    /// undefined (but still finite and non-negative) state.
    pub fn retract(&mut self, x: f64) {
        if self.count <= 1 {
            *self = Self::default();
            return;
        }

        let remaining = (self.count - 1) as f64;
        let old_mean = self.mean;
        let new_mean = (old_mean * self.count as f64 - x) / remaining;
        self.sum_sq_dev -= (x - new_mean) * (x - old_mean);
        if self.sum_sq_dev < 0.0 {
            self.sum_sq_dev = 0.0;
        }
        self.mean = new_mean;
        self.count -= 1;
        self.decay_weight_sum -= 1.0;
    }

    /// Swap an observation for a new value (retract then ingest)
    pub fn replace(&mut self, old: f64, new: f64) {
        self.retract(old);
        self.ingest(new);
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance, 0 until at least two observations exist
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        (self.sum_sq_dev / (self.count - 1) as f64).max(0.0)
    }

    /// Weighted (population) variance, 0 when no weight has been ingested
    pub fn weighted_variance(&self) -> f64 {
        if self.decay_weight_sum <= 0.0 || self.count < 2 {
            return 0.0;
        }
        (self.sum_sq_dev / self.decay_weight_sum).max(0.0)
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// `std_dev / mean`, 0 when the mean is not positive
    pub fn coefficient_of_variation(&self) -> f64 {
        if self.mean <= 0.0 {
            return 0.0;
        }
        let cv = self.std_dev() / self.mean;
        if cv.is_finite() {
            cv
        } else {
            0.0
        }
    }
}

/// Exponential half-life weight for an observation `age` periods old
pub fn decay_weight(age: f64, half_life: f64) -> f64 {
    if half_life <= 0.0 || age <= 0.0 {
        return 1.0;
    }
    0.5_f64.powf(age / half_life)
}

/// Add `amount` to the bucket `key`, keeping `acc` at one observation per bucket
///
/// A new bucket is ingested; a growing bucket replaces its previous total.
pub fn bucket_add<K: Ord>(
    acc: &mut StreamAccumulator,
    totals: &mut BTreeMap<K, f64>,
    key: K,
    amount: f64,
) {
    match totals.get_mut(&key) {
        Some(total) => {
            let old = *total;
            *total += amount;
            acc.replace(old, *total);
        }
        None => {
            totals.insert(key, amount);
            acc.ingest(amount);
        }
    }
}

/// Round to cents
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch_mean_var(values: &[f64]) -> (f64, f64) {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = if values.len() < 2 {
            0.0
        } else {
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
        };
        (mean, var)
    }

    #[test]
    fn test_empty_accumulator() {
        let acc = StreamAccumulator::new();
        assert!(acc.is_empty());
        assert_eq!(acc.mean(), 0.0);
        assert_eq!(acc.variance(), 0.0);
        assert_eq!(acc.coefficient_of_variation(), 0.0);
    }

    #[test]
    fn test_single_observation_has_zero_variance() {
        let mut acc = StreamAccumulator::new();
        acc.ingest(1000.0);
        assert_eq!(acc.count, 1);
        assert_eq!(acc.mean(), 1000.0);
        assert_eq!(acc.variance(), 0.0);
        assert!(!acc.variance().is_nan());
    }

    #[test]
    fn test_matches_known_values() {
        let acc = StreamAccumulator::from_values([100.0, 200.0, 300.0]);
        assert_eq!(acc.count, 3);
        assert!((acc.mean() - 200.0).abs() < 1e-9);
        assert!((acc.variance() - 10_000.0).abs() < 1e-6);
        assert!((acc.std_dev() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_large_magnitude_spread() {
        let values = [1e9 + 4.0, 1e9 + 7.0, 1e9 + 13.0, 1e9 + 16.0];
        let acc = StreamAccumulator::from_values(values);
        // Shifted data [4, 7, 13, 16] has sample variance 30
        assert!((acc.variance() - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_retract_restores_previous_state() {
        let mut acc = StreamAccumulator::from_values([10.0, 20.0, 60.0]);
        acc.retract(60.0);
        let expected = StreamAccumulator::from_values([10.0, 20.0]);
        assert!((acc.mean() - expected.mean()).abs() < 1e-9);
        assert!((acc.variance() - expected.variance()).abs() < 1e-9);
        assert_eq!(acc.count, 2);
    }

    #[test]
    fn test_retract_last_value_resets() {
        let mut acc = StreamAccumulator::from_values([42.0]);
        acc.retract(42.0);
        assert_eq!(acc, StreamAccumulator::default());
    }

    #[test]
    fn test_replace_month_total() {
        let mut acc = StreamAccumulator::from_values([500.0, 800.0]);
        acc.replace(800.0, 1200.0);
        let (mean, var) = batch_mean_var(&[500.0, 1200.0]);
        assert!((acc.mean() - mean).abs() < 1e-9);
        assert!((acc.variance() - var).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_rejects_non_positive_weight() {
        let mut acc = StreamAccumulator::new();
        assert!(matches!(
            acc.ingest_weighted(10.0, 0.0),
            Err(Error::InvalidWeight(_))
        ));
        assert!(matches!(
            acc.ingest_weighted(10.0, -1.0),
            Err(Error::InvalidWeight(_))
        ));
        assert!(acc.is_empty());
    }

    #[test]
    fn test_weighted_mean() {
        let mut acc = StreamAccumulator::new();
        acc.ingest_weighted(100.0, 1.0).unwrap();
        acc.ingest_weighted(200.0, 3.0).unwrap();
        assert!((acc.mean() - 175.0).abs() < 1e-9);
        // Population weighted variance: (1*75^2 + 3*25^2) / 4 = 1875
        assert!((acc.weighted_variance() - 1875.0).abs() < 1e-9);
    }

    #[test]
    fn test_unit_weights_match_unweighted() {
        let mut weighted = StreamAccumulator::new();
        for v in [3.0, 9.0, 27.0] {
            weighted.ingest_weighted(v, 1.0).unwrap();
        }
        let plain = StreamAccumulator::from_values([3.0, 9.0, 27.0]);
        assert!((weighted.mean() - plain.mean()).abs() < 1e-12);
        assert!((weighted.variance() - plain.variance()).abs() < 1e-9);
    }

    #[test]
    fn test_decay_weight() {
        assert_eq!(decay_weight(0.0, 6.0), 1.0);
        assert!((decay_weight(6.0, 6.0) - 0.5).abs() < 1e-12);
        assert!((decay_weight(12.0, 6.0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_bucket_add_keeps_one_value_per_bucket() {
        let mut acc = StreamAccumulator::new();
        let mut totals = BTreeMap::new();
        bucket_add(&mut acc, &mut totals, "2025-01", 300.0);
        bucket_add(&mut acc, &mut totals, "2025-02", 990.0);
        bucket_add(&mut acc, &mut totals, "2025-01", 550.0);

        assert_eq!(acc.count, 2);
        assert_eq!(totals["2025-01"], 850.0);
        let (mean, var) = batch_mean_var(&[850.0, 990.0]);
        assert!((acc.mean() - mean).abs() < 1e-9);
        assert!((acc.variance() - var).abs() < 1e-6);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(2166.666_666), 2166.67);
        assert_eq!(round2(13000.000_001), 13000.0);
    }

    #[test]
    fn test_cv_guards_zero_mean() {
        let acc = StreamAccumulator::from_values([0.0, 0.0]);
        assert_eq!(acc.coefficient_of_variation(), 0.0);
    }
}
