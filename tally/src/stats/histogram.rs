use quanta::Instant;

use crate::error::Error;

use super::{Reservoir, ReservoirConfig, Snapshot};

/// The stateful core of a histogram.
///
/// Tracks count, min, max, and the Welford `(m, s)` accumulators for online
/// mean and variance, and delegates quantile estimation to a reservoir.
/// Min and max are plain fields: the owning mailbox's total order over
/// updates makes them exact without compare-and-swap loops.
pub struct HistogramCore {
    count: u64,
    min: i64,
    max: i64,
    m: f64,
    s: f64,
    reservoir: Box<dyn Reservoir + Send>,
}

impl HistogramCore {
    /// Creates a `HistogramCore` with the given reservoir configuration,
    /// anchored at `now`.
    pub fn new(config: ReservoirConfig, now: Instant) -> Result<Self, Error> {
        Ok(HistogramCore {
            count: 0,
            min: 0,
            max: 0,
            m: 0.0,
            s: 0.0,
            reservoir: config.build(now)?,
        })
    }

    /// Records a value observed at `now`.
    pub fn update(&mut self, value: i64, now: Instant) {
        self.count += 1;
        if self.count == 1 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }

        // Welford's online mean/variance update.
        let x = value as f64;
        let delta = x - self.m;
        self.m += delta / self.count as f64;
        self.s += delta * (x - self.m);

        self.reservoir.update(value, now);
    }

    /// The number of recorded values.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// The smallest recorded value, or 0 if nothing has been recorded.
    pub fn min(&self) -> i64 {
        self.min
    }

    /// The largest recorded value, or 0 if nothing has been recorded.
    pub fn max(&self) -> i64 {
        self.max
    }

    /// The arithmetic mean of all recorded values, or 0 if empty.
    pub fn mean(&self) -> f64 {
        self.m
    }

    /// The sample variance of all recorded values, or 0 for fewer than two.
    pub fn variance(&self) -> f64 {
        if self.count > 1 {
            self.s / (self.count - 1) as f64
        } else {
            0.0
        }
    }

    /// The sample standard deviation of all recorded values.
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Takes a sorted snapshot of the reservoir.
    pub fn snapshot(&self) -> Snapshot {
        self.reservoir.snapshot()
    }

    /// Resets all accumulators and the reservoir, re-anchoring at `now`.
    pub fn clear(&mut self, now: Instant) {
        self.count = 0;
        self.min = 0;
        self.max = 0;
        self.m = 0.0;
        self.s = 0.0;
        self.reservoir.clear(now);
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use quanta::Clock;
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    use crate::error::Error;
    use crate::stats::ReservoirConfig;

    use super::HistogramCore;

    fn uniform(size: usize) -> HistogramCore {
        let clock = Clock::new();
        HistogramCore::new(ReservoirConfig::uniform(size), clock.now())
            .expect("valid config")
    }

    #[test]
    fn welford_known_values() {
        let clock = Clock::new();
        let mut histogram = uniform(128);
        for value in [1, 2, 3, 4, 5] {
            histogram.update(value, clock.now());
        }

        assert_eq!(histogram.count(), 5);
        assert_eq!(histogram.min(), 1);
        assert_eq!(histogram.max(), 5);
        assert_relative_eq!(histogram.mean(), 3.0);
        assert_relative_eq!(histogram.variance(), 2.5);
        assert_relative_eq!(histogram.std_dev(), 2.5f64.sqrt());
    }

    #[test]
    fn welford_matches_batch_computation() {
        let clock = Clock::new();
        let mut rng = SmallRng::seed_from_u64(9);
        let values: Vec<i64> = (0..500).map(|_| rng.random_range(-1_000..1_000)).collect();

        let mut histogram = uniform(1_028);
        for value in &values {
            histogram.update(*value, clock.now());
        }

        let n = values.len() as f64;
        let batch_mean = values.iter().map(|v| *v as f64).sum::<f64>() / n;
        let batch_variance = values
            .iter()
            .map(|v| (*v as f64 - batch_mean).powi(2))
            .sum::<f64>()
            / (n - 1.0);

        assert_relative_eq!(histogram.mean(), batch_mean, epsilon = 1e-9);
        assert_relative_eq!(histogram.variance(), batch_variance, epsilon = 1e-6);
        assert_eq!(histogram.min(), *values.iter().min().expect("non-empty"));
        assert_eq!(histogram.max(), *values.iter().max().expect("non-empty"));
    }

    #[test]
    fn empty_histogram_is_all_zeroes() {
        let histogram = uniform(128);
        assert_eq!(histogram.count(), 0);
        assert_eq!(histogram.min(), 0);
        assert_eq!(histogram.max(), 0);
        assert_relative_eq!(histogram.mean(), 0.0);
        assert_relative_eq!(histogram.variance(), 0.0);
        assert!(histogram.snapshot().is_empty());
    }

    #[test]
    fn single_value_has_zero_variance() {
        let clock = Clock::new();
        let mut histogram = uniform(128);
        histogram.update(42, clock.now());
        assert_relative_eq!(histogram.variance(), 0.0);
        assert_relative_eq!(histogram.mean(), 42.0);
    }

    #[test]
    fn clear_resets_everything() {
        let clock = Clock::new();
        let mut histogram = uniform(128);
        for value in [10, 20, 30] {
            histogram.update(value, clock.now());
        }
        histogram.clear(clock.now());

        assert_eq!(histogram.count(), 0);
        assert_relative_eq!(histogram.mean(), 0.0);
        assert!(histogram.snapshot().is_empty());

        histogram.update(-5, clock.now());
        assert_eq!(histogram.min(), -5);
        assert_eq!(histogram.max(), -5);
    }

    #[test]
    fn invalid_config_fails_construction() {
        let clock = Clock::new();
        assert!(matches!(
            HistogramCore::new(ReservoirConfig::uniform(0), clock.now()),
            Err(Error::InvalidCapacity)
        ));
    }
}
