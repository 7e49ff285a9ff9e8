use std::collections::BTreeMap;
use std::time::Duration;

use ordered_float::OrderedFloat;
use quanta::Instant;
use rand::{distr::OpenClosed01, rngs::SmallRng, Rng, SeedableRng};

use super::{Reservoir, Snapshot};

/// How often stored priorities are rescaled toward a fresh landmark time.
///
/// Priorities grow as `exp(alpha * seconds-since-landmark)`, so without
/// periodic rescaling a long-running process would overflow them.
pub(crate) const RESCALE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// An exponentially-decaying sampling reservoir.
///
/// Each stored value carries a priority `exp(alpha * (t - t0)) / u`, where
/// `t` is the observation's arrival time, `t0` a fixed landmark, and `u` a
/// uniform draw from `(0, 1]`.  Values are kept ordered by priority and the
/// lowest-priority value is evicted when the reservoir is full, which biases
/// the held sample toward recent observations.
///
/// Every [`RESCALE_INTERVAL`] the landmark is advanced and all priorities are
/// multiplied by `exp(-alpha * (t0_new - t0_old))`, preserving their relative
/// order while keeping their magnitudes bounded.
pub struct DecayingReservoir {
    values: BTreeMap<OrderedFloat<f64>, i64>,
    capacity: usize,
    alpha: f64,
    count: u64,
    landmark: Instant,
    next_rescale: Instant,
    rng: SmallRng,
}

impl DecayingReservoir {
    /// Creates a new `DecayingReservoir` anchored at `now`.
    ///
    /// Capacity and alpha are validated by
    /// [`ReservoirConfig`][super::ReservoirConfig] before construction.
    pub(crate) fn new(capacity: usize, alpha: f64, now: Instant) -> Self {
        debug_assert!(capacity > 0);
        debug_assert!(alpha.is_finite() && alpha > 0.0);
        DecayingReservoir {
            values: BTreeMap::new(),
            capacity,
            alpha,
            count: 0,
            landmark: now,
            next_rescale: now + RESCALE_INTERVAL,
            rng: SmallRng::from_os_rng(),
        }
    }

    #[cfg(test)]
    fn with_seed(capacity: usize, alpha: f64, now: Instant, seed: u64) -> Self {
        let mut reservoir = Self::new(capacity, alpha, now);
        reservoir.rng = SmallRng::seed_from_u64(seed);
        reservoir
    }

    fn weight(&self, elapsed: Duration) -> f64 {
        (self.alpha * elapsed.as_secs_f64()).exp()
    }

    fn rescale_if_due(&mut self, now: Instant) {
        if now >= self.next_rescale {
            self.rescale(now);
        }
    }

    fn rescale(&mut self, now: Instant) {
        self.next_rescale = now + RESCALE_INTERVAL;
        let old_landmark = self.landmark;
        self.landmark = now;

        let factor = (-self.alpha * now.duration_since(old_landmark).as_secs_f64()).exp();
        self.values = self
            .values
            .iter()
            .map(|(priority, value)| (OrderedFloat(priority.0 * factor), *value))
            .collect();
        // Priorities that underflow to the same key collapse into one entry;
        // those values were many decay periods old anyway.
    }
}

impl Reservoir for DecayingReservoir {
    fn update(&mut self, value: i64, now: Instant) {
        self.rescale_if_due(now);
        self.count += 1;

        let elapsed = now.saturating_duration_since(self.landmark);
        let u: f64 = self.rng.sample(OpenClosed01);
        let priority = OrderedFloat(self.weight(elapsed) / u);

        if self.values.len() < self.capacity {
            self.values.insert(priority, value);
        } else if let Some((&lowest, _)) = self.values.iter().next() {
            if lowest < priority && self.values.insert(priority, value).is_none() {
                self.values.remove(&lowest);
            }
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.values.values().copied().collect())
    }

    fn clear(&mut self, now: Instant) {
        self.values.clear();
        self.count = 0;
        self.landmark = now;
        self.next_rescale = now + RESCALE_INTERVAL;
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn count(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use quanta::Clock;

    use super::{DecayingReservoir, Reservoir, RESCALE_INTERVAL};

    #[test]
    fn size_stays_bounded() {
        let (clock, _mock) = Clock::mock();
        let now = clock.now();
        let mut reservoir = DecayingReservoir::with_seed(100, 0.99, now, 1);
        for i in 0..1_000 {
            reservoir.update(i, now);
        }
        assert_eq!(reservoir.len(), 100);
        assert_eq!(reservoir.count(), 1_000);
        for value in reservoir.snapshot().values() {
            assert!((0..1_000).contains(value));
        }
    }

    #[test]
    fn under_capacity_keeps_everything() {
        let (clock, _mock) = Clock::mock();
        let now = clock.now();
        let mut reservoir = DecayingReservoir::with_seed(100, 0.015, now, 2);
        for i in 0..10 {
            reservoir.update(i, now);
        }
        assert_eq!(reservoir.snapshot().values(), (0i64..10).collect::<Vec<_>>().as_slice());
    }

    #[test]
    fn recent_values_dominate() {
        let (clock, mock) = Clock::mock();
        let mut reservoir = DecayingReservoir::with_seed(10, 0.015, clock.now(), 3);

        // A burst of old values, then fresh values arriving once a minute.
        for i in 0..100 {
            reservoir.update(i, clock.now());
        }
        for i in 0..100 {
            mock.increment(Duration::from_secs(60));
            reservoir.update(1_000 + i, clock.now());
        }

        let snapshot = reservoir.snapshot();
        assert_eq!(snapshot.len(), 10);
        for value in snapshot.values() {
            assert!(*value >= 1_000, "stale value {} survived the decay window", value);
        }
    }

    #[test]
    fn rescale_preserves_held_values() {
        let (clock, mock) = Clock::mock();
        let mut reservoir = DecayingReservoir::with_seed(100, 0.015, clock.now(), 4);
        for i in 0..50 {
            reservoir.update(i, clock.now());
        }
        let before = reservoir.snapshot();

        // Cross the rescale boundary with a single fresh update.
        mock.increment(RESCALE_INTERVAL + Duration::from_secs(1));
        reservoir.update(999, clock.now());

        let after = reservoir.snapshot();
        assert_eq!(after.len(), before.len() + 1);
        for value in before.values() {
            assert!(after.values().contains(value));
        }
        assert!(after.values().contains(&999));
    }

    #[test]
    fn long_inactivity_collapses_stale_priorities() {
        let (clock, mock) = Clock::mock();
        let mut reservoir = DecayingReservoir::with_seed(10, 0.015, clock.now(), 5);
        for i in 0..10 {
            reservoir.update(i, clock.now());
        }
        assert_eq!(reservoir.len(), 10);

        // After 15 idle hours the rescale factor underflows to zero, so all
        // stale priorities collapse into a single slot.
        mock.increment(Duration::from_secs(15 * 60 * 60));
        reservoir.update(2_000, clock.now());

        assert_eq!(reservoir.len(), 2);
        assert!(reservoir.snapshot().values().contains(&2_000));
    }

    #[test]
    fn clear_reanchors() {
        let (clock, mock) = Clock::mock();
        let mut reservoir = DecayingReservoir::with_seed(10, 0.015, clock.now(), 6);
        for i in 0..10 {
            reservoir.update(i, clock.now());
        }
        mock.increment(Duration::from_secs(30));
        reservoir.clear(clock.now());
        assert!(reservoir.is_empty());
        assert_eq!(reservoir.count(), 0);

        reservoir.update(42, clock.now());
        assert_eq!(reservoir.snapshot().values(), &[42]);
    }
}
