use quanta::Instant;
use rand::{rngs::SmallRng, Rng, SeedableRng};

use super::{Reservoir, Snapshot};

/// A uniform sampling reservoir, based on Vitter's "Algorithm R".
///
/// The first `capacity` values are always retained.  After `k` updates with
/// `k > capacity`, a new value replaces a uniformly-random existing slot with
/// probability `capacity / k`, so every observed value has equal probability
/// of being present in the final sample.
pub struct UniformReservoir {
    values: Vec<i64>,
    capacity: usize,
    count: u64,
    rng: SmallRng,
}

impl UniformReservoir {
    /// Creates a new `UniformReservoir` holding up to `capacity` values.
    ///
    /// Capacity is validated by [`ReservoirConfig`][super::ReservoirConfig]
    /// before construction.
    pub(crate) fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        UniformReservoir {
            values: Vec::with_capacity(capacity),
            capacity,
            count: 0,
            rng: SmallRng::from_os_rng(),
        }
    }

    #[cfg(test)]
    fn with_seed(capacity: usize, seed: u64) -> Self {
        UniformReservoir {
            values: Vec::with_capacity(capacity),
            capacity,
            count: 0,
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl Reservoir for UniformReservoir {
    fn update(&mut self, value: i64, _now: Instant) {
        self.count += 1;
        if self.values.len() < self.capacity {
            self.values.push(value);
        } else {
            let slot = self.rng.random_range(0..self.count);
            if (slot as usize) < self.capacity {
                self.values[slot as usize] = value;
            }
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.values.clone())
    }

    fn clear(&mut self, _now: Instant) {
        self.values.clear();
        self.count = 0;
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn count(&self) -> u64 {
        self.count
    }
}
