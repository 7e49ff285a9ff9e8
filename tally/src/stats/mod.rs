//! Streaming statistics cores.
//!
//! Everything in this module is single-threaded and deterministic: cores take
//! explicit `now` instants instead of reading a clock, and are driven from
//! exactly one thread at a time by the per-metric [`Mailbox`][crate::Mailbox].
//! The serialized handles in the crate root wrap these cores; use the cores
//! directly only when you are providing your own synchronization.

mod decay;
mod ewma;
mod histogram;
mod meter;
mod snapshot;
mod timer;
mod uniform;

pub use decay::DecayingReservoir;
pub use ewma::{Ewma, TICK_INTERVAL};
pub use histogram::HistogramCore;
pub use meter::MeterCore;
pub use snapshot::Snapshot;
pub use timer::TimerCore;
pub use uniform::UniformReservoir;

use quanta::Instant;

use crate::error::Error;

/// A bounded, statistically-representative sample of an observed stream.
///
/// Implementations hold at most their configured capacity; once full, each
/// new observation may evict an existing one according to the reservoir's
/// policy.
pub trait Reservoir {
    /// Offers a value to the reservoir, observed at `now`.
    fn update(&mut self, value: i64, now: Instant);

    /// Takes an immutable, sorted view of the currently-held values.
    fn snapshot(&self) -> Snapshot;

    /// Resets the reservoir to empty, re-anchoring any time-based state at
    /// `now`.
    fn clear(&mut self, now: Instant);

    /// The number of values currently held.
    fn len(&self) -> usize;

    /// Whether the reservoir currently holds no values.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The total number of values ever offered (not just those held).
    fn count(&self) -> u64;
}

/// Configuration for a reservoir, validated at metric construction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ReservoirConfig {
    /// Classic uniform reservoir sampling (Vitter's Algorithm R): every
    /// observed value has equal probability of being present.
    Uniform {
        /// Maximum number of values held.
        size: usize,
    },
    /// Exponentially-decaying reservoir: recent values are weighted more
    /// heavily than old ones.
    Decaying {
        /// Maximum number of values held.
        size: usize,
        /// Decay factor; larger values bias the sample more strongly toward
        /// recent observations.
        alpha: f64,
    },
}

impl ReservoirConfig {
    /// Default reservoir capacity, sized so that quantile estimates carry
    /// roughly a 5% error bound at a 99.9% confidence level.
    pub const DEFAULT_SIZE: usize = 1028;

    /// Default decay factor, biasing the sample heavily toward the last
    /// five minutes of data.
    pub const DEFAULT_ALPHA: f64 = 0.015;

    /// A uniform reservoir of the given capacity.
    pub fn uniform(size: usize) -> Self {
        ReservoirConfig::Uniform { size }
    }

    /// A decaying reservoir of the given capacity and decay factor.
    pub fn decaying(size: usize, alpha: f64) -> Self {
        ReservoirConfig::Decaying { size, alpha }
    }

    /// A decaying reservoir with the default capacity and decay factor.
    pub fn decaying_default() -> Self {
        ReservoirConfig::Decaying { size: Self::DEFAULT_SIZE, alpha: Self::DEFAULT_ALPHA }
    }

    /// Validates the configuration, without building anything.
    pub fn validate(&self) -> Result<(), Error> {
        match *self {
            ReservoirConfig::Uniform { size } => {
                if size == 0 {
                    return Err(Error::InvalidCapacity);
                }
            }
            ReservoirConfig::Decaying { size, alpha } => {
                if size == 0 {
                    return Err(Error::InvalidCapacity);
                }
                if !alpha.is_finite() || alpha <= 0.0 {
                    return Err(Error::InvalidDecayFactor(alpha));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn build(&self, now: Instant) -> Result<Box<dyn Reservoir + Send>, Error> {
        self.validate()?;
        Ok(match *self {
            ReservoirConfig::Uniform { size } => Box::new(UniformReservoir::new(size)),
            ReservoirConfig::Decaying { size, alpha } => {
                Box::new(DecayingReservoir::new(size, alpha, now))
            }
        })
    }
}
