use std::time::Duration;

use crate::units::TimeUnit;

/// The cadence at which [`Ewma::tick`] is expected to be driven.
///
/// The standard window constructors tune their decay constants for this
/// interval, matching the classic UNIX load-average behavior.
pub const TICK_INTERVAL: Duration = Duration::from_secs(5);

const SECONDS_PER_MINUTE: f64 = 60.0;

/// An exponentially-weighted moving average of an event rate.
///
/// Updates accumulate into an `uncounted` bucket; each [`tick`][Ewma::tick]
/// drains the bucket into an instantaneous rate and blends it into the
/// smoothed rate.  The smoothed rate is only meaningful after the first
/// tick, which seeds it directly instead of blending.
pub struct Ewma {
    alpha: f64,
    uncounted: u64,
    rate: f64,
    initialized: bool,
}

impl Ewma {
    /// Creates an `Ewma` with an explicit smoothing factor.
    pub fn new(alpha: f64) -> Self {
        Ewma { alpha, uncounted: 0, rate: 0.0, initialized: false }
    }

    /// An `Ewma` equivalent to an N-minute load average at the standard
    /// five-second tick interval.
    fn minutes(minutes: f64) -> Self {
        let alpha = 1.0 - (-TICK_INTERVAL.as_secs_f64() / SECONDS_PER_MINUTE / minutes).exp();
        Ewma::new(alpha)
    }

    /// An `Ewma` with a one-minute window.
    pub fn one_minute() -> Self {
        Ewma::minutes(1.0)
    }

    /// An `Ewma` with a five-minute window.
    pub fn five_minutes() -> Self {
        Ewma::minutes(5.0)
    }

    /// An `Ewma` with a fifteen-minute window.
    pub fn fifteen_minutes() -> Self {
        Ewma::minutes(15.0)
    }

    /// Records `n` events.  No decay is applied until the next tick.
    pub fn update(&mut self, n: u64) {
        self.uncounted += n;
    }

    /// Drains the accumulated events and folds their instantaneous rate into
    /// the smoothed rate.
    pub fn tick(&mut self) {
        let counted = std::mem::take(&mut self.uncounted);
        let instant_rate = counted as f64 / TICK_INTERVAL.as_secs_f64();
        if self.initialized {
            self.rate += self.alpha * (instant_rate - self.rate);
        } else {
            self.rate = instant_rate;
            self.initialized = true;
        }
    }

    /// The smoothed rate, in events per second.
    ///
    /// Zero until the first tick.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// The smoothed rate, converted to events per `unit`.
    pub fn rate_in(&self, unit: TimeUnit) -> f64 {
        self.rate * unit.as_secs()
    }

    /// The smoothing factor.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}
