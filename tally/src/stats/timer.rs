use quanta::Instant;

use crate::error::Error;

use super::{HistogramCore, MeterCore, ReservoirConfig, Snapshot};

/// The stateful core of a timer: a meter for the throughput of timed
/// operations composed with a histogram of their durations (in nanoseconds).
pub struct TimerCore {
    meter: MeterCore,
    histogram: HistogramCore,
}

impl TimerCore {
    /// Creates a `TimerCore` anchored at `now`.
    pub fn new(config: ReservoirConfig, now: Instant) -> Result<Self, Error> {
        Ok(TimerCore { meter: MeterCore::new(now), histogram: HistogramCore::new(config, now)? })
    }

    /// Records a duration, in nanoseconds, observed at `now`.
    ///
    /// Negative durations indicate clock anomalies rather than caller bugs
    /// and are deliberately dropped without error.
    pub fn update(&mut self, duration_nanos: i64, now: Instant) {
        if duration_nanos < 0 {
            return;
        }
        self.histogram.update(duration_nanos, now);
        self.meter.mark(1, now);
    }

    /// The number of recorded durations.
    pub fn count(&self) -> u64 {
        self.meter.count()
    }

    /// The shortest recorded duration, in nanoseconds.
    pub fn min(&self) -> i64 {
        self.histogram.min()
    }

    /// The longest recorded duration, in nanoseconds.
    pub fn max(&self) -> i64 {
        self.histogram.max()
    }

    /// The mean recorded duration, in nanoseconds.
    pub fn mean(&self) -> f64 {
        self.histogram.mean()
    }

    /// The sample standard deviation of recorded durations, in nanoseconds.
    pub fn std_dev(&self) -> f64 {
        self.histogram.std_dev()
    }

    /// A sorted snapshot of sampled durations, in nanoseconds.
    pub fn snapshot(&self) -> Snapshot {
        self.histogram.snapshot()
    }

    /// The duration histogram.
    pub fn histogram(&self) -> &HistogramCore {
        &self.histogram
    }

    /// The lifetime mean rate of timed operations, in events per second.
    pub fn mean_rate(&self, now: Instant) -> f64 {
        self.meter.mean_rate(now)
    }

    /// The one-minute rate of timed operations, in events per second.
    pub fn one_minute_rate(&mut self, now: Instant) -> f64 {
        self.meter.one_minute_rate(now)
    }

    /// The five-minute rate of timed operations, in events per second.
    pub fn five_minute_rate(&mut self, now: Instant) -> f64 {
        self.meter.five_minute_rate(now)
    }

    /// The fifteen-minute rate of timed operations, in events per second.
    pub fn fifteen_minute_rate(&mut self, now: Instant) -> f64 {
        self.meter.fifteen_minute_rate(now)
    }
}
