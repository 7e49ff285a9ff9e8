use std::time::Duration;

use quanta::Instant;

use super::ewma::{Ewma, TICK_INTERVAL};

/// The stateful core of a meter: a total event count plus one-, five-, and
/// fifteen-minute exponentially-weighted rates.
///
/// Ticks are caught up lazily: every mark or rate read first applies
/// `floor(elapsed / tick-interval)` ticks to all three windows, so rates
/// decay correctly under bursty or idle traffic without a background timer.
pub struct MeterCore {
    count: u64,
    start: Instant,
    last_tick: Instant,
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
}

impl MeterCore {
    /// Creates a `MeterCore` whose lifetime starts at `now`.
    pub fn new(now: Instant) -> Self {
        MeterCore {
            count: 0,
            start: now,
            last_tick: now,
            m1: Ewma::one_minute(),
            m5: Ewma::five_minutes(),
            m15: Ewma::fifteen_minutes(),
        }
    }

    /// Records `n` events occurring at `now`.
    pub fn mark(&mut self, n: u64, now: Instant) {
        self.tick_if_due(now);
        self.count += n;
        self.m1.update(n);
        self.m5.update(n);
        self.m15.update(n);
    }

    fn tick_if_due(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_tick);
        let ticks = (elapsed.as_nanos() / TICK_INTERVAL.as_nanos()) as u64;
        if ticks == 0 {
            return;
        }
        for _ in 0..ticks {
            self.m1.tick();
            self.m5.tick();
            self.m15.tick();
        }
        self.last_tick = self.last_tick + Duration::from_secs(TICK_INTERVAL.as_secs() * ticks);
    }

    /// The total number of marked events.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// The lifetime mean rate in events per second, recomputed on read.
    pub fn mean_rate(&self, now: Instant) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let elapsed = now.saturating_duration_since(self.start).as_secs_f64();
        if elapsed == 0.0 {
            0.0
        } else {
            self.count as f64 / elapsed
        }
    }

    /// The one-minute rate in events per second, after catching up ticks.
    pub fn one_minute_rate(&mut self, now: Instant) -> f64 {
        self.tick_if_due(now);
        self.m1.rate()
    }

    /// The five-minute rate in events per second, after catching up ticks.
    pub fn five_minute_rate(&mut self, now: Instant) -> f64 {
        self.tick_if_due(now);
        self.m5.rate()
    }

    /// The fifteen-minute rate in events per second, after catching up
    /// ticks.
    pub fn fifteen_minute_rate(&mut self, now: Instant) -> f64 {
        self.tick_if_due(now);
        self.m15.rate()
    }
}
