//! Serialized metric handles.
//!
//! Handles are cheap clones sharing a per-metric [`Mailbox`].  Mutations are
//! fire-and-forget; reads take a callback invoked with the value and the
//! instant at which the serialized task observed the state.  Reading
//! correlated fields through independent calls may observe different
//! logical instants; use [`report`][Metric::report] when the fields must be
//! mutually consistent.

use std::sync::Arc;
use std::time::Duration;

use quanta::{Clock, Instant};

use crate::error::Error;
use crate::executor::Executor;
use crate::mailbox::Mailbox;
use crate::name::SharedString;
use crate::report::{FieldKind, ReportEntry};
use crate::stats::{HistogramCore, MeterCore, ReservoirConfig, Snapshot, TimerCore};
use crate::units::TimeUnit;

/// The event label used for timer rates.
const TIMER_EVENT_KIND: &str = "calls";

/// A monotonically adjustable count.
#[derive(Clone)]
pub struct Counter {
    mailbox: Mailbox<i64>,
    clock: Clock,
}

impl Counter {
    /// Creates a counter starting at zero.
    pub fn new(executor: Arc<dyn Executor>, clock: Clock) -> Self {
        Counter { mailbox: Mailbox::new(0, executor), clock }
    }

    /// Adds `n` to the count.
    pub fn increment(&self, n: i64) {
        self.mailbox.send(move |count| *count += n);
    }

    /// Subtracts `n` from the count.
    pub fn decrement(&self, n: i64) {
        self.mailbox.send(move |count| *count -= n);
    }

    /// Resets the count to zero.
    pub fn clear(&self) {
        self.mailbox.send(|count| *count = 0);
    }

    /// Reads the current count.
    pub fn get_count<F>(&self, cb: F)
    where
        F: FnOnce(i64, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        self.mailbox.send(move |count| cb(*count, clock.now()));
    }

    /// Reports the counter's fields.
    pub fn report<F>(&self, cb: F)
    where
        F: FnOnce(Vec<ReportEntry>, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        self.mailbox.send(move |count| {
            let entries = vec![ReportEntry::new(FieldKind::Count, *count as f64, "")];
            cb(entries, clock.now());
        });
    }
}

/// A distribution of recorded values: count, min, max, mean, variance, and
/// reservoir-sampled quantiles.
#[derive(Clone)]
pub struct Histogram {
    mailbox: Mailbox<HistogramCore>,
    clock: Clock,
}

impl Histogram {
    /// Creates a histogram with the given reservoir configuration.
    ///
    /// Fails fast on an invalid configuration; nothing is registered or
    /// spawned on error.
    pub fn new(
        config: ReservoirConfig,
        executor: Arc<dyn Executor>,
        clock: Clock,
    ) -> Result<Self, Error> {
        let core = HistogramCore::new(config, clock.now())?;
        Ok(Histogram { mailbox: Mailbox::new(core, executor), clock })
    }

    /// Records a value.
    pub fn update(&self, value: i64) {
        let now = self.clock.now();
        self.mailbox.send(move |histogram| histogram.update(value, now));
    }

    /// Resets all accumulators and the reservoir.
    pub fn clear(&self) {
        let now = self.clock.now();
        self.mailbox.send(move |histogram| histogram.clear(now));
    }

    /// Reads the number of recorded values.
    pub fn get_count<F>(&self, cb: F)
    where
        F: FnOnce(u64, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        self.mailbox.send(move |histogram| cb(histogram.count(), clock.now()));
    }

    /// Reads the smallest recorded value.
    pub fn get_min<F>(&self, cb: F)
    where
        F: FnOnce(i64, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        self.mailbox.send(move |histogram| cb(histogram.min(), clock.now()));
    }

    /// Reads the largest recorded value.
    pub fn get_max<F>(&self, cb: F)
    where
        F: FnOnce(i64, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        self.mailbox.send(move |histogram| cb(histogram.max(), clock.now()));
    }

    /// Reads the mean of all recorded values.
    pub fn get_mean<F>(&self, cb: F)
    where
        F: FnOnce(f64, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        self.mailbox.send(move |histogram| cb(histogram.mean(), clock.now()));
    }

    /// Reads the sample standard deviation of all recorded values.
    pub fn get_std_dev<F>(&self, cb: F)
    where
        F: FnOnce(f64, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        self.mailbox.send(move |histogram| cb(histogram.std_dev(), clock.now()));
    }

    /// Takes a sorted snapshot of the reservoir.
    pub fn get_snapshot<F>(&self, cb: F)
    where
        F: FnOnce(Snapshot, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        self.mailbox.send(move |histogram| cb(histogram.snapshot(), clock.now()));
    }

    /// Reports the histogram's fields, all observed at one logical instant.
    pub fn report<F>(&self, cb: F)
    where
        F: FnOnce(Vec<ReportEntry>, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        self.mailbox.send(move |histogram| {
            let entries = distribution_entries(histogram, SharedString::Borrowed(""), |v| v);
            cb(entries, clock.now());
        });
    }
}

/// A rate of events: total count, lifetime mean rate, and 1/5/15-minute
/// exponentially-weighted rates.
#[derive(Clone)]
pub struct Meter {
    mailbox: Mailbox<MeterCore>,
    clock: Clock,
    event_kind: SharedString,
    rate_unit: TimeUnit,
}

impl Meter {
    /// Creates a meter.  `event_kind` labels what is being counted (for
    /// example `"requests"`); `rate_unit` is the unit rates are reported in.
    pub fn new<E>(event_kind: E, rate_unit: TimeUnit, executor: Arc<dyn Executor>, clock: Clock) -> Self
    where
        E: Into<SharedString>,
    {
        let core = MeterCore::new(clock.now());
        Meter {
            mailbox: Mailbox::new(core, executor),
            clock,
            event_kind: event_kind.into(),
            rate_unit,
        }
    }

    /// Marks one event.
    pub fn mark(&self) {
        self.mark_n(1);
    }

    /// Marks `n` events.
    pub fn mark_n(&self, n: u64) {
        let now = self.clock.now();
        self.mailbox.send(move |meter| meter.mark(n, now));
    }

    /// Reads the total number of marked events.
    pub fn get_count<F>(&self, cb: F)
    where
        F: FnOnce(u64, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        self.mailbox.send(move |meter| cb(meter.count(), clock.now()));
    }

    /// Reads the lifetime mean rate, in events per this meter's rate unit.
    pub fn get_mean_rate<F>(&self, cb: F)
    where
        F: FnOnce(f64, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        let unit = self.rate_unit;
        self.mailbox.send(move |meter| {
            let now = clock.now();
            cb(meter.mean_rate(now) * unit.as_secs(), now);
        });
    }

    /// Reads the one-minute rate, in events per this meter's rate unit.
    pub fn get_one_minute_rate<F>(&self, cb: F)
    where
        F: FnOnce(f64, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        let unit = self.rate_unit;
        self.mailbox.send(move |meter| {
            let now = clock.now();
            cb(meter.one_minute_rate(now) * unit.as_secs(), now);
        });
    }

    /// Reads the five-minute rate, in events per this meter's rate unit.
    pub fn get_five_minute_rate<F>(&self, cb: F)
    where
        F: FnOnce(f64, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        let unit = self.rate_unit;
        self.mailbox.send(move |meter| {
            let now = clock.now();
            cb(meter.five_minute_rate(now) * unit.as_secs(), now);
        });
    }

    /// Reads the fifteen-minute rate, in events per this meter's rate unit.
    pub fn get_fifteen_minute_rate<F>(&self, cb: F)
    where
        F: FnOnce(f64, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        let unit = self.rate_unit;
        self.mailbox.send(move |meter| {
            let now = clock.now();
            cb(meter.fifteen_minute_rate(now) * unit.as_secs(), now);
        });
    }

    /// Reports the meter's fields, all observed at one logical instant.
    pub fn report<F>(&self, cb: F)
    where
        F: FnOnce(Vec<ReportEntry>, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        let event_kind = self.event_kind.clone();
        let rate_unit = self.rate_unit;
        self.mailbox.send(move |meter| {
            let now = clock.now();
            let entries = meter_entries(meter, now, event_kind, rate_unit);
            cb(entries, now);
        });
    }
}

/// Throughput and duration distribution of timed operations.
#[derive(Clone)]
pub struct Timer {
    mailbox: Mailbox<TimerCore>,
    clock: Clock,
    duration_unit: TimeUnit,
    rate_unit: TimeUnit,
}

impl Timer {
    /// Creates a timer with the default exponentially-decaying reservoir.
    ///
    /// `duration_unit` is the unit reported durations are converted to;
    /// `rate_unit` is the unit throughput rates are reported in.
    pub fn new(
        duration_unit: TimeUnit,
        rate_unit: TimeUnit,
        executor: Arc<dyn Executor>,
        clock: Clock,
    ) -> Result<Self, Error> {
        Self::with_config(ReservoirConfig::decaying_default(), duration_unit, rate_unit, executor, clock)
    }

    /// Creates a timer with an explicit reservoir configuration.
    pub fn with_config(
        config: ReservoirConfig,
        duration_unit: TimeUnit,
        rate_unit: TimeUnit,
        executor: Arc<dyn Executor>,
        clock: Clock,
    ) -> Result<Self, Error> {
        let core = TimerCore::new(config, clock.now())?;
        Ok(Timer { mailbox: Mailbox::new(core, executor), clock, duration_unit, rate_unit })
    }

    /// Records a duration.
    pub fn update(&self, duration: Duration) {
        self.update_nanos(duration.as_nanos().min(i64::MAX as u128) as i64);
    }

    /// Records a duration in nanoseconds.
    ///
    /// Negative durations indicate clock anomalies and are dropped without
    /// error.
    pub fn update_nanos(&self, nanos: i64) {
        let now = self.clock.now();
        self.mailbox.send(move |timer| timer.update(nanos, now));
    }

    /// Times the execution of `f`, recording its duration exactly once,
    /// even when `f` panics and the panic unwinds through this call.
    pub fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = self.start();
        f()
    }

    /// Starts a scoped timing; the returned guard records the elapsed time
    /// when dropped.
    pub fn start(&self) -> TimerGuard {
        TimerGuard { timer: self.clone(), started: self.clock.now() }
    }

    /// Reads the number of recorded durations.
    pub fn get_count<F>(&self, cb: F)
    where
        F: FnOnce(u64, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        self.mailbox.send(move |timer| cb(timer.count(), clock.now()));
    }

    /// Reads the shortest recorded duration, in this timer's duration unit.
    pub fn get_min<F>(&self, cb: F)
    where
        F: FnOnce(f64, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        let unit = self.duration_unit;
        self.mailbox
            .send(move |timer| cb(from_nanos(timer.min() as f64, unit), clock.now()));
    }

    /// Reads the longest recorded duration, in this timer's duration unit.
    pub fn get_max<F>(&self, cb: F)
    where
        F: FnOnce(f64, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        let unit = self.duration_unit;
        self.mailbox
            .send(move |timer| cb(from_nanos(timer.max() as f64, unit), clock.now()));
    }

    /// Reads the mean recorded duration, in this timer's duration unit.
    pub fn get_mean<F>(&self, cb: F)
    where
        F: FnOnce(f64, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        let unit = self.duration_unit;
        self.mailbox.send(move |timer| cb(from_nanos(timer.mean(), unit), clock.now()));
    }

    /// Reads the standard deviation of recorded durations, in this timer's
    /// duration unit.
    pub fn get_std_dev<F>(&self, cb: F)
    where
        F: FnOnce(f64, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        let unit = self.duration_unit;
        self.mailbox.send(move |timer| cb(from_nanos(timer.std_dev(), unit), clock.now()));
    }

    /// Takes a sorted snapshot of sampled durations, in raw nanoseconds.
    pub fn get_snapshot<F>(&self, cb: F)
    where
        F: FnOnce(Snapshot, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        self.mailbox.send(move |timer| cb(timer.snapshot(), clock.now()));
    }

    /// Reads the lifetime mean rate of timed operations, in events per this
    /// timer's rate unit.
    pub fn get_mean_rate<F>(&self, cb: F)
    where
        F: FnOnce(f64, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        let unit = self.rate_unit;
        self.mailbox.send(move |timer| {
            let now = clock.now();
            cb(timer.mean_rate(now) * unit.as_secs(), now);
        });
    }

    /// Reads the one-minute rate of timed operations, in events per this
    /// timer's rate unit.
    pub fn get_one_minute_rate<F>(&self, cb: F)
    where
        F: FnOnce(f64, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        let unit = self.rate_unit;
        self.mailbox.send(move |timer| {
            let now = clock.now();
            cb(timer.one_minute_rate(now) * unit.as_secs(), now);
        });
    }

    /// Reads the five-minute rate of timed operations, in events per this
    /// timer's rate unit.
    pub fn get_five_minute_rate<F>(&self, cb: F)
    where
        F: FnOnce(f64, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        let unit = self.rate_unit;
        self.mailbox.send(move |timer| {
            let now = clock.now();
            cb(timer.five_minute_rate(now) * unit.as_secs(), now);
        });
    }

    /// Reads the fifteen-minute rate of timed operations, in events per
    /// this timer's rate unit.
    pub fn get_fifteen_minute_rate<F>(&self, cb: F)
    where
        F: FnOnce(f64, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        let unit = self.rate_unit;
        self.mailbox.send(move |timer| {
            let now = clock.now();
            cb(timer.fifteen_minute_rate(now) * unit.as_secs(), now);
        });
    }

    /// Reports the timer's duration distribution and throughput fields, all
    /// observed at one logical instant.
    pub fn report<F>(&self, cb: F)
    where
        F: FnOnce(Vec<ReportEntry>, Instant) + Send + 'static,
    {
        let clock = self.clock.clone();
        let duration_unit = self.duration_unit;
        let rate_unit = self.rate_unit;
        self.mailbox.send(move |timer| {
            let now = clock.now();
            let unit_label = SharedString::Borrowed(duration_unit.as_str());
            let mut entries =
                distribution_entries(timer.histogram(), unit_label, move |v| from_nanos(v, duration_unit));

            let rate_label: SharedString =
                format!("{}/{}", TIMER_EVENT_KIND, rate_unit.singular()).into();
            let scale = rate_unit.as_secs();
            entries.push(ReportEntry::new(
                FieldKind::MeanRate,
                timer.mean_rate(now) * scale,
                rate_label.clone(),
            ));
            entries.push(ReportEntry::new(
                FieldKind::OneMinuteRate,
                timer.one_minute_rate(now) * scale,
                rate_label.clone(),
            ));
            entries.push(ReportEntry::new(
                FieldKind::FiveMinuteRate,
                timer.five_minute_rate(now) * scale,
                rate_label.clone(),
            ));
            entries.push(ReportEntry::new(
                FieldKind::FifteenMinuteRate,
                timer.fifteen_minute_rate(now) * scale,
                rate_label,
            ));
            cb(entries, now);
        });
    }
}

/// Records the elapsed time between its creation and its drop into the
/// owning [`Timer`].
///
/// Dropping during unwind still records, which is what guarantees a timed
/// region that panics is counted exactly once.
pub struct TimerGuard {
    timer: Timer,
    started: Instant,
}

impl TimerGuard {
    /// Stops the timing and records the elapsed duration now.
    pub fn stop(self) {
        // Recording happens in `drop`.
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        let elapsed = self.timer.clock.now().saturating_duration_since(self.started);
        self.timer.update(elapsed);
    }
}

/// Any of the engine's metric kinds, as stored in the registry.
#[derive(Clone)]
pub enum Metric {
    /// A [`Counter`].
    Counter(Counter),
    /// A [`Histogram`].
    Histogram(Histogram),
    /// A [`Meter`].
    Meter(Meter),
    /// A [`Timer`].
    Timer(Timer),
}

impl Metric {
    /// The kind of this metric, as a human-readable label.
    pub fn kind(&self) -> &'static str {
        match self {
            Metric::Counter(_) => "counter",
            Metric::Histogram(_) => "histogram",
            Metric::Meter(_) => "meter",
            Metric::Timer(_) => "timer",
        }
    }

    /// Reports this metric's fields through its own mailbox.
    pub fn report<F>(&self, cb: F)
    where
        F: FnOnce(Vec<ReportEntry>, Instant) + Send + 'static,
    {
        match self {
            Metric::Counter(counter) => counter.report(cb),
            Metric::Histogram(histogram) => histogram.report(cb),
            Metric::Meter(meter) => meter.report(cb),
            Metric::Timer(timer) => timer.report(cb),
        }
    }
}

impl From<Counter> for Metric {
    fn from(counter: Counter) -> Self {
        Metric::Counter(counter)
    }
}

impl From<Histogram> for Metric {
    fn from(histogram: Histogram) -> Self {
        Metric::Histogram(histogram)
    }
}

impl From<Meter> for Metric {
    fn from(meter: Meter) -> Self {
        Metric::Meter(meter)
    }
}

impl From<Timer> for Metric {
    fn from(timer: Timer) -> Self {
        Metric::Timer(timer)
    }
}

fn from_nanos(value: f64, unit: TimeUnit) -> f64 {
    TimeUnit::convert(value, TimeUnit::Nanoseconds, unit)
}

fn distribution_entries<C>(
    histogram: &HistogramCore,
    unit: SharedString,
    convert: C,
) -> Vec<ReportEntry>
where
    C: Fn(f64) -> f64,
{
    let snapshot = histogram.snapshot();
    vec![
        ReportEntry::new(FieldKind::Min, convert(histogram.min() as f64), unit.clone()),
        ReportEntry::new(FieldKind::Max, convert(histogram.max() as f64), unit.clone()),
        ReportEntry::new(FieldKind::Mean, convert(histogram.mean()), unit.clone()),
        ReportEntry::new(FieldKind::StdDev, convert(histogram.std_dev()), unit.clone()),
        ReportEntry::new(FieldKind::Median, convert(snapshot.median()), unit.clone()),
        ReportEntry::new(FieldKind::P75, convert(snapshot.p75()), unit.clone()),
        ReportEntry::new(FieldKind::P95, convert(snapshot.p95()), unit.clone()),
        ReportEntry::new(FieldKind::P98, convert(snapshot.p98()), unit.clone()),
        ReportEntry::new(FieldKind::P99, convert(snapshot.p99()), unit.clone()),
        ReportEntry::new(FieldKind::P999, convert(snapshot.p999()), unit),
        ReportEntry::new(FieldKind::Count, histogram.count() as f64, ""),
    ]
}

fn meter_entries(
    meter: &mut MeterCore,
    now: Instant,
    event_kind: SharedString,
    rate_unit: TimeUnit,
) -> Vec<ReportEntry> {
    let rate_label: SharedString = format!("{}/{}", event_kind, rate_unit.singular()).into();
    let scale = rate_unit.as_secs();
    vec![
        ReportEntry::new(FieldKind::Count, meter.count() as f64, event_kind),
        ReportEntry::new(FieldKind::MeanRate, meter.mean_rate(now) * scale, rate_label.clone()),
        ReportEntry::new(
            FieldKind::OneMinuteRate,
            meter.one_minute_rate(now) * scale,
            rate_label.clone(),
        ),
        ReportEntry::new(
            FieldKind::FiveMinuteRate,
            meter.five_minute_rate(now) * scale,
            rate_label.clone(),
        ),
        ReportEntry::new(
            FieldKind::FifteenMinuteRate,
            meter.fifteen_minute_rate(now) * scale,
            rate_label,
        ),
    ]
}
