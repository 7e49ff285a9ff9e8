use std::fmt;

use crate::name::SharedString;

/// The statistical fields a metric can contribute to a report.
///
/// `Metric::report` emits entries in the order the variants are declared
/// here: distribution fields first, then the count, then rates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Smallest recorded value.
    Min,
    /// Largest recorded value.
    Max,
    /// Arithmetic mean of all recorded values.
    Mean,
    /// Sample standard deviation of all recorded values.
    StdDev,
    /// 50th percentile of the sampled distribution.
    Median,
    /// 75th percentile of the sampled distribution.
    P75,
    /// 95th percentile of the sampled distribution.
    P95,
    /// 98th percentile of the sampled distribution.
    P98,
    /// 99th percentile of the sampled distribution.
    P99,
    /// 99.9th percentile of the sampled distribution.
    P999,
    /// Total number of recorded events.
    Count,
    /// Lifetime mean rate, `count / elapsed-since-start`.
    MeanRate,
    /// One-minute exponentially-weighted rate.
    OneMinuteRate,
    /// Five-minute exponentially-weighted rate.
    FiveMinuteRate,
    /// Fifteen-minute exponentially-weighted rate.
    FifteenMinuteRate,
}

impl FieldKind {
    /// Gets the string form of this `FieldKind`.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Min => "min",
            FieldKind::Max => "max",
            FieldKind::Mean => "mean",
            FieldKind::StdDev => "stddev",
            FieldKind::Median => "median",
            FieldKind::P75 => "p75",
            FieldKind::P95 => "p95",
            FieldKind::P98 => "p98",
            FieldKind::P99 => "p99",
            FieldKind::P999 => "p999",
            FieldKind::Count => "count",
            FieldKind::MeanRate => "mean_rate",
            FieldKind::OneMinuteRate => "m1_rate",
            FieldKind::FiveMinuteRate => "m5_rate",
            FieldKind::FifteenMinuteRate => "m15_rate",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field of a metric's report: what was measured, its value, and the
/// unit label the value is expressed in (for example `milliseconds` or
/// `requests/second`; empty for unitless values).
#[derive(Clone, Debug, PartialEq)]
pub struct ReportEntry {
    /// Which field this entry carries.
    pub kind: FieldKind,
    /// The field's value, converted to `unit`.
    pub value: f64,
    /// Human-readable unit label.
    pub unit: SharedString,
}

impl ReportEntry {
    pub(crate) fn new<U>(kind: FieldKind, value: f64, unit: U) -> Self
    where
        U: Into<SharedString>,
    {
        ReportEntry { kind, value, unit: unit.into() }
    }
}
