/// A unit of time, used both for reporting durations and for expressing
/// rates as events-per-unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    /// Nanoseconds.
    Nanoseconds,
    /// Microseconds.
    ///
    /// One microsecond is equal to 1000 nanoseconds.
    Microseconds,
    /// Milliseconds.
    ///
    /// One millisecond is equal to 1000 microseconds.
    Milliseconds,
    /// Seconds.
    ///
    /// One second is equal to 1000 milliseconds.
    Seconds,
    /// Minutes.
    Minutes,
    /// Hours.
    Hours,
    /// Days.
    Days,
}

impl TimeUnit {
    /// Gets the plural string form of this `TimeUnit`.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "nanoseconds",
            TimeUnit::Microseconds => "microseconds",
            TimeUnit::Milliseconds => "milliseconds",
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        }
    }

    /// Gets the singular string form of this `TimeUnit`, used when building
    /// rate labels such as `requests/second`.
    pub fn singular(&self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "nanosecond",
            TimeUnit::Microseconds => "microsecond",
            TimeUnit::Milliseconds => "millisecond",
            TimeUnit::Seconds => "second",
            TimeUnit::Minutes => "minute",
            TimeUnit::Hours => "hour",
            TimeUnit::Days => "day",
        }
    }

    /// The length of one unit, in nanoseconds.
    pub fn as_nanos(&self) -> f64 {
        match self {
            TimeUnit::Nanoseconds => 1.0,
            TimeUnit::Microseconds => 1_000.0,
            TimeUnit::Milliseconds => 1_000_000.0,
            TimeUnit::Seconds => 1_000_000_000.0,
            TimeUnit::Minutes => 60.0 * 1_000_000_000.0,
            TimeUnit::Hours => 3_600.0 * 1_000_000_000.0,
            TimeUnit::Days => 86_400.0 * 1_000_000_000.0,
        }
    }

    /// The length of one unit, in seconds.
    pub fn as_secs(&self) -> f64 {
        self.as_nanos() / 1_000_000_000.0
    }

    /// Converts a value from one unit to another.
    pub fn convert(value: f64, from: TimeUnit, to: TimeUnit) -> f64 {
        value * from.as_nanos() / to.as_nanos()
    }
}

impl std::fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
