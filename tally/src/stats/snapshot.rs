/// An immutable, sorted view of a reservoir's values at a point in time.
///
/// Snapshots answer quantile queries by linear interpolation between order
/// statistics: `quantile(q)` interpolates at position `q * (len + 1)`,
/// clamped to the first/last element outside that range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    values: Vec<i64>,
}

impl Snapshot {
    /// Creates a `Snapshot` from the given values, sorting them.
    pub fn new(mut values: Vec<i64>) -> Self {
        values.sort_unstable();
        Snapshot { values }
    }

    /// The sorted values.
    pub fn values(&self) -> &[i64] {
        &self.values
    }

    /// The number of values in the snapshot.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the snapshot holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The value at quantile `q`.
    ///
    /// `q` is clamped to `[0.0, 1.0]`; an empty snapshot yields `0.0`.
    pub fn quantile(&self, q: f64) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }

        let q = if q.is_nan() { 0.0 } else { q.clamp(0.0, 1.0) };
        let pos = q * (self.values.len() + 1) as f64;
        let idx = pos as usize;

        if idx < 1 {
            return self.values[0] as f64;
        }
        if idx >= self.values.len() {
            return self.values[self.values.len() - 1] as f64;
        }

        let lower = self.values[idx - 1] as f64;
        let upper = self.values[idx] as f64;
        lower + (pos - idx as f64) * (upper - lower)
    }

    /// The median (50th percentile).
    pub fn median(&self) -> f64 {
        self.quantile(0.5)
    }

    /// The 75th percentile.
    pub fn p75(&self) -> f64 {
        self.quantile(0.75)
    }

    /// The 95th percentile.
    pub fn p95(&self) -> f64 {
        self.quantile(0.95)
    }

    /// The 98th percentile.
    pub fn p98(&self) -> f64 {
        self.quantile(0.98)
    }

    /// The 99th percentile.
    pub fn p99(&self) -> f64 {
        self.quantile(0.99)
    }

    /// The 99.9th percentile.
    pub fn p999(&self) -> f64 {
        self.quantile(0.999)
    }

    /// The smallest sampled value, or 0 if empty.
    pub fn min(&self) -> i64 {
        self.values.first().copied().unwrap_or(0)
    }

    /// The largest sampled value, or 0 if empty.
    pub fn max(&self) -> i64 {
        self.values.last().copied().unwrap_or(0)
    }

    /// The arithmetic mean of the sampled values, or 0 if empty.
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.values.iter().map(|v| *v as f64).sum();
        sum / self.values.len() as f64
    }

    /// The sample standard deviation of the sampled values, or 0 for fewer
    /// than two values.
    pub fn std_dev(&self) -> f64 {
        if self.values.len() <= 1 {
            return 0.0;
        }
        let mean = self.mean();
        let sum_sq: f64 = self.values.iter().map(|v| (*v as f64 - mean).powi(2)).sum();
        (sum_sq / (self.values.len() - 1) as f64).sqrt()
    }
}
