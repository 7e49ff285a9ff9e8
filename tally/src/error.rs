use std::io;

use thiserror::Error;

use crate::name::MetricName;

/// Errors that can occur while constructing or registering metrics.
///
/// All variants are surfaced synchronously to the immediate caller; nothing
/// that runs inside a metric's mailbox produces an `Error`.
#[derive(Debug, Error)]
pub enum Error {
    /// A reservoir was configured with a capacity of zero.
    #[error("reservoir capacity must be greater than zero")]
    InvalidCapacity,

    /// A decaying reservoir was configured with a non-positive or non-finite
    /// decay factor.
    #[error("decay factor must be finite and greater than zero (got {0})")]
    InvalidDecayFactor(f64),

    /// `Registry::add` was called with a name that is already registered.
    #[error("a metric named `{0}` is already registered")]
    AlreadyRegistered(MetricName),

    /// The requested metric name is not registered.
    #[error("no metric named `{0}` is registered")]
    NotFound(MetricName),

    /// The requested name is registered, but as a different kind of metric.
    #[error("metric `{name}` is already registered as a {existing}")]
    KindMismatch {
        /// The requested metric name.
        name: MetricName,
        /// The kind of the metric already registered under that name.
        existing: &'static str,
    },

    /// A worker thread for the shared executor could not be spawned.
    #[error("failed to spawn executor worker thread")]
    Spawn(#[source] io::Error),
}
