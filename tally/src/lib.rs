//! A streaming metrics engine.
//!
//! `tally` keeps live statistical summaries of high-rate event streams:
//! counters, reservoir-sampled histograms with quantile snapshots, meters
//! with exponentially-weighted 1/5/15-minute rates, and timers combining
//! both.  Every metric's state is guarded by a single-writer mailbox, so
//! updates from any number of threads are a fire-and-forget enqueue and all
//! reads are internally consistent, without locks on the hot path.
//!
//! # Design
//!
//! - **Bounded memory.**  Histograms sample into fixed-capacity reservoirs,
//!   either uniform (every value equally likely to be retained) or
//!   exponentially-decaying (recent values dominate), so memory use is
//!   independent of how many values are recorded.
//! - **Serialized state.**  Mutations and reads of one metric flow through
//!   its [`Mailbox`][mailbox::Mailbox] in submission order; a multi-field
//!   [`report`][Metric::report] observes every field at one logical instant.
//! - **Injected time and execution.**  Metrics take their [`Clock`] and
//!   [`Executor`] from the [`Registry`] that creates them.  Production uses
//!   a shared thread pool and the system clock; tests use
//!   [`InlineExecutor`] and a mock clock for full determinism.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use tally::{Clock, InlineExecutor, Registry, TimeUnit};
//!
//! # fn main() -> Result<(), tally::Error> {
//! let registry = Registry::with(Arc::new(InlineExecutor), Clock::new());
//!
//! let requests = registry.meter("http.requests", "requests")?;
//! requests.mark();
//!
//! let latency = registry.timer("http.latency")?;
//! latency.time(|| {
//!     // handle the request
//! });
//!
//! registry.report(|name, entries, _observed_at| {
//!     for entry in entries {
//!         println!("{} {} = {} {}", name, entry.kind, entry.value, entry.unit);
//!     }
//! });
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

mod error;
mod executor;
pub mod mailbox;
mod metrics;
mod name;
mod registry;
mod report;
pub mod stats;
mod units;

pub use self::error::Error;
pub use self::executor::{Executor, InlineExecutor, Job, ThreadPoolExecutor};
pub use self::mailbox::Mailbox;
pub use self::metrics::{Counter, Histogram, Meter, Metric, Timer, TimerGuard};
pub use self::name::{MetricName, SharedString, Tag};
pub use self::registry::Registry;
pub use self::report::{FieldKind, ReportEntry};
pub use self::stats::{ReservoirConfig, Snapshot};
pub use self::units::TimeUnit;

pub use quanta::{Clock, Instant};
