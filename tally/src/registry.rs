//! The metric registry: a named, tagged catalog of live metrics.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use quanta::{Clock, Instant};

use crate::error::Error;
use crate::executor::{Executor, ThreadPoolExecutor};
use crate::metrics::{Counter, Histogram, Meter, Metric, Timer};
use crate::name::{MetricName, SharedString};
use crate::report::ReportEntry;
use crate::stats::ReservoirConfig;
use crate::units::TimeUnit;

type Listener = Arc<dyn Fn(&MetricName, &Metric) + Send + Sync>;

/// A catalog of metrics keyed by [`MetricName`], sharing one executor and
/// one clock.
///
/// The registry is cheap to clone; all clones see the same catalog.  The
/// map lock is held only for catalog operations, never while metric state
/// is read or written, so registration cost does not leak into the update
/// hot path.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    metrics: Mutex<HashMap<MetricName, Metric>>,
    listeners: Mutex<Vec<Listener>>,
    executor: Arc<dyn Executor>,
    clock: Clock,
}

impl Registry {
    /// Creates a registry backed by a thread pool with one worker per
    /// available CPU and the system clock.
    pub fn new() -> Result<Self, Error> {
        Ok(Self::with(Arc::new(ThreadPoolExecutor::with_default_threads()?), Clock::new()))
    }

    /// Creates a registry with an explicit executor and clock.
    ///
    /// Tests typically pass [`InlineExecutor`][crate::InlineExecutor] and a
    /// mock clock for full determinism.
    pub fn with(executor: Arc<dyn Executor>, clock: Clock) -> Self {
        Registry {
            inner: Arc::new(RegistryInner {
                metrics: Mutex::new(HashMap::new()),
                listeners: Mutex::new(Vec::new()),
                executor,
                clock,
            }),
        }
    }

    /// The executor shared by this registry's metrics.
    pub fn executor(&self) -> Arc<dyn Executor> {
        Arc::clone(&self.inner.executor)
    }

    /// The clock shared by this registry's metrics.
    pub fn clock(&self) -> Clock {
        self.inner.clock.clone()
    }

    /// Registers `metric` under `name`, failing if the name is taken.
    pub fn add<N, M>(&self, name: N, metric: M) -> Result<(), Error>
    where
        N: Into<MetricName>,
        M: Into<Metric>,
    {
        let name = name.into();
        let metric = metric.into();
        {
            let mut metrics = self.inner.metrics.lock();
            if metrics.contains_key(&name) {
                return Err(Error::AlreadyRegistered(name));
            }
            tracing::debug!(metric = %name, kind = metric.kind(), "registered metric");
            metrics.insert(name.clone(), metric.clone());
        }
        self.notify_added(&name, &metric);
        Ok(())
    }

    /// Returns the metric registered under `name`, creating it with
    /// `factory` if absent.
    ///
    /// The factory runs at most once, under the catalog lock: racing calls
    /// for the same unregistered name all receive the single instance built
    /// by whichever caller won the lock.  Factories should therefore not
    /// block or call back into the registry.
    pub fn get_or_create<N, M, F>(&self, name: N, factory: F) -> Metric
    where
        N: Into<MetricName>,
        M: Into<Metric>,
        F: FnOnce() -> M,
    {
        let name = name.into();
        let (metric, created) = {
            let mut metrics = self.inner.metrics.lock();
            match metrics.entry(name.clone()) {
                Entry::Occupied(entry) => (entry.get().clone(), false),
                Entry::Vacant(entry) => {
                    let metric: Metric = factory().into();
                    entry.insert(metric.clone());
                    (metric, true)
                }
            }
        };

        if created {
            tracing::debug!(metric = %name, kind = metric.kind(), "registered metric");
            self.notify_added(&name, &metric);
        }
        metric
    }

    fn get_or_try_create<N, M, F>(&self, name: N, factory: F) -> Result<Metric, Error>
    where
        N: Into<MetricName>,
        M: Into<Metric>,
        F: FnOnce() -> Result<M, Error>,
    {
        let name = name.into();
        let (metric, created) = {
            let mut metrics = self.inner.metrics.lock();
            match metrics.entry(name.clone()) {
                Entry::Occupied(entry) => (entry.get().clone(), false),
                // A failing factory registers nothing; the `?` releases the
                // lock without touching the entry.
                Entry::Vacant(entry) => {
                    let metric: Metric = factory()?.into();
                    entry.insert(metric.clone());
                    (metric, true)
                }
            }
        };

        if created {
            tracing::debug!(metric = %name, kind = metric.kind(), "registered metric");
            self.notify_added(&name, &metric);
        }
        Ok(metric)
    }

    /// Returns the metric registered under `name`, or
    /// [`Error::NotFound`].
    pub fn try_get<N>(&self, name: N) -> Result<Metric, Error>
    where
        N: Into<MetricName>,
    {
        let name = name.into();
        self.inner.metrics.lock().get(&name).cloned().ok_or(Error::NotFound(name))
    }

    /// Removes the metric registered under `name`, returning it.
    ///
    /// Handles already held by callers keep working; the metric merely
    /// stops appearing in the catalog and in reports.
    pub fn remove<N>(&self, name: N) -> Result<Metric, Error>
    where
        N: Into<MetricName>,
    {
        let name = name.into();
        self.inner.metrics.lock().remove(&name).ok_or(Error::NotFound(name))
    }

    /// The number of registered metrics.
    pub fn len(&self) -> usize {
        self.inner.metrics.lock().len()
    }

    /// Whether the registry holds no metrics.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers a listener invoked after every successful registration,
    /// from both [`add`][Registry::add] and a creating
    /// [`get_or_create`][Registry::get_or_create].
    pub fn on_metric_added<F>(&self, listener: F)
    where
        F: Fn(&MetricName, &Metric) + Send + Sync + 'static,
    {
        self.inner.listeners.lock().push(Arc::new(listener));
    }

    fn notify_added(&self, name: &MetricName, metric: &Metric) {
        // Snapshot the listener list so a listener registering another
        // metric cannot deadlock against this lock.
        let listeners: Vec<Listener> = self.inner.listeners.lock().clone();
        for listener in listeners {
            listener(name, metric);
        }
    }

    /// Reports every registered metric.
    ///
    /// `cb` is invoked once per metric, from that metric's own mailbox, with
    /// fields observed at one logical instant per metric.  The set of
    /// metrics reported is the catalog as of this call; metrics added
    /// afterwards are not included.
    pub fn report<F>(&self, cb: F)
    where
        F: Fn(&MetricName, Vec<ReportEntry>, Instant) + Send + Sync + 'static,
    {
        self.report_filtered(|_name| true, cb)
    }

    /// Reports the registered metrics whose names pass `filter`.
    pub fn report_filtered<P, F>(&self, filter: P, cb: F)
    where
        P: Fn(&MetricName) -> bool,
        F: Fn(&MetricName, Vec<ReportEntry>, Instant) + Send + Sync + 'static,
    {
        let selected: Vec<(MetricName, Metric)> = {
            let metrics = self.inner.metrics.lock();
            metrics
                .iter()
                .filter(|(name, _)| filter(name))
                .map(|(name, metric)| (name.clone(), metric.clone()))
                .collect()
        };

        let cb = Arc::new(cb);
        for (name, metric) in selected {
            let cb = Arc::clone(&cb);
            metric.report(move |entries, observed_at| cb(&name, entries, observed_at));
        }
    }

    /// Returns the counter registered under `name`, creating it if absent.
    pub fn counter<N>(&self, name: N) -> Result<Counter, Error>
    where
        N: Into<MetricName>,
    {
        let name = name.into();
        let metric = self.get_or_create(name.clone(), || {
            Counter::new(self.executor(), self.clock())
        });
        match metric {
            Metric::Counter(counter) => Ok(counter),
            other => Err(Error::KindMismatch { name, existing: other.kind() }),
        }
    }

    /// Returns the histogram registered under `name`, creating it with
    /// `config` if absent.
    ///
    /// The configuration is validated up front, so a bad configuration
    /// never registers anything.
    pub fn histogram<N>(&self, name: N, config: ReservoirConfig) -> Result<Histogram, Error>
    where
        N: Into<MetricName>,
    {
        let name = name.into();
        let metric = self.get_or_try_create(name.clone(), || {
            Histogram::new(config, self.executor(), self.clock())
        })?;
        match metric {
            Metric::Histogram(histogram) => Ok(histogram),
            other => Err(Error::KindMismatch { name, existing: other.kind() }),
        }
    }

    /// Returns the meter registered under `name`, creating it if absent
    /// with the given event kind, reporting rates per second.
    pub fn meter<N, E>(&self, name: N, event_kind: E) -> Result<Meter, Error>
    where
        N: Into<MetricName>,
        E: Into<SharedString>,
    {
        let name = name.into();
        let event_kind = event_kind.into();
        let metric = self.get_or_create(name.clone(), || {
            Meter::new(event_kind, TimeUnit::Seconds, self.executor(), self.clock())
        });
        match metric {
            Metric::Meter(meter) => Ok(meter),
            other => Err(Error::KindMismatch { name, existing: other.kind() }),
        }
    }

    /// Returns the timer registered under `name`, creating it if absent
    /// with the default decaying reservoir, millisecond durations, and
    /// per-second rates.
    pub fn timer<N>(&self, name: N) -> Result<Timer, Error>
    where
        N: Into<MetricName>,
    {
        let name = name.into();
        let metric = self.get_or_try_create(name.clone(), || {
            Timer::new(TimeUnit::Milliseconds, TimeUnit::Seconds, self.executor(), self.clock())
        })?;
        match metric {
            Metric::Timer(timer) => Ok(timer),
            other => Err(Error::KindMismatch { name, existing: other.kind() }),
        }
    }
}
