//! Per-metric single-writer serialization.
//!
//! Every stateful metric owns a [`Mailbox`]: a single-consumer task queue
//! that any number of producer threads may enqueue work into.  Tasks drain
//! strictly in submission order on a worker drawn from the shared
//! [`Executor`], so exactly one mutation or read of the metric's state runs
//! at a time.  Because reads flow through the same queue as writes, a read
//! task observes a state no older than every write enqueued before it,
//! which is what makes a multi-field report internally consistent without
//! locks on the hot update path.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{
    AtomicBool,
    Ordering::{AcqRel, Acquire, Release},
};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::executor::Executor;

type Task<T> = Box<dyn FnOnce(&mut T) + Send + 'static>;

/// A single-writer serializer around a piece of state `T`.
///
/// Cloning a `Mailbox` yields another handle to the same state and queue.
/// The queue is unbounded: `send` never blocks, and sustained overload
/// manifests as memory growth rather than backpressure.
pub struct Mailbox<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Mailbox { inner: Arc::clone(&self.inner) }
    }
}

struct Inner<T> {
    state: Mutex<T>,
    tx: Sender<Task<T>>,
    rx: Receiver<Task<T>>,
    scheduled: AtomicBool,
    executor: Arc<dyn Executor>,
}

impl<T: Send + 'static> Mailbox<T> {
    /// Creates a mailbox owning `state`, draining on `executor`.
    pub fn new(state: T, executor: Arc<dyn Executor>) -> Self {
        let (tx, rx) = unbounded();
        Mailbox {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                tx,
                rx,
                scheduled: AtomicBool::new(false),
                executor,
            }),
        }
    }

    /// Enqueues a task and returns immediately.
    ///
    /// Tasks submitted from any thread execute in FIFO order, one at a
    /// time.  A panicking task is caught and logged; subsequent tasks for
    /// the same metric still run.
    pub fn send<F>(&self, task: F)
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        // Both channel ends live in `inner`, so the send cannot fail.
        let _ = self.inner.tx.send(Box::new(task));

        if !self.inner.scheduled.swap(true, AcqRel) {
            let inner = Arc::clone(&self.inner);
            let executor = Arc::clone(&self.inner.executor);
            executor.execute(Box::new(move || drain(&inner)));
        }
    }

    /// Whether two mailboxes share the same underlying state.
    pub fn same_instance(&self, other: &Mailbox<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

fn drain<T>(inner: &Inner<T>) {
    loop {
        {
            // Uncontended: the `scheduled` flag admits one drainer at a time.
            let mut state = inner.state.lock();
            while let Ok(task) = inner.rx.try_recv() {
                if catch_unwind(AssertUnwindSafe(|| task(&mut *state))).is_err() {
                    tracing::error!("metric task panicked; continuing with queued tasks");
                }
            }
        }

        inner.scheduled.store(false, Release);
        if inner.rx.is_empty() {
            break;
        }
        // A task arrived between the last try_recv and clearing the flag.
        // Reclaim the schedule, unless the sender already did.
        if inner.scheduled.compare_exchange(false, true, AcqRel, Acquire).is_err() {
            break;
        }
    }
}
