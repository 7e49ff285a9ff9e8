//! Task executors backing the per-metric mailboxes.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::Error;

/// A unit of work submitted to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run jobs on behalf of metric mailboxes.
///
/// The executor is shared process-wide across metrics; a single pool sized
/// for the host is the intended production configuration, while
/// [`InlineExecutor`] runs everything on the calling thread for
/// deterministic tests.
pub trait Executor: Send + Sync + 'static {
    /// Submits a job for execution.  Must not block the caller.
    fn execute(&self, job: Job);
}

/// An executor that runs each job immediately on the calling thread.
///
/// Useful in tests: combined with a mailbox, every enqueued task has
/// completed by the time the enqueueing call returns, so reads are
/// deterministic.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, job: Job) {
        job();
    }
}

/// A fixed-size pool of named worker threads draining a shared, unbounded
/// job queue.
///
/// The queue is unbounded by design: submission never blocks and there is no
/// backpressure, so sustained overload shows up as memory growth rather than
/// stalled producers.  Dropping the pool finishes all queued jobs before
/// joining the workers.
pub struct ThreadPoolExecutor {
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPoolExecutor {
    /// Creates a pool with `threads` workers (at least one).
    pub fn new(threads: usize) -> Result<Self, Error> {
        let threads = threads.max(1);
        let (tx, rx) = unbounded::<Job>();

        let mut workers = Vec::with_capacity(threads);
        for idx in 0..threads {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("tally-worker-{}", idx))
                .spawn(move || worker_loop(rx))
                .map_err(Error::Spawn)?;
            workers.push(handle);
        }

        Ok(ThreadPoolExecutor { tx: Some(tx), workers })
    }

    /// Creates a pool with one worker per available CPU.
    pub fn with_default_threads() -> Result<Self, Error> {
        Self::new(num_cpus::get())
    }
}

impl Executor for ThreadPoolExecutor {
    fn execute(&self, job: Job) {
        // `tx` is only `None` mid-drop, when no jobs can arrive.
        if let Some(tx) = &self.tx {
            let _ = tx.send(job);
        }
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        // Disconnect the channel; workers drain what remains and exit.
        drop(self.tx.take());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("executor worker panicked during shutdown");
            }
        }
    }
}

fn worker_loop(rx: Receiver<Job>) {
    while let Ok(job) = rx.recv() {
        // A panicking job must not take the worker down with it.
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            tracing::error!("executor job panicked; worker continuing");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use crossbeam_channel::bounded;

    use super::{Executor, InlineExecutor, ThreadPoolExecutor};

    #[test]
    fn inline_runs_synchronously() {
        let ran = Arc::new(AtomicUsize::new(0));
        let executor = InlineExecutor;
        let ran2 = Arc::clone(&ran);
        executor.execute(Box::new(move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pool_runs_jobs() {
        let pool = ThreadPoolExecutor::new(2).expect("spawn workers");
        let (tx, rx) = bounded(1);
        pool.execute(Box::new(move || {
            let _ = tx.send(7);
        }));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(7));
    }

    #[test]
    fn panicking_job_does_not_kill_worker() {
        let pool = ThreadPoolExecutor::new(1).expect("spawn workers");
        pool.execute(Box::new(|| panic!("boom")));

        let (tx, rx) = bounded(1);
        pool.execute(Box::new(move || {
            let _ = tx.send("alive");
        }));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok("alive"));
    }

    #[test]
    fn drop_finishes_queued_jobs() {
        let ran = Arc::new(AtomicUsize::new(0));
        let pool = ThreadPoolExecutor::new(1).expect("spawn workers");
        for _ in 0..64 {
            let ran = Arc::clone(&ran);
            pool.execute(Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }
        drop(pool);
        assert_eq!(ran.load(Ordering::SeqCst), 64);
    }
}
