//! End-to-end tests driving metrics through the shared thread pool.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::bounded;
use tally::{
    Clock, FieldKind, InlineExecutor, Mailbox, Registry, ReservoirConfig, ThreadPoolExecutor,
    TimeUnit,
};

const RECV_TIMEOUT: Duration = Duration::from_secs(10);

fn pooled_registry(threads: usize) -> Registry {
    let executor = ThreadPoolExecutor::new(threads).expect("spawn workers");
    Registry::with(Arc::new(executor), Clock::new())
}

#[test]
fn mailbox_serializes_concurrent_producers() {
    // Eight producers hammer one mailbox.  Each task checks a busy flag on
    // entry and exit; any overlap between two tasks is a violation.  Task
    // panics are swallowed by the mailbox, so violations are counted in an
    // atomic rather than asserted inside the task.
    let executor = Arc::new(ThreadPoolExecutor::new(4).expect("spawn workers"));
    let mailbox: Mailbox<u64> = Mailbox::new(0, executor);

    let busy = Arc::new(AtomicBool::new(false));
    let violations = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..8)
        .map(|_| {
            let mailbox = mailbox.clone();
            let busy = Arc::clone(&busy);
            let violations = Arc::clone(&violations);
            thread::spawn(move || {
                for _ in 0..500 {
                    let busy = Arc::clone(&busy);
                    let violations = Arc::clone(&violations);
                    mailbox.send(move |count| {
                        if busy.swap(true, Ordering::SeqCst) {
                            violations.fetch_add(1, Ordering::SeqCst);
                        }
                        *count += 1;
                        busy.store(false, Ordering::SeqCst);
                    });
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().expect("producer thread");
    }

    let (tx, rx) = bounded(1);
    mailbox.send(move |count| {
        let _ = tx.send(*count);
    });
    assert_eq!(rx.recv_timeout(RECV_TIMEOUT), Ok(4_000));
    assert_eq!(violations.load(Ordering::SeqCst), 0);
}

#[test]
fn mailbox_preserves_per_producer_order() {
    let executor = Arc::new(ThreadPoolExecutor::new(4).expect("spawn workers"));
    // State maps producer id to the last sequence number seen from it.
    let mailbox: Mailbox<Vec<u64>> = Mailbox::new(vec![0; 8], executor);
    let violations = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..8usize)
        .map(|id| {
            let mailbox = mailbox.clone();
            let violations = Arc::clone(&violations);
            thread::spawn(move || {
                for seq in 1..=500u64 {
                    let violations = Arc::clone(&violations);
                    mailbox.send(move |last_seen| {
                        if last_seen[id] + 1 != seq {
                            violations.fetch_add(1, Ordering::SeqCst);
                        }
                        last_seen[id] = seq;
                    });
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().expect("producer thread");
    }

    let (tx, rx) = bounded(1);
    mailbox.send(move |last_seen| {
        let _ = tx.send(last_seen.clone());
    });
    assert_eq!(rx.recv_timeout(RECV_TIMEOUT), Ok(vec![500; 8]));
    assert_eq!(violations.load(Ordering::SeqCst), 0);
}

#[test]
fn concurrent_get_or_create_shares_one_metric() {
    let registry = pooled_registry(2);

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            thread::spawn(move || {
                let counter = registry.counter("shared.hits").expect("counter");
                counter.increment(1);
            })
        })
        .collect();
    for thread in threads {
        thread.join().expect("worker thread");
    }

    assert_eq!(registry.len(), 1);
    let counter = registry.counter("shared.hits").expect("counter");
    let (tx, rx) = bounded(1);
    counter.get_count(move |count, _at| {
        let _ = tx.send(count);
    });
    assert_eq!(rx.recv_timeout(RECV_TIMEOUT), Ok(8));
}

#[test]
fn timer_records_when_timed_code_panics() {
    let registry = Registry::with(Arc::new(InlineExecutor), Clock::new());
    let timer = registry.timer("flaky.op").expect("timer");

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        timer.time(|| panic!("boom"));
    }));
    assert!(outcome.is_err());

    let (tx, rx) = bounded(1);
    timer.get_count(move |count, _at| {
        let _ = tx.send(count);
    });
    assert_eq!(rx.recv_timeout(RECV_TIMEOUT), Ok(1));
}

#[test]
fn registry_reports_across_the_pool() {
    let registry = pooled_registry(4);

    let hits = registry.counter("cache.hits").expect("counter");
    hits.increment(12);

    let requests = registry.meter("http.requests", "requests").expect("meter");
    requests.mark_n(3);

    let latency = registry.timer("http.latency").expect("timer");
    latency.update(Duration::from_millis(25));

    let sizes =
        registry.histogram("payload.sizes", ReservoirConfig::uniform(128)).expect("histogram");
    sizes.update(512);

    let (tx, rx) = bounded(4);
    registry.report(move |name, entries, _observed_at| {
        let _ = tx.send((name.to_string(), entries));
    });

    let mut seen = Vec::new();
    for _ in 0..4 {
        let (name, entries) = rx.recv_timeout(RECV_TIMEOUT).expect("report entry");
        assert!(!entries.is_empty(), "metric {} reported no fields", name);
        seen.push((name, entries));
    }
    seen.sort_by(|a, b| a.0.cmp(&b.0));

    assert_eq!(seen[0].0, "cache.hits");
    assert_eq!(seen[0].1.len(), 1);
    assert_eq!(seen[0].1[0].kind, FieldKind::Count);
    assert_eq!(seen[0].1[0].value, 12.0);

    assert_eq!(seen[1].0, "http.latency");
    assert_eq!(seen[1].1.len(), 15);
    let count = seen[1].1.iter().find(|e| e.kind == FieldKind::Count).expect("count field");
    assert_eq!(count.value, 1.0);

    assert_eq!(seen[2].0, "http.requests");
    let count = seen[2].1.iter().find(|e| e.kind == FieldKind::Count).expect("count field");
    assert_eq!(count.value, 3.0);
    assert_eq!(count.unit, "requests");

    assert_eq!(seen[3].0, "payload.sizes");
    assert_eq!(seen[3].1.len(), 11);
}

#[test]
fn mean_rate_uses_registry_units() {
    let (clock, mock) = Clock::mock();
    let registry = Registry::with(Arc::new(InlineExecutor), clock);

    let jobs = registry
        .meter(
            tally::MetricName::from_name_and_tags("jobs.completed", [("queue", "default")]),
            "jobs",
        )
        .expect("meter");
    jobs.mark_n(120);
    mock.increment(Duration::from_secs(60));

    let (tx, rx) = bounded(1);
    jobs.get_mean_rate(move |rate, _at| {
        let _ = tx.send(rate);
    });
    let rate = rx.recv_timeout(RECV_TIMEOUT).expect("rate");
    assert!((rate - 2.0).abs() < 1e-9, "expected 2 jobs/second, got {}", rate);
}

#[test]
fn reads_after_writes_observe_them() {
    // A read enqueued after a write, from the same thread, must see it even
    // when tasks drain on pool workers.
    let registry = pooled_registry(1);
    let counter = registry.counter("ordered").expect("counter");

    for round in 1..=50u64 {
        counter.increment(1);
        let (tx, rx) = bounded(1);
        counter.get_count(move |count, _at| {
            let _ = tx.send(count);
        });
        let observed = rx.recv_timeout(RECV_TIMEOUT).expect("count") as u64;
        assert!(observed >= round, "read observed {} before its prior write {}", observed, round);
    }
}

#[test]
fn timer_unit_is_used_in_report() {
    let registry = Registry::with(Arc::new(InlineExecutor), Clock::new());
    let latency = registry.timer("db.query").expect("timer");
    latency.update(Duration::from_millis(8));

    let (tx, rx) = bounded(1);
    latency.report(move |entries, _at| {
        let _ = tx.send(entries);
    });
    let entries = rx.recv_timeout(RECV_TIMEOUT).expect("report");

    let max = entries.iter().find(|e| e.kind == FieldKind::Max).expect("max field");
    assert_eq!(max.unit, TimeUnit::Milliseconds.as_str());
    assert!((max.value - 8.0).abs() < 1.0, "expected ~8ms, got {}", max.value);

    let m1 = entries.iter().find(|e| e.kind == FieldKind::OneMinuteRate).expect("m1 field");
    assert_eq!(m1.unit, "calls/second");
}
