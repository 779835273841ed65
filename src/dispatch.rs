//! Bounded fan-out of work units over a fixed pool of worker threads
//!
//! Each unit is registered with a wait group before it is queued, runs while
//! holding a token from a [`TokenPool`], and is marked complete only after its
//! token has been returned and its report queued.

use crate::operation::Operation;
use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::sync::WaitGroup;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

/// Concurrency used when none is configured.
pub const DEFAULT_CAPACITY: usize = 10;

/// One file's pending operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub path: PathBuf,
    pub operation: Operation,
    key: Option<Arc<str>>,
}

impl WorkUnit {
    /// An empty key is treated the same as no key.
    pub fn new(path: PathBuf, operation: Operation, key: Option<&str>) -> Self {
        Self::with_shared_key(path, operation, key.filter(|k| !k.is_empty()).map(Arc::from))
    }

    pub(crate) fn with_shared_key(path: PathBuf, operation: Operation, key: Option<Arc<str>>) -> Self {
        Self {
            path,
            operation,
            key,
        }
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }
}

/// Counting semaphore built on a bounded channel.
///
/// Acquiring sends into the channel and blocks while it is full; releasing
/// takes one message back out. A [`Dispatcher`] starts exactly as many
/// workers as its pool has tokens, so there the thread count and the gate
/// both bound concurrency and `acquire` never waits. The pool still records
/// occupancy for [`Dispatcher::peak_concurrency`], and gates on its own when
/// shared by more threads than tokens.
#[derive(Debug)]
pub struct TokenPool {
    slots: Sender<()>,
    returns: Receiver<()>,
    capacity: usize,
    held: AtomicUsize,
    peak: AtomicUsize,
}

impl TokenPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (slots, returns) = channel::bounded(capacity);
        Self {
            slots,
            returns,
            capacity,
            held: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Block until a token is free.
    pub fn acquire(&self) -> Token<'_> {
        // The pool owns both channel ends, so the channel cannot disconnect.
        let _ = self.slots.send(());
        let held = self.held.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(held, Ordering::SeqCst);
        Token { pool: self }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tokens currently held.
    pub fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    /// Most tokens ever held at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// A held slot; dropping it returns the slot to its pool.
#[derive(Debug)]
pub struct Token<'a> {
    pool: &'a TokenPool,
}

impl Drop for Token<'_> {
    fn drop(&mut self) {
        self.pool.held.fetch_sub(1, Ordering::SeqCst);
        let _ = self.pool.returns.recv();
    }
}

struct Task {
    unit: WorkUnit,
    done: WaitGroup,
}

/// Runs a handler over submitted work units with bounded concurrency.
///
/// A handler that panics produces no report for its unit. The unit still
/// counts as finished and the worker moves on to the next one.
pub struct Dispatcher<R> {
    queue: Option<Sender<Task>>,
    reports: Receiver<R>,
    completion: WaitGroup,
    tokens: Arc<TokenPool>,
    workers: Vec<JoinHandle<()>>,
    submitted: usize,
}

impl<R: Send + 'static> Dispatcher<R> {
    /// Start `capacity` workers, each calling `handler` once per unit it takes.
    pub fn new<F>(capacity: usize, handler: F) -> Self
    where
        F: Fn(&WorkUnit) -> R + Send + Sync + 'static,
    {
        let tokens = Arc::new(TokenPool::new(capacity));
        let handler = Arc::new(handler);
        let (queue, tasks) = channel::unbounded::<Task>();
        let (report_tx, reports) = channel::unbounded::<R>();

        let workers = (0..tokens.capacity())
            .map(|_| {
                let tasks = tasks.clone();
                let report_tx = report_tx.clone();
                let tokens = Arc::clone(&tokens);
                let handler = Arc::clone(&handler);
                thread::spawn(move || {
                    for Task { unit, done } in tasks.iter() {
                        let report = {
                            let _token = tokens.acquire();
                            panic::catch_unwind(AssertUnwindSafe(|| handler(&unit)))
                        };
                        match report {
                            Ok(report) => {
                                let _ = report_tx.send(report);
                            }
                            Err(_) => {
                                tracing::error!(
                                    path = %unit.path.display(),
                                    "handler panicked, no report for this unit"
                                );
                            }
                        }
                        drop(done);
                    }
                })
            })
            .collect();

        Self {
            queue: Some(queue),
            reports,
            completion: WaitGroup::new(),
            tokens,
            workers,
            submitted: 0,
        }
    }

    /// Queue a unit. It is counted as outstanding before it can start.
    pub fn submit(&mut self, unit: WorkUnit) {
        let task = Task {
            unit,
            done: self.completion.clone(),
        };
        if let Some(queue) = &self.queue {
            // Workers outlive handler panics and hold the receiver until the
            // queue closes, so this cannot fail while `queue` is set.
            if queue.send(task).is_err() {
                tracing::error!("no workers left to accept work");
                return;
            }
            self.submitted += 1;
        }
    }

    /// Units submitted so far.
    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Most units that ever ran at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.tokens.peak()
    }

    /// Wait for every submitted unit to finish and return their reports.
    pub fn finish(mut self) -> Vec<R> {
        drop(self.queue.take());
        self.completion.wait();

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }

        self.reports.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    fn units(count: usize) -> Vec<WorkUnit> {
        (0..count)
            .map(|i| WorkUnit::new(PathBuf::from(format!("file-{}", i)), Operation::Verify, None))
            .collect()
    }

    #[test]
    fn test_work_unit_empty_key_is_absent() {
        let unit = WorkUnit::new(PathBuf::from("a"), Operation::Sign, Some(""));
        assert_eq!(unit.key(), None);
        let unit = WorkUnit::new(PathBuf::from("a"), Operation::Sign, Some("ABCDEF01"));
        assert_eq!(unit.key(), Some("ABCDEF01"));
    }

    #[test]
    fn test_token_pool_counts_and_releases() {
        let pool = TokenPool::new(2);
        {
            let _a = pool.acquire();
            let _b = pool.acquire();
            assert_eq!(pool.held(), 2);
        }
        assert_eq!(pool.held(), 0);
        assert_eq!(pool.peak(), 2);
        let _c = pool.acquire();
        assert_eq!(pool.held(), 1);
    }

    #[test]
    fn test_token_pool_zero_capacity_is_one() {
        assert_eq!(TokenPool::new(0).capacity(), 1);
    }

    #[test]
    fn test_concurrency_never_exceeds_capacity() {
        let active = Arc::new(AtomicUsize::new(0));
        let observed_max = Arc::new(AtomicUsize::new(0));
        let handler_active = Arc::clone(&active);
        let handler_max = Arc::clone(&observed_max);

        let mut dispatcher = Dispatcher::new(3, move |_unit: &WorkUnit| {
            let now = handler_active.fetch_add(1, Ordering::SeqCst) + 1;
            handler_max.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
            handler_active.fetch_sub(1, Ordering::SeqCst);
        });
        for unit in units(24) {
            dispatcher.submit(unit);
        }
        assert!(dispatcher.peak_concurrency() <= 3);
        let reports = dispatcher.finish();

        assert_eq!(reports.len(), 24);
        assert!(observed_max.load(Ordering::SeqCst) <= 3);
        assert!(observed_max.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_finish_waits_for_every_unit() {
        let finished = Arc::new(Mutex::new(Vec::new()));
        let handler_finished = Arc::clone(&finished);

        let mut dispatcher = Dispatcher::new(4, move |unit: &WorkUnit| {
            thread::sleep(Duration::from_millis(5));
            handler_finished.lock().unwrap().push(unit.path.clone());
            unit.path.clone()
        });
        for unit in units(17) {
            dispatcher.submit(unit);
        }
        assert_eq!(dispatcher.submitted(), 17);
        let mut reports = dispatcher.finish();

        assert_eq!(finished.lock().unwrap().len(), 17);
        reports.sort();
        reports.dedup();
        assert_eq!(reports.len(), 17);
    }

    #[test]
    fn test_finish_with_no_units() {
        let dispatcher = Dispatcher::new(DEFAULT_CAPACITY, |_unit: &WorkUnit| ());
        assert!(dispatcher.finish().is_empty());
    }

    #[test]
    fn test_panicking_handler_does_not_hang_batch() {
        let mut dispatcher = Dispatcher::new(2, |unit: &WorkUnit| {
            if unit.path == PathBuf::from("file-1") {
                panic!("handler blew up");
            }
            unit.path.clone()
        });
        for unit in units(2) {
            dispatcher.submit(unit);
        }
        let reports = dispatcher.finish();
        assert_eq!(reports, vec![PathBuf::from("file-0")]);
    }

    #[test]
    fn test_worker_survives_handler_panic() {
        let mut dispatcher = Dispatcher::new(1, |unit: &WorkUnit| {
            if unit.path == PathBuf::from("file-1") {
                panic!("handler blew up");
            }
            unit.path.clone()
        });
        for unit in units(3) {
            dispatcher.submit(unit);
        }
        assert_eq!(dispatcher.submitted(), 3);
        let mut reports = dispatcher.finish();
        reports.sort();
        assert_eq!(reports, vec![PathBuf::from("file-0"), PathBuf::from("file-2")]);
    }

    #[test]
    fn test_token_pool_blocks_when_exhausted() {
        let pool = Arc::new(TokenPool::new(1));
        let active = Arc::new(AtomicUsize::new(0));
        let observed_max = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let active = Arc::clone(&active);
                let observed_max = Arc::clone(&observed_max);
                thread::spawn(move || {
                    let _token = pool.acquire();
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    observed_max.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(10));
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(observed_max.load(Ordering::SeqCst), 1);
        assert_eq!(pool.peak(), 1);
        assert_eq!(pool.held(), 0);
    }

    #[test]
    fn test_independent_dispatchers() {
        let mut first = Dispatcher::new(1, |_unit: &WorkUnit| 1u8);
        let mut second = Dispatcher::new(2, |_unit: &WorkUnit| 2u8);
        for unit in units(3) {
            first.submit(unit.clone());
            second.submit(unit);
        }
        assert_eq!(first.finish(), vec![1, 1, 1]);
        assert_eq!(second.finish(), vec![2, 2, 2]);
    }
}
