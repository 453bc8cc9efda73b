use super::sleep::Sleeper;
use crate::deque::{Stealer, WorkStealingDeque};
use crate::runtime::context;
use crate::runtime::job::{Job, JobHandle};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Tuning knobs consulted by the worker loop.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StealPolicy {
    /// Randomized steal attempts per stealing round.
    pub(crate) steal_attempts: usize,

    /// Consecutive failed steals after which the thread yields.
    pub(crate) yield_after_failures: usize,

    /// Seed from which each worker derives its victim-selection stream.
    pub(crate) seed: u64,
}

/// State shared by the job system, its workers and every handle.
///
/// The victim table holds one stealer per worker followed by the stealer of
/// the entry queue, so the entry queue is addressed as victim
/// `worker_count`.
pub(crate) struct Shared {
    /// `stealers[i]` steals from worker `i`; the last one from the entry queue.
    stealers: Vec<Stealer<Job>>,

    /// Owner side of the entry queue, fed by threads that are not workers.
    entry: Mutex<WorkStealingDeque<Job>>,

    /// Set once; workers exit at their next dequeue attempt or wakeup.
    terminate: AtomicBool,

    /// Wake/sleep primitive for idle workers.
    sleeper: Sleeper,

    pub(crate) policy: StealPolicy,
}

impl Shared {
    /// Builds the shared state.
    ///
    /// # Arguments
    ///
    /// * `stealers` - One stealer per worker, in worker order
    /// * `entry` - The entry queue; its stealer is appended to the table
    /// * `policy` - Stealing parameters for the worker loop
    pub(crate) fn new(
        mut stealers: Vec<Stealer<Job>>,
        entry: WorkStealingDeque<Job>,
        policy: StealPolicy,
    ) -> Self {
        stealers.push(entry.stealer());

        Self {
            stealers,
            entry: Mutex::new(entry),
            terminate: AtomicBool::new(false),
            sleeper: Sleeper::new(),
            policy,
        }
    }

    /// Number of workers (the entry queue excluded).
    pub(crate) fn worker_count(&self) -> usize {
        self.stealers.len() - 1
    }

    /// Victim index of the entry queue.
    pub(crate) fn entry_index(&self) -> usize {
        self.worker_count()
    }

    /// Submits a callable and wakes one sleeping worker.
    ///
    /// From a worker thread of this system the job goes to that worker's
    /// own deque; from anywhere else it goes to the entry queue. Jobs
    /// submitted after termination was requested are discarded.
    pub(crate) fn submit<F>(self: &Arc<Self>, f: F) -> JobHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let (job, handle) = Job::new(f);

        if self.is_termination_requested() {
            tracing::trace!("job submitted after termination; discarding");
            return handle;
        }

        let mut job = Some(job);

        context::with_current(|worker| {
            if let Some(worker) = worker {
                if Arc::ptr_eq(&worker.shared, self) {
                    if let Some(job) = job.take() {
                        worker.local.push(job);
                    }
                }
            }
        });

        if let Some(job) = job {
            let mut entry = self.entry.lock().unwrap_or_else(PoisonError::into_inner);

            // Re-checked under the lock: `discard_pending` drains the entry
            // queue under the same lock once the flag is set, so a job pushed
            // here is either seen by that drain or never pushed at all.
            if self.is_termination_requested() {
                drop(entry);
                tracing::trace!("job submitted during termination; discarding");
                return handle;
            }

            entry.push(job);
        }

        self.sleeper.wake(1);

        handle
    }

    /// Attempts one steal from `victim`.
    pub(crate) fn steal_from(&self, victim: usize) -> Option<Job> {
        self.stealers[victim].steal()
    }

    /// Returns `true` if any deque looked non-empty.
    pub(crate) fn has_jobs(&self) -> bool {
        self.stealers.iter().any(|stealer| !stealer.is_empty())
    }

    pub(crate) fn is_termination_requested(&self) -> bool {
        self.terminate.load(Ordering::Acquire)
    }

    /// Sets the termination flag and wakes every sleeping worker.
    pub(crate) fn request_termination(&self) {
        self.terminate.store(true, Ordering::SeqCst);
        self.sleeper.wake_all();
    }

    pub(crate) fn wake_up_workers(&self, count: usize) {
        self.sleeper.wake(count);
    }

    /// Parks an idle worker until work shows up or termination is requested.
    pub(crate) fn sleep_until_work(&self) {
        self.sleeper
            .sleep_until(|| self.is_termination_requested() || self.has_jobs());
    }

    /// Parks the calling thread until `predicate` holds or termination is
    /// requested.
    pub(crate) fn park_until(&self, mut predicate: impl FnMut() -> bool) {
        self.sleeper
            .park_until(|| self.is_termination_requested() || predicate());
    }

    /// Drops every job still queued anywhere and returns how many there were.
    ///
    /// Only meaningful once the workers have exited. Dropping a queued job
    /// marks it discarded, and releases whatever the job captured; a job
    /// capturing a handle would otherwise keep this state alive through its
    /// own deque.
    pub(crate) fn discard_pending(&self) -> usize {
        let mut pending = Vec::new();

        for stealer in &self.stealers[..self.entry_index()] {
            pending.extend(std::iter::from_fn(|| stealer.steal()));
        }

        {
            // Excludes a submitter that checked the flag before it was set
            // but has not pushed yet.
            let _entry = self.entry.lock().unwrap_or_else(PoisonError::into_inner);
            let stealer = &self.stealers[self.entry_index()];
            pending.extend(std::iter::from_fn(|| stealer.steal()));
        }

        // Dropped outside the lock: a job's captures may run arbitrary code.
        let discarded = pending.len();
        drop(pending);

        discarded
    }
}
