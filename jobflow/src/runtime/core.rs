use super::builder::JobSystemBuilder;
use super::context;
use super::executor::shared::{Shared, StealPolicy};
use super::executor::sleep::StartupLatch;
use super::executor::worker::Worker;
use super::job::JobHandle;
use crate::deque::WorkStealingDeque;
use crate::error::{Error, Result};
use crate::utils::affinity;

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A fixed pool of worker threads that execute jobs by work stealing.
///
/// `JobSystem` is responsible for:
/// - spawning one named OS thread per worker and waiting until all of them
///   are running,
/// - routing submitted jobs (a worker's own deque, or the entry queue),
/// - the shared wake/sleep mechanism,
/// - orderly termination: dropping the system requests termination and
///   joins every worker.
///
/// Termination is cooperative. Jobs already running finish; jobs still
/// queued are discarded and their handles report
/// [`Error::JobDiscarded`].
///
/// # Examples
///
/// ```
/// use jobflow::JobSystem;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let jobs = JobSystem::new(4, "worker-").unwrap();
/// let counter = Arc::new(AtomicUsize::new(0));
///
/// let handles: Vec<_> = (0..16)
///     .map(|_| {
///         let counter = counter.clone();
///         jobs.submit(move || {
///             counter.fetch_add(1, Ordering::Relaxed);
///         })
///     })
///     .collect();
///
/// for handle in handles {
///     handle.wait().unwrap();
/// }
///
/// assert_eq!(counter.load(Ordering::Relaxed), 16);
/// ```
pub struct JobSystem {
    /// Handle onto the shared state, also given out to collaborators.
    handle: JobSystemHandle,

    /// Join handles of the worker threads, in worker order.
    threads: Vec<JoinHandle<()>>,

    /// Prefix the worker threads were named with.
    thread_name_prefix: String,
}

impl JobSystem {
    /// Creates a job system with `thread_count` workers named
    /// `"{name_prefix}{index}"`, blocking until all of them are running.
    ///
    /// A `thread_count` of zero means one worker per available CPU.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] if a worker thread could not be started.
    pub fn new(thread_count: usize, name_prefix: impl Into<String>) -> Result<Self> {
        let mut builder = JobSystemBuilder::new().thread_name_prefix(name_prefix);

        if thread_count > 0 {
            builder = builder.worker_threads(thread_count);
        }

        builder.build()
    }

    /// Returns a builder for a custom configuration.
    pub fn builder() -> JobSystemBuilder {
        JobSystemBuilder::new()
    }

    /// Starts the workers described by a validated builder.
    pub(crate) fn start(config: JobSystemBuilder) -> Result<Self> {
        let workers = config.worker_threads;

        let mut locals = Vec::with_capacity(workers);
        let mut stealers = Vec::with_capacity(workers + 1);
        for _ in 0..workers {
            let local = WorkStealingDeque::with_capacity(config.deque_capacity);
            stealers.push(local.stealer());
            locals.push(local);
        }

        let policy = StealPolicy {
            steal_attempts: config.effective_steal_attempts(),
            yield_after_failures: config.yield_after_failures,
            seed: config.seed,
        };
        let entry = WorkStealingDeque::with_capacity(config.deque_capacity);
        let shared = Arc::new(Shared::new(stealers, entry, policy));

        let cores = if config.pin_threads {
            affinity::allowed_cores()
        } else {
            Vec::new()
        };

        let startup = Arc::new(StartupLatch::new(workers));
        let mut threads = Vec::with_capacity(workers);

        for (index, local) in locals.into_iter().enumerate() {
            let core = (!cores.is_empty()).then(|| cores[index % cores.len()]);
            let worker = Worker::new(index, shared.clone(), local, core);
            let startup = startup.clone();

            let spawned = thread::Builder::new()
                .name(format!("{}{}", config.thread_name_prefix, index))
                .spawn(move || worker.run(&startup));

            match spawned {
                Ok(thread) => threads.push(thread),
                Err(source) => {
                    tracing::error!(worker = index, error = %source, "failed to spawn worker thread");

                    shared.request_termination();
                    for thread in threads {
                        let _ = thread.join();
                    }
                    shared.discard_pending();

                    return Err(Error::Spawn { index, source });
                }
            }
        }

        startup.wait();

        tracing::info!(
            workers,
            prefix = %config.thread_name_prefix,
            "job system started"
        );

        Ok(Self {
            handle: JobSystemHandle { shared },
            threads,
            thread_name_prefix: config.thread_name_prefix,
        })
    }

    /// Returns a cloneable handle for submitting jobs, e.g. from inside jobs.
    pub fn handle(&self) -> JobSystemHandle {
        self.handle.clone()
    }

    /// Submits a job. See [`JobSystemHandle::submit`].
    pub fn submit<F>(&self, f: F) -> JobHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.submit(f)
    }

    /// Number of worker threads.
    pub fn worker_thread_count(&self) -> usize {
        self.handle.worker_thread_count()
    }

    /// Returns `true` once termination has been requested.
    pub fn is_termination_requested(&self) -> bool {
        self.handle.is_termination_requested()
    }

    /// Asks every worker to stop at its next dequeue attempt.
    ///
    /// Running jobs finish; queued jobs are discarded when the system is
    /// dropped. Jobs submitted afterwards are discarded immediately.
    pub fn request_termination(&self) {
        self.handle.request_termination();
    }

    /// Wakes up to `count` sleeping workers.
    pub fn wake_up_workers(&self, count: usize) {
        self.handle.wake_up_workers(count);
    }

    /// See [`JobSystemHandle::put_current_worker_to_sleep_until`].
    pub fn put_current_worker_to_sleep_until(&self, predicate: impl FnMut() -> bool) {
        self.handle.put_current_worker_to_sleep_until(predicate);
    }

    /// Returns `true` if any deque looked non-empty.
    pub fn has_jobs(&self) -> bool {
        self.handle.has_jobs()
    }

    /// Index of the calling worker thread, or `None` off this system's
    /// workers.
    pub fn current_worker_index(&self) -> Option<usize> {
        self.handle.current_worker_index()
    }

    /// Prefix the worker threads were named with.
    pub fn thread_name_prefix(&self) -> &str {
        &self.thread_name_prefix
    }
}

impl Drop for JobSystem {
    /// Shuts the job system down.
    ///
    /// This performs the following steps:
    /// 1. Requests termination and wakes every sleeping worker
    /// 2. Joins all worker threads
    /// 3. Discards the jobs nobody dequeued
    fn drop(&mut self) {
        let shared = &self.handle.shared;

        shared.request_termination();

        for (index, thread) in self.threads.drain(..).enumerate() {
            if thread.join().is_err() {
                tracing::error!(worker = index, "worker thread panicked");
            }
        }

        let discarded = shared.discard_pending();

        tracing::info!(discarded, "job system stopped");
    }
}

impl fmt::Debug for JobSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSystem")
            .field("workers", &self.worker_thread_count())
            .field("thread_name_prefix", &self.thread_name_prefix)
            .field("terminating", &self.is_termination_requested())
            .finish()
    }
}

/// A cheap, cloneable reference to a [`JobSystem`].
///
/// Jobs use it to submit children and to query termination. A handle does
/// not keep the workers alive: once the owning `JobSystem` is dropped,
/// submissions through the handle are discarded.
#[derive(Clone)]
pub struct JobSystemHandle {
    shared: Arc<Shared>,
}

impl JobSystemHandle {
    /// Submits a job and wakes one sleeping worker.
    ///
    /// Called from a worker thread of this system, the job is pushed onto
    /// that worker's own deque (run LIFO by it, or stolen FIFO by others).
    /// Called from any other thread, it goes to the entry queue.
    ///
    /// The returned handle observes the job's outcome; the job body itself
    /// is responsible for reporting its own errors.
    pub fn submit<F>(&self, f: F) -> JobHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.submit(f)
    }

    /// Number of worker threads.
    pub fn worker_thread_count(&self) -> usize {
        self.shared.worker_count()
    }

    /// Returns `true` once termination has been requested.
    pub fn is_termination_requested(&self) -> bool {
        self.shared.is_termination_requested()
    }

    /// Asks every worker to stop at its next dequeue attempt.
    pub fn request_termination(&self) {
        self.shared.request_termination();
    }

    /// Wakes up to `count` sleeping workers.
    pub fn wake_up_workers(&self, count: usize) {
        self.shared.wake_up_workers(count);
    }

    /// Blocks the calling thread on the shared sleep primitive until
    /// `predicate` holds or termination is requested.
    ///
    /// The predicate is re-evaluated whenever sleepers are woken, i.e. on
    /// every submission and every [`wake_up_workers`](Self::wake_up_workers).
    /// Whatever makes the predicate true must be followed by such a wakeup.
    pub fn put_current_worker_to_sleep_until(&self, predicate: impl FnMut() -> bool) {
        self.shared.park_until(predicate);
    }

    /// Returns `true` if any deque looked non-empty.
    ///
    /// A heuristic under concurrency, meant for sleep predicates.
    pub fn has_jobs(&self) -> bool {
        self.shared.has_jobs()
    }

    /// Index of the calling worker thread, or `None` off this system's
    /// workers.
    pub fn current_worker_index(&self) -> Option<usize> {
        context::with_current(|worker| {
            worker
                .filter(|worker| Arc::ptr_eq(&worker.shared, &self.shared))
                .map(|worker| worker.index)
        })
    }
}

impl fmt::Debug for JobSystemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSystemHandle")
            .field("workers", &self.worker_thread_count())
            .finish()
    }
}
