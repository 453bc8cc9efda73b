use super::shared::Shared;
use super::sleep::StartupLatch;
use crate::deque::WorkStealingDeque;
use crate::runtime::context::{WorkerContext, enter_worker};
use crate::runtime::job::Job;
use crate::utils::{XorShift64, affinity};

use std::rc::Rc;
use std::sync::Arc;
use std::thread;

/// States of the worker loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// Draining the worker's own deque.
    LocalQueue,

    /// Looking for work in other deques.
    Stealing,

    /// Blocked until work shows up or termination is requested.
    Sleeping,
}

/// A worker thread of the job system.
///
/// A `Worker` is built on the constructing thread and moved onto its own OS
/// thread, where [`run`](Self::run) drives it through three states:
/// 1. `LocalQueue`: pop and run jobs from the own deque (LIFO)
/// 2. `Stealing`: steal from random peers, then scan every peer once,
///    including the entry queue
/// 3. `Sleeping`: park until a job is submitted or termination is requested
///
/// Termination is checked before every pop and steal attempt and after
/// every wakeup.
pub(crate) struct Worker {
    /// Index of the worker; also its slot in the victim table.
    index: usize,

    /// Back-reference to the job system's shared state.
    shared: Arc<Shared>,

    /// Owner side of this worker's deque.
    local: WorkStealingDeque<Job>,

    /// Core to pin the thread to, if pinning is enabled.
    core: Option<usize>,
}

impl Worker {
    /// Creates a new worker.
    ///
    /// # Arguments
    ///
    /// * `index` - Worker index, in `0..worker_count`
    /// * `shared` - Shared state of the job system
    /// * `local` - Owner side of the worker's deque
    /// * `core` - Core to pin to at startup, if any
    pub(crate) fn new(
        index: usize,
        shared: Arc<Shared>,
        local: WorkStealingDeque<Job>,
        core: Option<usize>,
    ) -> Self {
        Self {
            index,
            shared,
            local,
            core,
        }
    }

    /// Runs the worker on the current thread until termination.
    ///
    /// Reports ready to `startup` once the worker context is installed.
    pub(crate) fn run(self, startup: &StartupLatch) {
        let Worker {
            index,
            shared,
            local,
            core,
        } = self;

        if let Some(core) = core {
            match affinity::pin_current_thread(core) {
                Ok(()) => tracing::debug!(worker = index, core, "worker pinned"),
                Err(err) => {
                    tracing::warn!(worker = index, core, error = %err, "failed to pin worker")
                }
            }
        }

        let rng = XorShift64::for_worker(shared.policy.seed, index);
        let context = Rc::new(WorkerContext {
            index,
            shared,
            local,
        });

        enter_worker(context.clone(), || {
            startup.count_down();
            tracing::debug!(worker = index, "worker started");

            Scheduler {
                context: &context,
                rng,
            }
            .run();
        });

        tracing::debug!(worker = index, "worker exited");
    }
}

/// The worker loop, borrowing the installed worker context.
struct Scheduler<'a> {
    context: &'a WorkerContext,
    rng: XorShift64,
}

impl Scheduler<'_> {
    fn run(&mut self) {
        let shared = &*self.context.shared;

        let mut state = State::LocalQueue;
        let mut preferred_victim = None;

        loop {
            state = match state {
                State::LocalQueue => {
                    self.drain_local();
                    State::Stealing
                }

                State::Stealing => match self.steal(preferred_victim.take()) {
                    Some(job) => {
                        // There may be more where this came from.
                        shared.wake_up_workers(1);
                        job.run();
                        State::LocalQueue
                    }
                    None => State::Sleeping,
                },

                State::Sleeping => {
                    tracing::trace!(worker = self.context.index, "worker sleeping");
                    shared.sleep_until_work();
                    tracing::trace!(worker = self.context.index, "worker woke up");

                    // Fresh top-level work most likely sits in the entry queue.
                    preferred_victim = Some(shared.entry_index());
                    State::Stealing
                }
            };

            if shared.is_termination_requested() {
                return;
            }
        }
    }

    /// Pops and runs local jobs until the deque is empty or termination is
    /// requested.
    fn drain_local(&mut self) {
        let shared = &*self.context.shared;

        while !shared.is_termination_requested() {
            match self.context.local.pop() {
                Some(job) => job.run(),
                None => return,
            }
        }
    }

    /// Looks for a job in the other deques.
    ///
    /// Tries `preferred` first, then `steal_attempts` random victims
    /// (yielding after every `yield_after_failures` consecutive misses),
    /// then one linear scan over every peer and the entry queue.
    fn steal(&mut self, preferred: Option<usize>) -> Option<Job> {
        let shared = &*self.context.shared;
        let policy = shared.policy;
        let index = self.context.index;

        if let Some(victim) = preferred {
            if shared.is_termination_requested() {
                return None;
            }
            if let Some(job) = self.try_steal(victim) {
                return Some(job);
            }
        }

        // Every worker plus the entry queue, minus ourselves.
        let victims = shared.worker_count() + 1;
        let mut failures = 0;

        for _ in 0..policy.steal_attempts {
            if shared.is_termination_requested() {
                return None;
            }

            let victim = self.random_victim(victims);
            if let Some(job) = self.try_steal(victim) {
                return Some(job);
            }

            failures += 1;
            if failures % policy.yield_after_failures == 0 {
                thread::yield_now();
            }
        }

        for offset in 1..victims {
            if shared.is_termination_requested() {
                return None;
            }

            let victim = (index + offset) % victims;
            if let Some(job) = self.try_steal(victim) {
                return Some(job);
            }
        }

        None
    }

    fn try_steal(&self, victim: usize) -> Option<Job> {
        let job = self.context.shared.steal_from(victim)?;
        tracing::trace!(worker = self.context.index, victim, "stole job");
        Some(job)
    }

    /// Picks a victim in `0..victims`, never this worker.
    fn random_victim(&mut self, victims: usize) -> usize {
        let index = self.context.index;
        let pick = self.rng.next_usize(victims - 1);

        if pick >= index { pick + 1 } else { pick }
    }
}
