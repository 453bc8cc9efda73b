use super::state::{DISCARDED, FINISHED, PANICKED, PENDING};
use crate::error::{Error, Result};

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

/// Completion record shared between a job and its [`JobHandle`].
pub(crate) struct Completion {
    /// One of the constants in [`super::state`].
    state: AtomicU8,

    /// Guards the wait/notify handshake on `condvar`.
    lock: Mutex<()>,

    /// Signalled once `state` leaves `PENDING`.
    condvar: Condvar,
}

impl Completion {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(PENDING),
            lock: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }

    /// Records the final state of the job and wakes every waiter.
    ///
    /// The state is stored before the lock is taken, so a waiter that
    /// checked `PENDING` under the lock is already parked on the condvar.
    pub(crate) fn complete(&self, state: u8) {
        debug_assert_ne!(state, PENDING);

        self.state.store(state, Ordering::Release);

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.condvar.notify_all();
    }

    fn state(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    fn wait(&self) -> u8 {
        let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            let state = self.state();
            if state != PENDING {
                return state;
            }

            guard = self
                .condvar
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// A handle to a submitted job.
///
/// The handle observes the job's outcome. Dropping it does **not** cancel
/// the job; the scheduler has no per-job cancellation.
#[derive(Clone)]
pub struct JobHandle {
    pub(crate) completion: Arc<Completion>,
}

impl JobHandle {
    /// Returns `true` once the job has stopped being pending: it returned,
    /// panicked, or was discarded.
    pub fn is_finished(&self) -> bool {
        self.completion.state() != PENDING
    }

    /// Blocks the calling thread until the job is no longer pending.
    ///
    /// This parks the thread, it does not help execute jobs. Waiting from
    /// inside a job therefore takes a worker out of the pool until the
    /// awaited job completes on another worker; prefer waiting from
    /// producer threads.
    ///
    /// # Errors
    ///
    /// - [`Error::JobPanicked`] if the job body panicked.
    /// - [`Error::JobDiscarded`] if the job was dropped without running.
    pub fn wait(&self) -> Result<()> {
        match self.completion.wait() {
            FINISHED => Ok(()),
            PANICKED => Err(Error::JobPanicked),
            DISCARDED => Err(Error::JobDiscarded),
            state => unreachable!("job completed with pending state {state}"),
        }
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.completion.state() {
            PENDING => "pending",
            FINISHED => "finished",
            PANICKED => "panicked",
            _ => "discarded",
        };

        f.debug_struct("JobHandle").field("state", &state).finish()
    }
}
