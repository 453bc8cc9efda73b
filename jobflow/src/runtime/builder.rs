use super::JobSystem;
use crate::deque::DEFAULT_CAPACITY;
use crate::error::{Error, Result};

use std::thread;

/// Prefix used for worker thread names unless configured otherwise.
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "jobflow-";

/// Consecutive failed steals after which a worker yields, by default.
const DEFAULT_YIELD_AFTER_FAILURES: usize = 8;

/// Default seed for victim selection.
const DEFAULT_SEED: u64 = 0x853C_49E6_748F_EA9B;

/// Builder for configuring and creating a [`JobSystem`].
///
/// # Examples
///
/// ```
/// use jobflow::JobSystemBuilder;
///
/// let jobs = JobSystemBuilder::new()
///     .worker_threads(2)
///     .thread_name_prefix("physics-")
///     .build()
///     .unwrap();
///
/// assert_eq!(jobs.worker_thread_count(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct JobSystemBuilder {
    /// Number of worker threads.
    pub(crate) worker_threads: usize,

    /// Worker threads are named `"{prefix}{index}"`.
    pub(crate) thread_name_prefix: String,

    /// Initial capacity of every deque.
    pub(crate) deque_capacity: usize,

    /// Randomized steal attempts per round; derived from the worker count
    /// when unset.
    pub(crate) steal_attempts: Option<usize>,

    /// Consecutive failed steals after which a worker yields.
    pub(crate) yield_after_failures: usize,

    /// Victim-selection seed.
    pub(crate) seed: u64,

    /// Whether workers pin themselves to cores.
    pub(crate) pin_threads: bool,
}

impl JobSystemBuilder {
    /// Creates a builder with the default configuration.
    ///
    /// By default, the number of worker threads is the number of available
    /// logical CPUs, falling back to `1` if unavailable.
    pub fn new() -> Self {
        let worker_threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            worker_threads,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_owned(),
            deque_capacity: DEFAULT_CAPACITY,
            steal_attempts: None,
            yield_after_failures: DEFAULT_YIELD_AFTER_FAILURES,
            seed: DEFAULT_SEED,
            pin_threads: false,
        }
    }

    /// Sets the number of worker threads. Must be greater than zero.
    pub fn worker_threads(mut self, n: usize) -> Self {
        self.worker_threads = n;
        self
    }

    /// Sets the prefix of worker thread names. Diagnostic only.
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Sets the initial capacity of every deque.
    ///
    /// Rounded up to a power of two; deques grow on demand regardless.
    pub fn deque_capacity(mut self, capacity: usize) -> Self {
        self.deque_capacity = capacity;
        self
    }

    /// Sets how many random victims a worker tries before scanning every
    /// peer in order. Defaults to four times the worker count.
    pub fn steal_attempts(mut self, attempts: usize) -> Self {
        self.steal_attempts = Some(attempts);
        self
    }

    /// Sets how many consecutive failed steals make a worker yield its
    /// time slice.
    pub fn yield_after_failures(mut self, failures: usize) -> Self {
        self.yield_after_failures = failures;
        self
    }

    /// Sets the seed for victim selection.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Pins worker `i` to the `i`-th allowed core when enabled.
    ///
    /// Pinning failures are logged and otherwise ignored.
    pub fn pin_threads(mut self, pin: bool) -> Self {
        self.pin_threads = pin;
        self
    }

    /// Steal attempts per round, after applying the default.
    pub(crate) fn effective_steal_attempts(&self) -> usize {
        self.steal_attempts
            .unwrap_or_else(|| self.worker_threads.saturating_mul(4).max(4))
    }

    /// Checks every option.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first rejected option.
    pub(crate) fn validate(&self) -> Result<()> {
        let invalid = |field, reason| Err(Error::InvalidConfig { field, reason });

        if self.worker_threads == 0 {
            return invalid("worker_threads", "must be greater than zero");
        }
        if self.deque_capacity == 0 {
            return invalid("deque_capacity", "must be greater than zero");
        }
        if self.steal_attempts == Some(0) {
            return invalid("steal_attempts", "must be greater than zero");
        }
        if self.yield_after_failures == 0 {
            return invalid("yield_after_failures", "must be greater than zero");
        }

        Ok(())
    }

    /// Builds the job system, blocking until every worker is running.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`] if an option is out of range.
    /// - [`Error::Spawn`] if a worker thread could not be started.
    pub fn build(self) -> Result<JobSystem> {
        self.validate()?;
        JobSystem::start(self)
    }
}

impl Default for JobSystemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let builder = JobSystemBuilder::new();

        assert!(builder.worker_threads >= 1);
        assert_eq!(builder.thread_name_prefix, DEFAULT_THREAD_NAME_PREFIX);
        assert_eq!(builder.deque_capacity, DEFAULT_CAPACITY);
        assert!(builder.validate().is_ok());
    }

    #[test]
    fn steal_attempts_default_scales_with_workers() {
        assert_eq!(
            JobSystemBuilder::new()
                .worker_threads(1)
                .effective_steal_attempts(),
            4
        );
        assert_eq!(
            JobSystemBuilder::new()
                .worker_threads(6)
                .effective_steal_attempts(),
            24
        );
        assert_eq!(
            JobSystemBuilder::new()
                .worker_threads(6)
                .steal_attempts(3)
                .effective_steal_attempts(),
            3
        );
    }

    #[test]
    fn zero_values_are_rejected() {
        let cases = [
            (JobSystemBuilder::new().worker_threads(0), "worker_threads"),
            (JobSystemBuilder::new().deque_capacity(0), "deque_capacity"),
            (JobSystemBuilder::new().steal_attempts(0), "steal_attempts"),
            (
                JobSystemBuilder::new().yield_after_failures(0),
                "yield_after_failures",
            ),
        ];

        for (builder, expected) in cases {
            match builder.validate() {
                Err(Error::InvalidConfig { field, .. }) => assert_eq!(field, expected),
                other => panic!("expected {expected} to be rejected, got {other:?}"),
            }
        }
    }

    #[test]
    fn build_rejects_invalid_config() {
        let err = JobSystemBuilder::new().worker_threads(0).build().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }
}
