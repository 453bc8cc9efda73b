//! Error types for the job system.

use std::io;

use thiserror::Error;

/// Errors reported by the job system.
///
/// Scheduling itself never fails: an empty deque or a lost steal is normal
/// control flow. Errors only arise while building the system or when
/// observing the outcome of a job through a [`JobHandle`](crate::JobHandle).
#[derive(Debug, Error)]
pub enum Error {
    /// A builder option was rejected.
    #[error("invalid job system configuration: {field} {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },

    /// The operating system refused to start a worker thread.
    #[error("failed to spawn worker thread {index}")]
    Spawn {
        index: usize,
        #[source]
        source: io::Error,
    },

    /// The job body panicked. The panic was contained by its worker.
    #[error("job panicked")]
    JobPanicked,

    /// The job was dropped without running, because the job system
    /// terminated first.
    #[error("job was discarded before it could run")]
    JobDiscarded,
}

impl Error {
    /// Returns true if this error describes a job outcome rather than a
    /// setup failure.
    pub fn is_job_error(&self) -> bool {
        matches!(self, Error::JobPanicked | Error::JobDiscarded)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_outcomes_are_job_errors() {
        assert!(Error::JobPanicked.is_job_error());
        assert!(Error::JobDiscarded.is_job_error());
    }

    #[test]
    fn setup_failures_are_not_job_errors() {
        let invalid = Error::InvalidConfig {
            field: "worker_threads",
            reason: "must be greater than zero",
        };
        let spawn = Error::Spawn {
            index: 3,
            source: io::Error::other("no threads left"),
        };

        assert!(!invalid.is_job_error());
        assert!(!spawn.is_job_error());
        assert_eq!(
            invalid.to_string(),
            "invalid job system configuration: worker_threads must be greater than zero"
        );
        assert_eq!(spawn.to_string(), "failed to spawn worker thread 3");
    }
}
