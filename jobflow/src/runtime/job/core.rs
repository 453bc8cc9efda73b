use super::handle::{Completion, JobHandle};
use super::state::{DISCARDED, FINISHED, PANICKED};

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// The callable stored in a job.
type Body = Box<dyn FnOnce() + Send + 'static>;

/// A unit of work owned by exactly one deque slot until it is dequeued.
///
/// A job is consumed by [`run`](Self::run). If it is dropped without
/// running, its completion record is marked discarded so that no
/// [`JobHandle`] waits forever.
pub(crate) struct Job {
    /// `None` once the body has been taken for execution.
    body: Option<Body>,

    /// Completion record observed through the job's handle.
    completion: Arc<Completion>,
}

impl Job {
    /// Wraps a callable into a job and returns it with its handle.
    pub(crate) fn new<F>(f: F) -> (Self, JobHandle)
    where
        F: FnOnce() + Send + 'static,
    {
        let completion = Arc::new(Completion::new());

        let job = Self {
            body: Some(Box::new(f)),
            completion: completion.clone(),
        };

        (job, JobHandle { completion })
    }

    /// Executes the job body on the current thread.
    ///
    /// A panic in the body is caught here so that it cannot tear down the
    /// worker thread; it is logged and recorded in the completion record.
    pub(crate) fn run(mut self) {
        let Some(body) = self.body.take() else {
            return;
        };

        match panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(()) => self.completion.complete(FINISHED),
            Err(payload) => {
                tracing::error!(
                    panic = panic_message(payload.as_ref()),
                    "job panicked; the worker continues"
                );
                self.completion.complete(PANICKED);
            }
        }
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        if self.body.is_some() {
            self.completion.complete(DISCARDED);
        }
    }
}

/// Extracts a printable message from a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn run_marks_finished() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();

        let (job, handle) = Job::new(move || flag.store(true, Ordering::Relaxed));
        assert!(!handle.is_finished());

        job.run();

        assert!(ran.load(Ordering::Relaxed));
        assert!(handle.is_finished());
        assert!(handle.wait().is_ok());
    }

    #[test]
    fn panic_is_contained_and_reported() {
        let (job, handle) = Job::new(|| panic!("boom"));

        job.run();

        assert!(matches!(handle.wait(), Err(Error::JobPanicked)));
    }

    #[test]
    fn dropping_unrun_job_discards_it() {
        let (job, handle) = Job::new(|| {});

        drop(job);

        assert!(handle.is_finished());
        assert!(matches!(handle.wait(), Err(Error::JobDiscarded)));
    }

    #[test]
    fn panic_message_handles_common_payloads() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u32), "<non-string panic payload>");
    }
}
