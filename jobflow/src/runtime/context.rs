use crate::deque::WorkStealingDeque;
use crate::runtime::executor::shared::Shared;
use crate::runtime::job::Job;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

/// Per-thread state of a running worker.
///
/// Installed for the whole lifetime of a worker thread, so that code running
/// inside a job (for example a nested `submit`) can reach the worker's own
/// deque without passing it around.
pub(crate) struct WorkerContext {
    /// Index of the worker in its job system.
    pub(crate) index: usize,

    /// Back-reference to the job system the worker belongs to.
    pub(crate) shared: Arc<Shared>,

    /// Owner side of the worker's deque.
    pub(crate) local: WorkStealingDeque<Job>,
}

thread_local! {
    /// Context of the worker running on this thread, if any.
    static CURRENT_WORKER: RefCell<Option<Rc<WorkerContext>>> =
        const { RefCell::new(None) };
}

/// Installs `context` as the current worker for the duration of `f`.
///
/// The previous context (normally none) is restored afterwards.
pub(crate) fn enter_worker<R>(context: Rc<WorkerContext>, f: impl FnOnce() -> R) -> R {
    let previous = CURRENT_WORKER.with(|current| current.replace(Some(context)));

    let out = f();

    CURRENT_WORKER.with(|current| current.replace(previous));

    out
}

/// Runs `f` with the current worker context, or `None` off worker threads.
///
/// The context is cloned out of the thread-local first, so `f` may itself
/// call back into this function (a job submitting from inside a job).
pub(crate) fn with_current<R>(f: impl FnOnce(Option<&WorkerContext>) -> R) -> R {
    let current = CURRENT_WORKER
        .try_with(|current| current.borrow().clone())
        .ok()
        .flatten();

    f(current.as_deref())
}
