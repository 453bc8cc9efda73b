/// The job is queued or running.
pub(crate) const PENDING: u8 = 0;

/// The job body returned normally.
pub(crate) const FINISHED: u8 = 1;

/// The job body panicked; the worker caught the panic.
pub(crate) const PANICKED: u8 = 2;

/// The job was dropped without ever running.
///
/// This happens to jobs still queued when the job system terminates, and to
/// jobs submitted after termination was requested.
pub(crate) const DISCARDED: u8 = 3;
