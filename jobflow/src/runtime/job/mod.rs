//! Job primitives.
//!
//! A job is an opaque callable plus a completion record. The scheduler only
//! ever moves jobs between deques and runs them; it never looks inside.
//!
//! It includes:
//! - the job record and its execution,
//! - the completion states,
//! - the public [`JobHandle`] used to observe a job's outcome.

pub(crate) mod core;
pub(crate) mod handle;
pub(crate) mod state;

pub(crate) use self::core::Job;
pub use handle::JobHandle;
