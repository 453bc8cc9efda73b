//! Job system runtime.
//!
//! This module contains the job system built on top of the work-stealing
//! deque:
//! - [`core`]: the [`JobSystem`] and its [`JobSystemHandle`],
//! - [`builder`]: configuration,
//! - [`executor`]: worker threads, shared state and the sleep primitive,
//! - [`job`]: the job record and its handle,
//! - [`context`]: the thread-local worker context.

mod context;
mod executor;

pub(crate) mod builder;
pub(crate) mod core;
pub(crate) mod job;

pub use self::core::{JobSystem, JobSystemHandle};
pub use builder::{DEFAULT_THREAD_NAME_PREFIX, JobSystemBuilder};
pub use job::JobHandle;
