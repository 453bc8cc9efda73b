//! # jobflow
//!
//! **jobflow** is a work-stealing job system: a fixed pool of worker threads
//! that execute fine-grained jobs submitted by engine subsystems, balancing
//! load across cores by stealing rather than through a central queue.
//!
//! It provides:
//!
//! - A **lock-free work-stealing deque** ([`WorkStealingDeque`] /
//!   [`Stealer`]): the owner pushes and pops LIFO at the bottom, any thread
//!   steals FIFO from the top
//! - A **job system** ([`JobSystem`]) owning one deque and one OS thread per
//!   worker, with an entry queue for producers that are not workers
//! - A **three-state worker loop**: run local jobs, steal, sleep
//! - **Cooperative termination** and a shared **wake/sleep** primitive
//!
//! Jobs are opaque callables. There are no dependencies between jobs, no
//! priorities and no per-job cancellation.
//!
//! ## Quick Start
//!
//! ```
//! use jobflow::JobSystem;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let jobs = JobSystem::new(0, "jobs-").unwrap();
//! let handle = jobs.handle();
//! let leaves = Arc::new(AtomicUsize::new(0));
//!
//! let root = {
//!     let leaves = leaves.clone();
//!     jobs.submit(move || {
//!         // Children land on this worker's own deque.
//!         for _ in 0..8 {
//!             let leaves = leaves.clone();
//!             handle.submit(move || {
//!                 leaves.fetch_add(1, Ordering::Relaxed);
//!             });
//!         }
//!     })
//! };
//!
//! root.wait().unwrap();
//!
//! // The children run on their own; wait for them before `jobs` is dropped.
//! while leaves.load(Ordering::Relaxed) < 8 {
//!     std::thread::yield_now();
//! }
//! ```
//!
//! ## Modules
//!
//! - [`deque`]: the lock-free work-stealing deque
//!
//! ## Logging
//!
//! The crate reports through [`tracing`]: worker lifecycle at `debug`,
//! steals and sleep transitions at `trace`, start/stop at `info`, contained
//! job panics and fatal deque conditions at `error`. No subscriber is
//! installed by the library.

mod error;
mod runtime;
mod utils;

pub mod deque;

pub use deque::{Stealer, WorkStealingDeque};
pub use error::{Error, Result};
pub use runtime::{
    DEFAULT_THREAD_NAME_PREFIX, JobHandle, JobSystem, JobSystemBuilder, JobSystemHandle,
};
