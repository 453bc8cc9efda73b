//! Low-level utilities used internally by the job system.
//!
//! - [`rng`]: the per-worker victim-selection RNG,
//! - [`affinity`]: optional pinning of worker threads to CPU cores.

pub(crate) mod affinity;
pub(crate) mod rng;

pub(crate) use rng::XorShift64;
