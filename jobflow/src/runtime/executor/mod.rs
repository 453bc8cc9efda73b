//! Job executor implementation.
//!
//! This module contains the pieces that keep worker threads busy:
//! - [`shared`]: state shared by all workers (victim table, entry queue,
//!   termination flag),
//! - [`sleep`]: the wake/sleep primitive and the startup barrier,
//! - [`worker`]: the three-state worker loop.

pub(crate) mod shared;
pub(crate) mod sleep;
pub(crate) mod worker;
