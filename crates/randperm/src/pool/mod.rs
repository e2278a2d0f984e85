//! Producer pool for concurrent candidate sampling.
//!
//! ## Submodules
//!
//! - [`worker`] - The producer loop: sample, publish, observe the stop signal.
//! - [`manager`] - Spawning, live-count tracking and joining of producers.
mod manager;
mod worker;

pub use manager::{LiveProducers, WorkerPool};
