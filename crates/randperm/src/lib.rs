#![doc = include_str!("../README.md")]

mod collector;
mod config;
mod error;
mod generation;
mod pool;
mod rand;
mod signal;

#[cfg(test)]
mod tests;

pub use crate::collector::{CollectorStats, Outcome};
pub use crate::config::*;
pub use crate::error::*;
pub use crate::generation::*;
pub use crate::pool::{LiveProducers, WorkerPool};
pub use crate::rand::*;
pub use crate::signal::*;
