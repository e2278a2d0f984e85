//! Validated generation parameters.
//!
//! A [`Config`] couples the requested count `N` with the number of producers
//! `T`. The same `N` is used both as the exclusive upper bound of every sampled
//! candidate and as the number of distinct values the collector waits for,
//! which is what turns rejection sampling into a permutation of `[0, N)`.
//! There is no way to set the two independently.
//!
//! A `Config` can only be obtained through [`Limits::validate`] (or
//! [`Config::new`], which validates against the default limits), so the core
//! never sees an out-of-range request.

use crate::{Error, Result};

/// Largest count accepted by the library (`2^31 - 1`).
pub const MAX_COUNT: u32 = i32::MAX as u32;

/// Largest number of producers accepted by the library.
pub const MAX_WORKERS: usize = 32;

/// Parameters of a single generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Config {
    count: u32,
    workers: usize,
}

impl Config {
    /// Validates `count` and `workers` against the default [`Limits`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if either value is zero or above the
    /// library caps.
    pub fn new(count: u32, workers: usize) -> Result<Self> {
        Limits::default().validate(i64::from(count), workers as i64)
    }

    /// Number of distinct values to produce, and the exclusive upper bound of
    /// each value.
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Number of concurrent producers, also the capacity of the shared queue.
    pub const fn workers(&self) -> usize {
        self.workers
    }
}

/// Upper bounds a delivery layer enforces before handing work to the core.
///
/// Both bounds are themselves capped by [`MAX_COUNT`] and [`MAX_WORKERS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    max_count: u32,
    max_workers: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_count: MAX_COUNT,
            max_workers: MAX_WORKERS,
        }
    }
}

impl Limits {
    /// Builds a custom set of limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if a bound is zero or exceeds the
    /// library caps.
    pub fn new(max_count: u32, max_workers: usize) -> Result<Self> {
        if max_count == 0 || max_count > MAX_COUNT {
            return Err(Error::invalid(format!(
                "max count must be within [1, {MAX_COUNT}], got {max_count}"
            )));
        }
        if max_workers == 0 || max_workers > MAX_WORKERS {
            return Err(Error::invalid(format!(
                "max workers must be within [1, {MAX_WORKERS}], got {max_workers}"
            )));
        }
        Ok(Self {
            max_count,
            max_workers,
        })
    }

    pub const fn max_count(&self) -> u32 {
        self.max_count
    }

    pub const fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Checks raw, possibly negative, request values and produces a
    /// [`Config`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] describing the first offending field.
    pub fn validate(&self, count: i64, workers: i64) -> Result<Config> {
        if count < 1 {
            return Err(Error::invalid("countNumbers must be greater than 0"));
        }
        if count > i64::from(self.max_count) {
            return Err(Error::invalid(format!(
                "countNumbers {count} exceeds maximum allowed ({})",
                self.max_count
            )));
        }
        if workers < 1 {
            return Err(Error::invalid("countThreads must be greater than 0"));
        }
        if workers > self.max_workers as i64 {
            return Err(Error::invalid(format!(
                "countThreads {workers} exceeds maximum allowed ({})",
                self.max_workers
            )));
        }

        // Both casts are lossless: the bounds were checked above.
        Ok(Config {
            count: count as u32,
            workers: workers as usize,
        })
    }
}
