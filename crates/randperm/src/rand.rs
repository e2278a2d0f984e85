//! Per-producer randomness.
//!
//! Every producer owns its own [`RandSource`]; nothing is shared between
//! workers. By default each source is a [`StdRng`] derived from a single
//! request-level [`Seed`], so a run can be replayed by reusing the seed (with
//! one worker the output order is fully reproducible; with more, only the
//! per-worker candidate streams are).

use rand::{Rng, SeedableRng, rng, rngs::StdRng};

/// A source of uniformly distributed candidates.
///
/// This abstraction allows you to plug in a seeded generator, the thread-local
/// generator, or a scripted source in tests.
///
/// # Example
/// ```
/// use randperm::RandSource;
///
/// struct Countdown(u32);
/// impl RandSource for Countdown {
///     fn below(&mut self, upper: u32) -> u32 {
///         self.0 = self.0.wrapping_sub(1);
///         self.0 % upper
///     }
/// }
///
/// let mut source = Countdown(3);
/// assert_eq!(source.below(10), 2);
/// assert_eq!(source.below(10), 1);
/// ```
pub trait RandSource: Send + 'static {
    /// Returns an integer in `[0, upper)`. `upper` is never zero.
    fn below(&mut self, upper: u32) -> u32;
}

impl RandSource for StdRng {
    fn below(&mut self, upper: u32) -> u32 {
        self.random_range(0..upper)
    }
}

/// A [`RandSource`] that uses the thread-local RNG (`rand::rng()`).
///
/// This type does **not** store the RNG itself; it accesses the generator of
/// whichever runtime thread the producer happens to be polled on. Output is
/// not reproducible.
#[derive(Default, Clone, Copy, Debug)]
pub struct ThreadRandom;

impl RandSource for ThreadRandom {
    fn below(&mut self, upper: u32) -> u32 {
        rng().random_range(0..upper)
    }
}

/// Request-level seed from which every producer's [`StdRng`] is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Seed(u64);

impl Seed {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Draws a fresh seed from the thread-local RNG.
    pub fn random() -> Self {
        Self(rng().random())
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Derives `workers` independent generators from this seed.
    ///
    /// Worker `i` always receives the `i`-th generator, so the mapping is
    /// stable for a given seed.
    pub fn sources(self, workers: usize) -> Vec<StdRng> {
        let mut root = StdRng::seed_from_u64(self.0);
        (0..workers).map(|_| StdRng::from_rng(&mut root)).collect()
    }
}

impl From<u64> for Seed {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
