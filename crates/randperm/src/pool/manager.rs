//! Producer pool for a single generation request.
//!
//! This module defines the [`WorkerPool`] struct, which spawns one producer
//! task per configured worker, keeps a live count of them, and joins them with
//! a bounded grace period once the request is over.
//!
//! Producers share nothing but the sender half of the bounded queue and the
//! [`StopSignal`]. Each one owns its [`RandSource`], so sampling needs no
//! locking.

use super::worker::producer_loop;
use crate::{Error, RandSource, Result, StopSignal};
use core::time::Duration;
use portable_atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinSet, time::timeout};

/// Handle on the number of producers that have not exited yet.
///
/// Cloning the handle is cheap; it stays valid after the pool itself is
/// dropped, which is what leak checks rely on.
#[derive(Clone, Debug, Default)]
pub struct LiveProducers(Arc<AtomicUsize>);

impl LiveProducers {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    /// Polls until every producer has exited or `grace` elapses.
    ///
    /// Returns `true` if the count reached zero in time.
    pub async fn wait_idle(&self, grace: Duration) -> bool {
        timeout(grace, async {
            while self.count() > 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .is_ok()
    }

    fn enter(&self) -> LiveGuard {
        self.0.fetch_add(1, Ordering::AcqRel);
        LiveGuard(Arc::clone(&self.0))
    }
}

/// Decrements the live count when a producer future is dropped, whether it
/// returned, panicked or was aborted.
struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// The producers of one generation request.
///
/// Dropping the pool aborts any producer that is still running.
pub struct WorkerPool {
    tasks: JoinSet<u64>,
    live: LiveProducers,
}

impl WorkerPool {
    /// Spawns one producer per source.
    ///
    /// `sources` must yield exactly as many items as there are workers; each
    /// producer samples from `[0, count)`.
    pub(crate) fn spawn<R, I>(
        count: u32,
        sources: I,
        queue: &mpsc::Sender<u32>,
        stop: &StopSignal,
    ) -> Self
    where
        R: RandSource,
        I: IntoIterator<Item = R>,
    {
        let live = LiveProducers::default();
        let mut tasks = JoinSet::new();

        for (worker_id, source) in sources.into_iter().enumerate() {
            let guard = live.enter();
            let queue = queue.clone();
            let stop = stop.clone();

            tasks.spawn(async move {
                let _guard = guard;
                producer_loop(worker_id, count, source, queue, stop).await
            });
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Spawned {} producers", live.count());

        Self { tasks, live }
    }

    pub fn live(&self) -> LiveProducers {
        self.live.clone()
    }

    /// Waits for every producer to exit and returns the total number of
    /// candidates they published.
    ///
    /// Producers are expected to exit on their own once the stop signal has
    /// been raised. Any producer still running after `grace` is aborted and
    /// reported.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerFailed`] if a producer panicked or had to be
    /// aborted.
    pub async fn join(mut self, grace: Duration) -> Result<u64> {
        let mut published = 0_u64;
        let mut failure = None;

        let drained = timeout(grace, async {
            while let Some(res) = self.tasks.join_next().await {
                match res {
                    Ok(n) => published += n,
                    Err(e) => failure = Some(Error::from(e)),
                }
            }
        })
        .await;

        if drained.is_err() {
            let stuck = self.tasks.len();
            #[cfg(feature = "tracing")]
            tracing::warn!("{stuck} producers still running after {grace:?}, aborting");
            self.tasks.abort_all();
            return Err(Error::WorkerFailed {
                context: format!("{stuck} producers did not stop within {grace:?}"),
            });
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(published),
        }
    }
}
