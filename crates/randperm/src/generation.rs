//! End-to-end orchestration of one generation request.
//!
//! [`Generation`] wires the pieces together: it creates the shared queue (with
//! capacity `T`), the [`StopSignal`], the [`WorkerPool`] and the collector
//! task, and hands back a [`PermutationStream`] through which values arrive in
//! the collector's order.
//!
//! The stream is the single owner of the request. Every way of ending it goes
//! through the same stop signal:
//!
//! - the collector reaching `N` distinct values,
//! - [`PermutationStream::abort`],
//! - dropping the stream (for example when a transport write fails),
//! - cancellation of a parent token passed to [`Generation::cancel_with`].

use crate::{
    CollectorStats, Config, Error, Outcome, RandSource, Result, Seed, StopSignal,
    collector::{Collector, PREALLOCATE_LIMIT},
    pool::{LiveProducers, WorkerPool},
};
use core::{
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use futures::Stream;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// Default capacity of the channel between the collector and the consumer.
pub const DEFAULT_OUTPUT_BUFFER: usize = 1024;

/// Default time producers get to exit after the stop signal before they are
/// aborted.
pub const DEFAULT_JOIN_GRACE: Duration = Duration::from_secs(3);

/// Builder for a single generation request.
#[derive(Debug, Clone)]
pub struct Generation {
    config: Config,
    seed: Option<Seed>,
    output_buffer: usize,
    join_grace: Duration,
    parent: Option<CancellationToken>,
}

impl Generation {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            seed: None,
            output_buffer: DEFAULT_OUTPUT_BUFFER,
            join_grace: DEFAULT_JOIN_GRACE,
            parent: None,
        }
    }

    /// Derives every producer's generator from `seed` instead of a random one.
    #[must_use]
    pub fn seed(mut self, seed: impl Into<Seed>) -> Self {
        self.seed = Some(seed.into());
        self
    }

    /// Capacity of the output channel. Values below 1 are raised to 1.
    #[must_use]
    pub fn output_buffer(mut self, size: usize) -> Self {
        self.output_buffer = size.max(1);
        self
    }

    #[must_use]
    pub fn join_grace(mut self, grace: Duration) -> Self {
        self.join_grace = grace;
        self
    }

    /// Aborts the generation whenever `parent` is cancelled.
    #[must_use]
    pub fn cancel_with(mut self, parent: &CancellationToken) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Starts the generation with seeded per-producer generators.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(mut self) -> PermutationStream {
        let seed = *self.seed.get_or_insert_with(Seed::random);
        let sources = seed.sources(self.config.workers());
        self.start(sources)
    }

    /// Starts the generation with caller-provided randomness.
    ///
    /// `make_source` is called once per worker index. Any seed configured on
    /// the builder is ignored.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_with<R, F>(mut self, make_source: F) -> PermutationStream
    where
        R: RandSource,
        F: FnMut(usize) -> R,
    {
        self.seed = None;
        let sources = (0..self.config.workers()).map(make_source);
        self.start(sources)
    }

    fn start<R, I>(self, sources: I) -> PermutationStream
    where
        R: RandSource,
        I: IntoIterator<Item = R>,
    {
        let count = self.config.count();
        let stop = match &self.parent {
            Some(parent) => StopSignal::child_of(parent),
            None => StopSignal::new(),
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Starting generation: count={}, workers={}, seed={:?}",
            count,
            self.config.workers(),
            self.seed.map(|s| s.value())
        );

        let (queue_tx, queue_rx) = mpsc::channel(self.config.workers());
        let (output_tx, output_rx) = mpsc::channel(self.output_buffer);

        let pool = WorkerPool::spawn(count, sources, &queue_tx, &stop);
        // Producers hold the only senders from here on, so the queue closes
        // once all of them have exited.
        drop(queue_tx);

        let collector = tokio::spawn(Collector::new(count).run(queue_rx, output_tx, stop.clone()));

        PermutationStream {
            output: output_rx,
            live: pool.live(),
            pool: Some(pool),
            collector: Some(collector),
            stop,
            config: self.config,
            seed: self.seed,
            join_grace: self.join_grace,
        }
    }
}

/// Aggregated counters for a finished generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationStats {
    /// Candidates published by all producers combined.
    pub published: u64,
    /// Candidates the collector took off the queue.
    pub received: u64,
    /// Candidates rejected as already seen.
    pub duplicates: u64,
    /// Candidates rejected for not being below `N`.
    pub out_of_range: u64,
    /// Distinct values delivered.
    pub emitted: u64,
}

impl GenerationStats {
    fn new(published: u64, collected: CollectorStats) -> Self {
        Self {
            published,
            received: collected.received,
            duplicates: collected.duplicates,
            out_of_range: collected.out_of_range,
            emitted: collected.emitted,
        }
    }
}

/// Result of [`PermutationStream::finish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub outcome: Outcome,
    pub stats: GenerationStats,
}

/// Values of a running generation, in the order the collector accepted them.
///
/// Implements [`Stream`]. The stream ends once the collector has emitted all
/// `N` values or the generation was aborted; use [`finish`](Self::finish) to
/// tell the two apart.
///
/// Dropping the stream raises the stop signal and aborts any producer still
/// running.
pub struct PermutationStream {
    output: mpsc::Receiver<u32>,
    stop: StopSignal,
    pool: Option<WorkerPool>,
    collector: Option<JoinHandle<(Outcome, CollectorStats)>>,
    live: LiveProducers,
    config: Config,
    seed: Option<Seed>,
    join_grace: Duration,
}

impl PermutationStream {
    pub const fn config(&self) -> Config {
        self.config
    }

    /// Seed the producers were derived from, if [`Generation::spawn`] was used.
    pub const fn seed(&self) -> Option<Seed> {
        self.seed
    }

    /// A handle to this generation's stop signal, for external abort paths.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Raises the stop signal. Values already buffered can still be read.
    pub fn abort(&self) {
        self.stop.raise();
    }

    /// Live-producer gauge; remains usable after the stream is dropped.
    pub fn live_producers(&self) -> LiveProducers {
        self.live.clone()
    }

    /// Receives the next value, or `None` once the sequence is sealed.
    pub async fn next_value(&mut self) -> Option<u32> {
        self.output.recv().await
    }

    /// Stops accepting values, waits for the collector and every producer,
    /// and reports how the generation ended.
    ///
    /// Values not yet read are discarded. If the collector had not finished,
    /// the generation ends as [`Outcome::Aborted`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerFailed`] if a background task panicked or a
    /// producer failed to stop within the join grace period.
    pub async fn finish(mut self) -> Result<Report> {
        self.output.close();

        let Some(collector) = self.collector.take() else {
            return Err(Error::WorkerFailed {
                context: "collector already joined".to_string(),
            });
        };
        let (outcome, collected) = collector.await?;

        let published = match self.pool.take() {
            Some(pool) => pool.join(self.join_grace).await?,
            None => 0,
        };

        let report = Report {
            outcome,
            stats: GenerationStats::new(published, collected),
        };

        #[cfg(feature = "tracing")]
        tracing::debug!("Generation finished: {:?}", report);

        Ok(report)
    }

    /// Reads the whole sequence into a `Vec` and joins the generation.
    ///
    /// Unlike [`collect_vec`](Self::collect_vec) an aborted run is not an
    /// error: the values read so far are returned alongside the report.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerFailed`] as for [`finish`](Self::finish).
    pub async fn collect_report(mut self) -> Result<(Vec<u32>, Report)> {
        let mut values = Vec::with_capacity((self.config.count() as usize).min(PREALLOCATE_LIMIT));
        while let Some(value) = self.output.recv().await {
            values.push(value);
        }

        let report = self.finish().await?;
        Ok((values, report))
    }

    /// Reads the whole sequence into a `Vec`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Aborted`] if the generation stopped before all `N`
    /// values were produced, or [`Error::WorkerFailed`] as for
    /// [`finish`](Self::finish).
    pub async fn collect_vec(self) -> Result<Vec<u32>> {
        match self.collect_report().await? {
            (values, Report { outcome: Outcome::Completed, .. }) => Ok(values),
            (_, Report { outcome: Outcome::Aborted, .. }) => Err(Error::Aborted),
        }
    }
}

impl Stream for PermutationStream {
    type Item = u32;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<u32>> {
        self.output.poll_recv(cx)
    }
}

impl Drop for PermutationStream {
    fn drop(&mut self) {
        self.stop.raise();
    }
}

/// Generates a random permutation of `[0, config.count())` with
/// `config.workers()` producers and returns it in full.
///
/// # Errors
///
/// See [`PermutationStream::collect_vec`].
///
/// # Example
/// ```
/// # #[tokio::main(flavor = "multi_thread")]
/// # async fn main() -> randperm::Result<()> {
/// let config = randperm::Config::new(10, 4)?;
/// let mut values = randperm::generate(config).await?;
///
/// values.sort_unstable();
/// assert_eq!(values, (0..10).collect::<Vec<_>>());
/// # Ok(())
/// # }
/// ```
#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(count = config.count(), workers = config.workers())))]
pub async fn generate(config: Config) -> Result<Vec<u32>> {
    Generation::new(config).spawn().collect_vec().await
}
