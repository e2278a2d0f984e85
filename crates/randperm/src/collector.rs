//! Deduplication and completion detection.
//!
//! The [`Collector`] is the only consumer of the shared queue and the only
//! owner of the set of values seen so far, so neither needs synchronization.
//! It forwards each first occurrence to the output channel in arrival order
//! and raises the [`StopSignal`] once `N` distinct values have been emitted.

use crate::StopSignal;
use std::collections::HashSet;
use tokio::sync::mpsc;

/// Upper bound on the number of slots reserved up front for the seen set and
/// for collected output.
///
/// Larger requests grow on demand instead of allocating gigabytes before the
/// first candidate arrives.
pub(crate) const PREALLOCATE_LIMIT: usize = 1 << 20;

/// How a generation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every value in `[0, N)` was emitted exactly once.
    Completed,
    /// The stop signal was raised, or the consumer went away, first.
    Aborted,
}

/// Counters kept by the collector over one generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorStats {
    /// Candidates taken off the shared queue.
    pub received: u64,
    /// Candidates discarded because they had already been seen.
    pub duplicates: u64,
    /// Candidates discarded because they were not below `N`. Always zero
    /// for sources that honor the [`RandSource`](crate::RandSource) contract.
    pub out_of_range: u64,
    /// Distinct values forwarded to the output.
    pub emitted: u64,
}

pub(crate) struct Collector {
    count: u32,
    seen: HashSet<u32>,
    remaining: u32,
    stats: CollectorStats,
}

impl Collector {
    pub(crate) fn new(count: u32) -> Self {
        Self {
            count,
            seen: HashSet::with_capacity((count as usize).min(PREALLOCATE_LIMIT)),
            remaining: count,
            stats: CollectorStats::default(),
        }
    }

    /// Records a candidate and reports whether it is a first occurrence.
    ///
    /// Values outside `[0, N)` are never accepted, so a misbehaving source
    /// cannot complete a generation with a sequence that is not a permutation.
    fn offer(&mut self, candidate: u32) -> bool {
        self.stats.received += 1;
        if candidate >= self.count {
            #[cfg(feature = "tracing")]
            tracing::debug!("Discarding out-of-range candidate {} (count {})", candidate, self.count);
            self.stats.out_of_range += 1;
            return false;
        }
        if !self.seen.insert(candidate) {
            self.stats.duplicates += 1;
            return false;
        }
        self.remaining -= 1;
        true
    }

    /// Drains `queue` until `N` distinct values have been forwarded to
    /// `output`, or the generation is aborted.
    ///
    /// On completion the stop signal is raised and the queue receiver dropped
    /// *before* the final value is emitted, so producers are released as soon
    /// as possible. Dropping `output` on return seals the sequence.
    ///
    /// Aborts when:
    /// - `stop` is raised by someone else,
    /// - the output receiver is dropped (the consumer disconnected),
    /// - the queue closes without enough values (every producer is gone).
    ///
    /// In every case the stop signal is left raised.
    pub(crate) async fn run(
        mut self,
        mut queue: mpsc::Receiver<u32>,
        output: mpsc::Sender<u32>,
        stop: StopSignal,
    ) -> (Outcome, CollectorStats) {
        let outcome = loop {
            let candidate = tokio::select! {
                biased;
                () = stop.raised() => break Outcome::Aborted,
                next = queue.recv() => match next {
                    Some(candidate) => candidate,
                    None => break Outcome::Aborted,
                },
            };

            if !self.offer(candidate) {
                continue;
            }

            if self.remaining == 0 {
                stop.raise();
                drop(queue);
                // The consumer either reads this value or drops its receiver;
                // producers no longer depend on it.
                if output.send(candidate).await.is_err() {
                    break Outcome::Aborted;
                }
                self.stats.emitted += 1;
                break Outcome::Completed;
            }

            tokio::select! {
                biased;
                () = stop.raised() => break Outcome::Aborted,
                sent = output.send(candidate) => {
                    if sent.is_err() {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("Output receiver dropped, aborting generation");
                        break Outcome::Aborted;
                    }
                }
            }
            self.stats.emitted += 1;
        };

        stop.raise();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Collector finished: {:?}, {} received, {} duplicates, {} emitted",
            outcome,
            self.stats.received,
            self.stats.duplicates,
            self.stats.emitted
        );

        (outcome, self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn offer_rejects_repeats() {
        let mut collector = Collector::new(3);
        assert!(collector.offer(2));
        assert!(!collector.offer(2));
        assert!(collector.offer(0));
        assert!(!collector.offer(0));
        assert!(collector.offer(1));

        assert_eq!(collector.remaining, 0);
        assert_eq!(
            collector.stats,
            CollectorStats {
                received: 5,
                duplicates: 2,
                out_of_range: 0,
                emitted: 0,
            }
        );
    }

    #[test]
    fn offer_rejects_out_of_range() {
        let mut collector = Collector::new(2);
        assert!(!collector.offer(2));
        assert!(!collector.offer(u32::MAX));
        assert!(collector.offer(1));
        assert!(!collector.offer(7));
        assert!(collector.offer(0));

        assert_eq!(collector.remaining, 0);
        assert_eq!(collector.stats.received, 5);
        assert_eq!(collector.stats.out_of_range, 3);
        assert_eq!(collector.stats.duplicates, 0);
        assert!(!collector.seen.contains(&2));
    }

    #[tokio::test]
    async fn out_of_range_candidates_never_complete() {
        let (queue_tx, queue_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(16);

        for candidate in [3, 4, 5, 0, 9, 1] {
            queue_tx.send(candidate).await.unwrap();
        }
        drop(queue_tx);

        let (outcome, stats) = Collector::new(3)
            .run(queue_rx, out_tx, StopSignal::new())
            .await;

        assert_eq!(outcome, Outcome::Aborted);
        assert_eq!(stats.out_of_range, 4);
        assert_eq!(stats.emitted, 2);

        let mut emitted = Vec::new();
        while let Some(v) = out_rx.recv().await {
            emitted.push(v);
        }
        assert_eq!(emitted, vec![0, 1]);
    }

    #[tokio::test]
    async fn completes_and_raises_stop() {
        let (queue_tx, queue_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let stop = StopSignal::new();

        for candidate in [1, 1, 3, 0, 3, 2, 0, 1] {
            queue_tx.send(candidate).await.unwrap();
        }

        let (outcome, stats) = Collector::new(4)
            .run(queue_rx, out_tx, stop.clone())
            .await;

        assert_eq!(outcome, Outcome::Completed);
        assert!(stop.is_raised());
        assert!(queue_tx.is_closed());
        assert_eq!(stats.received, 6);
        assert_eq!(stats.duplicates, 2);
        assert_eq!(stats.emitted, 4);

        let mut emitted = Vec::new();
        while let Some(v) = out_rx.recv().await {
            emitted.push(v);
        }
        assert_eq!(emitted, vec![1, 3, 0, 2]);
    }

    #[tokio::test]
    async fn external_stop_aborts() {
        let (_queue_tx, queue_rx) = mpsc::channel::<u32>(4);
        let (out_tx, _out_rx) = mpsc::channel(4);
        let stop = StopSignal::new();

        let task = tokio::spawn(Collector::new(10).run(queue_rx, out_tx, stop.clone()));
        stop.raise();

        let (outcome, stats) = timeout(Duration::from_secs(1), task)
            .await
            .expect("collector ignored stop")
            .unwrap();
        assert_eq!(outcome, Outcome::Aborted);
        assert_eq!(stats.emitted, 0);
    }

    #[tokio::test]
    async fn dropped_output_aborts_and_raises_stop() {
        let (queue_tx, queue_rx) = mpsc::channel(4);
        let (out_tx, out_rx) = mpsc::channel(1);
        let stop = StopSignal::new();
        drop(out_rx);

        queue_tx.send(5).await.unwrap();
        let (outcome, _) = Collector::new(10).run(queue_rx, out_tx, stop.clone()).await;

        assert_eq!(outcome, Outcome::Aborted);
        assert!(stop.is_raised());
    }

    #[tokio::test]
    async fn closed_queue_aborts() {
        let (queue_tx, queue_rx) = mpsc::channel(4);
        let (out_tx, _out_rx) = mpsc::channel(4);
        queue_tx.send(0).await.unwrap();
        drop(queue_tx);

        let (outcome, stats) = Collector::new(2)
            .run(queue_rx, out_tx, StopSignal::new())
            .await;
        assert_eq!(outcome, Outcome::Aborted);
        assert_eq!(stats.emitted, 1);
    }
}
