use crate::{RandSource, StopSignal};
use tokio::sync::mpsc;

/// Number of consecutive publishes after which a producer voluntarily yields.
///
/// Near the end of a generation almost every candidate is a duplicate, so
/// producers become pure CPU spinners. Yielding keeps them from monopolising a
/// runtime thread without changing what the collector observes.
const PUBLISHES_PER_YIELD: u32 = 64;

/// Main execution loop for a producer task.
///
/// Samples candidates in `[0, count)` from its own `source` and publishes them
/// to the shared queue until the [`StopSignal`] is raised or the queue is
/// closed. Returns the number of candidates it managed to publish.
///
/// The publish is raced against the stop signal, so a producer waiting on a
/// full queue never outlives the signal even if the collector has stopped
/// draining.
///
/// # Arguments
///
/// - `worker_id`: Index of this producer, used for tracing.
/// - `count`: Exclusive upper bound of every candidate.
/// - `source`: Randomness owned by this producer.
/// - `queue`: Sender half of the shared bounded queue.
/// - `stop`: Broadcast stop signal shared with the collector.
pub(crate) async fn producer_loop<R: RandSource>(
    worker_id: usize,
    count: u32,
    mut source: R,
    queue: mpsc::Sender<u32>,
    stop: StopSignal,
) -> u64 {
    #[cfg(feature = "tracing")]
    tracing::trace!("Producer {worker_id} started");
    #[cfg(not(feature = "tracing"))]
    let _ = worker_id;

    let mut published = 0_u64;
    let mut streak = 0_u32;

    while !stop.is_raised() {
        let candidate = source.below(count);

        tokio::select! {
            biased;
            () = stop.raised() => break,
            sent = queue.send(candidate) => {
                if sent.is_err() {
                    // Collector dropped the receiver.
                    break;
                }
            }
        }

        published += 1;
        streak += 1;
        if streak == PUBLISHES_PER_YIELD {
            streak = 0;
            tokio::task::yield_now().await;
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Producer {worker_id} stopped after {published} candidates");

    published
}
