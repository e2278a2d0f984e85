use crate::{
    Config, Error, Generation, Outcome, PermutationStream, RandSource, Result, ThreadRandom,
    generate,
};
use core::time::Duration;
use futures::StreamExt;
use std::collections::HashSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const GRACE: Duration = Duration::from_secs(2);

fn assert_permutation(values: &[u32], count: u32) {
    assert_eq!(values.len(), count as usize, "wrong number of values");
    let unique: HashSet<u32> = values.iter().copied().collect();
    assert_eq!(unique.len(), values.len(), "duplicate value emitted");
    assert!(values.iter().all(|&v| v < count), "value out of range");
}

/// Emits a long run of the same value before moving on, so almost every
/// candidate is a duplicate.
struct Stuttering {
    next: u32,
    repeats: u32,
    left: u32,
}

impl Stuttering {
    fn new(start: u32, repeats: u32) -> Self {
        Self {
            next: start,
            repeats,
            left: repeats,
        }
    }
}

impl RandSource for Stuttering {
    fn below(&mut self, upper: u32) -> u32 {
        let value = self.next % upper;
        self.left -= 1;
        if self.left == 0 {
            self.left = self.repeats;
            self.next = self.next.wrapping_add(1);
        }
        value
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn completes_with_full_permutation() -> Result<()> {
    for (count, workers) in [(1, 1), (2, 1), (10, 3), (257, 8), (1_000, 32)] {
        let values = generate(Config::new(count, workers)?).await?;
        assert_permutation(&values, count);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_value_is_zero() -> Result<()> {
    let values = generate(Config::new(1, 1)?).await?;
    assert_eq!(values, vec![0]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn no_duplicates_under_maximal_contention() -> Result<()> {
    let config = Config::new(5, 32)?;
    for _ in 0..200 {
        let values = generate(config).await?;
        assert_permutation(&values, 5);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn large_request_completes_in_time() -> Result<()> {
    let values = timeout(
        Duration::from_secs(60),
        generate(Config::new(100_000, 8)?),
    )
    .await
    .expect("generation took too long")?;

    let mut sorted = values;
    sorted.sort_unstable();
    assert_eq!(sorted, (0..100_000).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_seed_single_worker_is_reproducible() -> Result<()> {
    let config = Config::new(500, 1)?;
    let first = Generation::new(config).seed(1234).spawn().collect_vec().await?;
    let second = Generation::new(config).seed(1234).spawn().collect_vec().await?;
    let other = Generation::new(config).seed(4321).spawn().collect_vec().await?;

    assert_permutation(&first, 500);
    assert_eq!(first, second);
    assert_ne!(first, other);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn heavy_duplication_still_yields_permutation() -> Result<()> {
    let config = Config::new(64, 4)?;
    let stream = Generation::new(config).spawn_with(|worker| Stuttering::new(worker as u32, 5));
    assert_eq!(stream.seed(), None);

    let mut stream = stream;
    let mut values = Vec::new();
    while let Some(value) = stream.next().await {
        values.push(value);
    }
    let report = stream.finish().await?;

    assert_permutation(&values, 64);
    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(report.stats.emitted, 64);
    assert!(report.stats.duplicates >= 60 * 4);
    assert_eq!(
        report.stats.received,
        report.stats.emitted + report.stats.duplicates
    );
    assert!(report.stats.published >= report.stats.received);
    Ok(())
}

/// Breaks the `[0, upper)` contract for its first `bad` draws, then counts
/// upwards through the valid range.
struct Overshooting {
    bad: u32,
    next: u32,
}

impl RandSource for Overshooting {
    fn below(&mut self, upper: u32) -> u32 {
        if self.bad > 0 {
            self.bad -= 1;
            return upper + self.bad;
        }
        let value = self.next % upper;
        self.next = self.next.wrapping_add(1);
        value
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn out_of_range_source_cannot_complete_early() -> Result<()> {
    let mut stream =
        Generation::new(Config::new(5, 1)?).spawn_with(|_| Overshooting { bad: 5, next: 0 });

    let mut values = Vec::new();
    while let Some(value) = stream.next().await {
        values.push(value);
    }
    let report = stream.finish().await?;

    assert_eq!(values, vec![0, 1, 2, 3, 4]);
    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(report.stats.out_of_range, 5);
    assert_eq!(
        report.stats.received,
        report.stats.emitted + report.stats.duplicates + report.stats.out_of_range
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn thread_random_source_works() -> Result<()> {
    let values = Generation::new(Config::new(300, 6)?)
        .spawn_with(|_| ThreadRandom)
        .collect_vec()
        .await?;
    assert_permutation(&values, 300);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn producers_exit_after_completion() -> Result<()> {
    let stream = Generation::new(Config::new(2_000, 16)?).spawn();
    let live = stream.live_producers();
    assert_eq!(live.count(), 16);

    let values = stream.collect_vec().await?;
    assert_permutation(&values, 2_000);
    assert_eq!(live.count(), 0);
    Ok(())
}

fn unbounded_stream(workers: usize) -> Result<PermutationStream> {
    // Large enough that it cannot complete while the test runs.
    Ok(Generation::new(Config::new(crate::MAX_COUNT, workers)?)
        .output_buffer(4)
        .spawn())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dropping_stream_stops_every_producer() -> Result<()> {
    let mut stream = unbounded_stream(8)?;
    for _ in 0..16 {
        assert!(stream.next_value().await.is_some());
    }

    let live = stream.live_producers();
    let stop = stream.stop_signal();
    assert_eq!(live.count(), 8);

    // Simulates a broken downstream connection.
    drop(stream);

    assert!(stop.is_raised());
    assert!(live.wait_idle(GRACE).await, "producers leaked");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn abort_reports_aborted_and_joins_producers() -> Result<()> {
    let mut stream = unbounded_stream(32)?;
    assert!(stream.next_value().await.is_some());

    let live = stream.live_producers();
    stream.abort();
    stream.abort();

    let report = timeout(GRACE, stream.finish())
        .await
        .expect("finish hung after abort")?;
    assert_eq!(report.outcome, Outcome::Aborted);
    assert_eq!(live.count(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unread_stream_finishes_as_aborted() -> Result<()> {
    // Collector blocks on the full output; finish() must still return.
    let stream = Generation::new(Config::new(10_000, 4)?)
        .output_buffer(1)
        .spawn();

    let report = timeout(GRACE, stream.finish())
        .await
        .expect("finish hung on unread output")?;
    assert_eq!(report.outcome, Outcome::Aborted);
    assert!(report.stats.emitted <= 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parent_cancellation_aborts_generation() -> Result<()> {
    let shutdown = CancellationToken::new();
    let stream = Generation::new(Config::new(crate::MAX_COUNT, 4)?)
        .cancel_with(&shutdown)
        .spawn();
    let live = stream.live_producers();

    shutdown.cancel();

    let err = timeout(GRACE, stream.collect_vec())
        .await
        .expect("collect hung after shutdown")
        .unwrap_err();
    assert_eq!(err, Error::Aborted);
    assert!(live.wait_idle(GRACE).await);
    Ok(())
}

#[test]
fn over_cap_workers_never_spawn() {
    // No runtime exists here: if validation let this through, spawning would
    // panic.
    let err = Config::new(10, 33).unwrap_err();
    assert!(matches!(err, Error::InvalidRequest { .. }));
}
