//! Shared service state and the HTTP router.
//!
//! [`GeneratorService`] is cloned into every handler. It owns the request
//! limits, the service-wide shutdown token and the count of in-flight
//! generations, and is the only place a [`Generation`] gets started. Each
//! started generation is wrapped in a [`Job`] that keeps the in-flight count
//! and the telemetry counters honest no matter how the request ends.
//!
//! ## Routes
//!
//! - `POST /random` - multipart or urlencoded form, whole permutation as a
//!   JSON array.
//! - `GET /stream` - one-shot WebSocket, one text frame per value.
//! - `GET /generator` - persistent WebSocket, JSON request/response.
//! - `GET /health` - `200 ok` while serving, `503` once shutdown began.

use super::{error::ServiceError, random, session, stream};
use crate::server::{
    config::ServerConfig,
    telemetry::{
        decrement_generations_inflight, increment_duplicates_rejected,
        increment_generations_inflight, increment_numbers_generated, increment_request_errors,
        increment_requests, record_generation_duration,
    },
};
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use core::time::Duration;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use randperm::{Config, Generation, LiveProducers, Limits, Outcome, PermutationStream, Report};
use std::{sync::Arc, time::Instant};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

/// Interval at which [`GeneratorService::shutdown`] re-checks the in-flight
/// count while draining.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

struct Inner {
    config: ServerConfig,
    shutdown: CancellationToken,
    shutting_down: AtomicBool,
    inflight: AtomicUsize,
}

#[derive(Clone)]
pub struct GeneratorService {
    inner: Arc<Inner>,
}

impl GeneratorService {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                shutdown: CancellationToken::new(),
                shutting_down: AtomicBool::new(false),
                inflight: AtomicUsize::new(0),
            }),
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.inner.config.limits
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::Acquire)
    }

    /// Cancelled once in-flight generations have drained (or the drain timed
    /// out). Long-lived connections watch it to close themselves.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }

    /// Generations currently running.
    pub fn inflight(&self) -> usize {
        self.inner.inflight.load(Ordering::Acquire)
    }

    /// Rejects the request if the service is shutting down. Counted as an
    /// error when it does.
    pub fn ensure_serving(&self) -> Result<(), ServiceError> {
        if self.is_shutting_down() {
            increment_request_errors();
            return Err(ServiceError::ServiceShutdown);
        }
        Ok(())
    }

    /// Starts a generation for an already validated `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ServiceShutdown`] once shutdown has begun.
    pub fn start(&self, config: Config) -> Result<Job, ServiceError> {
        self.ensure_serving()?;
        increment_requests();

        let stream = Generation::new(config)
            .output_buffer(self.inner.config.output_buffer_size)
            .cancel_with(&self.inner.shutdown)
            .spawn();

        tracing::debug!(
            count = config.count(),
            workers = config.workers(),
            seed = ?stream.seed().map(|s| s.value()),
            "Generation started"
        );

        Ok(Job {
            stream,
            started: Instant::now(),
            _inflight: InflightGuard::enter(&self.inner),
        })
    }

    /// Stops accepting work, waits up to the configured timeout for running
    /// generations, then cancels whatever is left.
    pub async fn shutdown(&self) {
        if self.inner.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let timeout = self.inner.config.shutdown_timeout;
        let drained = tokio::time::timeout(timeout, async {
            while self.inflight() > 0 {
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        })
        .await
        .is_ok();

        if drained {
            tracing::info!("All generations drained");
        } else {
            tracing::warn!(
                "Shutdown timeout ({:?}) elapsed with {} generation(s) in flight; aborting",
                timeout,
                self.inflight()
            );
        }

        self.inner.shutdown.cancel();
    }
}

/// Keeps [`GeneratorService::inflight`] accurate for the lifetime of a job.
struct InflightGuard {
    inner: Arc<Inner>,
}

impl InflightGuard {
    fn enter(inner: &Arc<Inner>) -> Self {
        inner.inflight.fetch_add(1, Ordering::AcqRel);
        increment_generations_inflight();
        Self {
            inner: Arc::clone(inner),
        }
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.inner.inflight.fetch_sub(1, Ordering::AcqRel);
        decrement_generations_inflight();
    }
}

/// A running generation owned by one request.
///
/// Dropping a `Job` aborts the generation; its producers observe the stop
/// signal and exit on their own.
pub struct Job {
    stream: PermutationStream,
    started: Instant,
    _inflight: InflightGuard,
}

impl Job {
    pub fn live_producers(&self) -> LiveProducers {
        self.stream.live_producers()
    }

    /// Raises the stop signal; [`finish`](Self::finish) then reports
    /// [`Outcome::Aborted`] unless the collector had already completed.
    pub fn abort(&self) {
        self.stream.abort();
    }

    pub async fn next_value(&mut self) -> Option<u32> {
        self.stream.next_value().await
    }

    /// Joins the generation and records its telemetry.
    ///
    /// # Errors
    ///
    /// Propagates [`randperm::Error::WorkerFailed`].
    pub async fn finish(self) -> Result<Report, ServiceError> {
        let Self {
            stream,
            started,
            _inflight,
        } = self;

        let report = stream.finish().await.inspect_err(join_failed)?;
        record(&report, started);
        Ok(report)
    }

    /// Reads the whole permutation, then joins the generation.
    ///
    /// # Errors
    ///
    /// Returns [`randperm::Error::Aborted`] if the generation was cancelled
    /// before it completed.
    pub async fn collect(self) -> Result<Vec<u32>, ServiceError> {
        let Self {
            stream,
            started,
            _inflight,
        } = self;

        let (values, report) = stream.collect_report().await.inspect_err(join_failed)?;
        record(&report, started);

        match report.outcome {
            Outcome::Completed => Ok(values),
            Outcome::Aborted => Err(randperm::Error::Aborted.into()),
        }
    }
}

fn join_failed(e: &randperm::Error) {
    increment_request_errors();
    tracing::error!("Generation failed to join: {}", e);
}

fn record(report: &Report, started: Instant) {
    record_generation_duration(started.elapsed().as_secs_f64() * 1_000.0);
    increment_numbers_generated(report.stats.emitted);
    increment_duplicates_rejected(report.stats.duplicates);
    if report.outcome == Outcome::Aborted {
        increment_request_errors();
    }

    tracing::debug!(
        outcome = ?report.outcome,
        published = report.stats.published,
        duplicates = report.stats.duplicates,
        out_of_range = report.stats.out_of_range,
        emitted = report.stats.emitted,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Generation finished"
    );
}

/// Builds the application router with a permissive CORS layer.
pub fn router(service: GeneratorService) -> Router {
    Router::new()
        .route("/random", post(random::random))
        .route("/stream", get(stream::stream))
        .route("/generator", get(session::generator))
        .route("/health", get(health))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(service)
}

async fn health(State(service): State<GeneratorService>) -> impl IntoResponse {
    if service.is_shutting_down() {
        (StatusCode::SERVICE_UNAVAILABLE, "shutting down")
    } else {
        (StatusCode::OK, "ok")
    }
}
