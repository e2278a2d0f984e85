//! Error types for permutation generation.
//!
//! The generation core itself cannot fail once it is handed a valid
//! [`Config`](crate::Config): producers and the collector perform pure
//! computation. Errors therefore only describe what happens around it.
//!
//! ## Error Cases
//! - `InvalidRequest`: The requested count or worker count is outside the
//!   allowed limits. Raised before any producer is spawned.
//! - `Aborted`: The generation was stopped before it produced every value,
//!   typically because the consumer went away.
//! - `WorkerFailed`: A producer or collector task could not be joined.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the generation core.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The request was malformed or exceeded the configured limits.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The stop signal was raised before the permutation was complete.
    #[error("Generation aborted before completion")]
    Aborted,

    /// A background task panicked or was cancelled by the runtime.
    #[error("Worker failed: {context}")]
    WorkerFailed { context: String },
}

impl Error {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::WorkerFailed {
            context: err.to_string(),
        }
    }
}
