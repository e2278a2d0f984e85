//! Errors surfaced by the delivery endpoints.
//!
//! ## Error Cases
//! - `Generation`: Anything reported by the `randperm` core, most commonly an
//!   invalid `countNumbers`/`countThreads`.
//! - `ServiceShutdown`: A request arrived while the server was shutting down.
//! - `TooManyPending`: A persistent session queued more requests than allowed
//!   behind a running generation.
//!
//! Over HTTP every error renders as an empty JSON array with a matching status
//! code; clients get no structured error body. The persistent WebSocket
//! protocol uses the `Display` text as its `err` field instead.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    /// Validation failure or early abort reported by the generation core.
    #[error(transparent)]
    Generation(#[from] randperm::Error),

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,

    #[error("Too many pending requests (limit {limit})")]
    TooManyPending { limit: usize },
}

impl ServiceError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Generation(randperm::Error::InvalidRequest {
            reason: reason.into(),
        })
    }

    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Generation(randperm::Error::InvalidRequest { .. }) => StatusCode::BAD_REQUEST,
            Self::ServiceShutdown => StatusCode::SERVICE_UNAVAILABLE,
            Self::TooManyPending { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Generation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status(), Json(Vec::<u32>::new())).into_response()
    }
}
