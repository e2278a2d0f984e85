//! `GET /stream`: one-shot WebSocket delivery.
//!
//! Parameters come from the query string and are validated before the
//! upgrade, so a bad request is answered with a plain `400` instead of an
//! upgraded connection. Once upgraded, every value is written as its own text
//! frame in collector order, followed by a close frame.

use super::{
    error::ServiceError,
    handler::{GeneratorService, Job},
    protocol::CountParams,
};
use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        rejection::QueryRejection,
        ws::{CloseFrame, Message, close_code},
    },
    response::{IntoResponse, Response},
};
use core::fmt::Display;
use futures::{Sink, SinkExt};
use randperm::{Outcome, Report};

pub async fn stream(
    State(service): State<GeneratorService>,
    params: Result<Query<CountParams>, QueryRejection>,
    ws: WebSocketUpgrade,
) -> Response {
    let job = match accept(&service, params) {
        Ok(job) => job,
        Err(e) => {
            tracing::warn!("Rejected /stream request: {}", e);
            return e.into_response();
        }
    };

    ws.on_upgrade(move |socket| async move {
        if let Err(e) = push_values(job, socket).await {
            tracing::warn!("/stream generation failed: {}", e);
        }
    })
}

fn accept(
    service: &GeneratorService,
    params: Result<Query<CountParams>, QueryRejection>,
) -> Result<Job, ServiceError> {
    service.ensure_serving()?;
    let params = params.map(|Query(p)| p).unwrap_or_default();
    let config = params.config(service.limits())?;
    service.start(config)
}

/// Writes every value of `job` to `sink`, then a close frame.
///
/// A failed write aborts the generation; the producers are joined before this
/// returns either way.
pub async fn push_values<Si>(mut job: Job, mut sink: Si) -> Result<Report, ServiceError>
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    while let Some(value) = job.next_value().await {
        if let Err(e) = sink.send(Message::Text(value.to_string().into())).await {
            tracing::debug!("Client went away mid-stream: {}", e);
            job.abort();
            break;
        }
    }

    let report = job.finish().await?;

    let frame = match report.outcome {
        Outcome::Completed => CloseFrame {
            code: close_code::NORMAL,
            reason: "complete".into(),
        },
        Outcome::Aborted => CloseFrame {
            code: close_code::AWAY,
            reason: "generation aborted".into(),
        },
    };
    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
        tracing::debug!("Failed to send close frame: {}", e);
    }

    Ok(report)
}
