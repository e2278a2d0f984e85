//! `GET /generator`: persistent WebSocket sessions.
//!
//! A session serves any number of requests, one at a time. Each text frame is
//! a JSON [`GenerateRequest`] and is answered with exactly one
//! [`GenerateResponse`], in arrival order. Frames that arrive while a
//! generation is running are queued, up to [`MAX_PENDING_REQUESTS`]; one more
//! ends the session with a policy-violation close frame.
//!
//! Closing the socket mid-generation aborts that generation. The session also
//! ends, with a close frame, once the service-wide shutdown token fires.

use super::{
    error::ServiceError,
    handler::GeneratorService,
    protocol::{GenerateRequest, GenerateResponse},
};
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{CloseFrame, Message, close_code},
    },
    response::{IntoResponse, Response},
};
use core::fmt::Display;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::collections::VecDeque;

pub async fn generator(State(service): State<GeneratorService>, ws: WebSocketUpgrade) -> Response {
    if let Err(e) = service.ensure_serving() {
        return e.into_response();
    }

    ws.on_upgrade(move |socket| async move {
        let (sink, inbound) = socket.split();
        session_loop(service, sink, inbound).await;
    })
}

/// Largest number of requests a client may queue behind a running
/// generation. Exceeding it ends the session.
pub const MAX_PENDING_REQUESTS: usize = 16;

/// How [`serve_request`] ended.
enum Served {
    Response(GenerateResponse),
    /// The client went away mid-generation.
    Disconnected,
    /// The client queued more than [`MAX_PENDING_REQUESTS`] requests.
    Overflow,
}

/// Runs a session until the client disconnects or the service shuts down.
pub async fn session_loop<Si, S>(service: GeneratorService, mut sink: Si, mut inbound: S)
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let shutdown = service.shutdown_token().clone();
    let mut pending = VecDeque::with_capacity(MAX_PENDING_REQUESTS);

    tracing::debug!("Session opened");

    loop {
        let text = match pending.pop_front() {
            Some(text) => text,
            None => tokio::select! {
                () = shutdown.cancelled() => {
                    close(&mut sink, close_code::AWAY, "server shutting down").await;
                    break;
                }
                next = next_request(&mut inbound) => match next {
                    Some(text) => text,
                    None => break,
                },
            },
        };

        let response = match serve_request(&service, &text, &mut inbound, &mut pending).await {
            Served::Response(response) => response,
            Served::Disconnected => {
                tracing::debug!("Client disconnected during generation");
                break;
            }
            Served::Overflow => {
                let err = ServiceError::TooManyPending {
                    limit: MAX_PENDING_REQUESTS,
                };
                tracing::warn!("Closing /generator session: {}", err);
                if reply(&mut sink, &GenerateResponse::failure(&err)).await {
                    close(&mut sink, close_code::POLICY, "too many pending requests").await;
                }
                break;
            }
        };

        if !reply(&mut sink, &response).await {
            break;
        }
    }

    tracing::debug!("Session closed");
}

/// Writes one response. Returns `false` if the session should end.
async fn reply<Si>(sink: &mut Si, response: &GenerateResponse) -> bool
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    let payload = match serde_json::to_string(response) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!("Failed to encode response: {}", e);
            return false;
        }
    };
    match sink.send(Message::Text(payload.into())).await {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("Failed to write response: {}", e);
            false
        }
    }
}

async fn close<Si>(sink: &mut Si, code: u16, reason: &'static str)
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
        tracing::debug!("Failed to send close frame: {}", e);
    }
}

/// Runs one request to completion while continuing to read the socket.
///
/// Dropping the job on [`Served::Disconnected`] or [`Served::Overflow`]
/// aborts the generation.
async fn serve_request<S>(
    service: &GeneratorService,
    text: &str,
    inbound: &mut S,
    pending: &mut VecDeque<String>,
) -> Served
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let job = match GenerateRequest::decode(text, service.limits()).and_then(|c| service.start(c)) {
        Ok(job) => job,
        Err(e) => {
            tracing::warn!("Rejected /generator request: {}", e);
            return Served::Response(GenerateResponse::failure(&e));
        }
    };

    let collect = job.collect();
    tokio::pin!(collect);

    loop {
        tokio::select! {
            result = &mut collect => return Served::Response(respond(result)),
            next = next_request(inbound) => match next {
                Some(_) if pending.len() == MAX_PENDING_REQUESTS => return Served::Overflow,
                Some(text) => pending.push_back(text),
                None => return Served::Disconnected,
            },
        }
    }
}

fn respond(result: Result<Vec<u32>, ServiceError>) -> GenerateResponse {
    match result {
        Ok(values) => GenerateResponse::success(values),
        Err(e) => {
            tracing::warn!("/generator generation failed: {}", e);
            GenerateResponse::failure(&e)
        }
    }
}

/// Reads the next request payload, skipping control frames. `None` means the
/// client is gone.
async fn next_request<S>(inbound: &mut S) -> Option<String>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        match inbound.next().await? {
            Ok(Message::Text(text)) => return Some(text.as_str().to_owned()),
            Ok(Message::Binary(bytes)) => return Some(String::from_utf8_lossy(&bytes).into_owned()),
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Ok(Message::Close(_)) => return None,
            Err(e) => {
                tracing::debug!("Socket read failed: {}", e);
                return None;
            }
        }
    }
}
