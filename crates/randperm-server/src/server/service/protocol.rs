//! Wire types shared by the delivery endpoints.
//!
//! - [`CountParams`] - `countNumbers`/`countThreads` as raw strings, from an
//!   urlencoded form body or a query string.
//! - [`GenerateRequest`] / [`GenerateResponse`] - JSON messages of the
//!   persistent WebSocket protocol.

use super::error::ServiceError;
use randperm::{Config, Limits};
use serde::{Deserialize, Serialize};

/// Form or query parameters of a one-shot request.
///
/// Fields are kept as strings so that missing and malformed values surface as
/// validation errors instead of extractor rejections.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CountParams {
    pub count_numbers: Option<String>,
    pub count_threads: Option<String>,
}

impl CountParams {
    /// Parses and validates both fields against `limits`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Generation`] wrapping an invalid-request error
    /// naming the offending field.
    pub fn config(&self, limits: &Limits) -> Result<Config, ServiceError> {
        let count = parse_field("countNumbers", self.count_numbers.as_deref())?;
        let workers = parse_field("countThreads", self.count_threads.as_deref())?;
        Ok(limits.validate(count, workers)?)
    }
}

fn parse_field(name: &str, raw: Option<&str>) -> Result<i64, ServiceError> {
    let raw = raw.ok_or_else(|| ServiceError::invalid(format!("{name} is required")))?;
    raw.trim()
        .parse()
        .map_err(|_| ServiceError::invalid(format!("{name} must be an integer, got {raw:?}")))
}

/// A request message on the persistent WebSocket.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub count_numbers: i64,
    pub count_threads: i64,
}

impl GenerateRequest {
    /// Decodes a JSON text frame and validates it against `limits`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-request error for undecodable JSON or out-of-range
    /// values.
    pub fn decode(text: &str, limits: &Limits) -> Result<Config, ServiceError> {
        let request: Self = serde_json::from_str(text)
            .map_err(|e| ServiceError::invalid(format!("malformed message: {e}")))?;
        Ok(limits.validate(request.count_numbers, request.count_threads)?)
    }
}

/// The reply to every [`GenerateRequest`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GenerateResponse {
    pub ok: bool,
    pub err: String,
    pub result: Vec<u32>,
}

impl GenerateResponse {
    pub const fn success(result: Vec<u32>) -> Self {
        Self {
            ok: true,
            err: String::new(),
            result,
        }
    }

    pub fn failure(err: &ServiceError) -> Self {
        Self {
            ok: false,
            err: err.to_string(),
            result: Vec::new(),
        }
    }
}
