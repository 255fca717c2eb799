//! Debug forwarder: a buffered `GET` wrapped in a JSON envelope.
//!
//! Not part of the streaming relay. Useful for checking what a target returns
//! for a given header set without consuming an event stream.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
    Json,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::http::server::AppState;
use crate::relay::{parse_descriptor, RelayError, RelayResult};
use crate::security::headers::{sanitize, Direction};
use crate::security::limits::bounded_snippet;

/// Envelope returned by the debug forwarder.
#[derive(Debug, Serialize)]
pub struct FetchResponse {
    pub status_code: u16,
    pub response: Value,
    /// Set when the upstream body was cut at `limits.max_body_size`.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

#[derive(Deserialize)]
struct FetchFields {
    #[serde(default)]
    headers: Option<BTreeMap<String, Value>>,
}

pub async fn fetch_handler(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let result = match body {
        Ok(body) => fetch(&state, &body).await,
        Err(rejection) => Err(RelayError::from(rejection)),
    };
    match result {
        Ok(envelope) => Json(envelope).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Debug fetch failed");
            e.into_response()
        }
    }
}

async fn fetch(state: &AppState, raw: &[u8]) -> RelayResult<FetchResponse> {
    let limits = state.relay.limits();
    let limit = limits.error_snippet_bytes;
    let descriptor = parse_descriptor(raw, None, limit)?;

    // Both fields are mandatory here, unlike on the relay endpoint.
    let fields: FetchFields = serde_json::from_slice(raw)
        .map_err(|e| RelayError::invalid(e.to_string(), bounded_snippet(raw, limit)))?;
    if fields.headers.map_or(true, |h| h.is_empty()) {
        return Err(RelayError::invalid(
            "URL and headers are required",
            bounded_snippet(raw, limit),
        ));
    }

    let headers = sanitize(&descriptor.headers, Direction::ToUpstream(&descriptor.body));
    let upstream = state
        .relay
        .dispatcher()
        .fetch(descriptor.target_url, headers)
        .await?;

    let status_code = upstream.status().as_u16();
    let is_json = upstream
        .headers()
        .get(CONTENT_TYPE)
        .is_some_and(|ct| ct == "application/json");
    let (body, truncated) = read_capped(upstream, limits.max_body_size).await?;
    if truncated {
        tracing::warn!(cap = limits.max_body_size, "Debug fetch body truncated");
    }
    let text = String::from_utf8_lossy(&body).into_owned();

    let response = if is_json {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    } else {
        Value::String(text)
    };

    Ok(FetchResponse {
        status_code,
        response,
        truncated,
    })
}

/// Buffers at most `cap` bytes of the body. The flag reports whether more followed.
async fn read_capped(upstream: reqwest::Response, cap: usize) -> RelayResult<(Vec<u8>, bool)> {
    let mut body = Vec::new();
    let mut chunks = upstream.bytes_stream();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(RelayError::UpstreamUnreachable)?;
        let room = cap - body.len();
        if chunk.len() > room {
            body.extend_from_slice(&chunk[..room]);
            return Ok((body, true));
        }
        body.extend_from_slice(&chunk);
    }
    Ok((body, false))
}
