//! Relay error taxonomy and its HTTP rendering.
//!
//! Errors raised before the response head is committed become a JSON error
//! object with a proxy-level status. `UpstreamStreamFailure` is the exception:
//! it only ever travels in-band, see [`crate::relay::stream`].

use axum::{
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while relaying a request.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Inbound body could not be read as a relay descriptor.
    #[error("invalid descriptor: {reason}")]
    InvalidDescriptor {
        reason: String,
        /// Bounded, lossily decoded prefix of the raw inbound body.
        snippet: String,
    },

    /// Inbound body exceeded the configured size limit.
    #[error("request body too large: {0}")]
    PayloadTooLarge(String),

    /// Descriptor parsed but carries no target URL.
    #[error("url is required")]
    MissingTarget,

    /// Connection to the target could not be established.
    #[error("upstream connection failed: {0}")]
    UpstreamUnreachable(#[source] reqwest::Error),

    /// Upstream failed after the response head was sent.
    #[error("upstream stream failed: {0}")]
    UpstreamStreamFailure(String),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

impl RelayError {
    /// Shorthand for a descriptor rejection that carries the raw-body snippet.
    pub fn invalid(reason: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            reason: reason.into(),
            snippet: snippet.into(),
        }
    }

    /// Stable machine-readable kind, used as the `error` field.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::InvalidDescriptor { .. } => "invalid_descriptor",
            RelayError::MissingTarget => "missing_target",
            RelayError::PayloadTooLarge(_) => "payload_too_large",
            RelayError::UpstreamUnreachable(_) => "upstream_connection_failed",
            RelayError::UpstreamStreamFailure(_) => "upstream_stream_failed",
            RelayError::Internal(_) => "internal_error",
        }
    }

    /// Status used when the error is reported before streaming starts.
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::InvalidDescriptor { .. } | RelayError::MissingTarget => {
                StatusCode::BAD_REQUEST
            }
            RelayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            RelayError::UpstreamStreamFailure(_) | RelayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Human-readable detail, including the underlying cause chain.
    pub fn detail(&self) -> String {
        match self {
            RelayError::InvalidDescriptor { reason, .. } => reason.clone(),
            RelayError::MissingTarget => "url is required".to_string(),
            RelayError::UpstreamUnreachable(e) => error_chain(e),
            RelayError::PayloadTooLarge(detail)
            | RelayError::UpstreamStreamFailure(detail)
            | RelayError::Internal(detail) => detail.clone(),
        }
    }

    /// JSON payload shared by the error response and the in-band event.
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.kind(),
            detail: self.detail(),
            debug_raw_snippet: match self {
                RelayError::InvalidDescriptor { snippet, .. } => Some(snippet.clone()),
                _ => None,
            },
        }
    }
}

/// Wire shape of an error reported to the caller.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_raw_snippet: Option<String>,
}

impl From<BytesRejection> for RelayError {
    /// Body extraction failures: the size limit is the caller's fault, anything
    /// else is ours.
    fn from(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            RelayError::PayloadTooLarge(rejection.body_text())
        } else {
            RelayError::Internal(rejection.body_text())
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

/// Flattens an error and its sources into one line.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
