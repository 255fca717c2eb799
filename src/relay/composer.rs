//! Response head composition.
//!
//! Decides the status, content type and headers sent to the caller. The head is
//! fixed before the first body byte is relayed.

use axum::{
    body::Body,
    http::{
        header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::Response,
};

use crate::relay::stream::Framing;
use crate::security::headers::{sanitize, Direction};

const EVENT_STREAM: &str = "text/event-stream";
const OCTET_STREAM: &str = "application/octet-stream";

/// Outbound status and headers for a relayed response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Line framing unless the body is content-encoded.
    pub framing: Framing,
}

impl ResponseHead {
    /// Whether the relayed body is a Server-Sent Events stream.
    pub fn is_event_stream(&self) -> bool {
        self.headers
            .get(CONTENT_TYPE)
            .is_some_and(|ct| ct == EVENT_STREAM)
    }

    /// Commits the head around `body`.
    pub fn into_response(self, body: Body) -> Response {
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Builds the outbound head from the upstream status and headers.
pub fn compose(status: StatusCode, upstream_headers: &HeaderMap) -> ResponseHead {
    let mut headers = sanitize(upstream_headers, Direction::ToClient);

    let content_type = match upstream_headers.get(CONTENT_TYPE) {
        Some(ct) if contains_event_stream(ct) => HeaderValue::from_static(EVENT_STREAM),
        Some(ct) => ct.clone(),
        None => HeaderValue::from_static(OCTET_STREAM),
    };
    headers.insert(CONTENT_TYPE, content_type);

    // Re-framing changes the body length; the relayed body is always chunked.
    headers.remove(CONTENT_LENGTH);

    let framing = if is_content_encoded(&headers) {
        Framing::Passthrough
    } else {
        Framing::Lines
    };

    ResponseHead {
        status,
        headers,
        framing,
    }
}

fn is_content_encoded(headers: &HeaderMap) -> bool {
    headers
        .get_all(CONTENT_ENCODING)
        .iter()
        .any(|v| !v.as_bytes().eq_ignore_ascii_case(b"identity"))
}

fn contains_event_stream(value: &HeaderValue) -> bool {
    value
        .to_str()
        .map(|ct| ct.to_ascii_lowercase().contains(EVENT_STREAM))
        .unwrap_or(false)
}
