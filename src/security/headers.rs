//! Hop-by-hop header sanitization.
//!
//! # Responsibilities
//! - Strip connection-management headers in both directions
//! - Default `Accept` and a JSON `Content-Type` on the way upstream
//! - Default SSE-friendly caching/connection headers on the way to the client
//!
//! # Design Decisions
//! - Total function: never fails, never reorders surviving headers
//! - Idempotent: sanitizing twice equals sanitizing once
//! - Names compare case-insensitively (`HeaderName` is lower-cased)

use axum::http::{
    header::{ACCEPT, CACHE_CONTROL, CONNECTION, CONTENT_TYPE},
    HeaderMap, HeaderValue,
};

use crate::relay::descriptor::RequestBody;

/// Header names never forwarded across the relay.
pub const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "host",
];

/// Which side of the relay a header set is headed for.
#[derive(Debug, Clone, Copy)]
pub enum Direction<'a> {
    /// Caller-supplied headers sent to the target, with the body they accompany.
    ToUpstream(&'a RequestBody),
    /// Upstream response headers sent back to the caller.
    ToClient,
}

/// Whether `name` is on the hop-by-hop denylist, ignoring case.
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Filters `headers` for the given direction.
pub fn sanitize(headers: &HeaderMap, direction: Direction<'_>) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len() + 2);
    for (name, value) in headers {
        if !is_hop_by_hop(name.as_str()) {
            out.append(name.clone(), value.clone());
        }
    }

    match direction {
        Direction::ToUpstream(body) => {
            if !out.contains_key(ACCEPT) {
                out.insert(ACCEPT, HeaderValue::from_static("*/*"));
            }
            if !out.contains_key(CONTENT_TYPE) && body.is_json() {
                out.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
        }
        Direction::ToClient => {
            if !out.contains_key(CACHE_CONTROL) {
                out.insert(
                    CACHE_CONTROL,
                    HeaderValue::from_static("no-cache, no-transform"),
                );
            }
            out.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        }
    }

    out
}
