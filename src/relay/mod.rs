//! Request relay pipeline.
//!
//! # Data Flow
//! ```text
//! inbound body
//!     → descriptor.rs (parse & validate, 400 on failure)
//!     → security::headers (sanitize for upstream)
//!     → dispatcher.rs (open upstream connection, 502 on failure)
//!     → composer.rs (status, content type, headers; head committed)
//!     → stream.rs (line-by-line relay until EOF, error or disconnect)
//!     → client
//! ```
//!
//! # Design Decisions
//! - No state shared between relay operations; each request owns its
//!   descriptor, headers and upstream connection
//! - Errors before the head is committed become JSON error responses;
//!   errors after it are signalled in-band

pub mod composer;
pub mod descriptor;
pub mod dispatcher;
pub mod error;
pub mod stream;

use axum::{body::Body, response::Response};

use crate::security::headers::{sanitize, Direction};
use crate::security::limits::RelayLimits;

pub use composer::{compose, ResponseHead};
pub use descriptor::{parse_descriptor, RelayDescriptor, RelayMethod, RequestBody};
pub use dispatcher::Dispatcher;
pub use error::{RelayError, RelayResult};
pub use stream::{Framing, RelayState, StreamRelay};

/// The relay core: everything needed to serve one descriptor.
#[derive(Clone)]
pub struct Relay {
    dispatcher: Dispatcher,
    limits: RelayLimits,
}

impl Relay {
    pub fn new(dispatcher: Dispatcher, limits: RelayLimits) -> Self {
        Self { dispatcher, limits }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn limits(&self) -> RelayLimits {
        self.limits
    }

    /// Runs the pipeline for one inbound body.
    ///
    /// Returns once the upstream head is available; the returned response body
    /// streams for as long as upstream does.
    pub async fn handle(&self, raw: &[u8], content_type: Option<&str>) -> RelayResult<Response> {
        let descriptor = parse_descriptor(raw, content_type, self.limits.error_snippet_bytes)?;
        let headers = sanitize(&descriptor.headers, Direction::ToUpstream(&descriptor.body));
        let target = descriptor.target_url.to_string();

        let upstream = self.dispatcher.dispatch(descriptor, headers).await?;

        let head = compose(upstream.status(), upstream.headers());
        let frames = stream::upstream_frames(upstream, head.framing, self.limits.max_line_bytes);
        let relay = StreamRelay::new(frames, head.framing, target);

        Ok(head.into_response(Body::from_stream(relay)))
    }
}
