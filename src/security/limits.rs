//! Request and stream limits.
//!
//! # Responsibilities
//! - Bound how much of a rejected inbound body is echoed back
//! - Bound the length of a single upstream line
//! - Supply the inbound body size cap to the HTTP layer
//! - Cap how much of an upstream body the debug forwarder buffers
//!
//! # Design Decisions
//! - Oversized inbound bodies are rejected by the HTTP layer with 413
//! - Snippets are cut on bytes, then decoded lossily

use crate::config::LimitsConfig;

/// Default inbound body cap (2 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// Default number of raw-body bytes echoed in a descriptor error.
pub const DEFAULT_ERROR_SNIPPET_BYTES: usize = 4096;

/// Default longest upstream line accepted (8 MiB).
pub const DEFAULT_MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// Limits applied by the relay pipeline, resolved from configuration.
#[derive(Debug, Clone, Copy)]
pub struct RelayLimits {
    pub max_body_size: usize,
    pub error_snippet_bytes: usize,
    pub max_line_bytes: usize,
}

impl Default for RelayLimits {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            error_snippet_bytes: DEFAULT_ERROR_SNIPPET_BYTES,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl From<&LimitsConfig> for RelayLimits {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            max_body_size: config.max_body_size,
            error_snippet_bytes: config.error_snippet_bytes,
            max_line_bytes: config.max_line_bytes,
        }
    }
}

/// Returns at most `limit` bytes of `raw`, decoded as UTF-8 with replacement.
pub fn bounded_snippet(raw: &[u8], limit: usize) -> String {
    let end = raw.len().min(limit);
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
