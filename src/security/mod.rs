//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Descriptor headers:
//!     → headers.rs (strip hop-by-hop, add defaults)
//!     → upstream
//! Upstream response headers:
//!     → headers.rs (strip hop-by-hop, add SSE defaults)
//!     → client
//! Inbound body / upstream lines:
//!     → limits.rs (size caps, bounded error snippets)
//! ```
//!
//! # Design Decisions
//! - No trust in client input: nothing reaches upstream unvalidated
//! - Never echo unbounded caller payloads back

pub mod headers;
pub mod limits;
