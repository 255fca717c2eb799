//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → middleware/cors.rs (preflight, origin policy)
//!     → request.rs (request ID)
//!     → relay pipeline (crate::relay) or fetch.rs (debug forwarder)
//!     → Send to client
//! ```

pub mod fetch;
pub mod middleware;
pub mod request;
pub mod server;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{AppState, HttpServer, ServerError};
