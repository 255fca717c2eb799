//! Streaming HTTP relay library.
//!
//! Accepts a JSON description of an upstream request, performs it, and streams
//! the upstream response back line by line so Server-Sent Events survive the hop.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod relay;
pub mod security;

pub use config::RelayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
