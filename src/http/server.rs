//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, limits, request ID, CORS, panic catcher)
//! - Bind server to listener
//! - Hand relay requests to the relay pipeline

use std::any::Any;
use std::future::Future;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{header::CONTENT_TYPE, HeaderMap},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::config::RelayConfig;
use crate::http::fetch::fetch_handler;
use crate::http::middleware::cors::cors_layer;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::observability::metrics;
use crate::relay::{Dispatcher, Relay, RelayError};
use crate::security::limits::RelayLimits;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub relay: Relay,
}

/// Errors raised while starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP server for the relay.
pub struct HttpServer {
    router: Router,
    config: RelayConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: RelayConfig) -> Result<Self, ServerError> {
        let dispatcher = Dispatcher::new(&config.upstream)?;
        let relay = Relay::new(dispatcher, RelayLimits::from(&config.limits));
        let router = Self::build_router(&config, AppState { relay });
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &RelayConfig, state: AppState) -> Router {
        let routes = Router::new()
            .route("/", post(relay_handler))
            .route("/proxy", post(relay_handler))
            .route("/fetch", post(fetch_handler))
            .route("/health", get(health_handler))
            .with_state(state);
        Self::with_middleware(routes, config)
    }

    /// Wraps `routes` in the middleware stack, innermost first.
    ///
    /// Each `Router::layer` call boxes the response body back into `Body`, so
    /// the CORS layer sees a body it can default for preflight answers.
    fn with_middleware(routes: Router, config: &RelayConfig) -> Router {
        routes
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(DefaultBodyLimit::max(config.limits.max_body_size))
            .layer(cors_layer(&config.cors))
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http())
                    .layer(propagate_request_id_layer()),
            )
    }

    /// The router, for driving the server without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            connect_timeout_secs = self.config.upstream.connect_timeout_secs,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

/// Relay endpoint: parse the descriptor, dispatch, stream the answer back.
async fn relay_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let start = Instant::now();
    let request_id = headers.request_id().to_string();
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());

    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            let e = RelayError::from(rejection);
            tracing::warn!(request_id = %request_id, error = %e, "Relay body unreadable");
            let response = e.into_response();
            metrics::record_request("POST", response.status().as_u16(), start);
            return response;
        }
    };

    tracing::debug!(
        request_id = %request_id,
        body_len = body.len(),
        "Relay request received"
    );

    let response = match state.relay.handle(&body, content_type).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(
                request_id = %request_id,
                error = %e,
                kind = e.kind(),
                "Relay request rejected"
            );
            e.into_response()
        }
    };

    metrics::record_request("POST", response.status().as_u16(), start);
    response
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// JSON 500 for a handler that panicked.
fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };
    tracing::error!(panic = %detail, "Request handler panicked");
    RelayError::Internal(detail).into_response()
}
