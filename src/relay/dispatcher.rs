//! Upstream dispatch.
//!
//! # Responsibilities
//! - Own the shared upstream HTTP client
//! - Issue the descriptor's method with sanitized headers and encoded body
//! - Map connection failures to `UpstreamUnreachable`
//!
//! # Design Decisions
//! - Connect timeout only: a read/total timeout would cut long-lived streams
//! - One attempt per request, no retries

use std::time::Duration;

use axum::http::{header::USER_AGENT, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};

use crate::config::UpstreamConfig;
use crate::relay::descriptor::{RelayDescriptor, RelayMethod};
use crate::relay::error::{RelayError, RelayResult};

/// Opens streaming connections to relay targets.
#[derive(Clone)]
pub struct Dispatcher {
    client: Client,
    user_agent: Option<HeaderValue>,
}

impl Dispatcher {
    /// Builds the upstream client from configuration.
    pub fn new(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        let user_agent = config
            .user_agent
            .as_deref()
            .and_then(|ua| HeaderValue::from_str(ua).ok());

        Ok(Self { client, user_agent })
    }

    /// Sends the request described by `descriptor` and waits for the response head.
    ///
    /// `headers` must already be sanitized for the upstream direction.
    pub async fn dispatch(
        &self,
        descriptor: RelayDescriptor,
        mut headers: HeaderMap,
    ) -> RelayResult<Response> {
        if let Some(ua) = &self.user_agent {
            headers.entry(USER_AGENT).or_insert_with(|| ua.clone());
        }

        let url = descriptor.target_url;
        let method = descriptor.method;
        let payload = descriptor.body.encode();

        tracing::info!(target_url = %url, method = %method, "Dispatching upstream request");

        let builder: RequestBuilder = match &method {
            RelayMethod::Get => self.client.get(url.clone()),
            RelayMethod::Post => with_body(self.client.post(url.clone()), payload),
            RelayMethod::Put => with_body(self.client.put(url.clone()), payload),
            RelayMethod::Other(m) => with_body(self.client.request(m.clone(), url.clone()), payload),
        };

        match builder.headers(headers).send().await {
            Ok(response) => {
                tracing::debug!(
                    target_url = %url,
                    status = %response.status(),
                    "Upstream response head received"
                );
                Ok(response)
            }
            Err(e) => {
                tracing::error!(target_url = %url, method = %method, error = %e, "Upstream error");
                Err(RelayError::UpstreamUnreachable(e))
            }
        }
    }

    /// Buffered `GET` used by the debug forwarder.
    pub async fn fetch(&self, url: url::Url, headers: HeaderMap) -> RelayResult<Response> {
        tracing::info!(target_url = %url, "Fetching upstream resource");
        self.client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(RelayError::UpstreamUnreachable)
    }
}

fn with_body(builder: RequestBuilder, payload: Option<String>) -> RequestBuilder {
    match payload {
        Some(body) => builder.body(body),
        None => builder,
    }
}
