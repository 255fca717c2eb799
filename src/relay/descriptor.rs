//! Relay descriptor parsing.
//!
//! Turns the raw inbound body into a validated [`RelayDescriptor`]. Parsing is
//! pure: the raw body is only borrowed, and only a bounded snippet of it ever
//! leaves this module (inside a [`RelayError::InvalidDescriptor`]).

use std::collections::BTreeMap;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::relay::error::{RelayError, RelayResult};
use crate::security::limits::bounded_snippet;

/// Upstream method, with natural semantics for the common verbs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RelayMethod {
    Get,
    #[default]
    Post,
    Put,
    /// Any other valid HTTP method, dispatched generically.
    Other(reqwest::Method),
}

impl RelayMethod {
    /// Parses a method name case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        let upper = raw.trim().to_ascii_uppercase();
        match upper.as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            _ => reqwest::Method::from_bytes(upper.as_bytes())
                .ok()
                .map(Self::Other),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Other(m) => m.as_str(),
        }
    }
}

impl std::fmt::Display for RelayMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload to forward upstream.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestBody {
    /// No body is sent.
    #[default]
    Absent,
    /// Sent verbatim.
    Raw(String),
    /// Sent as its JSON serialization.
    Structured(Value),
}

impl RequestBody {
    fn from_value(value: Option<Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::Absent,
            Some(Value::String(s)) => Self::Raw(s),
            Some(other) => Self::Structured(other),
        }
    }

    /// Serialized payload, `None` when absent.
    pub fn encode(&self) -> Option<String> {
        match self {
            Self::Absent => None,
            Self::Raw(s) => Some(s.clone()),
            Self::Structured(v) => Some(v.to_string()),
        }
    }

    /// Whether the serialized payload is valid JSON.
    pub fn is_json(&self) -> bool {
        match self {
            Self::Absent => false,
            Self::Raw(s) => serde_json::from_str::<serde::de::IgnoredAny>(s).is_ok(),
            Self::Structured(_) => true,
        }
    }
}

/// A validated description of the request to relay.
#[derive(Debug, Clone)]
pub struct RelayDescriptor {
    pub target_url: Url,
    pub method: RelayMethod,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

#[derive(Deserialize)]
struct RawDescriptor {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    headers: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    body: Option<Value>,
}

/// Parses the inbound body into a descriptor.
///
/// `content_type` is advisory: browsers often send `text/plain` to avoid a
/// preflight, so the body is always attempted as JSON.
pub fn parse_descriptor(
    raw: &[u8],
    content_type: Option<&str>,
    snippet_limit: usize,
) -> RelayResult<RelayDescriptor> {
    let snippet = || bounded_snippet(raw, snippet_limit);

    if let Some(ct) = content_type {
        if !ct.to_ascii_lowercase().contains("json") {
            tracing::debug!(content_type = %ct, "Descriptor sent without a JSON content type");
        }
    }

    let parsed: RawDescriptor = match serde_json::from_slice::<Value>(raw) {
        Ok(value @ Value::Object(_)) => serde_json::from_value(value)
            .map_err(|e| RelayError::invalid(format!("invalid JSON body: {e}"), snippet()))?,
        Ok(_) => {
            return Err(RelayError::invalid(
                "invalid JSON body: expected an object",
                snippet(),
            ))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse descriptor JSON");
            return Err(RelayError::invalid(format!("invalid JSON body: {e}"), snippet()));
        }
    };

    let url = match parsed.url.as_deref().map(str::trim) {
        Some(u) if !u.is_empty() => u,
        _ => return Err(RelayError::MissingTarget),
    };
    let target_url = Url::parse(url)
        .map_err(|e| RelayError::invalid(format!("invalid url '{url}': {e}"), snippet()))?;
    if !matches!(target_url.scheme(), "http" | "https") {
        return Err(RelayError::invalid(
            format!("unsupported url scheme '{}'", target_url.scheme()),
            snippet(),
        ));
    }

    let method = match parsed.method.as_deref() {
        None => RelayMethod::default(),
        Some(m) => RelayMethod::parse(m)
            .ok_or_else(|| RelayError::invalid(format!("invalid method '{m}'"), snippet()))?,
    };

    let mut headers = HeaderMap::new();
    for (name, value) in parsed.headers.unwrap_or_default() {
        let value = match value {
            Value::Null => continue,
            Value::String(s) => s,
            Value::Bool(_) | Value::Number(_) => value.to_string(),
            _ => {
                return Err(RelayError::invalid(
                    format!("header '{name}' must be a string"),
                    snippet(),
                ))
            }
        };
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| RelayError::invalid(format!("invalid header name '{name}'"), snippet()))?;
        let header_value = HeaderValue::from_str(&value).map_err(|_| {
            RelayError::invalid(format!("invalid value for header '{name}'"), snippet())
        })?;
        headers.append(header_name, header_value);
    }

    Ok(RelayDescriptor {
        target_url,
        method,
        headers,
        body: RequestBody::from_value(parsed.body),
    })
}
