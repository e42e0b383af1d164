//! Request execution against the aggregate endpoint.
//!
//! The core only sees [`RequestExecutor`]: send a wire body with headers,
//! get back a status and a body, or a [`TransportError`]. [`HttpExecutor`]
//! is the `reqwest` implementation used by the CLI; tests script their own.
//!
//! [`interpret_response`] turns a raw response into a [`CellSet`] or a
//! [`QueryError`] carrying the service's status and message verbatim.
//! Nothing here retries.

use serde_json::Value;

use crate::config::{ApiConfig, SESSION_COOKIE};
use crate::error::{QueryError, QueryResult, TransportError};
use crate::models::CellSet;

// =============================================================================
// Executor contract
// =============================================================================

/// Ordered header list sent with each request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    entries: Vec<(String, String)>,
}

impl RequestHeaders {
    /// Headers for an aggregate query under `config`.
    ///
    /// `Content-Type`, `apikey` and `Accept` are always set; `TargetTenantID`
    /// and the session cookie only when configured.
    pub fn from_config(config: &ApiConfig) -> Self {
        let mut headers = Self::default()
            .with("Content-Type", "application/json")
            .with("apikey", &config.apikey)
            .with("Accept", config.accept.mime());

        if let Some(tenant) = &config.target_tenant_id {
            headers = headers.with("TargetTenantID", tenant);
        }
        if let Some(token) = &config.session_token {
            headers = headers.with("Cookie", format!("{}={}", SESSION_COOKIE, token));
        }
        headers
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.push((name.into(), value.into()));
        self
    }

    /// Value of the first header named `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// Status and body exactly as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs one HTTP call per invocation.
///
/// Timeouts and any retry policy belong to the implementation.
#[allow(async_fn_in_trait)]
pub trait RequestExecutor {
    async fn execute(&self, body: &Value, headers: &RequestHeaders) -> Result<RawResponse, TransportError>;
}

// =============================================================================
// HTTP executor
// =============================================================================

/// [`RequestExecutor`] over `reqwest`, configured once from an [`ApiConfig`].
pub struct HttpExecutor {
    config: ApiConfig,
    client: reqwest::Client,
}

impl HttpExecutor {
    pub fn new(config: ApiConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransportError::RequestFailed(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Headers derived from this executor's configuration.
    pub fn headers(&self) -> RequestHeaders {
        RequestHeaders::from_config(&self.config)
    }
}

impl RequestExecutor for HttpExecutor {
    async fn execute(&self, body: &Value, headers: &RequestHeaders) -> Result<RawResponse, TransportError> {
        let mut request = self.client.post(self.config.endpoint()).json(body);
        if let Some(vanity) = &self.config.vanity {
            request = request.query(&[("vanity", vanity)]);
        }
        for (name, value) in headers.iter() {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;

        Ok(RawResponse { status, body })
    }
}

// =============================================================================
// Response interpretation
// =============================================================================

/// Map a non-success status to its [`QueryError`]; pass successes through.
pub fn check_status(raw: &RawResponse) -> QueryResult<()> {
    if raw.is_success() {
        return Ok(());
    }

    let message = status_message(&raw.body, raw.status);
    Err(match raw.status {
        400 => QueryError::SemanticQuery { message },
        401 => QueryError::Auth { message },
        404 => QueryError::NotFound { message },
        500..=599 => QueryError::Server {
            status: raw.status,
            message,
        },
        status => QueryError::UnexpectedStatus { status, message },
    })
}

/// Turn a raw JSON response into a cell set.
///
/// A success body holding an `error` object is a remote failure, not an
/// empty result.
pub fn interpret_response(raw: &RawResponse) -> QueryResult<CellSet> {
    check_status(raw)?;

    let value: Value = serde_json::from_str(&raw.body)
        .map_err(|e| QueryError::InvalidResponse(format!("body is not JSON: {}", e)))?;

    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| error.to_string());
        return Err(QueryError::Remote { message });
    }

    serde_json::from_value(value)
        .map_err(|e| QueryError::InvalidResponse(format!("body is not a cell set: {}", e)))
}

/// Message of a Status object, or the raw body when it is not one.
fn status_message(body: &str, status: u16) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let from_status = parsed.as_ref().and_then(|v| {
        v.get("message")
            .or_else(|| v.get("error").and_then(|e| e.get("message")))
            .and_then(Value::as_str)
            .map(String::from)
    });

    match from_status {
        Some(message) => message,
        None if body.trim().is_empty() => format!("HTTP {}", status),
        None => body.trim().to_string(),
    }
}
