//! Low-level HTTP transport for the PVE API.
//!
//! Every other component performs network I/O exclusively through this
//! wrapper. It applies a bounded request timeout, optionally skips TLS
//! certificate verification for a single call, and normalizes all failure
//! modes into the closed [`TransportError`] taxonomy. It performs exactly one
//! attempt per call; retries belong to the task poller.

use crate::core::domain::error::{TransportError, TransportResult};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Baseline deadline applied to every request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-call request options.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    /// Deadline override, honored only when longer than [`DEFAULT_TIMEOUT`].
    pub deadline: Option<Duration>,
    /// Disables TLS certificate verification for this call only. Meant for
    /// clusters running self-signed certificates; every use is logged at
    /// warn level.
    pub allow_insecure_tls: bool,
}

impl RequestOptions {
    /// Options that skip certificate verification for one call.
    pub fn insecure_tls() -> Self {
        Self {
            allow_insecure_tls: true,
            ..Self::default()
        }
    }

    fn timeout(&self) -> Duration {
        self.deadline
            .filter(|deadline| *deadline > DEFAULT_TIMEOUT)
            .unwrap_or(DEFAULT_TIMEOUT)
    }
}

/// HTTP transport holding two pre-built clients: one verifying TLS
/// certificates and one that does not. Which one serves a call is decided
/// per request, never via shared mutable state, so concurrent calls cannot
/// leak the insecure mode into each other.
#[derive(Debug)]
pub struct Transport {
    client: Client,
    insecure_client: Client,
}

impl Transport {
    /// Builds both underlying clients.
    ///
    /// # Errors
    /// Returns `TransportError::NetworkFailure` if a client cannot be built.
    pub fn new() -> TransportResult<Self> {
        let client = Client::builder().build().map_err(|e| {
            TransportError::NetworkFailure(format!("failed to build HTTP client: {e}"))
        })?;
        let insecure_client = Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| {
                TransportError::NetworkFailure(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            client,
            insecure_client,
        })
    }

    /// Performs a GET request.
    pub async fn get(
        &self,
        uri: &str,
        headers: HeaderMap,
        options: RequestOptions,
    ) -> TransportResult<Value> {
        self.request(Method::GET, uri, headers, None, options).await
    }

    /// Performs a POST request with a JSON body.
    pub async fn post(
        &self,
        uri: &str,
        headers: HeaderMap,
        body: &Value,
        options: RequestOptions,
    ) -> TransportResult<Value> {
        self.request(Method::POST, uri, headers, Some(body), options)
            .await
    }

    /// Core request execution: one attempt, bounded by the deadline, with
    /// the response body parsed as JSON and non-2xx statuses classified.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        headers: HeaderMap,
        body: Option<&Value>,
        options: RequestOptions,
    ) -> TransportResult<Value> {
        debug!(%method, uri, "pve request");

        let client = if options.allow_insecure_tls {
            warn!(
                %method,
                uri,
                "TLS certificate verification skipped for this request; this is insecure"
            );
            &self.insecure_client
        } else {
            &self.client
        };

        let mut builder = client
            .request(method.clone(), uri)
            .headers(headers)
            .timeout(options.timeout());
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                warn!(%method, uri, "pve request timed out");
                return Err(TransportError::Timeout);
            }
            Err(e) => {
                error!(%method, uri, error = %e, "pve request failed before a response arrived");
                return Err(TransportError::NetworkFailure(e.to_string()));
            }
        };

        let status = response.status();
        let json = match response.text().await {
            Ok(text) => serde_json::from_str::<Value>(&text).ok(),
            Err(e) if e.is_timeout() => {
                warn!(%method, uri, "pve response body read timed out");
                return Err(TransportError::Timeout);
            }
            Err(e) => {
                error!(%method, uri, error = %e, "pve response body read failed");
                return Err(TransportError::NetworkFailure(e.to_string()));
            }
        };

        if !status.is_success() {
            let body = json
                .as_ref()
                .map(Value::to_string)
                .unwrap_or_else(|| "<no JSON body>".to_string());
            warn!(
                %method,
                uri,
                status = status.as_u16(),
                body,
                "pve request rejected by server"
            );
            return Err(classify_status(status));
        }

        let Some(json) = json else {
            warn!(
                %method,
                uri,
                status = status.as_u16(),
                "pve response body was not valid JSON"
            );
            return Err(TransportError::JsonDecodeFailed);
        };

        debug!(%method, uri, status = status.as_u16(), "pve request completed");
        Ok(json)
    }
}

fn classify_status(status: StatusCode) -> TransportError {
    match status {
        StatusCode::BAD_REQUEST => TransportError::BadRequest,
        StatusCode::UNAUTHORIZED => TransportError::Unauthorized,
        StatusCode::FORBIDDEN => TransportError::Forbidden,
        StatusCode::NOT_FOUND => TransportError::NotFound,
        other => TransportError::ServerError {
            status: other.as_u16(),
        },
    }
}
