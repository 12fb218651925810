//! REST client for the remote order store.
//!
//! The store speaks a Realtime-Database-style REST dialect: every node is
//! addressable as `<base>/<path>.json`, GET returns a point-in-time
//! snapshot, PATCH merges fields, and POST appends a document under a
//! generated key, answering `{"name": "<id>"}`.

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::Instant;
use tracing::info;

use crate::config::StoreConfig;
use crate::error::BoardError;

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("cannot reach order store at {url}");
    }
    if err.is_timeout() {
        return format!("connection to {url} timed out");
    }
    if err.is_builder() {
        return format!("invalid order store URL: {url}");
    }
    format!("network error communicating with {url}: {err}")
}

/// Convert an HTTP status code into a user-friendly message.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "auth token is invalid or expired".to_string(),
        403 => "access to the order store denied".to_string(),
        404 => "order store path not found".to_string(),
        s if s >= 500 => format!("order store server error (HTTP {s})"),
        s => format!("unexpected response from order store (HTTP {s})"),
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Result of a connectivity probe.
#[derive(Debug, serde::Serialize)]
pub struct ConnectivityResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Thin authenticated JSON client over the store's REST surface. Built
/// once from a [`StoreConfig`] and passed into whatever consumes the
/// store; there is no implicit global connection.
pub struct StoreClient {
    http: Client,
    config: StoreConfig,
}

impl StoreClient {
    pub fn new(config: StoreConfig) -> Result<Self, BoardError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                BoardError::StoreUnavailable(format!("failed to create HTTP client: {e}"))
            })?;
        Ok(StoreClient { http, config })
    }

    pub fn database_url(&self) -> &str {
        &self.config.database_url
    }

    /// Build the REST URL for a node path. The root node is addressed as
    /// `<base>/.json`.
    fn node_url(&self, path: &str) -> String {
        let clean = path.trim_matches('/');
        let mut url = format!("{}/{clean}.json", self.config.database_url);
        if let Some(token) = &self.config.auth_token {
            url.push_str("?auth=");
            url.push_str(token);
        }
        url
    }

    pub async fn get(&self, path: &str) -> Result<Value, BoardError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, BoardError> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value, BoardError> {
        self.request(Method::PATCH, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value, BoardError> {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), BoardError> {
        self.request(Method::DELETE, path, None).await.map(|_| ())
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, BoardError> {
        let url = self.node_url(path);
        let mut req = self.http.request(method, &url);
        if let Some(b) = body {
            req = req.json(b);
        }

        let resp = req.send().await.map_err(|e| {
            BoardError::StoreUnavailable(friendly_error(&self.config.database_url, &e))
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            let detail = if body_text.trim().is_empty() {
                status_error(status)
            } else {
                format!("{}: {}", status_error(status), body_text.trim())
            };
            return Err(BoardError::StoreUnavailable(detail));
        }

        let body_text = resp.text().await.unwrap_or_default();
        if body_text.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body_text).map_err(|e| {
            BoardError::StoreUnavailable(format!("invalid JSON from order store: {e}"))
        })
    }

    /// Probe connectivity with a lightweight root fetch, measuring
    /// round-trip latency.
    pub async fn test_connectivity(&self) -> ConnectivityResult {
        let url = self.node_url("");
        let start = Instant::now();

        let resp = match self
            .http
            .get(&url)
            .timeout(self.config.probe_timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                return ConnectivityResult {
                    success: false,
                    latency_ms: None,
                    error: Some(friendly_error(&self.config.database_url, &e)),
                };
            }
        };

        let latency = start.elapsed().as_millis() as u64;
        let status = resp.status();

        if status.is_success() {
            info!(latency_ms = latency, "store connectivity probe passed");
            ConnectivityResult {
                success: true,
                latency_ms: Some(latency),
                error: None,
            }
        } else {
            ConnectivityResult {
                success: false,
                latency_ms: Some(latency),
                error: Some(status_error(status)),
            }
        }
    }
}
