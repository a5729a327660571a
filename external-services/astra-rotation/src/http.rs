//! HTTPS client for the Astra token authority

use crate::config::AstraApiConfig;
use crate::{Result, RotationError};
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Decoded response from the token authority.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub reason: String,
    pub headers: HeaderMap,
    /// Parsed JSON body, `None` when the body was empty.
    pub body: Option<Value>,
}

impl ApiResponse {
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Body rendered for diagnostics.
    pub fn body_text(&self) -> String {
        match &self.body {
            None => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(value) => value.to_string(),
        }
    }
}

/// Issues one bearer-authenticated request per call against a fixed host.
///
/// Idle connections are not pooled: each request opens its own connection and
/// releases it once the response body has been read or the call fails.
#[derive(Debug, Clone)]
pub struct AstraHttpClient {
    client: Client,
    base_url: String,
}

impl AstraHttpClient {
    pub fn new(config: &AstraApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| RotationError::ConfigurationError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send `method path` with `bearer_token`, decoding a JSON body if present.
    ///
    /// Non-2xx statuses are returned, not raised; only connection-level
    /// failures and timeouts are errors.
    pub async fn request(
        &self,
        bearer_token: &str,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, path = %path, "Sending token authority request");

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(AUTHORIZATION, format!("Bearer {}", bearer_token))
            .header(CONTENT_TYPE, "application/json");

        if let Some(body) = body {
            request = request.body(body.to_string());
        }

        let response = request.send().await?;
        let status = response.status();
        let reason = status.canonical_reason().unwrap_or_default().to_string();
        let headers = response.headers().clone();
        let content = response.bytes().await?;

        // Non-JSON bodies (proxy error pages, plain-text rate limits) are kept
        // verbatim so callers can surface them.
        let body = if content.is_empty() {
            None
        } else {
            Some(serde_json::from_slice(&content).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&content).into_owned())
            }))
        };

        debug!(method = %method, path = %path, status = status.as_u16(), "Token authority responded");

        Ok(ApiResponse {
            status,
            reason,
            headers,
            body,
        })
    }
}
