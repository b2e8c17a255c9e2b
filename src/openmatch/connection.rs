//! HTTP connection settings shared by the Open Match clients

use crate::error::{MatchmakingError, Result};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;

/// Connection configuration for one Open Match component
#[derive(Debug, Clone)]
pub struct OpenMatchEndpoint {
    /// Base URL, e.g. `http://open-match-backend.open-match.svc:51505`
    pub base_url: String,
    pub connect_timeout_ms: u64,
    /// Applies to unary calls only; streams are bounded by their callers
    pub request_timeout_ms: u64,
}

impl Default for OpenMatchEndpoint {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:51505".to_string(),
            connect_timeout_ms: 5000,
            request_timeout_ms: 10000,
        }
    }
}

impl OpenMatchEndpoint {
    /// Accepts `host:port` or a full URL; plain addresses default to http.
    pub fn new(addr: &str) -> Self {
        Self {
            base_url: normalize_base_url(addr),
            ..Default::default()
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Build the shared HTTP client for this endpoint
    pub fn build_client(&self) -> Result<Client> {
        debug!("Building HTTP client for {}", self.base_url);

        Client::builder()
            .connect_timeout(Duration::from_millis(self.connect_timeout_ms))
            .build()
            .map_err(|e| {
                MatchmakingError::ConfigurationError {
                    message: format!("Failed to build HTTP client for {}: {}", self.base_url, e),
                }
                .into()
            })
    }
}

/// Add a scheme when missing and strip trailing slashes
pub fn normalize_base_url(addr: &str) -> String {
    let trimmed = addr.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

/// Turn a non-success HTTP status into an error carrying the response body
pub async fn ensure_success(response: Response, operation: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(MatchmakingError::RemoteStream {
        message: format!("{} failed with status {}: {}", operation, status, body.trim()),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("om-backend:51505"), "http://om-backend:51505");
        assert_eq!(normalize_base_url("https://om:443/"), "https://om:443");
        assert_eq!(normalize_base_url(" http://om:1 "), "http://om:1");
    }

    #[test]
    fn test_endpoint_url() {
        let endpoint = OpenMatchEndpoint::new("localhost:51505");
        assert_eq!(
            endpoint.url("/v1/backendservice/tickets:assign"),
            "http://localhost:51505/v1/backendservice/tickets:assign"
        );
        assert!(endpoint.build_client().is_ok());
    }
}
