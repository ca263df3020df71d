//! HTTP client for the bridge `/list` endpoint.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use thiserror::Error;

use crate::config::Credentials;

/// Port the bridge HTTP API listens on.
pub const DEFAULT_BRIDGE_PORT: u16 = 8080;

/// Longest a single `/list` request may take.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Bodies of failed responses are cut to this many bytes in errors.
const MAX_ERROR_BODY: usize = 256;

/// Errors that can occur while fetching from the bridge.
///
/// Request errors never carry the request URL, which contains the token.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to build http client: {0}")]
    Client(reqwest::Error),

    #[error("invalid bridge address: {0}")]
    Address(String),

    #[error("bridge request failed: {0}")]
    Request(reqwest::Error),

    #[error("bridge returned status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("failed to read bridge response: {0}")]
    Body(reqwest::Error),
}

/// Source of raw device-list payloads.
///
/// Implemented over HTTP by [`HttpBridge`]; tests substitute canned
/// responses.
pub trait BridgeSource {
    /// Fetches one raw `/list` response body.
    fn fetch(&self) -> impl Future<Output = Result<Vec<u8>, BridgeError>> + Send;
}

/// Connection settings for the bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Hostname or IP address of the bridge.
    pub host: String,
    /// Bridge API port.
    pub port: u16,
    /// Optional HTTP proxy for bridge requests.
    pub proxy_url: Option<String>,
}

impl BridgeConfig {
    /// Creates a config for `host` on the default port without a proxy.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_BRIDGE_PORT,
            proxy_url: None,
        }
    }
}

/// Fetches device lists from a bridge over HTTP.
pub struct HttpBridge {
    client: Client,
    url: Url,
    /// `url` without the token, for logs.
    display_url: String,
}

impl HttpBridge {
    /// Builds the client and request URL.
    pub fn new(config: &BridgeConfig, credentials: &Credentials) -> Result<Self, BridgeError> {
        let mut builder = Client::builder().timeout(REQUEST_TIMEOUT);
        if let Some(proxy_url) = &config.proxy_url {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(BridgeError::Client)?;
            builder = builder.proxy(proxy);
        }
        let client = builder.build().map_err(BridgeError::Client)?;

        let display_url = format!("http://{}:{}/list", config.host, config.port);
        let url = Url::parse_with_params(&display_url, &[("token", credentials.token())])
            .map_err(|e| BridgeError::Address(format!("{}: {}", display_url, e)))?;

        tracing::debug!(url = %display_url, proxy = ?config.proxy_url, "Bridge client ready");

        Ok(Self {
            client,
            url,
            display_url,
        })
    }
}

impl BridgeSource for HttpBridge {
    async fn fetch(&self) -> Result<Vec<u8>, BridgeError> {
        tracing::debug!(url = %self.display_url, "Fetching device list");

        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| BridgeError::Request(e.without_url()))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::Status {
                status,
                body: truncate(body, MAX_ERROR_BODY),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| BridgeError::Body(e.without_url()))?;
        Ok(body.to_vec())
    }
}

fn truncate(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut end = max;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_carries_token() {
        let credentials = Credentials::new("s3cr&t").unwrap();
        let bridge = HttpBridge::new(&BridgeConfig::new("192.168.1.20"), &credentials).unwrap();

        assert_eq!(bridge.url.as_str(), "http://192.168.1.20:8080/list?token=s3cr%26t");
        assert_eq!(bridge.display_url, "http://192.168.1.20:8080/list");
    }

    #[test]
    fn test_custom_port() {
        let credentials = Credentials::new("abc").unwrap();
        let config = BridgeConfig {
            port: 8081,
            ..BridgeConfig::new("bridge.local")
        };
        let bridge = HttpBridge::new(&config, &credentials).unwrap();
        assert_eq!(bridge.url.port(), Some(8081));
    }

    #[test]
    fn test_invalid_host_rejected() {
        let credentials = Credentials::new("abc").unwrap();
        let result = HttpBridge::new(&BridgeConfig::new("bad host"), &credentials);
        assert!(matches!(result, Err(BridgeError::Address(_))));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short".to_string(), 10), "short");
        assert_eq!(truncate("äöü".to_string(), 3), "ä");
    }

    #[tokio::test]
    async fn test_unreachable_bridge_is_request_error() {
        // Bind and drop to find a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = BridgeConfig {
            port,
            ..BridgeConfig::new("127.0.0.1")
        };
        let bridge = HttpBridge::new(&config, &Credentials::new("abc").unwrap()).unwrap();

        match bridge.fetch().await {
            Err(BridgeError::Request(e)) => assert!(e.url().is_none()),
            other => panic!("expected request error, got {:?}", other.map(|b| b.len())),
        }
    }
}
