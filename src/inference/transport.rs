//! HTTP transport for gateway calls
//!
//! Abstracts the HTTP client for testability:
//! - Transport trait: one JSON POST, one response
//! - HttpTransport: blocking reqwest client for production
//! - ScriptedTransport (in `crate::mock`): canned responses for unit tests

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

/// A JSON POST request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status and body of an HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Transport errors: no HTTP response was received
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout(e.to_string())
        } else if e.is_connect() {
            GatewayError::Connect(e.to_string())
        } else {
            GatewayError::Request(e.to_string())
        }
    }
}

/// Sends JSON POST requests
pub trait Transport: Send + Sync {
    fn post_json(&self, request: &HttpRequest) -> Result<HttpResponse, GatewayError>;
}

/// Blocking reqwest transport
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::ClientBuild(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn post_json(&self, request: &HttpRequest) -> Result<HttpResponse, GatewayError> {
        debug!(url = %request.url, "POST");
        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder.send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        debug!(url = %request.url, status, "response");
        Ok(HttpResponse { status, body })
    }
}
