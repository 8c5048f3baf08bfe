//! V2 inference protocol client
//!
//! Sends a single fixed-shape FP32 request to the mesh gateway for a model or
//! a pipeline and turns whatever comes back into an [`InferenceResult`].
//! Nothing here returns an error to the caller: transport failures, non-200
//! answers and undecodable bodies all become failed results.

pub mod transport;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use mesh_report::InferenceRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

pub use transport::{GatewayError, HttpRequest, HttpResponse, HttpTransport, Transport};

/// Error bodies are cut to this many characters
pub const ERROR_BODY_LIMIT: usize = 100;

/// Iris sample sent to models
pub const MODEL_SAMPLE: [f32; 4] = [5.1, 3.5, 1.4, 0.2];

/// Iris sample sent to pipelines
pub const PIPELINE_SAMPLE: [f32; 4] = [5.9, 3.0, 5.1, 1.8];

/// What an inference call is routed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Model(String),
    Pipeline(String),
}

impl Target {
    pub fn name(&self) -> &str {
        match self {
            Target::Model(name) | Target::Pipeline(name) => name,
        }
    }

    /// Value of the `Seldon-Model` routing header
    pub fn routing_header(&self) -> String {
        match self {
            Target::Model(name) => name.clone(),
            Target::Pipeline(name) => format!("{}.pipeline", name),
        }
    }

    pub fn default_sample(&self) -> [f32; 4] {
        match self {
            Target::Model(_) => MODEL_SAMPLE,
            Target::Pipeline(_) => PIPELINE_SAMPLE,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Model(name) => write!(f, "model {}", name),
            Target::Pipeline(name) => write!(f, "pipeline {}", name),
        }
    }
}

/// Where the gateway listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayEndpoint {
    pub host: String,
    pub port: u16,
    /// Overrides the HTTP `Host` header (virtual-host routing)
    pub host_header: Option<String>,
}

impl GatewayEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            host_header: None,
        }
    }

    pub fn with_host_header(mut self, host_header: impl Into<String>) -> Self {
        self.host_header = Some(host_header.into());
        self
    }

    /// `http://host:port/v2/models/<name>/infer`
    pub fn infer_url(&self, name: &str) -> String {
        format!("http://{}:{}/v2/models/{}/infer", self.host, self.port, name)
    }

    /// `host:port`, as stored in the report header
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One V2 input tensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub datatype: String,
    pub data: Vec<Vec<f32>>,
}

/// V2 inference request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub inputs: Vec<InputTensor>,
}

impl InferenceRequest {
    /// A single `predict` row of shape [1, 4]
    pub fn single_row(row: [f32; 4]) -> Self {
        Self {
            inputs: vec![InputTensor {
                name: "predict".to_string(),
                shape: vec![1, 4],
                datatype: "FP32".to_string(),
                data: vec![row.to_vec()],
            }],
        }
    }
}

/// Outcome of one inference call
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResult {
    pub target: Target,
    pub success: bool,
    /// HTTP status, when a response arrived
    pub status_code: Option<u16>,
    /// Round-trip time, only for successful calls
    pub latency_ms: Option<f64>,
    pub error_detail: Option<String>,
    /// Decoded response body of a successful call
    pub body: Option<Value>,
}

impl InferenceResult {
    pub fn to_record(&self) -> InferenceRecord {
        match (self.success, self.status_code, self.latency_ms) {
            (true, _, Some(latency)) => InferenceRecord::success(latency),
            (false, Some(code), _) if code != 200 => {
                InferenceRecord::http_failure(code, self.error_detail.clone())
            }
            _ => InferenceRecord::transport_error(
                self.error_detail.clone().unwrap_or_else(|| "unknown error".to_string()),
            ),
        }
    }

    /// One-line description for progress output
    pub fn describe(&self) -> String {
        match (self.success, self.status_code, self.latency_ms) {
            (true, _, Some(latency)) => format!("{}: {:.1}ms", self.target, latency),
            (false, Some(code), _) if code != 200 => format!("{}: HTTP {}", self.target, code),
            _ => format!(
                "{}: {}",
                self.target,
                self.error_detail.as_deref().unwrap_or("error")
            ),
        }
    }
}

/// Cut `text` to at most `limit` characters
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Gateway client
pub struct InferenceClient {
    transport: Arc<dyn Transport>,
    endpoint: GatewayEndpoint,
}

impl InferenceClient {
    pub fn new(transport: Arc<dyn Transport>, endpoint: GatewayEndpoint) -> Self {
        Self {
            transport,
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &GatewayEndpoint {
        &self.endpoint
    }

    /// Build the HTTP request for `target` carrying `row`
    pub fn request_for(&self, target: &Target, row: [f32; 4]) -> HttpRequest {
        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Seldon-Model".to_string(), target.routing_header()),
        ];
        if let Some(ref host) = self.endpoint.host_header {
            headers.push(("Host".to_string(), host.clone()));
        }
        let body = serde_json::to_value(InferenceRequest::single_row(row))
            .unwrap_or(Value::Null);
        HttpRequest {
            url: self.endpoint.infer_url(target.name()),
            headers,
            body,
        }
    }

    /// Call `target` with its default sample
    pub fn infer(&self, target: &Target) -> InferenceResult {
        self.infer_with(target, target.default_sample())
    }

    pub fn infer_model(&self, name: &str) -> InferenceResult {
        self.infer(&Target::Model(name.to_string()))
    }

    pub fn infer_pipeline(&self, name: &str) -> InferenceResult {
        self.infer(&Target::Pipeline(name.to_string()))
    }

    /// Call `target` with a caller-supplied row
    pub fn infer_with(&self, target: &Target, row: [f32; 4]) -> InferenceResult {
        let request = self.request_for(target, row);
        let start = Instant::now();
        let response = self.transport.post_json(&request);
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let mut result = InferenceResult {
            target: target.clone(),
            success: false,
            status_code: None,
            latency_ms: None,
            error_detail: None,
            body: None,
        };

        match response {
            Ok(HttpResponse { status: 200, body }) => {
                result.status_code = Some(200);
                match serde_json::from_str::<Value>(&body) {
                    Ok(decoded) => {
                        result.success = true;
                        result.latency_ms = Some(elapsed_ms);
                        result.body = Some(decoded);
                    }
                    Err(e) => {
                        result.error_detail = Some(format!("invalid JSON response: {}", e));
                    }
                }
            }
            Ok(HttpResponse { status, body }) => {
                result.status_code = Some(status);
                result.error_detail = Some(truncate_chars(&body, ERROR_BODY_LIMIT));
            }
            Err(e) => {
                warn!(target = %target, error = %e, "inference transport error");
                result.error_detail = Some(truncate_chars(&e.to_string(), ERROR_BODY_LIMIT));
            }
        }

        debug!(
            target = %target,
            success = result.success,
            status = ?result.status_code,
            elapsed_ms,
            "inference call"
        );
        result
    }
}
