//! Entries recorded into a test report.
//!
//! Infrastructure checks are plain booleans. Inference calls record a
//! status string (`success`, `failed_<code>`, `error`) with latency on
//! success and a short error detail on failure. Deployments record the
//! terminal state observed by the readiness poller.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single report entry, keyed by target name within a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Entry {
    /// Pass/fail infrastructure check
    Check(bool),
    /// Outcome of one inference call
    Inference(InferenceRecord),
    /// Outcome of deploying one resource
    Deployment(DeploymentRecord),
}

impl Entry {
    /// Whether this entry counts toward the success total of its category
    pub fn is_success(&self) -> bool {
        match self {
            Entry::Check(passed) => *passed,
            Entry::Inference(record) => record.status.is_success(),
            Entry::Deployment(record) => record.state.is_success(),
        }
    }

    /// Latency of a successful inference, if this entry carries one
    pub fn latency_ms(&self) -> Option<f64> {
        match self {
            Entry::Inference(record) => record.latency_ms,
            _ => None,
        }
    }
}

impl From<bool> for Entry {
    fn from(passed: bool) -> Self {
        Entry::Check(passed)
    }
}

impl From<InferenceRecord> for Entry {
    fn from(record: InferenceRecord) -> Self {
        Entry::Inference(record)
    }
}

impl From<DeploymentRecord> for Entry {
    fn from(record: DeploymentRecord) -> Self {
        Entry::Deployment(record)
    }
}

/// Status of an inference call as persisted in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum InferenceStatus {
    /// Gateway answered HTTP 200
    Success,
    /// Gateway answered with a non-200 status
    HttpStatus(u16),
    /// Transport error; no HTTP status was received
    Error,
}

impl InferenceStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, InferenceStatus::Success)
    }
}

impl fmt::Display for InferenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceStatus::Success => write!(f, "success"),
            InferenceStatus::HttpStatus(code) => write!(f, "failed_{}", code),
            InferenceStatus::Error => write!(f, "error"),
        }
    }
}

impl FromStr for InferenceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(InferenceStatus::Success),
            "error" => Ok(InferenceStatus::Error),
            other => other
                .strip_prefix("failed_")
                .and_then(|code| code.parse::<u16>().ok())
                .map(InferenceStatus::HttpStatus)
                .ok_or_else(|| format!("unknown inference status: {}", other)),
        }
    }
}

impl TryFrom<String> for InferenceStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        value.parse()
    }
}

impl From<InferenceStatus> for String {
    fn from(status: InferenceStatus) -> Self {
        status.to_string()
    }
}

/// Recorded outcome of one inference call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRecord {
    pub status: InferenceStatus,

    /// Round-trip latency, only present for successful calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InferenceRecord {
    /// A successful call; latency is rounded to one decimal place.
    pub fn success(latency_ms: f64) -> Self {
        Self {
            status: InferenceStatus::Success,
            latency_ms: Some(round_tenths(latency_ms)),
            error: None,
        }
    }

    /// The gateway answered with a non-200 status.
    pub fn http_failure(code: u16, body: Option<String>) -> Self {
        Self {
            status: InferenceStatus::HttpStatus(code),
            latency_ms: None,
            error: body,
        }
    }

    /// The request never produced an HTTP response.
    pub fn transport_error(message: impl Into<String>) -> Self {
        Self {
            status: InferenceStatus::Error,
            latency_ms: None,
            error: Some(message.into()),
        }
    }
}

fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Terminal state of a resource deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    /// Poller observed a success token
    Ready,
    /// Poller observed a failure token
    Failed,
    /// Poller exhausted its attempts
    TimedOut,
    /// Resource was already present; nothing was applied
    Existing,
    /// Manifest applied without waiting for readiness
    Applied,
    /// `kubectl apply` itself failed
    ApplyFailed,
}

impl DeploymentState {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            DeploymentState::Ready | DeploymentState::Existing | DeploymentState::Applied
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::Ready => "ready",
            DeploymentState::Failed => "failed",
            DeploymentState::TimedOut => "timed_out",
            DeploymentState::Existing => "existing",
            DeploymentState::Applied => "applied",
            DeploymentState::ApplyFailed => "apply_failed",
        }
    }
}

/// Recorded outcome of deploying one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub state: DeploymentState,

    /// Status queries issued by the poller (0 when no poll ran)
    pub attempts: u32,

    /// Queries that failed to run or returned unparseable output
    pub query_failures: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl DeploymentRecord {
    /// A record for a resource that needed no poll (existing or apply-only).
    pub fn without_poll(state: DeploymentState) -> Self {
        Self {
            state,
            attempts: 0,
            query_failures: 0,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inference_status_strings() {
        assert_eq!(InferenceStatus::Success.to_string(), "success");
        assert_eq!(InferenceStatus::HttpStatus(503).to_string(), "failed_503");
        assert_eq!(InferenceStatus::Error.to_string(), "error");

        assert_eq!("failed_404".parse::<InferenceStatus>(), Ok(InferenceStatus::HttpStatus(404)));
        assert!("failed_abc".parse::<InferenceStatus>().is_err());
        assert!("pending".parse::<InferenceStatus>().is_err());
    }

    #[test]
    fn test_http_failure_has_no_latency() {
        let record = InferenceRecord::http_failure(503, Some("upstream unavailable".to_string()));
        let entry = Entry::from(record);

        assert!(!entry.is_success());
        assert_eq!(entry.latency_ms(), None);

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], "failed_503");
        assert!(json.get("latency_ms").is_none());
    }

    #[test]
    fn test_success_latency_rounded() {
        let record = InferenceRecord::success(12.345);
        assert_eq!(record.latency_ms, Some(12.3));
    }

    #[test]
    fn test_untagged_entry_decoding() {
        let check: Entry = serde_json::from_str("true").unwrap();
        assert_eq!(check, Entry::Check(true));

        let inference: Entry =
            serde_json::from_str(r#"{"status": "success", "latency_ms": 8.5}"#).unwrap();
        assert_eq!(inference, Entry::Inference(InferenceRecord::success(8.5)));

        let deployment: Entry = serde_json::from_str(
            r#"{"state": "timed_out", "attempts": 30, "query_failures": 2}"#,
        )
        .unwrap();
        match deployment {
            Entry::Deployment(record) => {
                assert_eq!(record.state, DeploymentState::TimedOut);
                assert_eq!(record.attempts, 30);
                assert_eq!(record.query_failures, 2);
            }
            other => panic!("expected deployment entry, got {:?}", other),
        }
    }

    #[test]
    fn test_deployment_state_success_markers() {
        assert!(DeploymentState::Ready.is_success());
        assert!(DeploymentState::Existing.is_success());
        assert!(DeploymentState::Applied.is_success());
        assert!(!DeploymentState::Failed.is_success());
        assert!(!DeploymentState::TimedOut.is_success());
        assert!(!DeploymentState::ApplyFailed.is_success());
    }
}
