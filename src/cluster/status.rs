//! Status extraction from resource JSON
//!
//! Mesh resources report readiness either as a `status.state` string
//! (`ModelReady`, `Ready`, ...) or as a `status.conditions[]` list with a
//! `Ready` condition. A [`StatusRule`] picks which one to read; a
//! [`StatusTokens`] set decides which values are terminal.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How to read a status string out of a resource document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusRule {
    /// `status.state`
    State,
    /// `status.conditions[type=Ready]`: `Ready` when its status is `"True"`,
    /// otherwise `NotReady`
    ReadyCondition,
}

impl StatusRule {
    /// Extract the status string, or None when the field is absent
    pub fn extract(&self, resource: &Value) -> Option<String> {
        let status = resource.get("status")?;
        match self {
            StatusRule::State => status.get("state")?.as_str().map(str::to_string),
            StatusRule::ReadyCondition => {
                let conditions = status.get("conditions")?.as_array()?;
                let ready = conditions
                    .iter()
                    .find(|c| c.get("type").and_then(Value::as_str) == Some("Ready"))?;
                let value = ready.get("status").and_then(Value::as_str);
                Some(if value == Some("True") { "Ready" } else { "NotReady" }.to_string())
            }
        }
    }
}

/// Terminal classification of an extracted status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Success,
    Failure,
}

/// Status values that end a poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTokens {
    pub success: Vec<String>,
    pub failure: Vec<String>,
}

impl Default for StatusTokens {
    fn default() -> Self {
        Self {
            success: vec!["Ready".to_string(), "ModelReady".to_string()],
            failure: vec!["Failed".to_string(), "ModelFailed".to_string()],
        }
    }
}

impl StatusTokens {
    pub fn classify(&self, status: &str) -> Option<Terminal> {
        let status = status.trim();
        if self.success.iter().any(|t| t == status) {
            Some(Terminal::Success)
        } else if self.failure.iter().any(|t| t == status) {
            Some(Terminal::Failure)
        } else {
            None
        }
    }
}
