//! Typed settings and built-in defaults (layer 1)
//!
//! [`SmokeConfig::default`] is the built-in layer. Every field carries a
//! serde default so a partially specified merged document still
//! deserializes.

use std::path::PathBuf;

use mesh_manifest::{ResourceKind, DEFAULT_STORAGE_URI};
use serde::{Deserialize, Serialize};

/// Fully resolved settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmokeConfig {
    /// Namespace holding the mesh resources
    pub namespace: String,
    pub kubectl: KubectlConfig,
    pub gateway: GatewayConfig,
    pub poll: PollConfig,
    pub report: ReportConfig,
    pub performance: PerformanceConfig,
    pub verdict: VerdictConfig,
    pub suite: SuiteConfig,
    pub deploy: DeployConfig,
}

impl Default for SmokeConfig {
    fn default() -> Self {
        Self {
            namespace: "seldon-mesh".to_string(),
            kubectl: KubectlConfig::default(),
            gateway: GatewayConfig::default(),
            poll: PollConfig::default(),
            report: ReportConfig::default(),
            performance: PerformanceConfig::default(),
            verdict: VerdictConfig::default(),
            suite: SuiteConfig::default(),
            deploy: DeployConfig::default(),
        }
    }
}

impl SmokeConfig {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubectlConfig {
    pub binary: String,
    /// Per-invocation timeout
    pub timeout_seconds: u64,
    /// `--context` passed to every invocation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Default for KubectlConfig {
    fn default() -> Self {
        Self {
            binary: "kubectl".to_string(),
            timeout_seconds: 30,
            context: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Fixed gateway address; discovered from the Service when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub port: u16,
    pub service: String,
    pub service_namespace: String,
    pub timeout_seconds: u64,
    /// Used when discovery finds no external address
    pub fallback_host: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 80,
            service: "istio-ingressgateway".to_string(),
            service_namespace: "istio-system".to_string(),
            timeout_seconds: 30,
            fallback_host: "localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_seconds: u64,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 5,
            max_attempts: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub path: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("test_report.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Requests sent to the performance target
    pub requests: u32,
    /// First existing model in this list is the target
    pub candidates: Vec<String>,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            requests: 10,
            candidates: strings(&["product-classifier-v1", "intent-classifier-v1"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerdictConfig {
    /// Infrastructure pass rate that must be exceeded
    pub min_infrastructure_pass_rate: f64,
}

impl Default for VerdictConfig {
    fn default() -> Self {
        Self {
            min_infrastructure_pass_rate: 0.8,
        }
    }
}

/// One group of components exercised together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentGroup {
    pub name: String,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub pipelines: Vec<String>,
    #[serde(default)]
    pub experiments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Servers whose Ready condition is checked
    pub servers: Vec<String>,
    /// Mesh CRDs that must be installed
    pub crds: Vec<ResourceKind>,
    pub groups: Vec<ComponentGroup>,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            servers: strings(&["mlserver", "triton"]),
            crds: ResourceKind::ALL.to_vec(),
            groups: vec![
                ComponentGroup {
                    name: "chatbot".to_string(),
                    models: strings(&[
                        "intent-classifier-v1",
                        "entity-extractor",
                        "product-recommender",
                    ]),
                    pipelines: strings(&["instant-chatbot", "chatbot-with-recommendations"]),
                    experiments: Vec::new(),
                },
                ComponentGroup {
                    name: "v71".to_string(),
                    models: strings(&[
                        "feature-transformer",
                        "product-classifier-v1",
                        "product-classifier-v2",
                    ]),
                    pipelines: strings(&["product-pipeline-v1", "product-pipeline-v2"]),
                    experiments: strings(&["product-ab-test"]),
                },
                ComponentGroup {
                    name: "monitoring".to_string(),
                    models: strings(&["drift-detector", "model-explainer", "performance-monitor"]),
                    pipelines: strings(&["real-time-monitoring", "explanation-service"]),
                    experiments: Vec::new(),
                },
            ],
        }
    }
}

/// A model the deployer creates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDeployment {
    pub name: String,
    #[serde(default = "default_memory")]
    pub memory: String,
}

fn default_memory() -> String {
    "1Gi".to_string()
}

/// A pipeline the deployer creates.
///
/// The first step reads the pipeline input as-is; later steps read
/// `<pipeline>.inputs.<input_tensor>` remapped to `<input_tensor>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDeployment {
    pub name: String,
    pub steps: Vec<String>,
    #[serde(default = "default_input_tensor")]
    pub input_tensor: String,
    /// Output step; the last step when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

fn default_input_tensor() -> String {
    "text".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub models: Vec<ModelDeployment>,
    pub pipelines: Vec<PipelineDeployment>,
    pub storage_uri: String,
    /// Poll pipelines for readiness instead of only applying them
    pub wait_for_pipelines: bool,
}

impl Default for DeployConfig {
    fn default() -> Self {
        let chatbot_steps = strings(&[
            "intent-classifier-v1",
            "entity-extractor",
            "product-recommender",
        ]);
        Self {
            models: vec![
                ModelDeployment {
                    name: "intent-classifier-v1".to_string(),
                    memory: "500Mi".to_string(),
                },
                ModelDeployment {
                    name: "entity-extractor".to_string(),
                    memory: "1Gi".to_string(),
                },
                ModelDeployment {
                    name: "product-recommender".to_string(),
                    memory: "1Gi".to_string(),
                },
            ],
            pipelines: ["instant-chatbot", "chatbot-with-recommendations"]
                .iter()
                .map(|name| PipelineDeployment {
                    name: name.to_string(),
                    steps: chatbot_steps.clone(),
                    input_tensor: default_input_tensor(),
                    output: Some("product-recommender".to_string()),
                })
                .collect(),
            storage_uri: DEFAULT_STORAGE_URI.to_string(),
            wait_for_pipelines: false,
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = SmokeConfig::default();
        assert_eq!(defaults.namespace, "seldon-mesh");
        assert_eq!(defaults.poll.interval_seconds, 5);
        assert_eq!(defaults.poll.max_attempts, 30);
        assert_eq!(defaults.gateway.port, 80);
        assert_eq!(defaults.performance.requests, 10);
        assert_eq!(defaults.suite.crds.len(), 4);
        assert_eq!(defaults.suite.groups.len(), 3);
        assert_eq!(defaults.deploy.models[0].memory, "500Mi");
    }

    #[test]
    fn test_to_value() {
        let value = SmokeConfig::default().to_value();

        assert_eq!(value["namespace"], "seldon-mesh");
        assert_eq!(value["gateway"]["service"], "istio-ingressgateway");
        assert_eq!(value["suite"]["crds"][0], "server");
        assert!(value["gateway"].get("host").is_none());
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: SmokeConfig =
            serde_json::from_value(serde_json::json!({"poll": {"max_attempts": 3}})).unwrap();
        assert_eq!(config.poll.max_attempts, 3);
        assert_eq!(config.poll.interval_seconds, 5);
        assert_eq!(config.namespace, "seldon-mesh");
    }
}
