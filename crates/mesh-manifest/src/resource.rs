//! Resource documents.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ManifestError;
use crate::validate::{validate_memory, validate_name};
use crate::{API_VERSION, DEFAULT_STORAGE_URI};

/// Mesh custom resource kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Server,
    Model,
    Pipeline,
    Experiment,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Server,
        ResourceKind::Model,
        ResourceKind::Pipeline,
        ResourceKind::Experiment,
    ];

    /// `kind:` field value
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceKind::Server => "Server",
            ResourceKind::Model => "Model",
            ResourceKind::Pipeline => "Pipeline",
            ResourceKind::Experiment => "Experiment",
        }
    }

    /// Singular resource name as accepted by `kubectl get`
    pub fn cli_name(&self) -> &'static str {
        match self {
            ResourceKind::Server => "server",
            ResourceKind::Model => "model",
            ResourceKind::Pipeline => "pipeline",
            ResourceKind::Experiment => "experiment",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::Server => "servers",
            ResourceKind::Model => "models",
            ResourceKind::Pipeline => "pipelines",
            ResourceKind::Experiment => "experiments",
        }
    }

    /// Name of the CustomResourceDefinition, e.g. `models.mlops.seldon.io`
    pub fn crd_name(&self) -> String {
        format!("{}.mlops.seldon.io", self.plural())
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Object metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// A mesh custom resource with a typed spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource<S> {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: S,
}

/// Model spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSpec {
    pub storage_uri: String,
    pub requirements: Vec<String>,
    pub memory: String,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            storage_uri: DEFAULT_STORAGE_URI.to_string(),
            requirements: vec!["sklearn".to_string()],
            memory: "1Gi".to_string(),
        }
    }
}

impl ModelSpec {
    pub fn with_memory(mut self, memory: impl Into<String>) -> Self {
        self.memory = memory.into();
        self
    }

    pub fn with_storage_uri(mut self, uri: impl Into<String>) -> Self {
        self.storage_uri = uri.into();
        self
    }
}

/// Server spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSpec {
    pub replicas: u32,
    pub server_config: String,
}

impl Default for ServerSpec {
    fn default() -> Self {
        Self {
            replicas: 2,
            server_config: "mlserver".to_string(),
        }
    }
}

/// One pipeline step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStep {
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,

    /// Tensor renames: `<source tensor> -> <step tensor>`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tensor_map: BTreeMap<String, String>,
}

impl PipelineStep {
    /// A step fed by the previous step's outputs
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            tensor_map: BTreeMap::new(),
        }
    }

    /// A step reading the pipeline input tensor `tensor` under the same name.
    ///
    /// Produces `inputs: [<pipeline>.inputs.<tensor>]` and
    /// `tensorMap: {<pipeline>.inputs.<tensor>: <tensor>}`.
    pub fn from_pipeline_input(name: impl Into<String>, pipeline: &str, tensor: &str) -> Self {
        let source = format!("{}.inputs.{}", pipeline, tensor);
        let mut tensor_map = BTreeMap::new();
        tensor_map.insert(source.clone(), tensor.to_string());
        Self {
            name: name.into(),
            inputs: vec![source],
            tensor_map,
        }
    }
}

/// Pipeline output selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub steps: Vec<String>,
}

/// Pipeline spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub steps: Vec<PipelineStep>,
    pub output: PipelineOutput,
}

impl PipelineSpec {
    /// Steps in order; output defaults to the last step.
    pub fn new(steps: Vec<PipelineStep>) -> Self {
        let output = steps.last().map(|s| vec![s.name.clone()]).unwrap_or_default();
        Self {
            steps,
            output: PipelineOutput { steps: output },
        }
    }

    pub fn with_output(mut self, steps: Vec<String>) -> Self {
        self.output = PipelineOutput { steps };
        self
    }
}

fn metadata(name: &str, namespace: &str) -> Result<ObjectMeta, ManifestError> {
    validate_name(name)?;
    validate_name(namespace)?;
    Ok(ObjectMeta {
        name: name.to_string(),
        namespace: Some(namespace.to_string()),
        labels: BTreeMap::new(),
    })
}

impl<S: Serialize> Resource<S> {
    fn build(kind: ResourceKind, name: &str, namespace: &str, spec: S) -> Result<Self, ManifestError> {
        Ok(Self {
            api_version: API_VERSION.to_string(),
            kind: kind.kind().to_string(),
            metadata: metadata(name, namespace)?,
            spec,
        })
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Render as a YAML document
    pub fn to_yaml(&self) -> Result<String, ManifestError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

impl Resource<ModelSpec> {
    pub fn model(name: &str, namespace: &str, spec: ModelSpec) -> Result<Self, ManifestError> {
        validate_memory(&spec.memory)?;
        Self::build(ResourceKind::Model, name, namespace, spec)
    }
}

impl Resource<ServerSpec> {
    pub fn server(name: &str, namespace: &str, spec: ServerSpec) -> Result<Self, ManifestError> {
        Self::build(ResourceKind::Server, name, namespace, spec)
    }
}

impl Resource<PipelineSpec> {
    pub fn pipeline(name: &str, namespace: &str, spec: PipelineSpec) -> Result<Self, ManifestError> {
        if spec.steps.is_empty() {
            return Err(ManifestError::EmptyPipeline(name.to_string()));
        }
        for step in &spec.steps {
            validate_name(&step.name)?;
        }
        if let Some(unknown) = spec
            .output
            .steps
            .iter()
            .find(|out| !spec.steps.iter().any(|s| &s.name == *out))
        {
            return Err(ManifestError::UnknownOutputStep {
                pipeline: name.to_string(),
                step: unknown.clone(),
            });
        }
        Self::build(ResourceKind::Pipeline, name, namespace, spec)
    }
}

/// Core v1 Namespace document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceDoc {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
}

impl NamespaceDoc {
    pub fn to_yaml(&self) -> Result<String, ManifestError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// A Namespace, optionally labelled for sidecar injection
pub fn namespace(name: &str, istio_injection: bool) -> Result<NamespaceDoc, ManifestError> {
    validate_name(name)?;
    let mut labels = BTreeMap::new();
    if istio_injection {
        labels.insert("istio-injection".to_string(), "enabled".to_string());
    }
    Ok(NamespaceDoc {
        api_version: "v1".to_string(),
        kind: "Namespace".to_string(),
        metadata: ObjectMeta {
            name: name.to_string(),
            namespace: None,
            labels,
        },
    })
}
