//! Seldon Core 2 Manifests
//!
//! Typed declarative documents for the resources the smoke tooling applies:
//! `Model`, `Pipeline` and `Server` under `mlops.seldon.io/v1alpha1`, plus
//! the core `Namespace` used by the single-namespace smoke flow. Documents
//! are rendered to YAML and piped to `kubectl apply -f -`.

pub mod error;
pub mod resource;
pub mod validate;

pub use error::ManifestError;
pub use resource::{
    namespace, ModelSpec, NamespaceDoc, ObjectMeta, PipelineOutput, PipelineSpec, PipelineStep,
    Resource, ResourceKind, ServerSpec,
};
pub use validate::{validate_memory, validate_name};

/// API group/version for mesh custom resources.
pub const API_VERSION: &str = "mlops.seldon.io/v1alpha1";

/// Default storage URI for the sample sklearn iris artifact.
pub const DEFAULT_STORAGE_URI: &str =
    "gs://seldon-models/scv2/samples/mlserver_1.5.0/iris-sklearn";
