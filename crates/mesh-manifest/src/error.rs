//! Manifest errors.

/// Errors raised while building or rendering a manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("invalid resource name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("invalid memory quantity '{0}'")]
    InvalidMemory(String),

    #[error("pipeline '{0}' has no steps")]
    EmptyPipeline(String),

    #[error("pipeline '{pipeline}' output references unknown step '{step}'")]
    UnknownOutputStep { pipeline: String, step: String },

    #[error("YAML rendering failed: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
