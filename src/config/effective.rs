//! Effective configuration with provenance
//!
//! The merged document plus where each layer came from. The typed
//! [`SmokeConfig`] is deserialized from the merged document before secret
//! redaction; the redacted document is what gets printed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use mesh_manifest::{validate_memory, validate_name};

use super::defaults::SmokeConfig;
use super::merge::merge_layers;

/// Schema version for effective_config
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "mesh-smoke/effective_config@1";

/// Project config file looked up in the working directory
pub const PROJECT_CONFIG_FILE: &str = "mesh-smoke.toml";

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    User,
    Project,
    Cli,
}

/// A contributing config source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Merged configuration with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub schema_version: u32,
    pub schema_id: String,
    pub created_at: DateTime<Utc>,

    /// Merged document, secrets redacted
    pub config: Value,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,

    /// Redacted key paths
    pub redactions: Vec<String>,

    #[serde(skip)]
    settings: SmokeConfig,
}

/// Keys that contain secrets and should be redacted
const SECRET_KEYS: &[&str] = &[
    "password",
    "token",
    "secret",
    "private_key",
    "api_key",
    "credential",
];

/// `~/.config/mesh-smoke/config.toml`, when HOME is set
pub fn user_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".config/mesh-smoke/config.toml"))
}

impl EffectiveConfig {
    /// Merge builtin defaults, user file, project file and CLI overrides.
    ///
    /// Missing files are skipped; unreadable or malformed ones are errors.
    pub fn build(
        user_config_path: Option<&Path>,
        project_config_path: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut layers = vec![SmokeConfig::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        for (origin, path) in [
            (ConfigOrigin::User, user_config_path),
            (ConfigOrigin::Project, project_config_path),
        ] {
            if let Some(path) = path.filter(|p| p.exists()) {
                let (value, digest) = Self::load_toml_file(path)?;
                layers.push(value);
                sources.push(ConfigSource {
                    origin,
                    path: Some(path.to_string_lossy().to_string()),
                    digest: Some(digest),
                });
            }
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let mut merged = merge_layers(layers);
        let settings: SmokeConfig = serde_json::from_value(merged.clone())
            .map_err(|e| ConfigError::ParseError(format!("invalid settings: {}", e)))?;
        validate_settings(&settings)?;

        let redactions = Self::redact_secrets(&mut merged);

        Ok(Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            config: merged,
            sources,
            redactions,
            settings,
        })
    }

    /// Typed view of the merged configuration
    pub fn settings(&self) -> &SmokeConfig {
        &self.settings
    }

    fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
        let bytes = fs::read(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let digest = hex::encode(Sha256::digest(&bytes));

        let contents = String::from_utf8(bytes)
            .map_err(|e| ConfigError::ParseError(format!("{}: invalid UTF-8: {}", path.display(), e)))?;

        let toml_value: toml::Value = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;

        Ok((toml_to_json(toml_value), digest))
    }

    fn redact_secrets(value: &mut Value) -> Vec<String> {
        let mut redactions = Vec::new();
        redact_recursive(value, String::new(), &mut redactions);
        redactions
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Get a config value by dot-separated path
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.config;
        for part in path.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(|v| v.as_u64())
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str())
    }
}

fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

fn redact_recursive(value: &mut Value, path: String, redactions: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let current_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                let key_lower = key.to_lowercase();
                let is_secret = SECRET_KEYS.iter().any(|s| key_lower.contains(s));

                if is_secret && !val.is_object() && !val.is_array() {
                    *val = Value::String("[REDACTED]".to_string());
                    redactions.push(current_path);
                } else {
                    redact_recursive(val, current_path, redactions);
                }
            }
        }
        Value::Array(arr) => {
            for (i, val) in arr.iter_mut().enumerate() {
                redact_recursive(val, format!("{}[{}]", path, i), redactions);
            }
        }
        _ => {}
    }
}

fn check_range(name: &str, value: u64, max: u64) -> Result<(), ConfigError> {
    if value == 0 || value > max {
        return Err(ConfigError::ValidationError(format!(
            "{} must be in (0, {}]",
            name, max
        )));
    }
    Ok(())
}

fn validate_settings(settings: &SmokeConfig) -> Result<(), ConfigError> {
    check_range("poll.interval_seconds", settings.poll.interval_seconds, 600)?;
    check_range("poll.max_attempts", u64::from(settings.poll.max_attempts), 10_000)?;
    check_range("kubectl.timeout_seconds", settings.kubectl.timeout_seconds, 600)?;
    check_range("gateway.timeout_seconds", settings.gateway.timeout_seconds, 600)?;

    if settings.performance.requests == 0 {
        return Err(ConfigError::ValidationError(
            "performance.requests must be greater than 0".to_string(),
        ));
    }

    let rate = settings.verdict.min_infrastructure_pass_rate;
    if !(0.0..=1.0).contains(&rate) {
        return Err(ConfigError::ValidationError(
            "verdict.min_infrastructure_pass_rate must be in [0, 1]".to_string(),
        ));
    }

    validate_name(&settings.namespace)
        .map_err(|e| ConfigError::ValidationError(format!("namespace: {}", e)))?;

    for model in &settings.deploy.models {
        validate_name(&model.name)
            .and_then(|_| validate_memory(&model.memory))
            .map_err(|e| ConfigError::ValidationError(format!("deploy.models: {}", e)))?;
    }
    for pipeline in &settings.deploy.pipelines {
        if pipeline.steps.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "deploy.pipelines: {} has no steps",
                pipeline.name
            )));
        }
    }

    Ok(())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
