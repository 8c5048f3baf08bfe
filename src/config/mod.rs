//! Configuration merge system
//!
//! Four layers, later ones win:
//! 1. Built-in defaults
//! 2. User config (~/.config/mesh-smoke/config.toml)
//! 3. Project config (mesh-smoke.toml, or --config)
//! 4. CLI flags

mod defaults;
mod effective;
mod merge;

pub use defaults::{
    ComponentGroup, DeployConfig, GatewayConfig, KubectlConfig, ModelDeployment,
    PerformanceConfig, PipelineDeployment, PollConfig, ReportConfig, SmokeConfig, SuiteConfig,
    VerdictConfig,
};
pub use effective::{
    user_config_path, ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig,
    PROJECT_CONFIG_FILE,
};
pub use merge::{deep_merge, merge_layers, set_path};
