//! Mesh Smoke - deployment and smoke testing for a Seldon Core 2 mesh
//!
//! Applies model-serving manifests through kubectl, polls their status until
//! they settle, calls them through the inference gateway, and aggregates the
//! outcomes into a JSON test report with a pass/fail verdict.

pub mod cluster;
pub mod config;
pub mod console;
pub mod context;
pub mod deploy;
pub mod inference;
pub mod mock;
pub mod poll;
pub mod smoke;
pub mod suite;
pub mod sweep;

pub use cluster::{ClusterError, CommandRunner, Kubectl, ProcessRunner};
pub use config::{ConfigError, EffectiveConfig, SmokeConfig};
pub use console::Console;
pub use context::{GatewaySource, RunContext};
pub use inference::{GatewayEndpoint, InferenceClient, InferenceResult, Target, Transport};
pub use poll::{poll, PollResult, ResourceCheck, ResourceOutcome, Sleeper};
