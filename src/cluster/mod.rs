//! Cluster access through the kubectl CLI
//!
//! [`Kubectl`] builds kubectl invocations and interprets their output. The
//! actual process execution goes through a [`CommandRunner`] so tests can
//! script responses.

pub mod runner;
pub mod status;

use std::sync::Arc;

use mesh_manifest::ResourceKind;
use serde_json::Value;
use tracing::debug;

pub use runner::{CommandOutput, CommandRunner, Invocation, ProcessRunner, RunnerError};
pub use status::{StatusRule, StatusTokens, Terminal};

/// Cluster access errors
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// The CLI could not be run or did not finish in time
    #[error(transparent)]
    Runner(#[from] RunnerError),

    /// The CLI ran and exited non-zero
    #[error("{command} exited with {code:?}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The CLI succeeded but its output was not the expected JSON
    #[error("could not parse output of {command}: {message}")]
    Parse { command: String, message: String },
}

impl ClusterError {
    /// Short classification for logs and report details
    pub fn kind(&self) -> &'static str {
        match self {
            ClusterError::Runner(RunnerError::Timeout { .. }) => "timeout",
            ClusterError::Runner(_) => "command_error",
            ClusterError::CommandFailed { .. } => "command_failed",
            ClusterError::Parse { .. } => "parse_failure",
        }
    }
}

pub type ClusterResult<T> = Result<T, ClusterError>;

/// kubectl wrapper
pub struct Kubectl {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    context: Option<String>,
}

impl Kubectl {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            binary: "kubectl".to_string(),
            context: None,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    fn invocation(&self, args: &[&str]) -> Invocation {
        let mut full = Vec::with_capacity(args.len() + 2);
        if let Some(ref ctx) = self.context {
            full.push("--context".to_string());
            full.push(ctx.clone());
        }
        full.extend(args.iter().map(|a| a.to_string()));
        Invocation::new(self.binary.clone(), full)
    }

    /// Run and return the output whatever the exit code
    pub fn run_unchecked(&self, args: &[&str]) -> ClusterResult<CommandOutput> {
        Ok(self.runner.run(&self.invocation(args))?)
    }

    /// Run and fail on a non-zero exit code
    pub fn run(&self, args: &[&str]) -> ClusterResult<CommandOutput> {
        let invocation = self.invocation(args);
        let output = self.runner.run(&invocation)?;
        if !output.success() {
            return Err(ClusterError::CommandFailed {
                command: invocation.display(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    fn run_json(&self, args: &[&str]) -> ClusterResult<Value> {
        let output = self.run(args)?;
        serde_json::from_str(&output.stdout).map_err(|e| ClusterError::Parse {
            command: self.invocation(args).display(),
            message: e.to_string(),
        })
    }

    /// `kubectl version --client -o json`
    pub fn client_version(&self) -> ClusterResult<Value> {
        self.run_json(&["version", "--client", "-o", "json"])
    }

    /// `kubectl apply -f -` with the manifest on stdin; returns stdout
    pub fn apply(&self, manifest: &str) -> ClusterResult<String> {
        let invocation = self.invocation(&["apply", "-f", "-"]).with_stdin(manifest);
        let output = self.runner.run(&invocation)?;
        if !output.success() {
            return Err(ClusterError::CommandFailed {
                command: invocation.display(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        debug!(output = %output.stdout.trim(), "applied manifest");
        Ok(output.stdout)
    }

    /// `kubectl get <kind> <name> [-n ns] -o json`
    pub fn get_json(&self, kind: &str, name: &str, namespace: Option<&str>) -> ClusterResult<Value> {
        let mut args = vec!["get", kind, name];
        if let Some(ns) = namespace {
            args.extend(["-n", ns]);
        }
        args.extend(["-o", "json"]);
        self.run_json(&args)
    }

    /// Whether `kubectl get <kind> <name>` succeeds.
    ///
    /// A non-zero exit (not found, forbidden, unknown kind) is `false`; only
    /// a runner failure is an error.
    pub fn exists(&self, kind: &str, name: &str, namespace: Option<&str>) -> ClusterResult<bool> {
        let mut args = vec!["get", kind, name];
        if let Some(ns) = namespace {
            args.extend(["-n", ns]);
        }
        Ok(self.run_unchecked(&args)?.success())
    }

    /// Whether a mesh resource exists in the namespace
    pub fn resource_exists(&self, kind: ResourceKind, name: &str, namespace: &str) -> ClusterResult<bool> {
        self.exists(kind.cli_name(), name, Some(namespace))
    }

    pub fn crd_exists(&self, kind: ResourceKind) -> ClusterResult<bool> {
        self.exists("crd", &kind.crd_name(), None)
    }

    pub fn namespace_exists(&self, namespace: &str) -> ClusterResult<bool> {
        self.exists("namespace", namespace, None)
    }

    /// Names of all resources of `plural` kind in the namespace
    pub fn list_names(&self, plural: &str, namespace: &str) -> ClusterResult<Vec<String>> {
        let list = self.run_json(&["get", plural, "-n", namespace, "-o", "json"])?;
        Ok(item_names(&list))
    }

    /// `kubectl label namespace <ns> key=value --overwrite`
    pub fn label_namespace(&self, namespace: &str, key: &str, value: &str) -> ClusterResult<()> {
        let label = format!("{}={}", key, value);
        self.run(&["label", "namespace", namespace, &label, "--overwrite"])?;
        Ok(())
    }

    /// `kubectl get pods -n <ns>` as printed by kubectl
    pub fn pods(&self, namespace: &str) -> ClusterResult<String> {
        Ok(self.run(&["get", "pods", "-n", namespace])?.stdout)
    }

    /// `kubectl logs -n <ns> -l <selector> --tail=<n>`
    pub fn logs(&self, namespace: &str, selector: &str, tail: u32) -> ClusterResult<String> {
        let tail = format!("--tail={}", tail);
        Ok(self.run(&["logs", "-n", namespace, "-l", selector, &tail])?.stdout)
    }

    pub fn delete_namespace(&self, namespace: &str) -> ClusterResult<()> {
        self.run(&["delete", "namespace", namespace])?;
        Ok(())
    }

    /// External address of a LoadBalancer Service.
    ///
    /// Reads `status.loadBalancer.ingress[0].ip`, falling back to
    /// `hostname`. Ok(None) when the Service has no ingress yet.
    pub fn load_balancer_address(&self, service: &str, namespace: &str) -> ClusterResult<Option<String>> {
        let svc = self.get_json("svc", service, Some(namespace))?;
        Ok(load_balancer_address(&svc))
    }
}

/// `items[].metadata.name` of a List document
pub fn item_names(list: &Value) -> Vec<String> {
    list.get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.pointer("/metadata/name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// First ingress ip (or hostname) of a Service document
pub fn load_balancer_address(service: &Value) -> Option<String> {
    let first = service.pointer("/status/loadBalancer/ingress/0")?;
    first
        .get("ip")
        .and_then(Value::as_str)
        .or_else(|| first.get("hostname").and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
