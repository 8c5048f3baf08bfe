//! Test fixtures: recorded kubectl JSON documents and gateway responses

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mesh_smoke::cluster::CommandOutput;
use mesh_smoke::config::SmokeConfig;
use mesh_smoke::mock::{RecordingSleeper, ScriptedRunner, ScriptedTransport};
use mesh_smoke::{Console, RunContext};

pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Fixture file contents
pub fn load(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name))
        .unwrap_or_else(|e| panic!("missing fixture {}: {}", name, e))
}

/// Exit-0 kubectl output carrying a fixture
pub fn ok(name: &str) -> CommandOutput {
    CommandOutput::ok(load(name))
}

pub struct Harness {
    pub runner: Arc<ScriptedRunner>,
    pub transport: Arc<ScriptedTransport>,
    pub sleeper: Arc<RecordingSleeper>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            runner: Arc::new(ScriptedRunner::new()),
            transport: Arc::new(ScriptedTransport::new()),
            sleeper: Arc::new(RecordingSleeper::new()),
        }
    }

    pub fn context(&self, settings: SmokeConfig) -> RunContext {
        RunContext::new(
            settings,
            self.runner.clone(),
            self.transport.clone(),
            self.sleeper.clone(),
            Console::captured(),
        )
    }

    /// kubectl, all four CRDs, the namespace and istio
    pub fn healthy_cluster(&self, namespace: &str) {
        self.runner
            .respond("version --client -o json", ok("kubectl_version.json"));
        for crd in ["servers", "models", "pipelines", "experiments"] {
            self.runner.respond(
                &format!("get crd {}.mlops.seldon.io", crd),
                CommandOutput::ok(""),
            );
        }
        self.runner
            .respond(&format!("get namespace {}", namespace), CommandOutput::ok(""));
        self.runner
            .respond("get namespace istio-system", CommandOutput::ok(""));
    }

    /// Answer the gateway Service lookup with a fixture
    pub fn gateway(&self, fixture: &str) {
        self.runner.respond(
            "get svc istio-ingressgateway -n istio-system -o json",
            ok(fixture),
        );
    }

    /// Make `kubectl get <kind> <name> -n <ns>` succeed
    pub fn present(&self, kind: &str, name: &str, namespace: &str) {
        self.runner.respond(
            &format!("get {} {} -n {}", kind, name, namespace),
            CommandOutput::ok(""),
        );
    }
}
