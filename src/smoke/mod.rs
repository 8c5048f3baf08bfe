//! Single-namespace smoke flow
//!
//! Creates (or reuses) a namespace with sidecar injection, brings up one
//! MLServer and one iris model in it, calls the model through the gateway
//! with virtual-host routing, then shows pods and model logs. The namespace
//! is deleted afterwards only when asked.

use mesh_manifest::{namespace, ModelSpec, Resource, ResourceKind, ServerSpec};
use tracing::warn;

use crate::cluster::{StatusRule, StatusTokens};
use crate::context::{GatewaySource, RunContext};
use crate::inference::{InferenceResult, MODEL_SAMPLE, Target};
use crate::poll::{PollResult, ResourceOutcome};

/// Namespace used when none is given
pub const SMOKE_NAMESPACE: &str = "chatbot-test";

pub const SMOKE_SERVER: &str = "test-mlserver";
pub const SMOKE_MODEL: &str = "test-intent-classifier";
pub const SMOKE_MODEL_MEMORY: &str = "500Mi";

const SERVER_ATTEMPTS: u32 = 30;
const MODEL_ATTEMPTS: u32 = 60;
const LOG_TAIL: u32 = 20;

/// What the smoke flow observed
#[derive(Debug, Clone, Default)]
pub struct SmokeOutcome {
    pub namespace_ready: bool,
    pub server: Option<PollResult>,
    pub model: Option<PollResult>,
    /// None when there was no gateway address to call
    pub inference: Option<InferenceResult>,
    pub cleaned_up: bool,
}

impl SmokeOutcome {
    /// Model ready and answered an inference call
    pub fn passed(&self) -> bool {
        let model_ready = self
            .model
            .as_ref()
            .is_some_and(|m| m.outcome == ResourceOutcome::Ready);
        let inferred = self.inference.as_ref().is_some_and(|i| i.success);
        model_ready && inferred
    }
}

/// `<namespace>.inference.seldon.test`
pub fn virtual_host(namespace: &str) -> String {
    format!("{}.inference.seldon.test", namespace)
}

pub struct SmokeTest<'a> {
    ctx: &'a RunContext,
    cleanup: bool,
    tokens: StatusTokens,
}

impl<'a> SmokeTest<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self {
            ctx,
            cleanup: false,
            tokens: StatusTokens::default(),
        }
    }

    /// Delete the namespace at the end
    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn run(&self) -> SmokeOutcome {
        let console = &self.ctx.console;
        let ns = self.ctx.namespace();
        let mut outcome = SmokeOutcome::default();

        console.info("Creating test namespace...");
        outcome.namespace_ready = self.create_namespace();
        if !outcome.namespace_ready {
            return outcome;
        }

        console.info("Checking Istio gateway...");
        let (endpoint, source) = self.ctx.resolve_gateway();

        console.info("Deploying MLServer...");
        let server = match Resource::server(SMOKE_SERVER, ns, ServerSpec::default()) {
            Ok(server) => server,
            Err(e) => {
                console.error(format!("Invalid server manifest: {}", e));
                return outcome;
            }
        };
        if !self.apply(server.to_yaml(), "server") {
            return outcome;
        }
        console.info("Waiting for server to be ready...");
        let result = self.wait(ResourceKind::Server, SMOKE_SERVER, SERVER_ATTEMPTS);
        console.outcome(
            result.outcome == ResourceOutcome::Ready,
            format!("Server {}: {}", SMOKE_SERVER, result.outcome),
        );
        outcome.server = Some(result);

        console.info("Deploying test model...");
        let model = match Resource::model(
            SMOKE_MODEL,
            ns,
            ModelSpec::default().with_memory(SMOKE_MODEL_MEMORY),
        ) {
            Ok(model) => model,
            Err(e) => {
                console.error(format!("Invalid model manifest: {}", e));
                return outcome;
            }
        };
        if !self.apply(model.to_yaml(), "model") {
            return outcome;
        }
        console.info("Waiting for model to be ready...");
        let result = self.wait(ResourceKind::Model, SMOKE_MODEL, MODEL_ATTEMPTS);
        console.outcome(
            result.outcome == ResourceOutcome::Ready,
            format!("Model {}: {}", SMOKE_MODEL, result.outcome),
        );
        outcome.model = Some(result);

        console.info("Checking pods...");
        match self.ctx.kubectl.pods(ns) {
            Ok(pods) => console.raw(pods.trim_end()),
            Err(e) => console.warn(format!("Could not list pods: {}", e)),
        }

        if source == GatewaySource::Fallback {
            console.warn("No gateway address; skipping inference");
        } else {
            console.info("Testing inference...");
            let client = self.ctx.client(endpoint.with_host_header(virtual_host(ns)));
            let result = client.infer_with(&Target::Model(SMOKE_MODEL.to_string()), MODEL_SAMPLE);
            if result.success {
                console.success("Inference successful!");
                if let Some(body) = result.body.as_ref() {
                    console.raw(serde_json::to_string_pretty(body).unwrap_or_default());
                }
            } else {
                console.error(format!("Inference failed: {}", result.describe()));
            }
            outcome.inference = Some(result);
        }

        console.info("Checking model logs...");
        let selector = format!("model.seldon.io/name={}", SMOKE_MODEL);
        match self.ctx.kubectl.logs(ns, &selector, LOG_TAIL) {
            Ok(logs) => console.raw(logs.trim_end()),
            Err(e) => console.warn(format!("Could not read logs: {}", e)),
        }

        if self.cleanup {
            console.info("Cleaning up...");
            match self.ctx.kubectl.delete_namespace(ns) {
                Ok(()) => outcome.cleaned_up = true,
                Err(e) => console.error(format!("Cleanup failed: {}", e)),
            }
        } else {
            console.info(format!("Resources preserved in namespace: {}", ns));
        }

        outcome
    }

    /// Apply the Namespace document, then make sure the injection label is set
    fn create_namespace(&self) -> bool {
        let ns = self.ctx.namespace();
        let doc = match namespace(ns, true).and_then(|d| d.to_yaml()) {
            Ok(doc) => doc,
            Err(e) => {
                self.ctx.console.error(format!("Invalid namespace {}: {}", ns, e));
                return false;
            }
        };
        if let Err(e) = self.ctx.kubectl.apply(&doc) {
            self.ctx
                .console
                .error(format!("Failed to create namespace {}: {}", ns, e));
            return false;
        }
        if let Err(e) = self.ctx.kubectl.label_namespace(ns, "istio-injection", "enabled") {
            warn!(namespace = ns, error = %e, "could not label namespace");
        }
        true
    }

    fn apply(
        &self,
        manifest: Result<String, mesh_manifest::ManifestError>,
        what: &str,
    ) -> bool {
        let applied = manifest
            .map_err(|e| e.to_string())
            .and_then(|yaml| self.ctx.kubectl.apply(&yaml).map_err(|e| e.to_string()));
        match applied {
            Ok(_) => true,
            Err(e) => {
                self.ctx
                    .console
                    .error(format!("Failed to create {}: {}", what, e));
                false
            }
        }
    }

    fn wait(&self, kind: ResourceKind, name: &str, attempts: u32) -> PollResult {
        match self.ctx.check(kind, name, attempts) {
            Ok(check) => self.ctx.kubectl.poll_resource(
                &check,
                StatusRule::State,
                &self.tokens,
                self.ctx.sleeper.as_ref(),
            ),
            Err(e) => PollResult {
                outcome: ResourceOutcome::TimedOut,
                attempts: 0,
                query_failures: 0,
                last_status: None,
                raw: None,
                last_error: Some(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::CommandOutput;
    use crate::config::SmokeConfig;
    use crate::console::Console;
    use crate::mock::{RecordingSleeper, ScriptedRunner, ScriptedTransport};
    use std::sync::Arc;

    fn context(runner: &Arc<ScriptedRunner>, transport: &Arc<ScriptedTransport>) -> RunContext {
        let mut settings = SmokeConfig::default();
        settings.namespace = SMOKE_NAMESPACE.to_string();
        RunContext::new(
            settings,
            runner.clone(),
            transport.clone(),
            Arc::new(RecordingSleeper::new()),
            Console::captured(),
        )
    }

    fn happy_runner() -> Arc<ScriptedRunner> {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("apply -f -", CommandOutput::ok("configured"));
        runner.respond(
            "label namespace chatbot-test istio-injection=enabled --overwrite",
            CommandOutput::ok(""),
        );
        runner.respond(
            "get svc istio-ingressgateway -n istio-system -o json",
            CommandOutput::ok(r#"{"status":{"loadBalancer":{"ingress":[{"ip":"34.90.187.46"}]}}}"#),
        );
        runner.respond(
            "get server test-mlserver -n chatbot-test -o json",
            CommandOutput::ok(r#"{"status":{"state":"Ready"}}"#),
        );
        runner.respond(
            "get model test-intent-classifier -n chatbot-test -o json",
            CommandOutput::ok(r#"{"status":{"state":"Ready"}}"#),
        );
        runner.respond("get pods -n chatbot-test", CommandOutput::ok("NAME READY\n"));
        runner.respond(
            "logs -n chatbot-test -l model.seldon.io/name=test-intent-classifier --tail=20",
            CommandOutput::ok("loaded model\n"),
        );
        runner
    }

    #[test]
    fn test_happy_path() {
        let runner = happy_runner();
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(SMOKE_MODEL, 200, r#"{"outputs":[{"data":[0]}]}"#);
        let ctx = context(&runner, &transport);

        let outcome = SmokeTest::new(&ctx).run();

        assert!(outcome.passed());
        assert!(!outcome.cleaned_up);
        let request = &transport.requests()[0];
        assert_eq!(request.header("Host"), Some("chatbot-test.inference.seldon.test"));
        assert_eq!(request.url, "http://34.90.187.46:80/v2/models/test-intent-classifier/infer");
        assert_eq!(runner.count_calls("delete"), 0);
    }

    #[test]
    fn test_cleanup_deletes_namespace() {
        let runner = happy_runner();
        runner.respond("delete namespace chatbot-test", CommandOutput::ok(""));
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(SMOKE_MODEL, 200, "{}");
        let ctx = context(&runner, &transport);

        let outcome = SmokeTest::new(&ctx).with_cleanup(true).run();
        assert!(outcome.cleaned_up);
    }

    #[test]
    fn test_apply_failure_stops_early() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("apply -f -", CommandOutput::failed(1, "forbidden"));
        let transport = Arc::new(ScriptedTransport::new());
        let ctx = context(&runner, &transport);

        let outcome = SmokeTest::new(&ctx).run();
        assert!(!outcome.namespace_ready);
        assert!(outcome.server.is_none());
        assert!(!outcome.passed());
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_no_gateway_skips_inference() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("apply -f -", CommandOutput::ok(""));
        runner.respond(
            "get model test-intent-classifier -n chatbot-test -o json",
            CommandOutput::ok(r#"{"status":{"state":"Ready"}}"#),
        );
        let transport = Arc::new(ScriptedTransport::new());
        let ctx = context(&runner, &transport);

        let outcome = SmokeTest::new(&ctx).run();
        assert!(outcome.inference.is_none());
        assert!(transport.requests().is_empty());
        assert!(!outcome.passed());
    }
}
