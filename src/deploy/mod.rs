//! Deployer
//!
//! Creates the configured models and pipelines. Models already present in
//! the namespace are left alone and count as deployed. Every other model is
//! applied and then polled until ready, failed or out of attempts.
//! Pipelines are applied and, when `deploy.wait_for_pipelines` is set,
//! polled the same way.

use std::fs;
use std::path::{Path, PathBuf};

use mesh_manifest::{
    ManifestError, ModelSpec, PipelineSpec, PipelineStep, Resource, ResourceKind,
};
use mesh_report::{DeploymentRecord, DeploymentState, TestReport};
use tracing::{info, warn};

use crate::cluster::{StatusRule, StatusTokens};
use crate::config::{ModelDeployment, PipelineDeployment};
use crate::context::RunContext;

/// Label applied to everything the deployer creates
pub const APP_LABEL: &str = "chatbot-platform";

/// Counts from one deploy pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployTally {
    pub deployed: usize,
    pub total: usize,
}

impl DeployTally {
    fn add(&mut self, record: &DeploymentRecord) {
        self.total += 1;
        if record.state.is_success() {
            self.deployed += 1;
        }
    }
}

/// Report key for a deployed resource, e.g. `model/iris`
pub fn deployment_key(kind: ResourceKind, name: &str) -> String {
    format!("{}/{}", kind.cli_name(), name)
}

/// Model manifest with the platform labels
pub fn render_model(
    name: &str,
    namespace: &str,
    memory: &str,
    storage_uri: &str,
) -> Result<Resource<ModelSpec>, ManifestError> {
    let spec = ModelSpec::default()
        .with_memory(memory)
        .with_storage_uri(storage_uri);
    Ok(Resource::model(name, namespace, spec)?
        .with_label("app", APP_LABEL)
        .with_label("component", name)
        .with_label("version", "v1"))
}

/// Pipeline manifest: the first step takes the pipeline input directly,
/// later steps read the input tensor through a tensor map
pub fn render_pipeline(
    pipeline: &PipelineDeployment,
    namespace: &str,
) -> Result<Resource<PipelineSpec>, ManifestError> {
    let steps = pipeline
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            if i == 0 {
                PipelineStep::new(step.clone())
            } else {
                PipelineStep::from_pipeline_input(step.clone(), &pipeline.name, &pipeline.input_tensor)
            }
        })
        .collect();
    let mut spec = PipelineSpec::new(steps);
    if let Some(ref output) = pipeline.output {
        spec = spec.with_output(vec![output.clone()]);
    }
    Ok(Resource::pipeline(&pipeline.name, namespace, spec)?.with_label("app", APP_LABEL))
}

pub struct Deployer<'a> {
    ctx: &'a RunContext,
    manifest_dir: Option<PathBuf>,
    tokens: StatusTokens,
}

impl<'a> Deployer<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self {
            ctx,
            manifest_dir: None,
            tokens: StatusTokens::default(),
        }
    }

    /// Also write each rendered manifest to `<dir>/<name>.yaml`
    pub fn with_manifest_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.manifest_dir = dir;
        self
    }

    /// Deploy configured models, then pipelines
    pub fn deploy_all(&self, report: &mut TestReport) -> (DeployTally, DeployTally) {
        let deploy = &self.ctx.settings.deploy;
        self.ctx.console.info("Deploying chatbot components...");
        let models = self.deploy_models(report, &deploy.models);
        let pipelines = self.deploy_pipelines(report, &deploy.pipelines);
        (models, pipelines)
    }

    /// Names of models already in the namespace; empty when listing fails
    pub fn existing_models(&self) -> Vec<String> {
        match self
            .ctx
            .kubectl
            .list_names(ResourceKind::Model.plural(), self.ctx.namespace())
        {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "could not list existing models");
                self.ctx
                    .console
                    .warn(format!("Could not list existing models: {}", e));
                Vec::new()
            }
        }
    }

    pub fn deploy_models(&self, report: &mut TestReport, models: &[ModelDeployment]) -> DeployTally {
        let existing = self.existing_models();
        let mut tally = DeployTally::default();

        for model in models {
            let record = if existing.iter().any(|name| name == &model.name) {
                self.ctx
                    .console
                    .info(format!("Model {} already exists", model.name));
                DeploymentRecord::without_poll(DeploymentState::Existing)
            } else {
                self.deploy_model(model)
            };
            tally.add(&record);
            report.record_deployment(deployment_key(ResourceKind::Model, &model.name), record);
        }

        self.ctx.console.outcome(
            tally.deployed == tally.total,
            format!("Deployed {}/{} models", tally.deployed, tally.total),
        );
        tally
    }

    /// Apply and poll one model
    pub fn deploy_model(&self, model: &ModelDeployment) -> DeploymentRecord {
        let console = &self.ctx.console;
        let rendered = render_model(
            &model.name,
            self.ctx.namespace(),
            &model.memory,
            &self.ctx.settings.deploy.storage_uri,
        )
        .and_then(|r| r.to_yaml());
        let manifest = match rendered {
            Ok(yaml) => yaml,
            Err(e) => {
                console.error(format!("Invalid model {}: {}", model.name, e));
                return DeploymentRecord::without_poll(DeploymentState::ApplyFailed)
                    .with_detail(e.to_string());
            }
        };

        console.info(format!("Deploying {}...", model.name));
        if let Err(record) = self.apply(&model.name, &manifest) {
            return record;
        }

        console.info(format!("Waiting for {} to be ready...", model.name));
        let check = match self.ctx.check(
            ResourceKind::Model,
            &model.name,
            self.ctx.settings.poll.max_attempts,
        ) {
            Ok(check) => check,
            Err(e) => {
                return DeploymentRecord::without_poll(DeploymentState::Applied)
                    .with_detail(e.to_string())
            }
        };
        let result = self.ctx.kubectl.poll_resource(
            &check,
            StatusRule::State,
            &self.tokens,
            self.ctx.sleeper.as_ref(),
        );
        info!(model = %model.name, outcome = %result.outcome, attempts = result.attempts, "model poll finished");

        let record = result.to_record();
        match record.state {
            DeploymentState::Ready => console.success(format!("{} is ready", model.name)),
            DeploymentState::Failed => console.error(format!("{} failed", model.name)),
            _ => console.warn(format!("{} deployment timeout", model.name)),
        }
        record
    }

    pub fn deploy_pipelines(
        &self,
        report: &mut TestReport,
        pipelines: &[PipelineDeployment],
    ) -> DeployTally {
        let mut tally = DeployTally::default();
        for pipeline in pipelines {
            let record = self.deploy_pipeline(pipeline);
            self.ctx.console.outcome(
                record.state.is_success(),
                format!("Pipeline {} {}", pipeline.name, describe(record.state)),
            );
            tally.add(&record);
            report.record_deployment(deployment_key(ResourceKind::Pipeline, &pipeline.name), record);
        }
        tally
    }

    pub fn deploy_pipeline(&self, pipeline: &PipelineDeployment) -> DeploymentRecord {
        let manifest = match render_pipeline(pipeline, self.ctx.namespace()).and_then(|r| r.to_yaml()) {
            Ok(yaml) => yaml,
            Err(e) => {
                return DeploymentRecord::without_poll(DeploymentState::ApplyFailed)
                    .with_detail(e.to_string())
            }
        };

        self.ctx
            .console
            .info(format!("Deploying pipeline {}...", pipeline.name));
        if let Err(record) = self.apply(&pipeline.name, &manifest) {
            return record;
        }
        if !self.ctx.settings.deploy.wait_for_pipelines {
            return DeploymentRecord::without_poll(DeploymentState::Applied);
        }

        match self.ctx.check(
            ResourceKind::Pipeline,
            &pipeline.name,
            self.ctx.settings.poll.max_attempts,
        ) {
            Ok(check) => self
                .ctx
                .kubectl
                .poll_resource(
                    &check,
                    StatusRule::ReadyCondition,
                    &self.tokens,
                    self.ctx.sleeper.as_ref(),
                )
                .to_record(),
            Err(e) => DeploymentRecord::without_poll(DeploymentState::Applied)
                .with_detail(e.to_string()),
        }
    }

    /// Write the manifest if asked to, then `kubectl apply` it
    fn apply(&self, name: &str, manifest: &str) -> Result<(), DeploymentRecord> {
        if let Some(ref dir) = self.manifest_dir {
            if let Err(e) = write_manifest(dir, name, manifest) {
                warn!(name, error = %e, "could not write manifest");
            }
        }
        self.ctx.kubectl.apply(manifest).map(|_| ()).map_err(|e| {
            self.ctx
                .console
                .error(format!("Failed to deploy {}: {}", name, e));
            DeploymentRecord::without_poll(DeploymentState::ApplyFailed).with_detail(e.to_string())
        })
    }
}

fn write_manifest(dir: &Path, name: &str, manifest: &str) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join(format!("{}.yaml", name)), manifest)
}

fn describe(state: DeploymentState) -> &'static str {
    match state {
        DeploymentState::Ready => "ready",
        DeploymentState::Applied | DeploymentState::Existing => "deployed",
        DeploymentState::TimedOut => "timed out",
        DeploymentState::Failed | DeploymentState::ApplyFailed => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::CommandOutput;
    use crate::config::SmokeConfig;
    use crate::console::Console;
    use crate::mock::{RecordingSleeper, ScriptedRunner, ScriptedTransport};
    use mesh_report::Category;
    use std::sync::Arc;

    fn context(runner: &Arc<ScriptedRunner>) -> RunContext {
        let mut settings = SmokeConfig::default();
        settings.poll.max_attempts = 3;
        RunContext::new(
            settings,
            runner.clone(),
            Arc::new(ScriptedTransport::new()),
            Arc::new(RecordingSleeper::new()),
            Console::captured(),
        )
    }

    fn model(name: &str, memory: &str) -> ModelDeployment {
        ModelDeployment {
            name: name.to_string(),
            memory: memory.to_string(),
        }
    }

    #[test]
    fn test_render_model_labels() {
        let yaml = render_model("intent-classifier-v1", "seldon-mesh", "500Mi", "gs://bucket/iris")
            .unwrap()
            .to_yaml()
            .unwrap();
        assert!(yaml.contains("app: chatbot-platform"));
        assert!(yaml.contains("component: intent-classifier-v1"));
        assert!(yaml.contains("version: v1"));
        assert!(yaml.contains("memory: 500Mi"));
        assert!(yaml.contains("storageUri: gs://bucket/iris"));
    }

    #[test]
    fn test_render_pipeline_steps() {
        let pipeline = SmokeConfig::default().deploy.pipelines[0].clone();
        let resource = render_pipeline(&pipeline, "seldon-mesh").unwrap();

        let steps = &resource.spec.steps;
        assert_eq!(steps.len(), 3);
        assert!(steps[0].inputs.is_empty());
        assert_eq!(steps[1].inputs, vec!["instant-chatbot.inputs.text"]);
        assert_eq!(
            steps[2].tensor_map.get("instant-chatbot.inputs.text").map(String::as_str),
            Some("text")
        );
        assert_eq!(resource.spec.output.steps, vec!["product-recommender"]);
    }

    #[test]
    fn test_existing_model_is_not_applied_or_polled() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond(
            "get models -n seldon-mesh -o json",
            CommandOutput::ok(r#"{"items":[{"metadata":{"name":"intent-classifier-v1"}}]}"#),
        );
        let ctx = context(&runner);
        let mut report = TestReport::new("run", "seldon-mesh");

        let tally = Deployer::new(&ctx)
            .deploy_models(&mut report, &[model("intent-classifier-v1", "500Mi")]);

        assert_eq!(tally, DeployTally { deployed: 1, total: 1 });
        assert_eq!(runner.count_calls("apply"), 0);
        assert_eq!(runner.count_calls("get model "), 0);
        assert!(report
            .get(Category::Deployments, "model/intent-classifier-v1")
            .unwrap()
            .is_success());
    }

    #[test]
    fn test_new_model_applied_then_polled() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("get models -n seldon-mesh -o json", CommandOutput::ok(r#"{"items":[]}"#));
        runner.respond("apply -f -", CommandOutput::ok("model created"));
        runner.respond_sequence(
            "get model entity-extractor -n seldon-mesh -o json",
            vec![
                CommandOutput::ok(r#"{"status":{"state":"ModelProgressing"}}"#),
                CommandOutput::ok(r#"{"status":{"state":"ModelReady"}}"#),
            ],
        );
        let ctx = context(&runner);

        let record = Deployer::new(&ctx).deploy_model(&model("entity-extractor", "1Gi"));
        assert_eq!(record.state, DeploymentState::Ready);
        assert_eq!(record.attempts, 2);
        assert_eq!(runner.count_calls("apply -f -"), 1);
    }

    #[test]
    fn test_apply_failure_skips_poll() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("apply -f -", CommandOutput::failed(1, "forbidden"));
        let ctx = context(&runner);

        let record = Deployer::new(&ctx).deploy_model(&model("entity-extractor", "1Gi"));
        assert_eq!(record.state, DeploymentState::ApplyFailed);
        assert!(record.detail.unwrap().contains("forbidden"));
        assert_eq!(runner.count_calls("get model "), 0);
    }

    #[test]
    fn test_listing_failure_deploys_everything() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.time_out("get models -n seldon-mesh -o json");
        runner.respond("apply -f -", CommandOutput::ok(""));
        runner.respond(
            "get model iris -n seldon-mesh -o json",
            CommandOutput::ok(r#"{"status":{"state":"ModelFailed"}}"#),
        );
        let ctx = context(&runner);
        let mut report = TestReport::new("run", "seldon-mesh");

        let tally = Deployer::new(&ctx).deploy_models(&mut report, &[model("iris", "1Gi")]);
        assert_eq!(tally, DeployTally { deployed: 0, total: 1 });
        assert_eq!(runner.count_calls("apply"), 1);
    }

    #[test]
    fn test_pipelines_apply_only_by_default() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("apply -f -", CommandOutput::ok("pipeline created"));
        let ctx = context(&runner);
        let mut report = TestReport::new("run", "seldon-mesh");
        let pipelines = ctx.settings.deploy.pipelines.clone();

        let tally = Deployer::new(&ctx).deploy_pipelines(&mut report, &pipelines);
        assert_eq!(tally, DeployTally { deployed: 2, total: 2 });
        assert_eq!(runner.count_calls("get pipeline"), 0);
    }

    #[test]
    fn test_manifest_dir_receives_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("apply -f -", CommandOutput::ok(""));
        let ctx = context(&runner);
        let pipeline = ctx.settings.deploy.pipelines[0].clone();

        Deployer::new(&ctx)
            .with_manifest_dir(Some(dir.path().to_path_buf()))
            .deploy_pipeline(&pipeline);

        let written = fs::read_to_string(dir.path().join("instant-chatbot.yaml")).unwrap();
        assert!(written.contains("kind: Pipeline"));
    }
}
