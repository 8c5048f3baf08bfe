//! Inference sweep
//!
//! Calls a list of models and reports the success rate. Pipelines are only
//! called when the gate model answered, since a pipeline cannot work when
//! its first step does not.

use mesh_report::{Category, TestReport};

use crate::console::Console;
use crate::inference::{InferenceClient, InferenceResult};

/// Default gate model for the pipeline sweep
pub const DEFAULT_GATE: &str = "feature-transformer";

/// Models swept when none are named
pub const DEFAULT_MODELS: &[&str] = &[
    "iris",
    "sklearn-iris",
    "sklearn-iris-v2",
    "feature-transformer",
    "product-classifier-v1",
    "product-classifier-v2",
    "intent-classifier-v1",
    "entity-extractor",
    "product-recommender",
    "drift-detector",
    "model-explainer",
    "performance-monitor",
];

/// Pipelines swept when none are named
pub const DEFAULT_PIPELINES: &[&str] = &[
    "product-pipeline-v1",
    "product-pipeline-v2",
    "instant-chatbot",
];

/// Results of one sweep
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    pub models: Vec<InferenceResult>,
    /// Empty when the gate model did not work
    pub pipelines: Vec<InferenceResult>,
    pub gate_passed: bool,
}

impl SweepOutcome {
    pub fn working_models(&self) -> Vec<&str> {
        self.models
            .iter()
            .filter(|r| r.success)
            .map(|r| r.target.name())
            .collect()
    }

    pub fn failed_models(&self) -> Vec<&str> {
        self.models
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.target.name())
            .collect()
    }

    /// Percentage of models that answered; 0 for an empty sweep
    pub fn success_rate(&self) -> f64 {
        if self.models.is_empty() {
            return 0.0;
        }
        self.working_models().len() as f64 / self.models.len() as f64 * 100.0
    }

    /// Record into the models and pipelines categories
    pub fn record_into(&self, report: &mut TestReport) {
        for result in &self.models {
            report.record_inference(Category::Models, result.target.name(), result.to_record());
        }
        for result in &self.pipelines {
            report.record_inference(Category::Pipelines, result.target.name(), result.to_record());
        }
    }
}

pub fn sweep(
    client: &InferenceClient,
    console: &Console,
    models: &[String],
    pipelines: &[String],
    gate: &str,
) -> SweepOutcome {
    console.info(format!("Testing inference via {}", client.endpoint().address()));

    let mut outcome = SweepOutcome::default();
    for model in models {
        let result = client.infer_model(model);
        console.outcome(result.success, result.describe());
        outcome.models.push(result);
    }

    console.info(format!(
        "Working models: {}/{} ({:.1}%)",
        outcome.working_models().len(),
        outcome.models.len(),
        outcome.success_rate()
    ));
    let working = outcome.working_models();
    if !working.is_empty() {
        console.success(format!("Working models: {}", working.join(", ")));
    }
    let failed = outcome.failed_models();
    if !failed.is_empty() {
        console.error(format!("Failed models: {}", failed.join(", ")));
    }

    outcome.gate_passed = outcome.working_models().contains(&gate);
    if pipelines.is_empty() {
        return outcome;
    }
    if !outcome.gate_passed {
        console.warn(format!("Gate model {} not working; skipping pipelines", gate));
        return outcome;
    }

    console.info("Testing pipeline inference");
    for pipeline in pipelines {
        let result = client.infer_pipeline(pipeline);
        console.outcome(result.success, result.describe());
        outcome.pipelines.push(result);
    }
    outcome
}
