//! Full test run
//!
//! Phases, in order:
//! 1. Prerequisites: kubectl, mesh CRDs, namespace, Istio, gateway address
//! 2. Servers: `Ready` condition of each configured Server
//! 3. Component groups: inference against every model and pipeline of the
//!    group that exists in the namespace; experiment presence
//! 4. Performance: repeated requests against the first existing candidate
//!
//! Phases 2-4 only run when every prerequisite passed. The report is always
//! written, and the verdict decides the outcome.

use std::path::Path;

use mesh_manifest::ResourceKind;
use mesh_report::{Category, ReportError, Summary, TestReport, Verdict};
use tracing::{info, warn};

use crate::cluster::StatusRule;
use crate::config::ComponentGroup;
use crate::context::RunContext;
use crate::inference::InferenceClient;

/// Result of a full run
#[derive(Debug, Clone)]
pub struct SuiteOutcome {
    pub report: TestReport,
    pub summary: Summary,
    pub verdict: Verdict,
    pub prerequisites_met: bool,
}

pub struct TestSuite<'a> {
    ctx: &'a RunContext,
    run_id: String,
}

impl<'a> TestSuite<'a> {
    pub fn new(ctx: &'a RunContext, run_id: impl Into<String>) -> Self {
        Self {
            ctx,
            run_id: run_id.into(),
        }
    }

    /// Run every phase and write the report to `report_path`
    pub fn run(&self, report_path: &Path) -> Result<SuiteOutcome, ReportError> {
        let console = &self.ctx.console;
        console.info("Starting mesh smoke tests...");

        let mut report = TestReport::new(self.run_id.clone(), self.ctx.namespace());
        let prerequisites_met = self.check_prerequisites(&mut report);

        if prerequisites_met {
            let (endpoint, source) = self.ctx.resolve_gateway();
            info!(gateway = %endpoint.address(), source = ?source, "gateway resolved");
            report.set_gateway(endpoint.address());
            let client = self.ctx.client(endpoint);

            self.check_servers(&mut report);
            for group in &self.ctx.settings.suite.groups {
                self.test_group(&client, group, &mut report);
            }
            self.test_performance(&client, &mut report);
        } else {
            console.error("Prerequisites not met - skipping component tests");
        }

        report.finalize();
        let summary = report.summarize();

        console.info("=== Test Report ===");
        for line in summary.human_lines() {
            console.info(line);
        }

        report.write_to_file(report_path)?;
        console.success(format!("Detailed report saved to {}", report_path.display()));

        let mut verdict = summary.verdict(self.ctx.settings.verdict.min_infrastructure_pass_rate);
        if !prerequisites_met {
            verdict.passed = false;
            verdict.reasons.insert(0, "prerequisites not met".to_string());
        }
        if verdict.passed {
            console.success("Overall: PASSED");
        } else {
            console.error(format!("Overall: FAILED ({})", verdict.reasons.join("; ")));
        }

        Ok(SuiteOutcome {
            report,
            summary,
            verdict,
            prerequisites_met,
        })
    }

    /// Record the infrastructure checks; true when all of them passed
    pub fn check_prerequisites(&self, report: &mut TestReport) -> bool {
        let kubectl = &self.ctx.kubectl;
        let console = &self.ctx.console;
        console.info("Testing prerequisites...");

        let client_ok = match kubectl.client_version() {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "kubectl client check failed");
                false
            }
        };
        console.outcome(client_ok, "kubectl client");
        report.record_check("kubectl", client_ok);

        let crds = &self.ctx.settings.suite.crds;
        let found = crds
            .iter()
            .filter(|kind| self.present(kubectl.crd_exists(**kind), &kind.crd_name()))
            .count();
        console.info(format!("Found {}/{} Seldon CRDs", found, crds.len()));
        report.record_check("seldon_crds", found == crds.len());

        let namespace_ok = self.present(kubectl.namespace_exists(self.ctx.namespace()), "namespace");
        console.outcome(namespace_ok, format!("Namespace {}", self.ctx.namespace()));
        report.record_check("namespace", namespace_ok);

        let istio_ns = &self.ctx.settings.gateway.service_namespace;
        let istio_ok = self.present(kubectl.namespace_exists(istio_ns), "istio namespace");
        console.outcome(istio_ok, format!("Istio namespace {}", istio_ns));
        report.record_check("istio", istio_ok);

        report.infrastructure_ok()
    }

    /// `server_<name>` checks from each Server's Ready condition
    pub fn check_servers(&self, report: &mut TestReport) {
        self.ctx.console.info("Testing servers...");
        for server in &self.ctx.settings.suite.servers {
            let ready = match self.ctx.kubectl.get_json(
                ResourceKind::Server.cli_name(),
                server,
                Some(self.ctx.namespace()),
            ) {
                Ok(doc) => StatusRule::ReadyCondition.extract(&doc).as_deref() == Some("Ready"),
                Err(e) => {
                    warn!(server = %server, error = %e, kind = e.kind(), "server query failed");
                    false
                }
            };
            self.ctx.console.info(format!(
                "Server {}: {}",
                server,
                if ready { "Ready" } else { "Not Ready" }
            ));
            report.record_check(format!("server_{}", server), ready);
        }
    }

    /// Inference against the group's existing models and pipelines
    pub fn test_group(&self, client: &InferenceClient, group: &ComponentGroup, report: &mut TestReport) {
        let console = &self.ctx.console;
        console.info(format!("=== Testing {} components ===", group.name));

        for model in &group.models {
            if !self.exists(ResourceKind::Model, model) {
                continue;
            }
            let result = client.infer_model(model);
            console.outcome(result.success, format!("Model {}", result.describe()));
            report.record_inference(Category::Models, model.clone(), result.to_record());
        }

        for pipeline in &group.pipelines {
            if !self.exists(ResourceKind::Pipeline, pipeline) {
                continue;
            }
            let result = client.infer_pipeline(pipeline);
            console.outcome(result.success, format!("Pipeline {}", result.describe()));
            report.record_inference(Category::Pipelines, pipeline.clone(), result.to_record());
        }

        for experiment in &group.experiments {
            let present = self.exists(ResourceKind::Experiment, experiment);
            console.outcome(present, format!("Experiment {}", experiment));
            report.record_check(format!("experiment_{}", experiment), present);
        }
    }

    /// Repeated requests against the first candidate model that exists
    pub fn test_performance(&self, client: &InferenceClient, report: &mut TestReport) {
        let console = &self.ctx.console;
        console.info("=== Performance testing ===");

        let performance = &self.ctx.settings.performance;
        let target = performance
            .candidates
            .iter()
            .find(|model| self.exists(ResourceKind::Model, model));
        let Some(target) = target else {
            console.warn("No model available for performance testing");
            return;
        };

        let width = performance.requests.to_string().len().max(2);
        for i in 1..=performance.requests {
            let result = client.infer_model(target);
            report.record_inference(
                Category::Performance,
                format!("request-{:0width$}", i, width = width),
                result.to_record(),
            );
        }

        let summary = report.summarize();
        let counts = summary.category(Category::Performance);
        match summary.latency {
            Some(latency) => console.info(format!(
                "Performance ({}): {}/{} requests, avg={:.1}ms, p95={:.1}ms",
                target, counts.succeeded, counts.total, latency.mean_ms, latency.p95_ms
            )),
            None => console.warn(format!(
                "Performance ({}): 0/{} requests succeeded",
                target, counts.total
            )),
        }
    }

    fn exists(&self, kind: ResourceKind, name: &str) -> bool {
        self.present(
            self.ctx.kubectl.resource_exists(kind, name, self.ctx.namespace()),
            name,
        )
    }

    fn present(&self, lookup: crate::cluster::ClusterResult<bool>, what: &str) -> bool {
        lookup.unwrap_or_else(|e| {
            warn!(what, error = %e, kind = e.kind(), "existence check failed");
            false
        })
    }
}
