//! Full test run against a scripted cluster and gateway
//!
//! Drives `TestSuite::run` end to end: kubectl calls come from the scripted
//! runner, inference calls from the scripted transport, and the report is
//! written to a temp directory and read back.

mod fixtures;

use fixtures::{load, ok, Harness};
use mesh_report::{Category, Entry, InferenceStatus, TestReport};
use mesh_smoke::config::SmokeConfig;
use mesh_smoke::console::Level;
use mesh_smoke::suite::TestSuite;
use tempfile::TempDir;

const NS: &str = "seldon-mesh";

fn settings() -> SmokeConfig {
    let mut settings = SmokeConfig::default();
    settings.performance.requests = 5;
    settings
}

#[test]
fn test_passing_run_writes_report() {
    let harness = Harness::new();
    harness.healthy_cluster(NS);
    harness.gateway("gateway_service.json");
    harness.runner.respond("get server mlserver -n seldon-mesh -o json", ok("server_ready.json"));
    harness.runner.respond("get server triton -n seldon-mesh -o json", ok("server_ready.json"));
    harness.present("model", "intent-classifier-v1", NS);
    harness.present("model", "entity-extractor", NS);
    harness.present("pipeline", "instant-chatbot", NS);
    harness.present("experiment", "product-ab-test", NS);

    let body = load("inference_response.json");
    harness.transport.respond("intent-classifier-v1", 200, &body);
    harness.transport.respond("entity-extractor", 503, "no healthy upstream");
    harness.transport.respond("instant-chatbot.pipeline", 200, &body);

    let ctx = harness.context(settings());
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test_report.json");

    let outcome = TestSuite::new(&ctx, "run-1").run(&path).unwrap();

    assert!(outcome.prerequisites_met);
    assert!(outcome.verdict.passed, "reasons: {:?}", outcome.verdict.reasons);

    let report = TestReport::from_file(&path).unwrap();
    assert_eq!(report, outcome.report);
    assert_eq!(report.gateway.as_deref(), Some("34.90.187.46:80"));
    assert!(report.finished_at.is_some());

    // kubectl, seldon_crds, namespace, istio, 2 servers, 1 experiment
    assert_eq!(report.entries(Category::Infrastructure).count(), 7);

    let models = outcome.summary.category(Category::Models);
    assert_eq!((models.succeeded, models.total), (1, 2));
    match report.get(Category::Models, "entity-extractor") {
        Some(Entry::Inference(record)) => {
            assert_eq!(record.status, InferenceStatus::HttpStatus(503));
            assert_eq!(record.latency_ms, None);
            assert_eq!(record.error.as_deref(), Some("no healthy upstream"));
        }
        other => panic!("unexpected entry: {:?}", other),
    }

    // product-classifier-v1 is missing, so intent-classifier-v1 is the target
    assert_eq!(report.entries(Category::Performance).count(), 5);
    assert_eq!(harness.transport.count("intent-classifier-v1"), 6);
    assert_eq!(outcome.summary.latency.map(|l| l.samples), Some(5));
}

#[test]
fn test_failed_prerequisites_skip_components_but_write_report() {
    let harness = Harness::new();
    harness.runner.time_out("version --client -o json");
    harness.present("model", "intent-classifier-v1", NS);

    let ctx = harness.context(settings());
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("report.json");

    let outcome = TestSuite::new(&ctx, "run-2").run(&path).unwrap();

    assert!(!outcome.prerequisites_met);
    assert!(!outcome.verdict.passed);
    assert_eq!(outcome.verdict.reasons[0], "prerequisites not met");
    assert!(harness.transport.requests().is_empty());
    assert_eq!(harness.runner.count_calls("get svc"), 0);

    let report = TestReport::from_file(&path).unwrap();
    assert_eq!(report.entries(Category::Infrastructure).count(), 4);
    assert_eq!(report.entries(Category::Models).count(), 0);
    assert!(ctx
        .console
        .messages(Level::Error)
        .iter()
        .any(|m| m.contains("Prerequisites not met")));
}

#[test]
fn test_no_working_pipeline_fails_verdict() {
    let harness = Harness::new();
    harness.healthy_cluster(NS);
    harness.runner.respond("get server mlserver -n seldon-mesh -o json", ok("server_ready.json"));
    harness.runner.respond("get server triton -n seldon-mesh -o json", ok("server_ready.json"));
    harness.present("model", "intent-classifier-v1", NS);
    harness.present("pipeline", "instant-chatbot", NS);
    harness.transport.respond("intent-classifier-v1", 200, "{}");
    harness.transport.respond("instant-chatbot.pipeline", 404, "pipeline not found");

    let ctx = harness.context(settings());
    let dir = TempDir::new().unwrap();

    let outcome = TestSuite::new(&ctx, "run-3")
        .run(&dir.path().join("report.json"))
        .unwrap();

    assert!(outcome.prerequisites_met);
    assert!(!outcome.verdict.passed);
    assert_eq!(outcome.verdict.reasons, vec!["no working pipelines".to_string()]);
}

#[test]
fn test_not_ready_server_counts_against_infrastructure() {
    let harness = Harness::new();
    harness.healthy_cluster(NS);
    harness.runner.respond("get server mlserver -n seldon-mesh -o json", ok("server_not_ready.json"));
    harness.runner.respond("get server triton -n seldon-mesh -o json", ok("server_not_ready.json"));
    harness.present("model", "intent-classifier-v1", NS);
    harness.present("pipeline", "instant-chatbot", NS);
    harness.transport.respond("intent-classifier-v1", 200, "{}");
    harness.transport.respond("instant-chatbot.pipeline", 200, "{}");

    let ctx = harness.context(settings());
    let dir = TempDir::new().unwrap();

    let outcome = TestSuite::new(&ctx, "run-4")
        .run(&dir.path().join("report.json"))
        .unwrap();

    // prerequisites pass; both servers and the experiment do not
    let infra = outcome.summary.category(Category::Infrastructure);
    assert_eq!((infra.succeeded, infra.total), (4, 7));
    assert!(!outcome.verdict.passed);
    assert!(outcome.verdict.reasons[0].starts_with("infrastructure 4/7"));
}

#[test]
fn test_unwritable_report_is_an_error() {
    let harness = Harness::new();
    let ctx = harness.context(settings());
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing-dir").join("report.json");

    let err = TestSuite::new(&ctx, "run-5").run(&path).unwrap_err();
    assert!(err.to_string().contains("missing-dir"));
}

#[test]
fn test_pending_gateway_falls_back_to_localhost() {
    let harness = Harness::new();
    harness.healthy_cluster(NS);
    harness.gateway("gateway_service_pending.json");
    harness.present("model", "intent-classifier-v1", NS);
    harness.transport.respond("intent-classifier-v1", 200, "{}");

    let ctx = harness.context(settings());
    let dir = TempDir::new().unwrap();

    let outcome = TestSuite::new(&ctx, "run-6")
        .run(&dir.path().join("report.json"))
        .unwrap();

    assert_eq!(outcome.report.gateway.as_deref(), Some("localhost:80"));
    assert!(harness
        .transport
        .requests()
        .iter()
        .all(|r| r.url.starts_with("http://localhost:80/v2/models/")));
    assert!(ctx
        .console
        .messages(Level::Warning)
        .iter()
        .any(|m| m.contains("has no external address")));
}
