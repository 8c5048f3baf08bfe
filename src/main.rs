//! Mesh Smoke CLI
//!
//! Entry point for the `mesh-smoke` command-line tool.
//!
//! Exit codes: 0 passed, 1 checks failed, 2 configuration or usage error,
//! 3 report could not be written.

use std::path::PathBuf;
use std::process;

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use mesh_manifest::{Resource, ServerSpec};
use mesh_report::TestReport;
use serde_json::{json, Value};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mesh_smoke::config::{
    set_path, user_config_path, EffectiveConfig, PipelineDeployment, SmokeConfig,
    PROJECT_CONFIG_FILE,
};
use mesh_smoke::deploy::{render_model, render_pipeline, Deployer};
use mesh_smoke::smoke::{SmokeTest, SMOKE_NAMESPACE};
use mesh_smoke::suite::TestSuite;
use mesh_smoke::sweep::{sweep, DEFAULT_GATE, DEFAULT_MODELS, DEFAULT_PIPELINES};
use mesh_smoke::{Console, RunContext};

const EXIT_FAILED: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_REPORT: i32 = 3;

#[derive(Parser)]
#[command(name = "mesh-smoke")]
#[command(about = "Deploy and smoke-test models on a Seldon Core 2 mesh", version)]
struct Cli {
    /// Project config file (default: ./mesh-smoke.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Namespace holding the mesh resources
    #[arg(long, short = 'n', global = true)]
    namespace: Option<String>,

    /// Only print successes, warnings and errors
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full test suite and write the report
    Test {
        /// Report path (default: test_report.json)
        #[arg(long)]
        report: Option<PathBuf>,

        /// Gateway host, skipping discovery
        #[arg(long)]
        gateway: Option<String>,
    },

    /// Deploy the configured models and pipelines
    Deploy {
        /// Also write each manifest to this directory
        #[arg(long)]
        manifest_dir: Option<PathBuf>,
    },

    /// Single-namespace end-to-end check
    Smoke {
        /// Delete the namespace afterwards
        #[arg(long)]
        cleanup: bool,
    },

    /// Call models (and, if the gate model works, pipelines) once each
    Infer {
        /// Models to call (default: the sample model list)
        #[arg(long = "model", value_delimiter = ',')]
        models: Vec<String>,

        /// Pipelines to call (default: the sample pipeline list)
        #[arg(long = "pipeline", value_delimiter = ',')]
        pipelines: Vec<String>,

        /// Model that must work before pipelines are called
        #[arg(long, default_value = DEFAULT_GATE)]
        gate: String,

        /// Gateway host, skipping discovery
        #[arg(long)]
        gateway: Option<String>,
    },

    /// Print a manifest
    Render {
        kind: RenderKind,

        name: String,

        /// Memory request for models
        #[arg(long, default_value = "1Gi")]
        memory: String,

        /// Pipeline steps in order (default: the configured pipeline's steps)
        #[arg(long = "step", value_delimiter = ',')]
        steps: Vec<String>,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum RenderKind {
    Model,
    Pipeline,
    Server,
}

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let overrides = cli_overrides(&cli);
    let effective = load_config(cli.config.clone(), overrides);
    let console = Console::new(cli.quiet);

    let code = match cli.command {
        Commands::Test { .. } => run_test(effective.settings().clone(), console),
        Commands::Deploy { manifest_dir } => {
            run_deploy(effective.settings().clone(), console, manifest_dir)
        }
        Commands::Smoke { cleanup } => {
            let mut settings = effective.settings().clone();
            if cli.namespace.is_none() {
                settings.namespace = SMOKE_NAMESPACE.to_string();
            }
            run_smoke(settings, console, cleanup)
        }
        Commands::Infer {
            models,
            pipelines,
            gate,
            ..
        } => run_infer(effective.settings().clone(), console, models, pipelines, &gate),
        Commands::Render {
            kind,
            name,
            memory,
            steps,
        } => run_render(effective.settings(), kind, &name, &memory, steps),
        Commands::Config => match effective.to_json() {
            Ok(json) => {
                println!("{}", json);
                0
            }
            Err(e) => {
                eprintln!("Error serializing config: {}", e);
                EXIT_USAGE
            }
        },
    };
    process::exit(code);
}

/// Flags that map onto config keys
fn cli_overrides(cli: &Cli) -> Option<Value> {
    let mut overrides = json!({});
    if let Some(ref ns) = cli.namespace {
        set_path(&mut overrides, "namespace", json!(ns));
    }
    match &cli.command {
        Commands::Test { report, gateway } => {
            if let Some(report) = report {
                set_path(&mut overrides, "report.path", json!(report));
            }
            if let Some(gateway) = gateway {
                set_path(&mut overrides, "gateway.host", json!(gateway));
            }
        }
        Commands::Infer {
            gateway: Some(gateway),
            ..
        } => set_path(&mut overrides, "gateway.host", json!(gateway)),
        _ => {}
    }
    match overrides.as_object() {
        Some(map) if !map.is_empty() => Some(overrides),
        _ => None,
    }
}

fn load_config(explicit: Option<PathBuf>, overrides: Option<Value>) -> EffectiveConfig {
    if let Some(ref path) = explicit {
        if !path.exists() {
            eprintln!("Config file not found: {}", path.display());
            process::exit(EXIT_USAGE);
        }
    }
    let project = explicit.unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    let user = user_config_path();

    match EffectiveConfig::build(user.as_deref(), Some(project.as_path()), overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(EXIT_USAGE);
        }
    }
}

fn live_context(settings: SmokeConfig, console: Console) -> RunContext {
    match RunContext::live(settings, console) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error creating HTTP client: {}", e);
            process::exit(EXIT_USAGE);
        }
    }
}

fn run_id() -> String {
    format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%SZ"), process::id())
}

fn run_test(settings: SmokeConfig, console: Console) -> i32 {
    let report_path = settings.report.path.clone();
    let ctx = live_context(settings, console);

    match TestSuite::new(&ctx, run_id()).run(&report_path) {
        Ok(outcome) if outcome.verdict.passed => 0,
        Ok(_) => EXIT_FAILED,
        Err(e) => {
            eprintln!("Error writing report: {}", e);
            EXIT_REPORT
        }
    }
}

fn run_deploy(settings: SmokeConfig, console: Console, manifest_dir: Option<PathBuf>) -> i32 {
    let ctx = live_context(settings, console);
    let mut report = TestReport::new(run_id(), ctx.namespace());

    let (models, pipelines) = Deployer::new(&ctx)
        .with_manifest_dir(manifest_dir)
        .deploy_all(&mut report);

    ctx.console.info("Deployment complete!");
    if models.deployed == models.total && pipelines.deployed == pipelines.total {
        0
    } else {
        EXIT_FAILED
    }
}

fn run_smoke(settings: SmokeConfig, console: Console, cleanup: bool) -> i32 {
    let ctx = live_context(settings, console);
    let outcome = SmokeTest::new(&ctx).with_cleanup(cleanup).run();
    if outcome.passed() {
        0
    } else {
        EXIT_FAILED
    }
}

fn run_infer(
    settings: SmokeConfig,
    console: Console,
    models: Vec<String>,
    pipelines: Vec<String>,
    gate: &str,
) -> i32 {
    let ctx = live_context(settings, console);
    let (endpoint, _) = ctx.resolve_gateway();
    let client = ctx.client(endpoint);

    let models = or_defaults(models, DEFAULT_MODELS);
    let pipelines = or_defaults(pipelines, DEFAULT_PIPELINES);
    let outcome = sweep(&client, &ctx.console, &models, &pipelines, gate);

    if outcome.working_models().is_empty() {
        EXIT_FAILED
    } else {
        0
    }
}

fn or_defaults(given: Vec<String>, defaults: &[&str]) -> Vec<String> {
    if given.is_empty() {
        defaults.iter().map(|s| s.to_string()).collect()
    } else {
        given
    }
}

fn run_render(
    settings: &SmokeConfig,
    kind: RenderKind,
    name: &str,
    memory: &str,
    steps: Vec<String>,
) -> i32 {
    let ns = &settings.namespace;
    let rendered = match kind {
        RenderKind::Model => {
            render_model(name, ns, memory, &settings.deploy.storage_uri).and_then(|r| r.to_yaml())
        }
        RenderKind::Server => {
            Resource::server(name, ns, ServerSpec::default()).and_then(|r| r.to_yaml())
        }
        RenderKind::Pipeline => {
            let configured = settings.deploy.pipelines.iter().find(|p| p.name == name);
            let pipeline = match (steps.is_empty(), configured) {
                (false, _) => PipelineDeployment {
                    name: name.to_string(),
                    steps,
                    input_tensor: "text".to_string(),
                    output: None,
                },
                (true, Some(configured)) => configured.clone(),
                (true, None) => {
                    eprintln!("No steps given and no configured pipeline named {}", name);
                    return EXIT_USAGE;
                }
            };
            render_pipeline(&pipeline, ns).and_then(|r| r.to_yaml())
        }
    };

    match rendered {
        Ok(yaml) => {
            print!("{}", yaml);
            0
        }
        Err(e) => {
            eprintln!("Invalid manifest: {}", e);
            EXIT_USAGE
        }
    }
}
