//! taskcrew - role-based task orchestration
//!
//! Reads a request (a "manifesto"), classifies it, and drives the planner,
//! builder, reviewer, tester and integrator roles through the phase
//! pipeline until the work is complete or the iteration limit is reached.
//!
//! `--dry-run` stops after classification and reports what would run.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{json, Value};
use taskcrew_core::collaborators::{
    FanoutNotifier, FsCodebaseInspector, LocalGitIntegration, LogNotifier, OpenAiExecutor,
    WebhookNotifier,
};
use taskcrew_core::manifesto;
use taskcrew_core::telemetry::init_tracing;
use taskcrew_core::{
    ApprovalGate, Collaborators, ContextManager, IterationController, Orchestrator,
    OrchestratorConfig, StdinDecisionSource, TaskClassification,
};
use taskcrew_state::fakes::NoopMetricsSink;
use taskcrew_state::{MetricsSink, SurrealMetricsSink};
use tracing::{info, Level};

/// Used when no manifesto is given.
const EXAMPLE_REQUEST: &str = "\
Build a quick POC for a CLI calculator that adds, subtracts, multiplies \
and divides two numbers given on the command line.

output_dir: ./calculator
";

#[derive(Parser, Debug)]
#[command(name = "taskcrew")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Role-based task orchestration", long_about = None)]
struct Cli {
    /// Request file; `-` reads stdin. A built-in example is used if omitted.
    /// A request that is empty or only whitespace is rejected.
    manifesto: Option<PathBuf>,

    /// TOML config file
    #[arg(long, env = "TASKCREW_CONFIG")]
    config: Option<PathBuf>,

    /// Approve every checkpoint without asking
    #[arg(short = 'y', long)]
    auto_approve: bool,

    /// Classify and report, execute nothing
    #[arg(long)]
    dry_run: bool,

    #[arg(long, env = "TASKCREW_MAX_ITERATIONS")]
    max_iterations: Option<u32>,

    /// Open and merge an integration request in the output directory
    #[arg(long)]
    integrate: bool,

    #[arg(long, env = "TASKCREW_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Webhook receiving notifications
    #[arg(long, env = "TASKCREW_WEBHOOK_URL")]
    webhook: Option<String>,

    /// Metrics database (`mem://`, `surrealkv://path`, `ws://host:port`)
    #[arg(long, env = "TASKCREW_DB_URL")]
    db: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let request = read_request(cli.manifesto.as_deref())?;
    let config = resolve_config(&cli, &request)?;

    if cli.dry_run {
        let report = dry_run_report(&config, &request)?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let collaborators = build_collaborators(&cli, &config).await?;
    let gate = if config.auto_approve {
        ApprovalGate::auto_approve()
    } else {
        ApprovalGate::new(Arc::new(StdinDecisionSource), config.non_interactive_policy)
    };
    let max_iterations = config.max_iterations;
    let orchestrator =
        Orchestrator::new(config, collaborators, gate).context("Invalid configuration")?;

    let controller = IterationController::new(orchestrator);
    let outcome = controller.run(&request, max_iterations).await;
    info!(
        iterations = outcome.iterations,
        complete = outcome.complete,
        "done"
    );
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn read_request(source: Option<&Path>) -> Result<String> {
    let text = match source {
        None => EXAMPLE_REQUEST.to_string(),
        Some(path) if path == Path::new("-") => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read request from stdin")?;
            buf
        }
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifesto {}", path.display()))?,
    };
    if text.trim().is_empty() {
        anyhow::bail!("Request is empty");
    }
    Ok(text)
}

/// Config file, then flags and env vars, then directives in the request.
fn resolve_config(cli: &Cli, request: &str) -> Result<OrchestratorConfig> {
    let mut config = match &cli.config {
        Some(path) => OrchestratorConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => OrchestratorConfig::default(),
    };

    config.auto_approve |= cli.auto_approve;
    config.integrate |= cli.integrate;
    if let Some(n) = cli.max_iterations {
        config.max_iterations = n;
    }
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    let directives = manifesto::directives(request);
    if let Some(dir) = directives.output_dir {
        config.output_dir = PathBuf::from(dir);
    }
    if let Some(repository) = directives.repository {
        config.repository = Some(repository);
    }
    if let Some(owner) = directives.owner {
        config.owner = Some(owner);
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn dry_run_report(config: &OrchestratorConfig, request: &str) -> Result<Value> {
    let classification = TaskClassification::from_text(request, config.integrate);
    let budget = config.budget().context("Invalid context budget")?;
    let context = ContextManager::new(budget.clone());
    let usage = context.check_usage(&[request], config.warn_threshold);
    Ok(json!({
        "task_type": classification.task_type,
        "defaulted": classification.defaulted,
        "required_roles": classification.required_roles,
        "active_phases": classification.required_phases,
        "skipped_phases": classification.skipped_phases(),
        "max_iterations": config.max_iterations,
        "output_dir": config.output_dir,
        "repository": config.repository_slug(),
        "budget": budget,
        "tokenizer": context.tokenizer_name(),
        "request_usage": usage,
    }))
}

async fn build_collaborators(cli: &Cli, config: &OrchestratorConfig) -> Result<Collaborators> {
    let executor =
        OpenAiExecutor::from_env(&config.model_tag).context("Failed to configure role executor")?;

    let mut notifier = FanoutNotifier::new().with(Arc::new(LogNotifier));
    if let Some(url) = cli.webhook.as_deref().filter(|u| !u.trim().is_empty()) {
        notifier = notifier.with(Arc::new(WebhookNotifier::new(url)));
    }

    let metrics: Arc<dyn MetricsSink> = match cli.db.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(url) => Arc::new(
            SurrealMetricsSink::connect(url)
                .await
                .context("Failed to connect to metrics database")?,
        ),
        None => Arc::new(NoopMetricsSink),
    };

    let mut collaborators = Collaborators::new(Arc::new(executor))
        .with_notifier(Arc::new(notifier))
        .with_codebase(Arc::new(FsCodebaseInspector::new(&config.output_dir)))
        .with_metrics(metrics);
    if config.integrate {
        let mut integration = LocalGitIntegration::new(&config.output_dir);
        if let Some(slug) = config.repository_slug() {
            integration = integration.with_repository(slug);
        }
        collaborators = collaborators.with_integration(Arc::new(integration));
    }
    Ok(collaborators)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut full = vec!["taskcrew"];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_missing_manifesto_uses_example() {
        let text = read_request(None).unwrap();
        assert_eq!(text, EXAMPLE_REQUEST);
    }

    #[test]
    fn test_manifesto_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request.md");
        std::fs::write(&path, "Fix the crash in the parser").unwrap();
        assert_eq!(
            read_request(Some(&path)).unwrap(),
            "Fix the crash in the parser"
        );
    }

    #[test]
    fn test_unreadable_manifesto_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_request(Some(&dir.path().join("absent.md"))).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read manifesto"));
    }

    #[test]
    fn test_flags_layer_over_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taskcrew.toml");
        std::fs::write(&path, "max_iterations = 4\noutput_dir = \"from-file\"\n").unwrap();
        let path_arg = path.to_string_lossy().into_owned();

        let args = cli(&["--config", &path_arg, "-y", "--integrate"]);
        let config = resolve_config(&args, "Build a demo").unwrap();
        assert_eq!(config.max_iterations, 4);
        assert_eq!(config.output_dir, PathBuf::from("from-file"));
        assert!(config.auto_approve);
        assert!(config.integrate);

        let args = cli(&["--config", &path_arg, "--max-iterations", "2"]);
        let config = resolve_config(&args, "Build a demo").unwrap();
        assert_eq!(config.max_iterations, 2);
    }

    #[test]
    fn test_request_directive_overrides_output_dir() {
        let args = cli(&["--output-dir", "flag-dir"]);
        let config = resolve_config(&args, "Build a demo\noutput_dir: ./calc\n").unwrap();
        assert_eq!(config.output_dir, PathBuf::from("./calc"));
    }

    #[test]
    fn test_request_directives_set_the_repository() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taskcrew.toml");
        std::fs::write(&path, "repository = \"from-file\"\nowner = \"file-org\"\n").unwrap();
        let path_arg = path.to_string_lossy().into_owned();

        let args = cli(&["--config", &path_arg]);
        let config = resolve_config(&args, "Build a demo").unwrap();
        assert_eq!(config.repository_slug().as_deref(), Some("file-org/from-file"));

        let request = "Build a demo\ngithub_repo: calc-cli\ngithub_owner: acme\n";
        let config = resolve_config(&args, request).unwrap();
        assert_eq!(config.repository.as_deref(), Some("calc-cli"));
        assert_eq!(config.owner.as_deref(), Some("acme"));

        let report = dry_run_report(&config, request).unwrap();
        assert_eq!(report["repository"], "acme/calc-cli");
    }

    #[test]
    fn test_blank_manifesto_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.md");
        std::fs::write(&path, " \n\t\n").unwrap();
        let err = read_request(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Request is empty"));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let args = cli(&["--max-iterations", "0"]);
        assert!(resolve_config(&args, "Build a demo").is_err());
    }

    #[test]
    fn test_dry_run_report_describes_the_plan() {
        let config = OrchestratorConfig::default();
        let report = dry_run_report(&config, "Build a quick POC for a CLI calculator").unwrap();
        assert_eq!(report["task_type"], "proof_of_concept");
        assert_eq!(report["active_phases"], json!(["build"]));
        assert_eq!(
            report["skipped_phases"],
            json!(["plan", "review", "test", "integrate"])
        );
        assert_eq!(report["request_usage"]["within_limit"], true);
        assert_eq!(report["tokenizer"], "cl100k_base");
    }
}
