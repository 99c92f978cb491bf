//! shipit - conditional release orchestrator CLI
//!
//! ## Commands
//!
//! - `run`: Seed, build and roll out according to the trigger message
//! - `plan`: Show what a run would do, without touching anything
//! - `intent`: Show the intent flags parsed from a message
//! - `catalog`: Print the effective image and workload catalogs

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn, Level};

use shipit_core::telemetry::{init_tracing, LogFormat};
use shipit_core::{
    head_commit_message, parse_intent, plan_release, Cancellation, ReleaseOrchestrator,
    RunContext, RunIdentifier, ShipitConfig,
};

#[derive(Parser)]
#[command(name = "shipit")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Conditional release orchestrator", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML configuration file (built-in defaults when omitted)
    #[arg(short, long, global = true, env = "SHIPIT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the release requested by the trigger message
    Run {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        trigger: TriggerArgs,

        /// Also write the release summary as JSON
        #[arg(long)]
        summary_out: Option<PathBuf>,
    },

    /// Print the ordered activities a run would perform
    Plan {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        trigger: TriggerArgs,
    },

    /// Print the intent parsed from a message
    Intent {
        /// Trigger message to parse
        message: String,
    },

    /// Print the effective catalogs as JSON
    Catalog,
}

/// Overrides for the `[target]` and `[manifests]` configuration sections.
#[derive(Args, Debug, Default)]
struct TargetArgs {
    /// Registry address, e.g. myacr.azurecr.io
    #[arg(long, env = "SHIPIT_REGISTRY")]
    registry: Option<String>,

    /// Cluster namespace hosting the application
    #[arg(long, env = "SHIPIT_NAMESPACE")]
    namespace: Option<String>,

    /// Run identifier used as the first-party image tag (generated when omitted)
    #[arg(long, env = "SHIPIT_RUN_ID")]
    run_id: Option<String>,

    /// Manifest applied on first-time deployment (repeatable)
    #[arg(long = "manifest")]
    manifests: Vec<PathBuf>,

    /// kubeconfig context to target
    #[arg(long, env = "SHIPIT_KUBE_CONTEXT")]
    kube_context: Option<String>,
}

/// Where the trigger message comes from.
#[derive(Args, Debug, Default)]
struct TriggerArgs {
    /// Trigger message, e.g. "fix bug [app]"
    #[arg(short, long, env = "SHIPIT_TRIGGER_MESSAGE")]
    message: Option<String>,

    /// Use the HEAD commit message of a git checkout
    #[arg(
        long,
        value_name = "DIR",
        num_args = 0..=1,
        default_missing_value = ".",
        conflicts_with = "message"
    )]
    from_git: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(LogFormat::from_json_flag(cli.json), level);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            target,
            trigger,
            summary_out,
        } => cmd_run(config, &target, &trigger, summary_out.as_deref()).await,
        Commands::Plan { target, trigger } => cmd_plan(config, &target, &trigger),
        Commands::Intent { message } => cmd_intent(&message),
        Commands::Catalog => cmd_catalog(&config),
    }
}

fn load_config(path: Option<&Path>) -> Result<ShipitConfig> {
    match path {
        Some(path) => ShipitConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(ShipitConfig::default()),
    }
}

/// Apply command-line overrides and validate.
fn resolve_config(mut config: ShipitConfig, target: &TargetArgs) -> Result<ShipitConfig> {
    if let Some(registry) = &target.registry {
        config.target.registry = registry.clone();
    }
    if let Some(namespace) = &target.namespace {
        config.target.namespace = namespace.clone();
    }
    if !target.manifests.is_empty() {
        config.manifests.paths = target.manifests.clone();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn resolve_context(config: &ShipitConfig, target: &TargetArgs) -> Result<RunContext> {
    let run_id = match &target.run_id {
        Some(raw) => RunIdentifier::parse(raw)?,
        None => RunIdentifier::generate(),
    };
    Ok(RunContext::new(
        run_id,
        &config.target.namespace,
        &config.target.registry,
    ))
}

fn resolve_trigger(trigger: &TriggerArgs) -> Result<String> {
    if let Some(dir) = &trigger.from_git {
        return head_commit_message(dir)
            .with_context(|| format!("Failed to read HEAD commit message in {}", dir.display()));
    }
    match &trigger.message {
        Some(message) => Ok(message.clone()),
        None => bail!("No trigger message: pass --message, set SHIPIT_TRIGGER_MESSAGE or use --from-git"),
    }
}

async fn cmd_run(
    config: ShipitConfig,
    target: &TargetArgs,
    trigger: &TriggerArgs,
    summary_out: Option<&Path>,
) -> Result<ExitCode> {
    let config = resolve_config(config, target)?;
    let ctx = resolve_context(&config, target)?;
    let message = resolve_trigger(trigger)?;

    let (handle, cancel) = Cancellation::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after in-flight work");
            handle.cancel();
        }
    });

    let collaborators = shipit_exec::process_collaborators(
        &config.target.registry,
        config.policy.command_timeout(),
        target.kube_context.as_deref(),
    );
    let orchestrator = ReleaseOrchestrator::new(collaborators, &config);

    info!(run_id = %ctx.run_id, "starting release");
    let summary = orchestrator.run(&message, &ctx, &cancel).await;

    print!("{}", summary.render_text());
    if let Some(path) = summary_out {
        summary
            .write_json(path)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
        info!(path = %path.display(), "summary written");
    }

    Ok(exit_code(summary.exit_code()))
}

fn cmd_plan(config: ShipitConfig, target: &TargetArgs, trigger: &TriggerArgs) -> Result<ExitCode> {
    let config = resolve_config(config, target)?;
    let ctx = resolve_context(&config, target)?;
    let message = resolve_trigger(trigger)?;

    let (intent, steps) = plan_release(&message, &config.catalog, &ctx, &config.manifests.paths);

    println!("Run {} -> {} ({})", ctx.run_id, ctx.namespace, ctx.registry);
    println!(
        "intent: seed={} app={}",
        intent.seed_third_party, intent.build_first_party
    );
    if steps.is_empty() {
        println!("nothing to do");
    }
    for (i, step) in steps.iter().enumerate() {
        println!("{:>3}. {step}", i + 1);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_intent(message: &str) -> Result<ExitCode> {
    let intent = parse_intent(message);
    println!("{}", serde_json::to_string_pretty(&intent)?);
    Ok(ExitCode::SUCCESS)
}

fn cmd_catalog(config: &ShipitConfig) -> Result<ExitCode> {
    config
        .catalog
        .validate()
        .context("Invalid catalog")?;
    println!("{}", serde_json::to_string_pretty(&config.catalog)?);
    Ok(ExitCode::SUCCESS)
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
