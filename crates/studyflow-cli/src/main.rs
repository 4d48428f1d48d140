//! studyflow rule simulator
//!
//! Applies a study rule set to one participant for one event and prints the
//! resulting participant state and reports as JSON.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use studyflow_cli::{read_document, Settings, Simulation};
use studyflow_core::Expression;
use studyflow_runtime::{validate_rules, RuleErrorPolicy};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to config/studyflow.*)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a rule set to a participant for one event
    Run(RunArgs),

    /// Check a rule set for unknown or misplaced expression names
    Validate {
        /// Rule set file (JSON or YAML)
        rules: PathBuf,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Rule set file (JSON or YAML)
    #[arg(short, long)]
    rules: PathBuf,

    /// Participant state file
    #[arg(short, long)]
    participant: PathBuf,

    /// Study event file
    #[arg(short, long)]
    event: PathBuf,

    /// Study data present before the event (codes, counters, variables, responses)
    #[arg(short, long)]
    seed: Option<PathBuf>,

    /// Override the configured rule error policy
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,

    /// Validate the rule set first and refuse to run it if issues are found
    #[arg(long)]
    strict: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Continue,
    Abort,
}

impl From<PolicyArg> for RuleErrorPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Continue => RuleErrorPolicy::Continue,
            PolicyArg::Abort => RuleErrorPolicy::Abort,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };

    init_tracing(&settings)?;

    match cli.command {
        Commands::Run(args) => run(&settings, args).await,
        Commands::Validate { rules } => validate(&rules),
    }
}

async fn run(settings: &Settings, args: RunArgs) -> Result<()> {
    let simulation = Simulation::load(
        &args.rules,
        &args.participant,
        &args.event,
        args.seed.as_deref(),
    )?;

    if args.strict {
        check_rules(&simulation.rules)?;
    }

    let policy = args.policy.map(Into::into).unwrap_or(settings.error_policy);
    let report = simulation.run(settings, policy).await?;

    for failure in &report.failures {
        warn!("rule {} ({}) failed: {}", failure.index, failure.rule, failure.error);
    }
    info!(
        reports = report.reports_to_create.len(),
        failures = report.failures.len(),
        "simulation finished"
    );

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn validate(path: &Path) -> Result<()> {
    let rules: Vec<Expression> = read_document(path)?;
    check_rules(&rules)?;
    println!("{} rules OK", rules.len());
    Ok(())
}

fn check_rules(rules: &[Expression]) -> Result<()> {
    let issues = validate_rules(rules);
    if issues.is_empty() {
        return Ok(());
    }
    for issue in &issues {
        eprintln!("{}", issue);
    }
    bail!("rule set has {} issue(s)", issues.len())
}

/// Initialize tracing subscriber; `RUST_LOG` takes precedence over settings
fn init_tracing(settings: &Settings) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    Ok(())
}
