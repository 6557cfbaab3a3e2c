//! rpm-orchestrator - runs the decision loop against a frame fixture
//!
//! Observations are read from a JSON or YAML frame file on every tick and
//! approved actions go to the dry-run venue.

use clap::Parser;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orchestrator::{JsonlAuditLog, OrchestratorConfig, ReputationStore, TickOutcome, TickScheduler};
use rpm_agent::agents::reference_agents;
use rpm_agent::{DryRunExecution, FileObservation};

#[derive(Parser, Debug, Clone)]
#[command(name = "rpm-orchestrator")]
#[command(about = "Decision orchestrator for the RWA Portfolio Manager")]
struct Args {
    /// YAML config file (defaults apply when omitted)
    #[arg(long, env = "RPM_CONFIG")]
    config: Option<PathBuf>,

    /// Observation frame fixture (JSON, or YAML by extension)
    #[arg(long, env = "RPM_FRAME", default_value = "frame.json")]
    frame: PathBuf,

    /// Append-only JSONL audit log
    #[arg(long, env = "RPM_AUDIT_PATH", default_value = "audit.jsonl")]
    audit_path: PathBuf,

    /// Reputation table to load at start and save after every tick
    #[arg(long, env = "RPM_REPUTATION_PATH")]
    reputation_path: Option<PathBuf>,

    /// Override the configured inter-tick delay (seconds)
    #[arg(long, env = "RPM_TICK_SECS")]
    tick_secs: Option<u64>,

    /// Log level for the orchestrator
    #[arg(long, env = "RPM_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "RPM_LOG_JSON", default_value = "false")]
    log_json: bool,

    /// Run a single tick and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("orchestrator={},info", args.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let config = match load_config(&args).await {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!("======================================");
    info!("  RWA Portfolio Manager - Orchestrator");
    info!("======================================");
    info!("Frame: {}", args.frame.display());
    info!("Audit log: {}", args.audit_path.display());
    info!("Tick interval: {}s", config.scheduler.tick_secs);
    info!("Consensus threshold: {}", config.consensus.threshold_weight);
    info!("======================================");

    let reputation = Arc::new(ReputationStore::new());
    if let Some(path) = &args.reputation_path {
        reputation.load(path).await?;
        info!(path = %path.display(), agents = reputation.len(), "Reputation loaded");
    }

    let audit = Arc::new(JsonlAuditLog::open(&args.audit_path).await?);
    let adapter = Arc::new(DryRunExecution::new().with_policy(config.execution.policy.clone()));

    let mut builder = TickScheduler::builder(Arc::new(FileObservation::new(&args.frame)), adapter)
        .with_config(config)
        .with_agents(reference_agents())
        .with_audit(audit)
        .with_reputation(reputation.clone());
    if let Some(path) = &args.reputation_path {
        builder = builder.persist_reputation(path);
    }
    let scheduler = builder.build()?;

    if args.once {
        match scheduler.tick().await {
            TickOutcome::Decided { decision, .. } => info!(
                decision_id = %decision.id,
                risk_score = decision.risk_score,
                escalation_required = decision.escalation_required,
                "Single tick complete"
            ),
            TickOutcome::ObservationFailed { error } => warn!(error = %error, "Single tick observed nothing"),
            TickOutcome::Skipped => {}
        }
        return Ok(());
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(forward_shutdown(tokio::signal::ctrl_c(), cancel_tx));

    let ticks = scheduler.run(cancel_rx).await;

    if let Some(path) = &args.reputation_path {
        reputation.save(path).await?;
        info!(path = %path.display(), "Reputation saved");
    }
    info!(ticks, "Orchestrator stopped");
    Ok(())
}

/// Cancel the loop once `signal` resolves, or at once if listening failed.
async fn forward_shutdown(signal: impl Future<Output = std::io::Result<()>>, cancel_tx: watch::Sender<bool>) {
    match signal.await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => warn!(error = %e, "Failed to listen for shutdown signal, stopping after this tick"),
    }
    let _ = cancel_tx.send(true);
}

async fn load_config(args: &Args) -> anyhow::Result<OrchestratorConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path).await?;
            OrchestratorConfig::from_yaml(&raw)?
        }
        None => OrchestratorConfig::default(),
    };
    if let Some(secs) = args.tick_secs {
        config.scheduler.tick_secs = secs;
    }
    config.validate()?;
    Ok(config)
}
