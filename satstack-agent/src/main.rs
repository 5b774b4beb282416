//! satstack-agent
//!
//! Commands:
//! - `run` (default): snapshot, decide and drive every action on-chain
//! - `status`: read-only vault summary
//! - `replay`: offline decision and commitment for a recorded snapshot
//! - `constraints`: owner-only vault constraint update

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};

use satstack_agent::{
    apply_constraints, replay, run_pipeline, vault_summary, AgentConfig, AgentContext, ConstraintsUpdate,
};
use satstack_core::{PortfolioSnapshot, StarknetGateway, StrategyParams};

#[derive(Parser)]
#[command(name = "satstack-agent", version, about = "Verifiable BTC portfolio agent on Starknet")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full decision-proof pipeline once.
    Run,
    /// Print the vault state, constraints and recent actions.
    Status {
        /// Number of most recent action records to read.
        #[arg(long, default_value_t = 5)]
        recent: u64,
    },
    /// Print the decision and commitment for a snapshot JSON file.
    Replay {
        #[arg(long)]
        snapshot: PathBuf,
    },
    /// Replace the vault constraints, signed with OWNER_ADDRESS/OWNER_PRIVATE_KEY.
    Constraints(ConstraintsArgs),
}

#[derive(Args)]
struct ConstraintsArgs {
    #[arg(long)]
    max_daily_spend: u128,
    /// Bitmap of allowed action types, decimal or 0x hex.
    #[arg(long)]
    allowed_action_types: String,
    #[arg(long)]
    max_single_tx: u128,
    #[arg(long)]
    risk_threshold: u8,
    /// Deactivate the vault; every approval is refused while inactive.
    #[arg(long)]
    inactive: bool,
}

impl From<ConstraintsArgs> for ConstraintsUpdate {
    fn from(args: ConstraintsArgs) -> Self {
        Self {
            max_daily_spend: args.max_daily_spend,
            allowed_action_types: args.allowed_action_types,
            max_single_tx: args.max_single_tx,
            risk_threshold: args.risk_threshold,
            is_active: !args.inactive,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match execute(cli.command.unwrap_or(Command::Run)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "satstack_agent=info,satstack_core=info".into());

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn execute(command: Command) -> Result<()> {
    match command {
        Command::Run => run().await,
        Command::Status { recent } => status(recent).await,
        Command::Replay { snapshot } => replay_file(&snapshot),
        Command::Constraints(args) => set_constraints(args.into()).await,
    }
}

async fn connect() -> Result<AgentContext<satstack_agent::XverseClient, StarknetGateway>> {
    let config = AgentConfig::from_env().context("invalid configuration")?;
    info!(
        btc_address = %config.btc_address,
        rpc_url = %config.starknet_rpc_url,
        vault = %config.vault_address,
        registry = %config.registry_address,
        "starting satstack-agent"
    );
    AgentContext::connect(config)
        .await
        .context("failed to reach the chain endpoint")
}

async fn run() -> Result<()> {
    let ctx = connect().await?;

    tokio::select! {
        result = run_pipeline(&ctx) => {
            let run = result?;
            if !run.fallbacks.is_empty() {
                warn!(fallbacks = ?run.fallbacks, "snapshot used default values");
            }
            info!(commitment = %run.report.commitment, recorded = run.report.commitment_recorded, "run finished");
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, abandoning the current action");
            anyhow::bail!("interrupted")
        }
    }
}

async fn status(recent: u64) -> Result<()> {
    let ctx = connect().await?;
    let summary = vault_summary(&ctx.chain, recent)
        .await
        .context("failed to read vault state")?;
    let rendered = serde_json::to_string_pretty(&summary.to_json()).context("failed to render summary")?;
    println!("{}", rendered);
    Ok(())
}

async fn set_constraints(update: ConstraintsUpdate) -> Result<()> {
    let config = AgentConfig::from_env().context("invalid configuration")?;
    let owner = config.owner_gateway().context("owner credentials required")?;
    info!(vault = %config.vault_address, owner = %owner.account_address, "updating vault constraints");

    let vault = StarknetGateway::connect(owner)
        .await
        .context("failed to reach the chain endpoint")?;
    let applied = apply_constraints(&vault, &update)
        .await
        .context("failed to update constraints")?;
    let rendered = serde_json::to_string_pretty(&applied.to_json()).context("failed to render result")?;
    println!("{}", rendered);
    Ok(())
}

fn replay_file(path: &PathBuf) -> Result<()> {
    let json = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let snapshot: PortfolioSnapshot = serde_json::from_str(&json).context("failed to parse snapshot json")?;
    let replayed = replay(snapshot, StrategyParams::default());
    let rendered = serde_json::to_string_pretty(&replayed).context("failed to render replay")?;
    println!("{}", rendered);
    Ok(())
}
