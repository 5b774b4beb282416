//! One agent run: vault check, snapshot, decision, on-chain pipeline.

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use satstack_core::{
    commit, decide_with, GatewayError, Orchestrator, PortfolioCommitment, PortfolioSnapshot, ProposedAction,
    RegistryGateway, RunReport, StrategyParams, VaultGateway,
};

use crate::context::AgentContext;
use crate::portfolio::{capture_snapshot, PortfolioSource, SnapshotField};

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The vault could not be read before any action was processed.
    #[error("startup vault read failed: {0}")]
    StartupRead(#[source] GatewayError),
}

/// Outcome of [`run_pipeline`].
#[derive(Debug)]
pub struct PipelineRun {
    pub snapshot: PortfolioSnapshot,
    pub fallbacks: Vec<SnapshotField>,
    pub report: RunReport,
}

/// Run the full pipeline once.
///
/// Only the startup vault read is fatal. Snapshot fields fall back to
/// defaults and per-action failures end up in the report.
pub async fn run_pipeline<P, C>(ctx: &AgentContext<P, C>) -> Result<PipelineRun, PipelineError>
where
    P: PortfolioSource,
    C: VaultGateway + RegistryGateway,
{
    let agent_state = ctx
        .chain
        .read_agent_state()
        .await
        .map_err(PipelineError::StartupRead)?;
    info!(
        total_actions = agent_state.total_actions,
        risk_threshold = agent_state.constraints.risk_threshold,
        is_active = agent_state.constraints.is_active,
        "vault reachable"
    );

    let captured = capture_snapshot(&ctx.portfolio, &ctx.config.btc_address, &ctx.defaults).await;
    let actions = decide_with(&captured.snapshot, &ctx.params);
    for action in &actions {
        info!(action = %action.label, action_type = %action.action_type, "strategy decision");
    }

    let report = Orchestrator::new(&ctx.chain, &ctx.chain)
        .with_params(ctx.params)
        .run(&captured.snapshot, actions)
        .await;
    info!(
        approved = report.approved_count(),
        rejected = report.rejected_count(),
        failed = report.failed_count(),
        "{}",
        report.summary()
    );

    Ok(PipelineRun {
        snapshot: captured.snapshot,
        fallbacks: captured.fallbacks,
        report,
    })
}

/// Offline decision for a recorded snapshot.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Replay {
    pub snapshot: PortfolioSnapshot,
    pub params: StrategyParams,
    pub commitment: PortfolioCommitment,
    pub actions: Vec<ProposedAction>,
}

pub fn replay(snapshot: PortfolioSnapshot, params: StrategyParams) -> Replay {
    Replay {
        snapshot,
        params,
        commitment: commit(&snapshot),
        actions: decide_with(&snapshot, &params),
    }
}
