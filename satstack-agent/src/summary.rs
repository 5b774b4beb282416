//! Read-only vault summary for the `status` command.

use serde_json::{json, Value};

use satstack_core::{
    felt_hex, ActionRecord, AgentState, DecisionProof, FieldElement, GatewayError, RegistryGateway, VaultGateway,
};

use crate::constraints::constraints_json;

/// One of the most recent action records, or why it could not be read.
#[derive(Debug)]
pub struct RecentAction {
    pub action_id: u64,
    pub record: Result<ActionRecord, GatewayError>,
}

#[derive(Debug)]
pub struct VaultSummary {
    pub agent_state: AgentState,
    pub portfolio_commit: Result<FieldElement, GatewayError>,
    pub total_proofs: Result<u64, GatewayError>,
    /// The proof at `total_proofs - 1`, if any.
    pub latest_proof: Option<Result<DecisionProof, GatewayError>>,
    /// Newest first.
    pub recent_actions: Vec<RecentAction>,
}

/// Collect the summary. Only the agent state read is required; every other
/// read is reported individually.
pub async fn vault_summary<C>(chain: &C, recent: u64) -> Result<VaultSummary, GatewayError>
where
    C: VaultGateway + RegistryGateway,
{
    let agent_state = chain.read_agent_state().await?;
    let portfolio_commit = chain.get_portfolio_commit().await;
    let total_proofs = chain.get_total_proofs().await;

    let latest_proof = match &total_proofs {
        Ok(total) if *total > 0 => Some(chain.get_proof(total - 1).await),
        _ => None,
    };

    let first = agent_state.total_actions.saturating_sub(recent);
    let mut recent_actions = Vec::new();
    for action_id in (first..agent_state.total_actions).rev() {
        recent_actions.push(RecentAction {
            action_id,
            record: chain.read_action(action_id).await,
        });
    }

    Ok(VaultSummary {
        agent_state,
        portfolio_commit,
        total_proofs,
        latest_proof,
        recent_actions,
    })
}

impl VaultSummary {
    pub fn to_json(&self) -> Value {
        let state = &self.agent_state;

        json!({
            "agent": felt_hex(&state.agent),
            "dailySpent": state.daily_spent.to_string(),
            "lastResetTimestamp": state.last_reset_timestamp,
            "totalActions": state.total_actions,
            "constraints": constraints_json(&state.constraints),
            "portfolioCommit": or_error(&self.portfolio_commit, felt_hex),
            "totalProofs": or_error(&self.total_proofs, |total| json!(total)),
            "latestProof": self.latest_proof.as_ref().map(|proof| or_error(proof, proof_json)),
            "recentActions": self.recent_actions.iter().map(recent_json).collect::<Vec<_>>(),
        })
    }
}

fn proof_json(proof: &DecisionProof) -> Value {
    json!({
        "agent": felt_hex(&proof.agent),
        "inputHash": felt_hex(&proof.input_hash),
        "outputHash": felt_hex(&proof.output_hash),
        "strategyHash": felt_hex(&proof.strategy_hash),
        "timestamp": proof.timestamp,
        "verified": proof.verified,
    })
}

fn recent_json(recent: &RecentAction) -> Value {
    match &recent.record {
        Ok(record) => json!({
            "id": recent.action_id,
            "actionType": record.action_type.to_string(),
            "amount": record.amount.to_string(),
            "riskScore": record.risk_score,
            "proofHash": felt_hex(&record.proof_hash),
            "timestamp": record.timestamp,
            "approved": record.approved,
        }),
        Err(err) => json!({
            "id": recent.action_id,
            "error": err.to_string(),
            "code": err.error_code(),
        }),
    }
}

fn or_error<T, F, V>(result: &Result<T, GatewayError>, render: F) -> Value
where
    F: Fn(&T) -> V,
    V: Into<Value>,
{
    match result {
        Ok(value) => render(value).into(),
        Err(err) => json!({ "error": err.to_string(), "code": err.error_code() }),
    }
}
