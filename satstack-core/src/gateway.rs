//! Consumed interface of the on-chain contracts.
//!
//! Mutating calls return only after the transaction reached finality. The
//! orchestrator is generic over these traits; the Starknet JSON-RPC
//! implementation lives in [`crate::rpc`] and tests use in-memory fakes.

use async_trait::async_trait;
use starknet_crypto::FieldElement;

use crate::error::GatewayError;
use crate::types::{
    ActionOutput, ActionRecord, AgentState, Constraints, DecisionProof, PortfolioInput, ProposalCall,
    StrategyParams, TxHash,
};

/// AgentVault: portfolio commitment storage, proposals and constraint-checked
/// approval.
#[async_trait]
pub trait VaultGateway: Send + Sync {
    async fn read_agent_state(&self) -> Result<AgentState, GatewayError>;

    async fn read_action(&self, action_id: u64) -> Result<ActionRecord, GatewayError>;

    async fn set_portfolio_commit(&self, hash: FieldElement) -> Result<TxHash, GatewayError>;

    async fn get_portfolio_commit(&self) -> Result<FieldElement, GatewayError>;

    async fn propose_action(&self, call: &ProposalCall) -> Result<TxHash, GatewayError>;

    /// A contract-side refusal surfaces as [`GatewayError::Reverted`] or
    /// [`GatewayError::Rejected`].
    async fn approve_action(&self, action_id: u64) -> Result<TxHash, GatewayError>;

    /// Replace the vault constraints. The contract only accepts this from the
    /// owner account, so the agent run never calls it.
    async fn update_constraints(&self, constraints: &Constraints) -> Result<TxHash, GatewayError>;
}

/// ProofRegistry: decision proof submission and lookup.
#[async_trait]
pub trait RegistryGateway: Send + Sync {
    async fn submit_proof(
        &self,
        input: &PortfolioInput,
        params: &StrategyParams,
        output: &ActionOutput,
    ) -> Result<TxHash, GatewayError>;

    async fn compute_output_hash(&self, output: &ActionOutput) -> Result<FieldElement, GatewayError>;

    async fn get_total_proofs(&self) -> Result<u64, GatewayError>;

    async fn get_proof(&self, proof_id: u64) -> Result<DecisionProof, GatewayError>;
}
