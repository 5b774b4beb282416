//! Decision-proof orchestrator.
//!
//! Drives each proposed action through commit, proof submission, proof
//! resolution, proposal and approval. Actions run strictly one after the
//! other: proof and action ids are read from the contracts' counters right
//! after each write, which assumes this process is the only writer.
//!
//! A failing step ends that action in [`ActionState::Failed`] and the run
//! moves on to the next action. Nothing here returns an error to the caller.

use tracing::{error, info, warn};

use crate::commitment::commit;
use crate::error::{GatewayError, Step, StepFailure};
use crate::gateway::{RegistryGateway, VaultGateway};
use crate::state::{transition, ActionEvent, ActionState};
use crate::types::{
    PortfolioCommitment, PortfolioInput, PortfolioSnapshot, ProposalCall, ProposedAction, StrategyParams, U256,
};

/// Final state of one action.
#[derive(Debug)]
pub struct ActionOutcome {
    pub action: ProposedAction,
    /// Vault action id, once the proposal was resolved.
    pub action_id: Option<u64>,
    pub state: ActionState,
    /// Set when the action ended in [`ActionState::Failed`] on a step error.
    pub failure: Option<StepFailure>,
}

impl ActionOutcome {
    fn new(action: ProposedAction) -> Self {
        Self {
            action,
            action_id: None,
            state: ActionState::Init,
            failure: None,
        }
    }

    fn advance(&mut self, event: ActionEvent) {
        self.state = match transition(self.state, event) {
            Ok(next) => next,
            Err(err) => {
                error!(action = %self.action.label, error = %err, "invalid state transition");
                ActionState::Failed
            }
        };
    }
}

/// Result of one pipeline run.
#[derive(Debug)]
pub struct RunReport {
    pub commitment: PortfolioCommitment,
    /// Whether `set_portfolio_commit` reached finality.
    pub commitment_recorded: bool,
    pub outcomes: Vec<ActionOutcome>,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn approved_count(&self) -> usize {
        self.count(ActionState::Approved)
    }

    pub fn rejected_count(&self) -> usize {
        self.count(ActionState::Rejected)
    }

    pub fn failed_count(&self) -> usize {
        self.count(ActionState::Failed)
    }

    pub fn summary(&self) -> String {
        format!(
            "pipeline complete: {}/{} actions approved",
            self.approved_count(),
            self.total()
        )
    }

    fn count(&self, state: ActionState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }
}

/// Runs proposed actions against a vault and a proof registry.
pub struct Orchestrator<'a, V, R> {
    vault: &'a V,
    registry: &'a R,
    params: StrategyParams,
}

impl<'a, V, R> Orchestrator<'a, V, R>
where
    V: VaultGateway,
    R: RegistryGateway,
{
    pub fn new(vault: &'a V, registry: &'a R) -> Self {
        Self {
            vault,
            registry,
            params: StrategyParams::default(),
        }
    }

    /// Override the strategy parameters sent with each proof. They must match
    /// the parameters the actions were decided with.
    pub fn with_params(mut self, params: StrategyParams) -> Self {
        self.params = params;
        self
    }

    /// Commit the snapshot once, then drive every action to a terminal state.
    pub async fn run(&self, snapshot: &PortfolioSnapshot, actions: Vec<ProposedAction>) -> RunReport {
        let commitment = commit(snapshot);
        let commitment_recorded = self.record_commitment(commitment).await;

        let mut outcomes = Vec::with_capacity(actions.len());
        for action in actions {
            outcomes.push(self.run_action(snapshot, commitment, action).await);
        }

        RunReport {
            commitment,
            commitment_recorded,
            outcomes,
        }
    }

    /// Failure is logged and the run continues with the local commitment.
    async fn record_commitment(&self, commitment: PortfolioCommitment) -> bool {
        match self.vault.set_portfolio_commit(commitment.felt()).await {
            Ok(tx_hash) => {
                info!(
                    step = %Step::SetPortfolioCommit,
                    commitment = %commitment,
                    tx_hash = %tx_hash,
                    "portfolio commitment recorded"
                );
                true
            }
            Err(err) => {
                warn!(
                    step = %Step::SetPortfolioCommit,
                    commitment = %commitment,
                    code = err.error_code(),
                    error = %err,
                    "portfolio commitment not recorded, continuing with local value"
                );
                false
            }
        }
    }

    async fn run_action(
        &self,
        snapshot: &PortfolioSnapshot,
        commitment: PortfolioCommitment,
        action: ProposedAction,
    ) -> ActionOutcome {
        let mut outcome = ActionOutcome::new(action);
        outcome.advance(ActionEvent::CommitResolved);
        info!(
            action = %outcome.action.label,
            action_type = %outcome.action.action_type,
            amount = %outcome.action.amount,
            risk_score = outcome.action.risk_score,
            "processing action"
        );

        if let Err(failure) = self.drive(&mut outcome, snapshot, commitment).await {
            error!(
                action = %outcome.action.label,
                step = %failure.step,
                code = failure.source.error_code(),
                error = %failure.source,
                "action failed"
            );
            outcome.advance(ActionEvent::StepFailed);
            outcome.failure = Some(failure);
        }

        if !outcome.state.is_terminal() {
            error!(action = %outcome.action.label, state = %outcome.state, "action left open, marking failed");
            outcome.state = ActionState::Failed;
        }

        info!(action = %outcome.action.label, state = %outcome.state, "action finished");
        outcome
    }

    async fn drive(
        &self,
        outcome: &mut ActionOutcome,
        snapshot: &PortfolioSnapshot,
        commitment: PortfolioCommitment,
    ) -> Result<(), StepFailure> {
        let label = outcome.action.label.clone();
        let output = outcome.action.output();

        // Proof submission. The registry re-derives the decision and reverts
        // on mismatch.
        let input = PortfolioInput::from(snapshot);
        let tx_hash = self
            .registry
            .submit_proof(&input, &self.params, &output)
            .await
            .map_err(at(Step::SubmitProof))?;
        info!(action = %label, step = %Step::SubmitProof, tx_hash = %tx_hash, "decision proof submitted");
        outcome.advance(ActionEvent::ProofSubmitted);

        // Proof id and hash.
        let proof_hash = self
            .registry
            .compute_output_hash(&output)
            .await
            .map_err(at(Step::ResolveProof))?;
        let total_proofs = self
            .registry
            .get_total_proofs()
            .await
            .map_err(at(Step::ResolveProof))?;
        let proof_id = last_index(total_proofs, "total_proofs").map_err(at(Step::ResolveProof))?;
        outcome.action.proof_id = Some(proof_id);
        outcome.action.proof_hash = Some(proof_hash);
        info!(action = %label, step = %Step::ResolveProof, proof_id, "proof resolved");
        outcome.advance(ActionEvent::ProofResolved);

        // Proposal.
        let call = ProposalCall {
            action_type: output.action_type,
            amount: U256::from_u128(output.amount),
            risk_score: output.risk_score,
            proof_id,
            portfolio_commitment: commitment,
        };
        let tx_hash = self
            .vault
            .propose_action(&call)
            .await
            .map_err(at(Step::ProposeAction))?;
        info!(action = %label, step = %Step::ProposeAction, tx_hash = %tx_hash, proof_id, "action proposed");

        let agent_state = self
            .vault
            .read_agent_state()
            .await
            .map_err(at(Step::ResolveAction))?;
        let action_id = last_index(agent_state.total_actions, "total_actions").map_err(at(Step::ResolveAction))?;
        outcome.action_id = Some(action_id);
        outcome.advance(ActionEvent::ActionProposed);

        // Approval. A reverted approval is the vault refusing the action.
        match self.vault.approve_action(action_id).await {
            Ok(tx_hash) => {
                info!(action = %label, step = %Step::ApproveAction, tx_hash = %tx_hash, action_id, "approval confirmed");
            }
            Err(err) if err.is_contract_rejection() => {
                warn!(
                    action = %label,
                    step = %Step::ApproveAction,
                    action_id,
                    error = %err,
                    "approval refused by vault"
                );
                outcome.advance(ActionEvent::ApprovalRefused);
                return Ok(());
            }
            Err(err) => return Err(StepFailure::new(Step::ApproveAction, err)),
        }

        let record = self
            .vault
            .read_action(action_id)
            .await
            .map_err(at(Step::ReadAction))?;
        if record.approved {
            info!(action = %label, action_id, "action approved");
        } else {
            warn!(action = %label, action_id, "action not approved by vault constraints");
        }
        outcome.advance(ActionEvent::ApprovalObserved {
            approved: record.approved,
        });
        Ok(())
    }
}

fn at(step: Step) -> impl Fn(GatewayError) -> StepFailure {
    move |err| StepFailure::new(step, err)
}

/// Index of the entry a counter just advanced past. Zero means the write we
/// just waited on is not visible, which fails closed.
fn last_index(counter: u64, name: &str) -> Result<u64, GatewayError> {
    counter
        .checked_sub(1)
        .ok_or_else(|| GatewayError::Inconsistent(format!("{} is 0 after a confirmed write", name)))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use starknet_crypto::FieldElement;

    use super::*;
    use crate::error::DecodeError;
    use crate::strategy::decide;
    use crate::types::{
        ActionOutput, ActionRecord, ActionType, AgentState, Constraints, DecisionProof, TxHash,
    };

    /// Which calls the fake chain fails.
    #[derive(Clone, Copy, Default)]
    struct Faults {
        commit: bool,
        submit: bool,
        propose: bool,
        approve: bool,
        read_action: bool,
        approve_reverts: bool,
        approved_flag_false: bool,
        malformed_record: bool,
        output_hash: bool,
        agent_state: bool,
        /// `total_actions` stays at 0 after a proposal.
        stale_action_counter: bool,
    }

    struct FakeChain {
        faults: Faults,
        total_proofs: Mutex<u64>,
        actions: Mutex<Vec<ActionRecord>>,
        commitment: Mutex<Option<FieldElement>>,
        constraint_updates: Mutex<u32>,
    }

    impl FakeChain {
        fn new(faults: Faults, total_proofs: u64, existing_actions: u64) -> Self {
            let record = ActionRecord {
                action_type: ActionType::Rebalance,
                amount: U256::default(),
                risk_score: 0,
                proof_hash: FieldElement::ZERO,
                timestamp: 0,
                approved: true,
            };
            Self {
                faults,
                total_proofs: Mutex::new(total_proofs),
                actions: Mutex::new(vec![record; existing_actions as usize]),
                commitment: Mutex::new(None),
                constraint_updates: Mutex::new(0),
            }
        }

        fn tx(&self) -> TxHash {
            TxHash(FieldElement::from(0x7au64))
        }
    }

    fn provider_down() -> GatewayError {
        GatewayError::Provider("connection refused".into())
    }

    #[async_trait]
    impl VaultGateway for FakeChain {
        async fn read_agent_state(&self) -> Result<AgentState, GatewayError> {
            if self.faults.agent_state {
                return Err(provider_down());
            }
            let total_actions = if self.faults.stale_action_counter {
                0
            } else {
                self.actions.lock().expect("lock").len() as u64
            };
            Ok(AgentState {
                agent: FieldElement::from(0x42u64),
                daily_spent: U256::default(),
                last_reset_timestamp: 0,
                total_actions,
                constraints: Constraints {
                    max_daily_spend: U256::from_u128(100_000),
                    allowed_action_types: FieldElement::from(7u64),
                    max_single_tx: U256::from_u128(10_000),
                    risk_threshold: 50,
                    is_active: true,
                },
            })
        }

        async fn read_action(&self, action_id: u64) -> Result<ActionRecord, GatewayError> {
            if self.faults.read_action {
                return Err(provider_down());
            }
            if self.faults.malformed_record {
                return Err(DecodeError::UnexpectedLength {
                    shape: "ActionRecord",
                    expected: 7,
                    got: 5,
                }
                .into());
            }
            let actions = self.actions.lock().expect("lock");
            actions
                .get(action_id as usize)
                .copied()
                .ok_or_else(|| GatewayError::InvalidInput(format!("no action {}", action_id)))
        }

        async fn set_portfolio_commit(&self, hash: FieldElement) -> Result<TxHash, GatewayError> {
            if self.faults.commit {
                return Err(GatewayError::Timeout("commit not final".into()));
            }
            *self.commitment.lock().expect("lock") = Some(hash);
            Ok(self.tx())
        }

        async fn get_portfolio_commit(&self) -> Result<FieldElement, GatewayError> {
            Ok(self.commitment.lock().expect("lock").unwrap_or(FieldElement::ZERO))
        }

        async fn propose_action(&self, call: &ProposalCall) -> Result<TxHash, GatewayError> {
            if self.faults.propose {
                return Err(GatewayError::Reverted {
                    tx_hash: "0x1".into(),
                    reason: "proof not verified".into(),
                });
            }
            self.actions.lock().expect("lock").push(ActionRecord {
                action_type: call.action_type,
                amount: call.amount,
                risk_score: call.risk_score,
                proof_hash: FieldElement::from(call.proof_id),
                timestamp: 1_700_000_000,
                approved: false,
            });
            Ok(self.tx())
        }

        async fn approve_action(&self, action_id: u64) -> Result<TxHash, GatewayError> {
            if self.faults.approve {
                return Err(provider_down());
            }
            if self.faults.approve_reverts {
                return Err(GatewayError::Reverted {
                    tx_hash: "0x2".into(),
                    reason: "risk too high".into(),
                });
            }
            let mut actions = self.actions.lock().expect("lock");
            let record = actions
                .get_mut(action_id as usize)
                .ok_or_else(|| GatewayError::InvalidInput(format!("no action {}", action_id)))?;
            record.approved = !self.faults.approved_flag_false;
            Ok(self.tx())
        }

        async fn update_constraints(&self, _constraints: &Constraints) -> Result<TxHash, GatewayError> {
            *self.constraint_updates.lock().expect("lock") += 1;
            Ok(self.tx())
        }
    }

    #[async_trait]
    impl RegistryGateway for FakeChain {
        async fn submit_proof(
            &self,
            _input: &PortfolioInput,
            _params: &StrategyParams,
            _output: &ActionOutput,
        ) -> Result<TxHash, GatewayError> {
            if self.faults.submit {
                return Err(GatewayError::Reverted {
                    tx_hash: "0x3".into(),
                    reason: "decision mismatch".into(),
                });
            }
            *self.total_proofs.lock().expect("lock") += 1;
            Ok(self.tx())
        }

        async fn compute_output_hash(&self, output: &ActionOutput) -> Result<FieldElement, GatewayError> {
            if self.faults.output_hash {
                return Err(DecodeError::UnexpectedLength {
                    shape: "output_hash",
                    expected: 1,
                    got: 0,
                }
                .into());
            }
            Ok(FieldElement::from(output.amount) + FieldElement::from(output.risk_score))
        }

        async fn get_total_proofs(&self) -> Result<u64, GatewayError> {
            Ok(*self.total_proofs.lock().expect("lock"))
        }

        async fn get_proof(&self, _proof_id: u64) -> Result<DecisionProof, GatewayError> {
            Err(GatewayError::InvalidInput("not stored".into()))
        }
    }

    fn snapshot() -> PortfolioSnapshot {
        PortfolioSnapshot {
            balance_sats: 100_000,
            utxo_count: 3,
            ordinal_count: 0,
            rune_count: 0,
        }
    }

    async fn run_with(chain: &FakeChain) -> RunReport {
        let snapshot = snapshot();
        Orchestrator::new(chain, chain).run(&snapshot, decide(&snapshot)).await
    }

    #[tokio::test]
    async fn test_happy_path_approves() {
        let chain = FakeChain::new(Faults::default(), 0, 0);
        let report = run_with(&chain).await;

        assert!(report.commitment_recorded);
        assert_eq!(report.total(), 1);
        assert_eq!(report.approved_count(), 1);
        assert_eq!(report.summary(), "pipeline complete: 1/1 actions approved");

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.state, ActionState::Approved);
        assert!(outcome.failure.is_none());
        assert_eq!(outcome.action.proof_hash, Some(FieldElement::from(5_030u64)));
        assert_eq!(*chain.constraint_updates.lock().expect("lock"), 0);
    }

    #[tokio::test]
    async fn test_ids_equal_counters_before_submission() {
        let chain = FakeChain::new(Faults::default(), 5, 3);
        let report = run_with(&chain).await;

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.action.proof_id, Some(5));
        assert_eq!(outcome.action_id, Some(3));
    }

    #[tokio::test]
    async fn test_commit_failure_is_not_fatal() {
        let faults = Faults {
            commit: true,
            ..Faults::default()
        };
        let chain = FakeChain::new(faults, 0, 0);
        let report = run_with(&chain).await;

        assert!(!report.commitment_recorded);
        assert_eq!(report.commitment, commit(&snapshot()));
        assert_eq!(report.outcomes[0].state, ActionState::Approved);
    }

    #[tokio::test]
    async fn test_submit_failure_marks_failed() {
        let faults = Faults {
            submit: true,
            ..Faults::default()
        };
        let chain = FakeChain::new(faults, 0, 0);
        let report = run_with(&chain).await;

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.state, ActionState::Failed);
        let failure = outcome.failure.as_ref().expect("should record failure");
        assert_eq!(failure.step, Step::SubmitProof);
        assert_eq!(outcome.action.proof_id, None);
        assert_eq!(outcome.action_id, None);
    }

    #[tokio::test]
    async fn test_unapproved_record_is_rejected() {
        let faults = Faults {
            approved_flag_false: true,
            ..Faults::default()
        };
        let chain = FakeChain::new(faults, 0, 0);
        let report = run_with(&chain).await;

        assert_eq!(report.outcomes[0].state, ActionState::Rejected);
        assert_eq!(report.summary(), "pipeline complete: 0/1 actions approved");
    }

    #[tokio::test]
    async fn test_reverted_approval_is_rejected() {
        let faults = Faults {
            approve_reverts: true,
            ..Faults::default()
        };
        let chain = FakeChain::new(faults, 0, 0);
        let report = run_with(&chain).await;

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.state, ActionState::Rejected);
        assert!(outcome.failure.is_none());
        assert_eq!(report.rejected_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_record_fails_closed() {
        let faults = Faults {
            malformed_record: true,
            ..Faults::default()
        };
        let chain = FakeChain::new(faults, 0, 0);
        let report = run_with(&chain).await;

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.state, ActionState::Failed);
        let failure = outcome.failure.as_ref().expect("should record failure");
        assert_eq!(failure.step, Step::ReadAction);
        assert_eq!(failure.source.error_code(), "MALFORMED_RESPONSE");
    }

    #[tokio::test]
    async fn test_zero_counter_after_submit_fails_closed() {
        struct StuckRegistry;

        #[async_trait]
        impl RegistryGateway for StuckRegistry {
            async fn submit_proof(
                &self,
                _input: &PortfolioInput,
                _params: &StrategyParams,
                _output: &ActionOutput,
            ) -> Result<TxHash, GatewayError> {
                Ok(TxHash(FieldElement::ONE))
            }

            async fn compute_output_hash(&self, _output: &ActionOutput) -> Result<FieldElement, GatewayError> {
                Ok(FieldElement::ONE)
            }

            async fn get_total_proofs(&self) -> Result<u64, GatewayError> {
                Ok(0)
            }

            async fn get_proof(&self, _proof_id: u64) -> Result<DecisionProof, GatewayError> {
                Err(GatewayError::InvalidInput("none".into()))
            }
        }

        let vault = FakeChain::new(Faults::default(), 0, 0);
        let snapshot = snapshot();
        let report = Orchestrator::new(&vault, &StuckRegistry)
            .run(&snapshot, decide(&snapshot))
            .await;

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.state, ActionState::Failed);
        let failure = outcome.failure.as_ref().expect("should record failure");
        assert_eq!(failure.step, Step::ResolveProof);
        assert_eq!(failure.source.error_code(), "INCONSISTENT_STATE");
    }

    #[tokio::test]
    async fn test_output_hash_failure_fails_at_resolve_proof() {
        let faults = Faults {
            output_hash: true,
            ..Faults::default()
        };
        let chain = FakeChain::new(faults, 0, 0);
        let report = run_with(&chain).await;

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.state, ActionState::Failed);
        let failure = outcome.failure.as_ref().expect("should record failure");
        assert_eq!(failure.step, Step::ResolveProof);
        assert_eq!(failure.source.error_code(), "MALFORMED_RESPONSE");
        assert_eq!(outcome.action.proof_id, None);
        // nothing was proposed
        assert!(chain.actions.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn test_agent_state_failure_fails_at_resolve_action() {
        let faults = Faults {
            agent_state: true,
            ..Faults::default()
        };
        let chain = FakeChain::new(faults, 0, 0);
        let report = run_with(&chain).await;

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.state, ActionState::Failed);
        let failure = outcome.failure.as_ref().expect("should record failure");
        assert_eq!(failure.step, Step::ResolveAction);
        assert_eq!(failure.source.error_code(), "PROVIDER_ERROR");
        assert_eq!(outcome.action.proof_id, Some(0));
        assert_eq!(outcome.action_id, None);
    }

    #[tokio::test]
    async fn test_zero_action_counter_after_propose_fails_closed() {
        let faults = Faults {
            stale_action_counter: true,
            ..Faults::default()
        };
        let chain = FakeChain::new(faults, 0, 0);
        let report = run_with(&chain).await;

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.state, ActionState::Failed);
        let failure = outcome.failure.as_ref().expect("should record failure");
        assert_eq!(failure.step, Step::ResolveAction);
        assert_eq!(failure.source.error_code(), "INCONSISTENT_STATE");
        assert_eq!(outcome.action_id, None);
        // the proposal was written but never approved
        let actions = chain.actions.lock().expect("lock");
        assert_eq!(actions.len(), 1);
        assert!(!actions[0].approved);
    }

    #[tokio::test]
    async fn test_every_fault_combination_terminates() {
        for mask in 0u8..32 {
            let faults = Faults {
                commit: mask & 1 != 0,
                submit: mask & 2 != 0,
                propose: mask & 4 != 0,
                approve: mask & 8 != 0,
                read_action: mask & 16 != 0,
                ..Faults::default()
            };
            let chain = FakeChain::new(faults, 0, 0);
            let report = run_with(&chain).await;

            assert_eq!(report.total(), 1);
            let outcome = &report.outcomes[0];
            assert!(outcome.state.is_terminal(), "mask {mask:05b} left {}", outcome.state);

            // commit failure alone never fails the action
            let action_faults = mask >> 1;
            let expected = if action_faults == 0 {
                ActionState::Approved
            } else {
                ActionState::Failed
            };
            assert_eq!(outcome.state, expected, "mask {mask:05b}");
            assert_eq!(
                report.approved_count() + report.rejected_count() + report.failed_count(),
                1
            );
        }
    }

    #[tokio::test]
    async fn test_actions_run_in_order() {
        let chain = FakeChain::new(Faults::default(), 0, 0);
        let snapshot = snapshot();
        let mut actions = decide(&snapshot);
        // a second action; the fake accepts it regardless of the decision
        actions.push(ProposedAction::new(ActionType::Swap, "swap 1 rune(s) (risk: 40)", 1_000, 40));

        let report = Orchestrator::new(&chain, &chain).run(&snapshot, actions).await;
        assert_eq!(report.total(), 2);
        assert_eq!(report.outcomes[0].action.proof_id, Some(0));
        assert_eq!(report.outcomes[1].action.proof_id, Some(1));
        assert_eq!(report.outcomes[1].action_id, Some(1));
        assert_eq!(report.approved_count(), 2);
    }
}
