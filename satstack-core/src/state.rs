//! Per-action state machine of the proof pipeline.
//!
//! ```text
//! Init -> CommitSet -> ProofSubmitted -> ProofResolved -> Proposed -> Approved
//!                                                                   \-> Rejected
//! any non-terminal state --StepFailed--> Failed
//! ```

use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionState {
    Init,
    CommitSet,
    ProofSubmitted,
    ProofResolved,
    Proposed,
    Approved,
    Rejected,
    Failed,
}

impl ActionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActionState::Approved | ActionState::Rejected | ActionState::Failed)
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionState::Init => "INIT",
            ActionState::CommitSet => "COMMIT_SET",
            ActionState::ProofSubmitted => "PROOF_SUBMITTED",
            ActionState::ProofResolved => "PROOF_RESOLVED",
            ActionState::Proposed => "PROPOSED",
            ActionState::Approved => "APPROVED",
            ActionState::Rejected => "REJECTED",
            ActionState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionEvent {
    /// The run's commitment step finished, recorded on-chain or not.
    CommitResolved,
    ProofSubmitted,
    ProofResolved,
    ActionProposed,
    /// The stored action record was read back after approval.
    ApprovalObserved { approved: bool },
    /// The vault refused the approval transaction.
    ApprovalRefused,
    StepFailed,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid transition from {from} on {event:?}")]
pub struct TransitionError {
    pub from: ActionState,
    pub event: ActionEvent,
}

pub fn transition(current: ActionState, event: ActionEvent) -> Result<ActionState, TransitionError> {
    use ActionEvent as E;
    use ActionState as S;

    match (current, event) {
        (S::Init, E::CommitResolved) => Ok(S::CommitSet),
        (S::CommitSet, E::ProofSubmitted) => Ok(S::ProofSubmitted),
        (S::ProofSubmitted, E::ProofResolved) => Ok(S::ProofResolved),
        (S::ProofResolved, E::ActionProposed) => Ok(S::Proposed),
        (S::Proposed, E::ApprovalObserved { approved: true }) => Ok(S::Approved),
        (S::Proposed, E::ApprovalObserved { approved: false }) => Ok(S::Rejected),
        (S::Proposed, E::ApprovalRefused) => Ok(S::Rejected),
        (state, E::StepFailed) if !state.is_terminal() => Ok(S::Failed),
        _ => Err(TransitionError { from: current, event }),
    }
}
