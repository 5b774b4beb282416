//! Error types for the decision-proof core.
//!
//! Each layer gets its own enum: the calldata codec reports [`DecodeError`],
//! chain access reports [`GatewayError`] and the orchestrator wraps the
//! failing step in a [`StepFailure`].

use std::fmt;

use thiserror::Error;

/// A contract response that does not match its expected shape.
///
/// Decoders never default a missing or out-of-range field; they report one
/// of these instead and the caller fails closed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Response had the wrong number of felts.
    #[error("{shape}: expected {expected} felts, got {got}")]
    UnexpectedLength {
        shape: &'static str,
        expected: usize,
        got: usize,
    },

    /// A felt did not fit the integer width of its field.
    #[error("{shape}.{field}: value {value} out of range")]
    OutOfRange {
        shape: &'static str,
        field: &'static str,
        value: String,
    },

    /// A boolean field was neither 0 nor 1.
    #[error("{shape}.{field}: {value} is not a boolean")]
    InvalidBool {
        shape: &'static str,
        field: &'static str,
        value: String,
    },

    /// An action type tag the strategy does not know.
    #[error("{shape}.action_type: unknown tag {tag}")]
    UnknownActionType { shape: &'static str, tag: String },
}

/// Errors raised while talking to the vault or proof registry.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport or JSON-RPC failure.
    #[error("provider error: {0}")]
    Provider(String),

    /// Signing failure.
    #[error("account error: {0}")]
    Account(String),

    /// The transaction could not be sent.
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    /// The transaction was included but its execution reverted.
    #[error("transaction {tx_hash} reverted: {reason}")]
    Reverted { tx_hash: String, reason: String },

    /// The contract refused the call before inclusion, typically an
    /// assertion hit during fee estimation.
    #[error("rejected by contract: {0}")]
    Rejected(String),

    /// Finality was not observed in time.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A read returned an unexpected shape.
    #[error("malformed response: {0}")]
    Decode(#[from] DecodeError),

    /// Invalid address, key or argument.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Chain state contradicts a write that just reached finality.
    #[error("inconsistent chain state: {0}")]
    Inconsistent(String),
}

impl GatewayError {
    /// Get a machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::Provider(_) => "PROVIDER_ERROR",
            GatewayError::Account(_) => "ACCOUNT_ERROR",
            GatewayError::TransactionFailed(_) => "TRANSACTION_FAILED",
            GatewayError::Reverted { .. } => "REVERTED",
            GatewayError::Rejected(_) => "REJECTED",
            GatewayError::Timeout(_) => "TIMEOUT",
            GatewayError::Decode(_) => "MALFORMED_RESPONSE",
            GatewayError::InvalidInput(_) => "INVALID_INPUT",
            GatewayError::Inconsistent(_) => "INCONSISTENT_STATE",
        }
    }

    /// Check if this error is retryable.
    ///
    /// Only meaningful for view calls; writes are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Provider(_) | GatewayError::Timeout(_))
    }

    /// Whether the contract itself refused the call.
    pub fn is_contract_rejection(&self) -> bool {
        matches!(self, GatewayError::Reverted { .. } | GatewayError::Rejected(_))
    }
}

/// Orchestrator step names, used in logs and failure reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    SetPortfolioCommit,
    SubmitProof,
    ResolveProof,
    ProposeAction,
    ResolveAction,
    ApproveAction,
    ReadAction,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::SetPortfolioCommit => "set_portfolio_commit",
            Step::SubmitProof => "submit_proof",
            Step::ResolveProof => "resolve_proof",
            Step::ProposeAction => "propose_action",
            Step::ResolveAction => "resolve_action",
            Step::ApproveAction => "approve_action",
            Step::ReadAction => "read_action",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pipeline step that failed for one action.
#[derive(Debug, Error)]
#[error("{step} failed: {source}")]
pub struct StepFailure {
    pub step: Step,
    #[source]
    pub source: GatewayError,
}

impl StepFailure {
    pub fn new(step: Step, source: GatewayError) -> Self {
        Self { step, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(GatewayError::Timeout("x".into()).error_code(), "TIMEOUT");
        let decode = GatewayError::from(DecodeError::UnexpectedLength {
            shape: "ActionRecord",
            expected: 7,
            got: 3,
        });
        assert_eq!(decode.error_code(), "MALFORMED_RESPONSE");
        assert_eq!(
            decode.to_string(),
            "malformed response: ActionRecord: expected 7 felts, got 3"
        );
    }

    #[test]
    fn test_is_retryable() {
        assert!(GatewayError::Provider("test".into()).is_retryable());
        assert!(GatewayError::Timeout("test".into()).is_retryable());
        assert!(!GatewayError::InvalidInput("test".into()).is_retryable());
        assert!(!GatewayError::Reverted {
            tx_hash: "0x1".into(),
            reason: "assert".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_step_failure_display() {
        let failure = StepFailure::new(
            Step::SubmitProof,
            GatewayError::Rejected("submit_proof: decision mismatch".into()),
        );
        assert_eq!(
            failure.to_string(),
            "submit_proof failed: rejected by contract: submit_proof: decision mismatch"
        );
    }
}
