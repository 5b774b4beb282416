//! Calldata encoding and strict response decoding for the vault and proof
//! registry entrypoints.
//!
//! Every decoder checks the exact felt count of its response and the range of
//! every field. Nothing is defaulted: a short tuple, an out-of-range integer or
//! a flag other than 0/1 is a [`DecodeError`].

use starknet_crypto::FieldElement;

use crate::error::DecodeError;
use crate::types::{
    ActionOutput, ActionRecord, ActionType, AgentState, Constraints, DecisionProof, PortfolioInput,
    ProposalCall, StrategyParams, U256,
};

/// Entrypoint names, hashed with `get_selector_from_name` by the RPC gateway.
pub mod entrypoints {
    pub const SET_PORTFOLIO_COMMIT: &str = "set_portfolio_commit";
    pub const GET_PORTFOLIO_COMMIT: &str = "get_portfolio_commit";
    pub const PROPOSE_ACTION: &str = "propose_action";
    pub const APPROVE_ACTION: &str = "approve_action";
    pub const GET_AGENT_STATE: &str = "get_agent_state";
    pub const GET_ACTION: &str = "get_action";
    pub const UPDATE_CONSTRAINTS: &str = "update_constraints";
    pub const SUBMIT_PROOF: &str = "submit_proof";
    pub const COMPUTE_OUTPUT_HASH: &str = "compute_output_hash";
    pub const GET_TOTAL_PROOFS: &str = "get_total_proofs";
    pub const VERIFY_PROOF: &str = "verify_proof";
}

pub const AGENT_STATE_LEN: usize = 12;
pub const ACTION_RECORD_LEN: usize = 7;
pub const DECISION_PROOF_LEN: usize = 6;

// ============================================================================
// Calldata
// ============================================================================

/// `submit_proof(PortfolioInput, StrategyParams, ActionOutput)`, flattened to
/// nine felts in struct order.
pub fn submit_proof_calldata(
    input: &PortfolioInput,
    params: &StrategyParams,
    output: &ActionOutput,
) -> Vec<FieldElement> {
    vec![
        FieldElement::from(input.balance_sats),
        FieldElement::from(input.num_utxos),
        FieldElement::from(input.num_ordinals),
        FieldElement::from(input.num_runes),
        FieldElement::from(params.rebalance_threshold_sats),
        FieldElement::from(params.max_risk),
        FieldElement::from(output.action_type.tag()),
        FieldElement::from(output.amount),
        FieldElement::from(output.risk_score),
    ]
}

/// `propose_action(action_type, amount: u256, risk_score, proof_id, portfolio_commitment)`.
pub fn propose_action_calldata(call: &ProposalCall) -> Vec<FieldElement> {
    vec![
        FieldElement::from(call.action_type.tag()),
        FieldElement::from(call.amount.low),
        FieldElement::from(call.amount.high),
        FieldElement::from(call.risk_score),
        FieldElement::from(call.proof_id),
        call.portfolio_commitment.felt(),
    ]
}

/// `approve_action(action_id)` and `get_action(action_id)`.
pub fn action_id_calldata(action_id: u64) -> Vec<FieldElement> {
    vec![FieldElement::from(action_id)]
}

/// `set_portfolio_commit(hash)`.
pub fn set_portfolio_commit_calldata(hash: FieldElement) -> Vec<FieldElement> {
    vec![hash]
}

/// `update_constraints(max_daily_spend: u256, allowed_action_types,
/// max_single_tx: u256, risk_threshold, is_active)`. Owner only.
pub fn update_constraints_calldata(constraints: &Constraints) -> Vec<FieldElement> {
    vec![
        FieldElement::from(constraints.max_daily_spend.low),
        FieldElement::from(constraints.max_daily_spend.high),
        constraints.allowed_action_types,
        FieldElement::from(constraints.max_single_tx.low),
        FieldElement::from(constraints.max_single_tx.high),
        FieldElement::from(constraints.risk_threshold),
        FieldElement::from(constraints.is_active as u8),
    ]
}

/// `compute_output_hash(action_type, amount, risk_score)`.
pub fn compute_output_hash_calldata(output: &ActionOutput) -> Vec<FieldElement> {
    vec![
        FieldElement::from(output.action_type.tag()),
        FieldElement::from(output.amount),
        FieldElement::from(output.risk_score),
    ]
}

/// `verify_proof(proof_id)`.
pub fn proof_id_calldata(proof_id: u64) -> Vec<FieldElement> {
    vec![FieldElement::from(proof_id)]
}

/// Render calldata as decimal strings for logging.
pub fn calldata_to_strings(calldata: &[FieldElement]) -> Vec<String> {
    calldata.iter().map(|felt| felt.to_string()).collect()
}

// ============================================================================
// Decoders
// ============================================================================

/// Decode `get_agent_state`:
/// `[agent, daily_spent.low, daily_spent.high, last_reset, total_actions,
///   max_daily.low, max_daily.high, allowed_types, max_single.low,
///   max_single.high, risk_threshold, is_active]`.
pub fn decode_agent_state(felts: &[FieldElement]) -> Result<AgentState, DecodeError> {
    const SHAPE: &str = "AgentState";
    expect_len(SHAPE, felts, AGENT_STATE_LEN)?;

    Ok(AgentState {
        agent: felts[0],
        daily_spent: u256_from_limbs(SHAPE, "daily_spent", felts[1], felts[2])?,
        last_reset_timestamp: felt_to_u64(SHAPE, "last_reset_timestamp", felts[3])?,
        total_actions: felt_to_u64(SHAPE, "total_actions", felts[4])?,
        constraints: Constraints {
            max_daily_spend: u256_from_limbs(SHAPE, "max_daily_spend", felts[5], felts[6])?,
            allowed_action_types: felts[7],
            max_single_tx: u256_from_limbs(SHAPE, "max_single_tx", felts[8], felts[9])?,
            risk_threshold: felt_to_u8(SHAPE, "risk_threshold", felts[10])?,
            is_active: felt_to_bool(SHAPE, "is_active", felts[11])?,
        },
    })
}

/// Decode `get_action`:
/// `[action_type, amount.low, amount.high, risk_score, proof_hash, timestamp, approved]`.
pub fn decode_action_record(felts: &[FieldElement]) -> Result<ActionRecord, DecodeError> {
    const SHAPE: &str = "ActionRecord";
    expect_len(SHAPE, felts, ACTION_RECORD_LEN)?;

    Ok(ActionRecord {
        action_type: decode_action_type(SHAPE, felts[0])?,
        amount: u256_from_limbs(SHAPE, "amount", felts[1], felts[2])?,
        risk_score: felt_to_u8(SHAPE, "risk_score", felts[3])?,
        proof_hash: felts[4],
        timestamp: felt_to_u64(SHAPE, "timestamp", felts[5])?,
        approved: felt_to_bool(SHAPE, "approved", felts[6])?,
    })
}

/// Decode `verify_proof`:
/// `[agent, input_hash, output_hash, strategy_hash, timestamp, verified]`.
pub fn decode_decision_proof(felts: &[FieldElement]) -> Result<DecisionProof, DecodeError> {
    const SHAPE: &str = "DecisionProof";
    expect_len(SHAPE, felts, DECISION_PROOF_LEN)?;

    Ok(DecisionProof {
        agent: felts[0],
        input_hash: felts[1],
        output_hash: felts[2],
        strategy_hash: felts[3],
        timestamp: felt_to_u64(SHAPE, "timestamp", felts[4])?,
        verified: felt_to_bool(SHAPE, "verified", felts[5])?,
    })
}

/// Decode a view returning exactly one felt (`compute_output_hash`,
/// `get_portfolio_commit`).
pub fn decode_single_felt(shape: &'static str, felts: &[FieldElement]) -> Result<FieldElement, DecodeError> {
    expect_len(shape, felts, 1)?;
    Ok(felts[0])
}

/// Decode a view returning one u64 counter (`get_total_proofs`).
pub fn decode_u64(shape: &'static str, felts: &[FieldElement]) -> Result<u64, DecodeError> {
    let felt = decode_single_felt(shape, felts)?;
    felt_to_u64(shape, "value", felt)
}

fn expect_len(shape: &'static str, felts: &[FieldElement], expected: usize) -> Result<(), DecodeError> {
    if felts.len() != expected {
        return Err(DecodeError::UnexpectedLength {
            shape,
            expected,
            got: felts.len(),
        });
    }
    Ok(())
}

fn out_of_range(shape: &'static str, field: &'static str, felt: FieldElement) -> DecodeError {
    DecodeError::OutOfRange {
        shape,
        field,
        value: felt.to_string(),
    }
}

pub fn felt_to_u8(shape: &'static str, field: &'static str, felt: FieldElement) -> Result<u8, DecodeError> {
    u8::try_from(felt).map_err(|_| out_of_range(shape, field, felt))
}

pub fn felt_to_u64(shape: &'static str, field: &'static str, felt: FieldElement) -> Result<u64, DecodeError> {
    u64::try_from(felt).map_err(|_| out_of_range(shape, field, felt))
}

pub fn felt_to_u128(shape: &'static str, field: &'static str, felt: FieldElement) -> Result<u128, DecodeError> {
    u128::try_from(felt).map_err(|_| out_of_range(shape, field, felt))
}

/// Cairo `bool`: exactly 0 or 1.
pub fn felt_to_bool(shape: &'static str, field: &'static str, felt: FieldElement) -> Result<bool, DecodeError> {
    if felt == FieldElement::ZERO {
        Ok(false)
    } else if felt == FieldElement::ONE {
        Ok(true)
    } else {
        Err(DecodeError::InvalidBool {
            shape,
            field,
            value: felt.to_string(),
        })
    }
}

pub fn u256_from_limbs(
    shape: &'static str,
    field: &'static str,
    low: FieldElement,
    high: FieldElement,
) -> Result<U256, DecodeError> {
    Ok(U256 {
        low: felt_to_u128(shape, field, low)?,
        high: felt_to_u128(shape, field, high)?,
    })
}

fn decode_action_type(shape: &'static str, felt: FieldElement) -> Result<ActionType, DecodeError> {
    u64::try_from(felt)
        .ok()
        .and_then(ActionType::from_tag)
        .ok_or_else(|| DecodeError::UnknownActionType {
            shape,
            tag: felt.to_string(),
        })
}
