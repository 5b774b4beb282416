//! Type definitions shared by the strategy, the codec and the orchestrator.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use starknet_crypto::FieldElement;

/// BTC portfolio observation the strategy decides on.
///
/// Captured once per run and never mutated afterwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSnapshot {
    /// Balance in satoshis.
    pub balance_sats: u64,
    /// Number of unspent outputs.
    pub utxo_count: u64,
    /// Number of ordinal inscriptions held.
    pub ordinal_count: u64,
    /// Number of rune balances held.
    pub rune_count: u64,
}

impl PortfolioSnapshot {
    /// Balance expressed in BTC, for display only.
    pub fn balance_btc(&self) -> f64 {
        self.balance_sats as f64 / 100_000_000.0
    }
}

/// Action kinds understood by the vault, tagged with their on-chain encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Rebalance,
    Catalog,
    Swap,
}

impl ActionType {
    /// Numeric tag written as the `action_type` felt.
    pub fn tag(&self) -> u8 {
        match self {
            ActionType::Rebalance => 1,
            ActionType::Catalog => 2,
            ActionType::Swap => 3,
        }
    }

    /// Inverse of [`ActionType::tag`].
    pub fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            1 => Some(ActionType::Rebalance),
            2 => Some(ActionType::Catalog),
            3 => Some(ActionType::Swap),
            _ => None,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionType::Rebalance => "REBALANCE",
            ActionType::Catalog => "CATALOG",
            ActionType::Swap => "SWAP",
        };
        f.write_str(name)
    }
}

/// An action produced by the strategy.
///
/// The orchestrator attaches `proof_id` and `proof_hash` once the decision
/// proof is resolved; nothing else changes after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedAction {
    pub action_type: ActionType,
    pub label: String,
    /// Amount in satoshis.
    pub amount: u128,
    /// Strategy risk in [0, 100]. Distinct from the vault's [0, 255] threshold.
    pub risk_score: u8,
    pub proof_id: Option<u64>,
    #[serde(serialize_with = "serialize_opt_felt")]
    pub proof_hash: Option<FieldElement>,
}

impl ProposedAction {
    pub fn new(action_type: ActionType, label: impl Into<String>, amount: u128, risk_score: u8) -> Self {
        Self {
            action_type,
            label: label.into(),
            amount,
            risk_score,
            proof_id: None,
            proof_hash: None,
        }
    }

    /// The three fields the registry hashes into the proof output.
    pub fn output(&self) -> ActionOutput {
        ActionOutput {
            action_type: self.action_type,
            amount: self.amount,
            risk_score: self.risk_score,
        }
    }
}

/// Chained Pedersen hash pinning the snapshot a decision was based on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PortfolioCommitment(pub FieldElement);

impl PortfolioCommitment {
    pub fn felt(&self) -> FieldElement {
        self.0
    }
}

impl fmt::Display for PortfolioCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", felt_hex(&self.0))
    }
}

impl Serialize for PortfolioCommitment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&felt_hex(&self.0))
    }
}

/// A u256 as carried in Cairo calldata: two u128 limbs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct U256 {
    pub low: u128,
    pub high: u128,
}

impl U256 {
    pub fn from_u128(value: u128) -> Self {
        Self { low: value, high: 0 }
    }

    /// Narrow to u128 if the high limb is empty.
    pub fn to_u128(&self) -> Option<u128> {
        (self.high == 0).then_some(self.low)
    }
}

impl fmt::Display for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_u128() {
            Some(value) => write!(f, "{}", value),
            None => write!(f, "0x{:032x}{:032x}", self.high, self.low),
        }
    }
}

/// Portfolio fields of a decision proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortfolioInput {
    pub balance_sats: u64,
    pub num_utxos: u64,
    pub num_ordinals: u64,
    pub num_runes: u64,
}

impl From<&PortfolioSnapshot> for PortfolioInput {
    fn from(snapshot: &PortfolioSnapshot) -> Self {
        Self {
            balance_sats: snapshot.balance_sats,
            num_utxos: snapshot.utxo_count,
            num_ordinals: snapshot.ordinal_count,
            num_runes: snapshot.rune_count,
        }
    }
}

/// Strategy parameters the registry re-derives the decision with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyParams {
    pub rebalance_threshold_sats: u64,
    pub max_risk: u8,
}

/// Proposed action fields of a decision proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActionOutput {
    pub action_type: ActionType,
    pub amount: u128,
    pub risk_score: u8,
}

/// Arguments of the vault's `propose_action` entrypoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProposalCall {
    pub action_type: ActionType,
    pub amount: U256,
    pub risk_score: u8,
    pub proof_id: u64,
    pub portfolio_commitment: PortfolioCommitment,
}

/// Vault limits checked by `approve_action`. Set by the owner only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Constraints {
    pub max_daily_spend: U256,
    /// Bitmap of allowed action types, opaque to the agent.
    pub allowed_action_types: FieldElement,
    pub max_single_tx: U256,
    /// Contract-side risk threshold in [0, 255].
    pub risk_threshold: u8,
    pub is_active: bool,
}

/// Result of the vault's `get_agent_state` view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AgentState {
    pub agent: FieldElement,
    pub daily_spent: U256,
    pub last_reset_timestamp: u64,
    pub total_actions: u64,
    pub constraints: Constraints,
}

/// An entry of the vault's append-only action log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActionRecord {
    pub action_type: ActionType,
    pub amount: U256,
    pub risk_score: u8,
    pub proof_hash: FieldElement,
    pub timestamp: u64,
    pub approved: bool,
}

/// A decision proof as stored by the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecisionProof {
    pub agent: FieldElement,
    pub input_hash: FieldElement,
    pub output_hash: FieldElement,
    pub strategy_hash: FieldElement,
    pub timestamp: u64,
    pub verified: bool,
}

/// Hash of a transaction that reached finality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TxHash(pub FieldElement);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", felt_hex(&self.0))
    }
}

/// Render a felt as 0x-prefixed, 64-digit hex.
pub fn felt_hex(felt: &FieldElement) -> String {
    format!("0x{:064x}", felt)
}

fn serialize_opt_felt<S: Serializer>(value: &Option<FieldElement>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(felt) => serializer.serialize_some(&felt_hex(felt)),
        None => serializer.serialize_none(),
    }
}
