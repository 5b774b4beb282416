//! Owner-side constraint updates for the `constraints` command.
//!
//! The vault accepts `update_constraints` only from its owner, so this runs
//! against a gateway signing with the owner account, never during an agent
//! run.

use serde_json::{json, Value};
use tracing::info;

use satstack_core::{felt_hex, Constraints, FieldElement, GatewayError, TxHash, VaultGateway, U256};

/// New vault limits as given on the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstraintsUpdate {
    pub max_daily_spend: u128,
    /// Bitmap of allowed action types, decimal or `0x` hex.
    pub allowed_action_types: String,
    pub max_single_tx: u128,
    pub risk_threshold: u8,
    pub is_active: bool,
}

impl ConstraintsUpdate {
    pub fn to_constraints(&self) -> Result<Constraints, GatewayError> {
        Ok(Constraints {
            max_daily_spend: U256::from_u128(self.max_daily_spend),
            allowed_action_types: parse_bitmap(&self.allowed_action_types)?,
            max_single_tx: U256::from_u128(self.max_single_tx),
            risk_threshold: self.risk_threshold,
            is_active: self.is_active,
        })
    }
}

/// Result of a confirmed update.
#[derive(Debug)]
pub struct ConstraintsApplied {
    pub tx_hash: TxHash,
    /// Constraints read back from the vault after finality.
    pub constraints: Constraints,
}

impl ConstraintsApplied {
    pub fn to_json(&self) -> Value {
        json!({
            "status": "constraints_updated",
            "transactionHash": self.tx_hash.to_string(),
            "constraints": constraints_json(&self.constraints),
        })
    }
}

/// Send the update, then read the vault state back. A read-back that does
/// not match what was sent is [`GatewayError::Inconsistent`].
pub async fn apply_constraints<V>(vault: &V, update: &ConstraintsUpdate) -> Result<ConstraintsApplied, GatewayError>
where
    V: VaultGateway + ?Sized,
{
    let requested = update.to_constraints()?;
    let tx_hash = vault.update_constraints(&requested).await?;
    info!(
        tx_hash = %tx_hash,
        max_daily_spend = %requested.max_daily_spend,
        max_single_tx = %requested.max_single_tx,
        risk_threshold = requested.risk_threshold,
        is_active = requested.is_active,
        "vault constraints updated"
    );

    let constraints = vault.read_agent_state().await?.constraints;
    if constraints != requested {
        return Err(GatewayError::Inconsistent(format!(
            "constraints read back as {:?} after update {}",
            constraints, tx_hash
        )));
    }
    Ok(ConstraintsApplied { tx_hash, constraints })
}

/// JSON view shared with the vault summary.
pub fn constraints_json(constraints: &Constraints) -> Value {
    json!({
        "maxDailySpend": constraints.max_daily_spend.to_string(),
        "maxSingleTx": constraints.max_single_tx.to_string(),
        "allowedActionTypes": felt_hex(&constraints.allowed_action_types),
        "riskThreshold": constraints.risk_threshold,
        "isActive": constraints.is_active,
    })
}

fn parse_bitmap(value: &str) -> Result<FieldElement, GatewayError> {
    let value = value.trim();
    let parsed = if value.starts_with("0x") || value.starts_with("0X") {
        FieldElement::from_hex_be(value).ok()
    } else {
        FieldElement::from_dec_str(value).ok()
    };
    parsed.ok_or_else(|| GatewayError::InvalidInput(format!("invalid action type bitmap: {:?}", value)))
}
