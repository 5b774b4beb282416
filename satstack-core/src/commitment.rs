//! Portfolio commitments.
//!
//! A commitment is `h(h(h(h(0, balance), utxos), ordinals), runes)` with `h`
//! the Starknet Pedersen hash. The vault stores it as-is, so the fold order
//! and the zero seed are fixed.

use starknet_crypto::{pedersen_hash, FieldElement};

use crate::types::{PortfolioCommitment, PortfolioSnapshot};

/// Seed of the left fold.
pub const COMMITMENT_SEED: FieldElement = FieldElement::ZERO;

/// Commit to a snapshot.
pub fn commit(snapshot: &PortfolioSnapshot) -> PortfolioCommitment {
    PortfolioCommitment(fold(&snapshot_fields(snapshot)))
}

/// Snapshot fields in commitment order.
pub fn snapshot_fields(snapshot: &PortfolioSnapshot) -> [FieldElement; 4] {
    [
        FieldElement::from(snapshot.balance_sats),
        FieldElement::from(snapshot.utxo_count),
        FieldElement::from(snapshot.ordinal_count),
        FieldElement::from(snapshot.rune_count),
    ]
}

fn fold(values: &[FieldElement]) -> FieldElement {
    values
        .iter()
        .fold(COMMITMENT_SEED, |acc, value| pedersen_hash(&acc, value))
}
