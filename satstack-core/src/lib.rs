//! satstack-core
//!
//! Decision-proof core for an autonomous BTC portfolio agent verified on
//! Starknet.
//!
//! # Architecture
//!
//! A run turns one [`PortfolioSnapshot`] into zero or more verified actions:
//!
//! 1. [`strategy::decide`] maps the snapshot to proposed actions. It is a pure
//!    integer function; the proof registry re-derives it and rejects any
//!    mismatch.
//! 2. [`commitment::commit`] folds the snapshot into a Pedersen commitment
//!    that the vault stores and every proposal references.
//! 3. [`Orchestrator`] drives each action through proof submission, proof
//!    resolution, proposal and constraint-checked approval, ending every
//!    action in `Approved`, `Rejected` or `Failed`.
//!
//! Chain access goes through the [`VaultGateway`] and [`RegistryGateway`]
//! traits. With the `starknet-rpc` feature, [`rpc::StarknetGateway`]
//! implements both over Starknet JSON-RPC.
//!
//! # Contract layouts
//!
//! Calldata builders and strict response decoders live in [`codec`]. Decoders
//! fail closed on any shape mismatch.

pub mod codec;
pub mod commitment;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod state;
pub mod strategy;
pub mod types;

#[cfg(feature = "starknet-rpc")]
pub mod rpc;

pub use commitment::commit;
pub use error::{DecodeError, GatewayError, Step, StepFailure};
pub use gateway::{RegistryGateway, VaultGateway};
pub use orchestrator::{ActionOutcome, Orchestrator, RunReport};
pub use state::{transition, ActionEvent, ActionState, TransitionError};
pub use strategy::{decide, decide_with, MAX_RISK, REBALANCE_THRESHOLD_SATS};
pub use types::*;

pub use starknet_crypto::FieldElement;

#[cfg(feature = "starknet-rpc")]
pub use rpc::{StarknetGateway, StarknetGatewayConfig};
