//! satstack-agent
//!
//! Off-chain agent around `satstack-core`:
//! 1. Read the portfolio snapshot from Xverse, falling back per field
//! 2. Decide on actions with the deterministic strategy
//! 3. Commit, prove, propose and approve each action on Starknet
//! 4. Report `approved/total`
//!
//! The owner-only constraint update lives in [`constraints`] and is never
//! part of a run.

pub mod config;
pub mod constraints;
pub mod context;
pub mod pipeline;
pub mod portfolio;
pub mod summary;

pub use config::{AgentConfig, ConfigError};
pub use constraints::{apply_constraints, constraints_json, ConstraintsApplied, ConstraintsUpdate};
pub use context::{AgentContext, ContextError};
pub use pipeline::{replay, run_pipeline, PipelineError, PipelineRun, Replay};
pub use portfolio::{
    capture_snapshot, count_pages, CapturedSnapshot, Page, PortfolioSource, ProviderError, SnapshotDefaults,
    SnapshotField, XverseClient,
};
pub use summary::{vault_summary, RecentAction, VaultSummary};
