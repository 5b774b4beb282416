//! Run context.
//!
//! Everything a run needs is built once at startup and passed by reference:
//! configuration, the snapshot source, the chain gateway, the fallback
//! defaults and the strategy parameters.

use satstack_core::{StarknetGateway, StrategyParams};

use crate::config::AgentConfig;
use crate::portfolio::{ProviderError, SnapshotDefaults, XverseClient};

pub struct AgentContext<P, C> {
    pub config: AgentConfig,
    pub portfolio: P,
    /// Implements both the vault and the registry gateway.
    pub chain: C,
    pub defaults: SnapshotDefaults,
    pub params: StrategyParams,
}

impl<P, C> AgentContext<P, C> {
    pub fn new(config: AgentConfig, portfolio: P, chain: C) -> Self {
        Self {
            config,
            portfolio,
            chain,
            defaults: SnapshotDefaults::default(),
            params: StrategyParams::default(),
        }
    }
}

impl AgentContext<XverseClient, StarknetGateway> {
    /// Build the Xverse client and connect to Starknet.
    ///
    /// Fails when the chain endpoint does not answer or an address or key is
    /// malformed.
    pub async fn connect(config: AgentConfig) -> Result<Self, ContextError> {
        let portfolio = XverseClient::new(&config.xverse_api_base, &config.xverse_api_key, config.http_timeout())?;
        let chain = StarknetGateway::connect(config.gateway()).await?;
        Ok(Self::new(config, portfolio, chain))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("snapshot provider: {0}")]
    Provider(#[from] ProviderError),

    #[error("starknet: {0}")]
    Chain(#[from] satstack_core::GatewayError),
}
