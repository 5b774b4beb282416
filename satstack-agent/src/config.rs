//! Agent configuration.
//!
//! Read once at startup from the environment (optionally seeded from a
//! `.env` file) and never reloaded.

use std::env;
use std::fmt;
use std::time::Duration;

use satstack_core::StarknetGatewayConfig;
use thiserror::Error;

pub const DEFAULT_XVERSE_API_BASE: &str = "https://api.secretkeylabs.io";
pub const DEFAULT_STARKNET_RPC_URL: &str = "http://localhost:5050";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} is not a valid number: {value:?}")]
    InvalidNumber { key: &'static str, value: String },
}

/// Agent configuration.
#[derive(Clone)]
pub struct AgentConfig {
    /// Xverse API key, sent as `x-api-key`. May be empty.
    pub xverse_api_key: String,
    pub xverse_api_base: String,
    /// BTC address the snapshot is taken for.
    pub btc_address: String,
    pub starknet_rpc_url: String,
    pub vault_address: String,
    pub registry_address: String,
    pub agent_address: String,
    pub agent_private_key: String,
    /// Vault owner, only needed to change constraints.
    pub owner_address: Option<String>,
    pub owner_private_key: Option<String>,
    pub tx_timeout_secs: u64,
    pub tx_poll_interval_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub http_timeout_secs: u64,
}

impl AgentConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        Ok(Self {
            xverse_api_key: get("XVERSE_API_KEY").unwrap_or_default(),
            xverse_api_base: get("XVERSE_API_BASE").unwrap_or_else(|| DEFAULT_XVERSE_API_BASE.to_string()),
            btc_address: required("BTC_ADDRESS")?,
            starknet_rpc_url: get("STARKNET_RPC_URL").unwrap_or_else(|| DEFAULT_STARKNET_RPC_URL.to_string()),
            vault_address: required("VAULT_ADDRESS")?,
            registry_address: required("PROOF_REGISTRY_ADDRESS")?,
            agent_address: required("AGENT_ADDRESS")?,
            agent_private_key: required("AGENT_PRIVATE_KEY")?,
            owner_address: get("OWNER_ADDRESS"),
            owner_private_key: get("OWNER_PRIVATE_KEY"),
            tx_timeout_secs: number(&get, "TX_TIMEOUT_SECS", 120)?,
            tx_poll_interval_ms: number(&get, "TX_POLL_INTERVAL_MS", 2_000)?,
            max_retries: number(&get, "MAX_RETRIES", 3)?,
            retry_delay_ms: number(&get, "RETRY_DELAY_MS", 500)?,
            http_timeout_secs: number(&get, "HTTP_TIMEOUT_SECS", 15)?,
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Settings for the Starknet gateway.
    pub fn gateway(&self) -> StarknetGatewayConfig {
        StarknetGatewayConfig {
            rpc_url: self.starknet_rpc_url.clone(),
            vault_address: self.vault_address.clone(),
            registry_address: self.registry_address.clone(),
            account_address: self.agent_address.clone(),
            private_key: self.agent_private_key.clone(),
            tx_timeout_secs: self.tx_timeout_secs,
            poll_interval_ms: self.tx_poll_interval_ms,
            max_retries: self.max_retries,
            retry_delay_ms: self.retry_delay_ms,
        }
    }

    /// Gateway settings signing as the vault owner.
    pub fn owner_gateway(&self) -> Result<StarknetGatewayConfig, ConfigError> {
        let account_address = self.owner_address.clone().ok_or(ConfigError::Missing("OWNER_ADDRESS"))?;
        let private_key = self
            .owner_private_key
            .clone()
            .ok_or(ConfigError::Missing("OWNER_PRIVATE_KEY"))?;
        Ok(StarknetGatewayConfig {
            account_address,
            private_key,
            ..self.gateway()
        })
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("xverse_api_key", &if self.xverse_api_key.is_empty() { "" } else { "<redacted>" })
            .field("xverse_api_base", &self.xverse_api_base)
            .field("btc_address", &self.btc_address)
            .field("starknet_rpc_url", &self.starknet_rpc_url)
            .field("vault_address", &self.vault_address)
            .field("registry_address", &self.registry_address)
            .field("agent_address", &self.agent_address)
            .field("agent_private_key", &"<redacted>")
            .field("owner_address", &self.owner_address)
            .field("owner_private_key", &self.owner_private_key.as_ref().map(|_| "<redacted>"))
            .field("tx_timeout_secs", &self.tx_timeout_secs)
            .field("tx_poll_interval_ms", &self.tx_poll_interval_ms)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}

fn number<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { key, value }),
    }
}
