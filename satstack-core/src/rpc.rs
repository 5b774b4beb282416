//! Starknet JSON-RPC gateway for the AgentVault and ProofRegistry contracts.
//!
//! This module requires the `starknet-rpc` feature flag.
//!
//! Writes are signed by a single-owner account and block until a receipt is
//! available; they are sent exactly once. View calls are retried with
//! exponential backoff on transport errors.

#![cfg(feature = "starknet-rpc")]

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use starknet::{
    accounts::{Account, AccountError, Call, ConnectedAccount, ExecutionEncoding, SingleOwnerAccount},
    core::{
        types::{
            BlockId, BlockTag, ExecutionResult, FieldElement, FunctionCall, MaybePendingTransactionReceipt,
            StarknetError, TransactionReceipt,
        },
        utils::get_selector_from_name,
    },
    providers::{jsonrpc::HttpTransport, JsonRpcClient, Provider, ProviderError},
    signers::{LocalWallet, SigningKey},
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    codec::{self, entrypoints},
    error::GatewayError,
    gateway::{RegistryGateway, VaultGateway},
    types::{
        felt_hex, ActionOutput, ActionRecord, AgentState, Constraints, DecisionProof, PortfolioInput,
        ProposalCall, StrategyParams, TxHash,
    },
};

/// Upper bound for one view-call backoff delay.
pub const MAX_RETRY_DELAY_MS: u64 = 60_000;

type AgentAccount = SingleOwnerAccount<JsonRpcClient<HttpTransport>, LocalWallet>;

/// Connection settings for [`StarknetGateway`].
#[derive(Clone)]
pub struct StarknetGatewayConfig {
    pub rpc_url: String,
    pub vault_address: String,
    pub registry_address: String,
    /// Agent account that signs every write.
    pub account_address: String,
    pub private_key: String,
    /// Finality wait per transaction.
    pub tx_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// View call retries on transport errors.
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for StarknetGatewayConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:5050".into(),
            vault_address: String::new(),
            registry_address: String::new(),
            account_address: String::new(),
            private_key: String::new(),
            tx_timeout_secs: 120,
            poll_interval_ms: 2_000,
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }
}

impl fmt::Debug for StarknetGatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StarknetGatewayConfig")
            .field("rpc_url", &self.rpc_url)
            .field("vault_address", &self.vault_address)
            .field("registry_address", &self.registry_address)
            .field("account_address", &self.account_address)
            .field("private_key", &"<redacted>")
            .field("tx_timeout_secs", &self.tx_timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .finish()
    }
}

/// Vault and registry access over one JSON-RPC endpoint.
pub struct StarknetGateway {
    account: AgentAccount,
    vault: FieldElement,
    registry: FieldElement,
    chain_id: FieldElement,
    config: StarknetGatewayConfig,
}

impl StarknetGateway {
    /// Connect to the endpoint and build the signing account.
    ///
    /// Fails if the endpoint does not answer `starknet_chainId`, so an
    /// unreachable chain is detected before any action is processed.
    pub async fn connect(config: StarknetGatewayConfig) -> Result<Self, GatewayError> {
        let url: Url = config
            .rpc_url
            .parse()
            .map_err(|e: url::ParseError| GatewayError::InvalidInput(format!("invalid RPC URL: {}", e)))?;
        let provider = JsonRpcClient::new(HttpTransport::new(url));

        let vault = parse_felt("vault address", &config.vault_address)?;
        let registry = parse_felt("registry address", &config.registry_address)?;
        let address = parse_felt("account address", &config.account_address)?;
        let private_key = parse_felt("private key", &config.private_key)?;

        let chain_id = provider
            .chain_id()
            .await
            .map_err(|e| GatewayError::Provider(format!("chain endpoint unreachable: {}", e)))?;
        info!(rpc_url = %config.rpc_url, chain_id = %felt_hex(&chain_id), "connected to Starknet");

        let signer = LocalWallet::from(SigningKey::from_secret_scalar(private_key));
        let account = SingleOwnerAccount::new(provider, signer, address, chain_id, ExecutionEncoding::New);

        Ok(Self {
            account,
            vault,
            registry,
            chain_id,
            config,
        })
    }

    pub fn chain_id(&self) -> FieldElement {
        self.chain_id
    }

    pub fn config(&self) -> &StarknetGatewayConfig {
        &self.config
    }

    /// Sign, send and wait for finality. Never retried.
    async fn invoke(
        &self,
        contract: FieldElement,
        entrypoint: &'static str,
        calldata: Vec<FieldElement>,
    ) -> Result<TxHash, GatewayError> {
        debug!(
            entrypoint,
            contract = %felt_hex(&contract),
            calldata = ?codec::calldata_to_strings(&calldata),
            "sending transaction"
        );
        let call = Call {
            to: contract,
            selector: selector(entrypoint)?,
            calldata,
        };

        let result = self
            .account
            .execute(vec![call])
            .send()
            .await
            .map_err(|e| send_error(entrypoint, e))?;

        let tx_hash = TxHash(result.transaction_hash);
        debug!(entrypoint, tx_hash = %tx_hash, "transaction sent, waiting for finality");
        self.wait_for_transaction(tx_hash).await?;
        Ok(tx_hash)
    }

    /// Poll the receipt until it leaves the pending state or the timeout
    /// elapses.
    async fn wait_for_transaction(&self, tx_hash: TxHash) -> Result<(), GatewayError> {
        let timeout = Duration::from_secs(self.config.tx_timeout_secs);
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let start = Instant::now();

        loop {
            if start.elapsed() > timeout {
                return Err(GatewayError::Timeout(format!(
                    "transaction {} not confirmed within {} seconds",
                    tx_hash, self.config.tx_timeout_secs
                )));
            }

            match self.account.provider().get_transaction_receipt(tx_hash.0).await {
                Ok(MaybePendingTransactionReceipt::Receipt(receipt)) => {
                    return match receipt_execution(&receipt) {
                        ExecutionResult::Succeeded => Ok(()),
                        ExecutionResult::Reverted { reason } => Err(GatewayError::Reverted {
                            tx_hash: tx_hash.to_string(),
                            reason: reason.clone(),
                        }),
                    };
                }
                Ok(MaybePendingTransactionReceipt::PendingReceipt(_)) => {
                    debug!(tx_hash = %tx_hash, "transaction pending");
                }
                Err(e) => {
                    debug!(tx_hash = %tx_hash, error = %e, "receipt not available yet");
                }
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// View call with exponential backoff on retryable errors.
    async fn call_view(
        &self,
        contract: FieldElement,
        entrypoint: &'static str,
        calldata: Vec<FieldElement>,
    ) -> Result<Vec<FieldElement>, GatewayError> {
        let request = FunctionCall {
            contract_address: contract,
            entry_point_selector: selector(entrypoint)?,
            calldata,
        };

        let mut attempt = 0;
        loop {
            let result = self
                .account
                .provider()
                .call(request.clone(), BlockId::Tag(BlockTag::Latest))
                .await
                .map_err(|e| GatewayError::Provider(format!("{}: {}", entrypoint, e)));

            match result {
                Ok(felts) => return Ok(felts),
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    let delay = backoff_delay(self.config.retry_delay_ms, attempt);
                    warn!(entrypoint, attempt = attempt + 1, delay_ms = delay, error = %err, "view call failed, retrying");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl VaultGateway for StarknetGateway {
    async fn read_agent_state(&self) -> Result<AgentState, GatewayError> {
        let felts = self
            .call_view(self.vault, entrypoints::GET_AGENT_STATE, vec![])
            .await?;
        Ok(codec::decode_agent_state(&felts)?)
    }

    async fn read_action(&self, action_id: u64) -> Result<ActionRecord, GatewayError> {
        let felts = self
            .call_view(self.vault, entrypoints::GET_ACTION, codec::action_id_calldata(action_id))
            .await?;
        Ok(codec::decode_action_record(&felts)?)
    }

    async fn set_portfolio_commit(&self, hash: FieldElement) -> Result<TxHash, GatewayError> {
        self.invoke(
            self.vault,
            entrypoints::SET_PORTFOLIO_COMMIT,
            codec::set_portfolio_commit_calldata(hash),
        )
        .await
    }

    async fn get_portfolio_commit(&self) -> Result<FieldElement, GatewayError> {
        let felts = self
            .call_view(self.vault, entrypoints::GET_PORTFOLIO_COMMIT, vec![])
            .await?;
        Ok(codec::decode_single_felt("portfolio_commit", &felts)?)
    }

    async fn propose_action(&self, call: &ProposalCall) -> Result<TxHash, GatewayError> {
        self.invoke(self.vault, entrypoints::PROPOSE_ACTION, codec::propose_action_calldata(call))
            .await
    }

    async fn approve_action(&self, action_id: u64) -> Result<TxHash, GatewayError> {
        self.invoke(self.vault, entrypoints::APPROVE_ACTION, codec::action_id_calldata(action_id))
            .await
    }

    async fn update_constraints(&self, constraints: &Constraints) -> Result<TxHash, GatewayError> {
        self.invoke(
            self.vault,
            entrypoints::UPDATE_CONSTRAINTS,
            codec::update_constraints_calldata(constraints),
        )
        .await
    }
}

#[async_trait]
impl RegistryGateway for StarknetGateway {
    async fn submit_proof(
        &self,
        input: &PortfolioInput,
        params: &StrategyParams,
        output: &ActionOutput,
    ) -> Result<TxHash, GatewayError> {
        self.invoke(
            self.registry,
            entrypoints::SUBMIT_PROOF,
            codec::submit_proof_calldata(input, params, output),
        )
        .await
    }

    async fn compute_output_hash(&self, output: &ActionOutput) -> Result<FieldElement, GatewayError> {
        let felts = self
            .call_view(
                self.registry,
                entrypoints::COMPUTE_OUTPUT_HASH,
                codec::compute_output_hash_calldata(output),
            )
            .await?;
        Ok(codec::decode_single_felt("output_hash", &felts)?)
    }

    async fn get_total_proofs(&self) -> Result<u64, GatewayError> {
        let felts = self
            .call_view(self.registry, entrypoints::GET_TOTAL_PROOFS, vec![])
            .await?;
        Ok(codec::decode_u64("total_proofs", &felts)?)
    }

    async fn get_proof(&self, proof_id: u64) -> Result<DecisionProof, GatewayError> {
        let felts = self
            .call_view(self.registry, entrypoints::VERIFY_PROOF, codec::proof_id_calldata(proof_id))
            .await?;
        Ok(codec::decode_decision_proof(&felts)?)
    }
}

/// Map a failed `send()`.
///
/// The account estimates the fee before signing, so a contract assertion
/// surfaces here as a contract or execution error rather than as a reverted
/// receipt. Those are the contract refusing the call.
fn send_error<S: fmt::Display>(entrypoint: &str, err: AccountError<S>) -> GatewayError {
    match err {
        AccountError::Provider(ProviderError::StarknetError(StarknetError::ContractError(data))) => {
            GatewayError::Rejected(format!("{}: {}", entrypoint, data.revert_error))
        }
        AccountError::Provider(ProviderError::StarknetError(StarknetError::TransactionExecutionError(data))) => {
            GatewayError::Rejected(format!("{}: {}", entrypoint, data.execution_error))
        }
        AccountError::Signing(e) => GatewayError::Account(format!("{}: signing failed: {}", entrypoint, e)),
        AccountError::Provider(e) => GatewayError::TransactionFailed(format!("{}: {}", entrypoint, e)),
        AccountError::ClassHashCalculation(e) => GatewayError::TransactionFailed(format!("{}: {}", entrypoint, e)),
        AccountError::ClassCompression(e) => GatewayError::TransactionFailed(format!("{}: {}", entrypoint, e)),
        AccountError::FeeOutOfRange => {
            GatewayError::TransactionFailed(format!("{}: fee calculation overflow", entrypoint))
        }
    }
}

/// `base_ms * 2^attempt`, saturating and capped at [`MAX_RETRY_DELAY_MS`].
fn backoff_delay(base_ms: u64, attempt: u32) -> u64 {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor).min(MAX_RETRY_DELAY_MS)
}

fn receipt_execution(receipt: &TransactionReceipt) -> &ExecutionResult {
    match receipt {
        TransactionReceipt::Invoke(r) => &r.execution_result,
        TransactionReceipt::L1Handler(r) => &r.execution_result,
        TransactionReceipt::Declare(r) => &r.execution_result,
        TransactionReceipt::Deploy(r) => &r.execution_result,
        TransactionReceipt::DeployAccount(r) => &r.execution_result,
    }
}

fn selector(entrypoint: &str) -> Result<FieldElement, GatewayError> {
    get_selector_from_name(entrypoint)
        .map_err(|e| GatewayError::InvalidInput(format!("selector for {}: {}", entrypoint, e)))
}

fn parse_felt(what: &str, hex_str: &str) -> Result<FieldElement, GatewayError> {
    FieldElement::from_hex_be(hex_str.trim())
        .map_err(|e| GatewayError::InvalidInput(format!("invalid {}: {}", what, e)))
}
