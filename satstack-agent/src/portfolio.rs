//! Portfolio snapshot provider.
//!
//! Reads balance, UTXO, ordinal and rune counts for one BTC address from the
//! Xverse API. Each field is fetched independently; a failed field falls back
//! to its value in [`SnapshotDefaults`] and is reported in
//! [`CapturedSnapshot::fallbacks`].

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use satstack_core::PortfolioSnapshot;

/// Page size of the UTXO listing.
pub const UTXO_PAGE_SIZE: u64 = 25;
/// Longer listings are treated as an unrecognized shape.
pub const MAX_UTXO_PAGES: u64 = 40;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to {endpoint} failed: {reason}")]
    Http { endpoint: String, reason: String },

    #[error("{endpoint} returned status {status}")]
    Status { endpoint: String, status: StatusCode },

    #[error("unrecognized response: {0}")]
    Shape(String),

    #[error("client setup failed: {0}")]
    Client(String),
}

/// Snapshot fields, in commitment order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SnapshotField {
    Balance,
    Utxos,
    Ordinals,
    Runes,
}

impl fmt::Display for SnapshotField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SnapshotField::Balance => "balance",
            SnapshotField::Utxos => "utxos",
            SnapshotField::Ordinals => "ordinals",
            SnapshotField::Runes => "runes",
        };
        f.write_str(name)
    }
}

/// Values used for fields the provider could not deliver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnapshotDefaults {
    pub balance_sats: u64,
    pub utxo_count: u64,
    pub ordinal_count: u64,
    pub rune_count: u64,
}

impl Default for SnapshotDefaults {
    fn default() -> Self {
        Self {
            balance_sats: 50_000_000,
            utxo_count: 3,
            ordinal_count: 2,
            rune_count: 1,
        }
    }
}

/// A snapshot plus the fields that came from defaults.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedSnapshot {
    pub snapshot: PortfolioSnapshot,
    pub fallbacks: Vec<SnapshotField>,
}

impl CapturedSnapshot {
    pub fn is_live(&self) -> bool {
        self.fallbacks.is_empty()
    }
}

/// Source of the four snapshot fields.
#[async_trait]
pub trait PortfolioSource: Send + Sync {
    async fn balance_sats(&self, address: &str) -> Result<u64, ProviderError>;

    async fn utxo_count(&self, address: &str) -> Result<u64, ProviderError>;

    async fn ordinal_count(&self, address: &str) -> Result<u64, ProviderError>;

    async fn rune_count(&self, address: &str) -> Result<u64, ProviderError>;
}

/// Fetch all four fields concurrently and resolve every failure to its
/// default. Never fails.
pub async fn capture_snapshot<S>(source: &S, address: &str, defaults: &SnapshotDefaults) -> CapturedSnapshot
where
    S: PortfolioSource + ?Sized,
{
    let (balance, utxos, ordinals, runes) = tokio::join!(
        source.balance_sats(address),
        source.utxo_count(address),
        source.ordinal_count(address),
        source.rune_count(address)
    );

    let mut fallbacks = Vec::new();
    let snapshot = PortfolioSnapshot {
        balance_sats: resolve(SnapshotField::Balance, balance, defaults.balance_sats, &mut fallbacks),
        utxo_count: resolve(SnapshotField::Utxos, utxos, defaults.utxo_count, &mut fallbacks),
        ordinal_count: resolve(SnapshotField::Ordinals, ordinals, defaults.ordinal_count, &mut fallbacks),
        rune_count: resolve(SnapshotField::Runes, runes, defaults.rune_count, &mut fallbacks),
    };

    info!(
        balance_sats = snapshot.balance_sats,
        balance_btc = snapshot.balance_btc(),
        utxo_count = snapshot.utxo_count,
        ordinal_count = snapshot.ordinal_count,
        rune_count = snapshot.rune_count,
        fallbacks = ?fallbacks,
        "portfolio snapshot captured"
    );

    CapturedSnapshot { snapshot, fallbacks }
}

fn resolve(
    field: SnapshotField,
    result: Result<u64, ProviderError>,
    default: u64,
    fallbacks: &mut Vec<SnapshotField>,
) -> u64 {
    match result {
        Ok(value) => value,
        Err(err) => {
            warn!(field = %field, default, error = %err, "snapshot field unavailable, using default");
            fallbacks.push(field);
            default
        }
    }
}

// ============================================================================
// Xverse
// ============================================================================

/// Xverse REST client.
pub struct XverseClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl XverseClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn get_json(&self, path: &str) -> Result<Value, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(path, "xverse request");

        let mut request = self.client.get(&url).header("Accept", "application/json");
        if !self.api_key.is_empty() {
            request = request.header("x-api-key", &self.api_key);
        }

        let response = request.send().await.map_err(|e| ProviderError::Http {
            endpoint: path.to_string(),
            reason: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(ProviderError::Status {
                endpoint: path.to_string(),
                status: response.status(),
            });
        }

        response.json().await.map_err(|e| ProviderError::Http {
            endpoint: path.to_string(),
            reason: format!("invalid JSON: {}", e),
        })
    }
}

#[async_trait]
impl PortfolioSource for XverseClient {
    /// `getBalance`; the address summary's funded sum only if that request
    /// itself fails. An unrecognized getBalance body is not retried.
    async fn balance_sats(&self, address: &str) -> Result<u64, ProviderError> {
        match self.get_json(&format!("/v1/address/{}/getBalance", address)).await {
            Ok(body) => parse_balance(&body),
            Err(err) => {
                debug!(error = %err, "getBalance unavailable, trying address summary");
                let body = self.get_json(&format!("/v1/address/{}", address)).await?;
                parse_funded_sum(&body)
            }
        }
    }

    async fn utxo_count(&self, address: &str) -> Result<u64, ProviderError> {
        count_pages(|offset| {
            let path = format!(
                "/v1/bitcoin/address/{}/utxo?offset={}&limit={}",
                address, offset, UTXO_PAGE_SIZE
            );
            async move { self.get_json(&path).await }
        })
        .await
    }

    async fn ordinal_count(&self, address: &str) -> Result<u64, ProviderError> {
        let body = self
            .get_json(&format!("/v1/address/{}/ordinals?offset=0&limit=1", address))
            .await?;
        parse_count(&body)
    }

    async fn rune_count(&self, address: &str) -> Result<u64, ProviderError> {
        let body = self.get_json(&format!("/v1/address/{}/runes", address)).await?;
        Ok(parse_rune_count(&body))
    }
}

/// `totalBalance`, else `confirmed`.
pub fn parse_balance(body: &Value) -> Result<u64, ProviderError> {
    ["totalBalance", "confirmed"]
        .iter()
        .find_map(|key| body.get(*key).and_then(as_u64))
        .ok_or_else(|| ProviderError::Shape("balance: neither totalBalance nor confirmed".into()))
}

/// `chain_stats.funded_txo_sum` of an address summary.
pub fn parse_funded_sum(body: &Value) -> Result<u64, ProviderError> {
    body.get("chain_stats")
        .and_then(|stats| stats.get("funded_txo_sum"))
        .and_then(as_u64)
        .ok_or_else(|| ProviderError::Shape("address summary: missing chain_stats.funded_txo_sum".into()))
}

/// One page of a listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Page {
    /// The API reported the full count.
    Total(u64),
    /// Only the items of this page.
    Items(u64),
}

/// `total`, else the length of `results`, else the length of a bare array.
pub fn parse_page(body: &Value) -> Result<Page, ProviderError> {
    if let Some(total) = body.get("total").and_then(as_u64) {
        return Ok(Page::Total(total));
    }
    if let Some(results) = body.get("results").and_then(Value::as_array) {
        return Ok(Page::Items(results.len() as u64));
    }
    if let Some(items) = body.as_array() {
        return Ok(Page::Items(items.len() as u64));
    }
    Err(ProviderError::Shape("count: neither total nor results".into()))
}

/// Count of a single-page listing.
pub fn parse_count(body: &Value) -> Result<u64, ProviderError> {
    parse_page(body).map(|page| match page {
        Page::Total(n) | Page::Items(n) => n,
    })
}

/// Runes listing: a body without `total` or `results` means no runes.
pub fn parse_rune_count(body: &Value) -> u64 {
    parse_count(body).unwrap_or(0)
}

/// Walk a paged listing of [`UTXO_PAGE_SIZE`] items until a short page or a
/// reported total.
pub async fn count_pages<F, Fut>(mut fetch: F) -> Result<u64, ProviderError>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<Value, ProviderError>>,
{
    let mut counted = 0;
    for page in 0..MAX_UTXO_PAGES {
        let body = fetch(page * UTXO_PAGE_SIZE).await?;
        match parse_page(&body)? {
            Page::Total(total) => return Ok(total),
            Page::Items(items) => {
                counted += items;
                if items < UTXO_PAGE_SIZE {
                    return Ok(counted);
                }
            }
        }
    }
    Err(ProviderError::Shape(format!("listing longer than {} pages", MAX_UTXO_PAGES)))
}

/// Non-negative integer, as a JSON number or a decimal string.
fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
