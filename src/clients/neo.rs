use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::str::FromStr;
use std::time::Duration;

use super::jsonrpc::{JsonRpcClient, RpcError};
use crate::error::{AppError, AppResult};
use crate::ledger::models::{TxHash, NEO_CHAIN};

/// One page of neoscan's address abstracts. Page 1 is the most recent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AbstractsPage {
    pub total_pages: u32,
    #[serde(default)]
    pub page_number: u32,
    /// Newest first
    pub entries: Vec<AbstractEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AbstractEntry {
    pub txid: String,
    pub block_height: u64,
    pub address_from: String,
    pub address_to: String,
    pub asset: String,
    #[serde(deserialize_with = "decimal_from_any")]
    pub amount: Decimal,
}

/// neoscan reports amounts as JSON numbers or strings depending on version
fn decimal_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let text = match &value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => return Err(serde::de::Error::custom(format!("invalid amount: {}", other))),
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(serde::de::Error::custom)
}

/// Address history explorer for the NEO chain
#[async_trait]
pub trait NeoScanApi: Send + Sync {
    async fn address_abstracts(&self, address: &str, page: u32) -> AppResult<AbstractsPage>;
}

/// Wallet-enabled NEO node
#[async_trait]
pub trait NeoNodeApi: Send + Sync {
    /// Transfer from a specific wallet address to `to`
    async fn send_from(&self, asset_id: &str, from: &str, to: &str, amount: Decimal) -> AppResult<TxHash>;

    /// Addresses whose private key the node wallet holds
    async fn wallet_addresses(&self) -> AppResult<Vec<String>>;

    /// Confirmation count, `None` while the node does not know the transaction
    async fn confirmations(&self, txid: &TxHash) -> AppResult<Option<u64>>;
}

pub struct NeoScanClient {
    http: reqwest::Client,
    base_url: String,
}

impl NeoScanClient {
    pub fn new(base_url: &str, timeout: Duration) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("neoscan client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl NeoScanApi for NeoScanClient {
    async fn address_abstracts(&self, address: &str, page: u32) -> AppResult<AbstractsPage> {
        let url = format!("{}/get_address_abstracts/{}/{}", self.base_url, address, page);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::fetch(NEO_CHAIN, format!("GET {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(AppError::fetch(
                NEO_CHAIN,
                format!("GET {} returned {}", url, response.status()),
            ));
        }

        response
            .json::<AbstractsPage>()
            .await
            .map_err(|e| AppError::fetch(NEO_CHAIN, format!("malformed page {} for {}: {}", page, address, e)))
    }
}

pub struct NeoRpcClient {
    rpc: JsonRpcClient,
}

#[derive(Deserialize)]
struct SentTransaction {
    txid: String,
}

#[derive(Deserialize)]
struct WalletAddress {
    address: String,
    #[serde(default)]
    haskey: bool,
}

#[derive(Deserialize)]
struct VerboseTransaction {
    #[serde(default)]
    confirmations: Option<u64>,
}

/// neo-cli code for "Unknown transaction"
const UNKNOWN_TRANSACTION: i64 = -100;

impl NeoRpcClient {
    pub fn new(rpc_url: &str, timeout: Duration) -> AppResult<Self> {
        let rpc = JsonRpcClient::new(rpc_url, timeout)
            .map_err(|e| AppError::Configuration(format!("neo rpc client: {}", e)))?;
        Ok(Self { rpc })
    }

    async fn submit(&self, method: &str, params: Value) -> AppResult<TxHash> {
        let sent: Value = self
            .rpc
            .call(method, params)
            .await
            .map_err(|e| AppError::send(NEO_CHAIN, format!("{}: {}", method, e)))?;

        // neo-cli answers `false` when the wallet could not build the transfer
        serde_json::from_value::<SentTransaction>(sent)
            .map(|tx| TxHash::new(tx.txid))
            .map_err(|_| AppError::send(NEO_CHAIN, format!("{} was rejected by the node wallet", method)))
    }
}

#[async_trait]
impl NeoNodeApi for NeoRpcClient {
    async fn send_from(&self, asset_id: &str, from: &str, to: &str, amount: Decimal) -> AppResult<TxHash> {
        self.submit("sendfrom", json!([asset_id, from, to, amount.to_string()]))
            .await
    }

    async fn wallet_addresses(&self) -> AppResult<Vec<String>> {
        let addresses: Vec<WalletAddress> = self
            .rpc
            .call("listaddress", json!([]))
            .await
            .map_err(|e| AppError::fetch(NEO_CHAIN, format!("listaddress: {}", e)))?;

        Ok(addresses
            .into_iter()
            .filter(|a| a.haskey)
            .map(|a| a.address)
            .collect())
    }

    async fn confirmations(&self, txid: &TxHash) -> AppResult<Option<u64>> {
        match self
            .rpc
            .call::<VerboseTransaction>("getrawtransaction", json!([format!("0x{}", txid), 1]))
            .await
        {
            Ok(tx) => Ok(Some(tx.confirmations.unwrap_or(0))),
            Err(RpcError::Remote { code, .. }) if code == UNKNOWN_TRANSACTION => Ok(None),
            Err(e) => Err(AppError::fetch(NEO_CHAIN, format!("getrawtransaction: {}", e))),
        }
    }
}
