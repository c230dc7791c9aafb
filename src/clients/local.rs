use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use super::jsonrpc::{JsonRpcClient, RpcError};
use crate::error::{AppError, AppResult};
use crate::ledger::models::TxHash;

/// Token as published by the local chain, with its bridged counterparts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalToken {
    pub symbol: String,
    pub decimals: u8,
    /// Asset ids of the same token on other platforms
    #[serde(default)]
    pub external: Vec<ExternalToken>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalToken {
    pub platform: String,
    pub hash: String,
}

/// Interop pair published by the local chain for one external platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformInfo {
    pub platform: String,
    /// Bridge deposit address on the external platform
    pub external_address: String,
    /// Local-chain address that receives deposits destined for the platform
    pub local_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTransfer {
    pub hash: String,
    pub height: u64,
    pub from: String,
    pub to: String,
    pub symbol: String,
    /// Integer amount in the token's base units
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalTransferPage {
    pub page: u32,
    pub total_pages: u32,
    /// Newest first
    pub transfers: Vec<LocalTransfer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTransactionStatus {
    pub hash: String,
    pub height: Option<u64>,
}

/// Query/submit surface of the chain the bridge is anchored to
#[async_trait]
pub trait LocalChainApi: Send + Sync {
    async fn get_token(&self, symbol: &str) -> AppResult<LocalToken>;

    async fn get_platforms(&self) -> AppResult<Vec<PlatformInfo>>;

    /// Local-chain address registered for `native_address` on `chain`, if any
    async fn resolve_swap_address(&self, native_address: &str, chain: &str) -> AppResult<Option<String>>;

    async fn send_raw_transaction(&self, raw_hex: &str) -> AppResult<TxHash>;

    /// Page 1 holds the most recent transfers
    async fn get_address_transactions(
        &self,
        address: &str,
        page: u32,
        page_size: u32,
    ) -> AppResult<LocalTransferPage>;

    /// `None` while the transaction is unknown to the node
    async fn get_transaction(&self, hash: &TxHash) -> AppResult<Option<LocalTransactionStatus>>;
}

/// JSON-RPC client for a Nexus-style local node
pub struct NexusRpcClient {
    chain: String,
    rpc: JsonRpcClient,
}

impl NexusRpcClient {
    pub fn new(chain: &str, rpc_url: &str, timeout: Duration) -> AppResult<Self> {
        let rpc = JsonRpcClient::new(rpc_url, timeout)
            .map_err(|e| AppError::Configuration(format!("{} rpc client: {}", chain, e)))?;
        Ok(Self {
            chain: chain.to_string(),
            rpc,
        })
    }

    fn fetch_error(&self, method: &str, error: RpcError) -> AppError {
        AppError::fetch(&self.chain, format!("{} via {}: {}", method, self.rpc.url(), error))
    }
}

#[async_trait]
impl LocalChainApi for NexusRpcClient {
    async fn get_token(&self, symbol: &str) -> AppResult<LocalToken> {
        self.rpc
            .call("getToken", json!([symbol]))
            .await
            .map_err(|e| self.fetch_error("getToken", e))
    }

    async fn get_platforms(&self) -> AppResult<Vec<PlatformInfo>> {
        self.rpc
            .call("getPlatforms", json!([]))
            .await
            .map_err(|e| self.fetch_error("getPlatforms", e))
    }

    async fn resolve_swap_address(&self, native_address: &str, chain: &str) -> AppResult<Option<String>> {
        match self
            .rpc
            .call::<Option<String>>("resolveSwapAddress", json!([native_address, chain]))
            .await
        {
            Ok(address) => Ok(address.filter(|a| !a.is_empty())),
            // Unmapped addresses come back as a remote error
            Err(RpcError::Remote { .. }) => Ok(None),
            Err(e) => Err(self.fetch_error("resolveSwapAddress", e)),
        }
    }

    async fn send_raw_transaction(&self, raw_hex: &str) -> AppResult<TxHash> {
        self.rpc
            .call::<String>("sendRawTransaction", json!([raw_hex]))
            .await
            .map(TxHash::new)
            .map_err(|e| AppError::send(&self.chain, format!("sendRawTransaction: {}", e)))
    }

    async fn get_address_transactions(
        &self,
        address: &str,
        page: u32,
        page_size: u32,
    ) -> AppResult<LocalTransferPage> {
        self.rpc
            .call("getAddressTransactions", json!([address, page, page_size]))
            .await
            .map_err(|e| self.fetch_error("getAddressTransactions", e))
    }

    async fn get_transaction(&self, hash: &TxHash) -> AppResult<Option<LocalTransactionStatus>> {
        match self
            .rpc
            .call::<LocalTransactionStatus>("getTransaction", json!([hash.as_str()]))
            .await
        {
            Ok(status) => Ok(Some(status)),
            Err(RpcError::Remote { .. }) => Ok(None),
            Err(e) => Err(self.fetch_error("getTransaction", e)),
        }
    }
}
