use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::ledger::models::{SwapRecord, TxHash};

/// Deposit observed on a source chain, not yet known to be settled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSwap {
    pub source_hash: TxHash,
    pub source_chain: String,
    pub source_address: String,
    pub destination_chain: String,
    /// Set when the source chain already knows the receiving address;
    /// otherwise resolved through the swap context before recording
    pub destination_address: Option<String>,
    pub symbol: String,
    pub amount: Decimal,
    pub height: u64,
}

/// Outbound deposit into a bridge address, used by simulation harnesses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub source_address: String,
    /// Chain the deposit should be bridged to
    pub destination_chain: String,
    pub symbol: String,
    pub amount: Decimal,
}

/// Chain adapter - one implementation per supported chain
///
/// Adapters hold no swap state. Everything durable about a swap lives in
/// the ledger; an adapter only reads its chain and submits transactions.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Chain name, the key the adapter is registered under
    fn name(&self) -> &str;

    /// Deposits strictly above `checkpoint`, ascending by height
    ///
    /// Safe to call repeatedly; mutates nothing persisted.
    async fn poll(&self, checkpoint: u64) -> AppResult<Vec<CandidateSwap>>;

    /// Deposit `request.amount` into this chain's bridge address
    async fn send_funds(&self, request: &TransferRequest) -> AppResult<TxHash>;

    /// Release `swap.amount` of `swap.symbol` to `swap.destination_address`
    async fn receive_funds(&self, swap: &SwapRecord) -> AppResult<TxHash>;

    /// Notarize the origin transaction on this chain
    async fn settle_transaction(&self, source_hash: &TxHash, origin_chain: &str) -> AppResult<TxHash>;

    /// Whether `settle_transaction` must run before `receive_funds`
    fn requires_notarization(&self) -> bool {
        false
    }

    /// `Ok(false)` means not confirmed yet
    async fn confirm_transaction(&self, hash: &TxHash) -> AppResult<bool>;
}
