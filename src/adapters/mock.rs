//! In-memory chains for unit tests.

use async_trait::async_trait;
use borsh::BorshDeserialize;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::adapters::chains::local::{transaction_id, SignedTransaction};
use crate::adapters::traits::{CandidateSwap, ChainAdapter, TransferRequest};
use crate::clients::local::{LocalToken, LocalTransactionStatus, LocalTransfer, LocalTransferPage};
use crate::clients::neo::{AbstractEntry, AbstractsPage};
use crate::clients::{LocalChainApi, NeoNodeApi, NeoScanApi, PlatformInfo};
use crate::error::{AppError, AppResult};
use crate::ledger::models::{SwapRecord, TxHash};

/// Scriptable adapter that records every leg it executes
pub struct MockAdapter {
    name: String,
    notarize: bool,
    deposits: Mutex<Vec<CandidateSwap>>,
    poll_failure: Mutex<Option<String>>,
    /// `true` = permanent
    receive_failures: Mutex<VecDeque<bool>>,
    settle_failures: Mutex<VecDeque<bool>>,
    confirmed: Mutex<bool>,
    pub received: Mutex<Vec<SwapRecord>>,
    pub settled: Mutex<Vec<(TxHash, String)>>,
    pub sent: Mutex<Vec<TransferRequest>>,
    confirm_calls: AtomicUsize,
}

impl MockAdapter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            notarize: false,
            deposits: Mutex::new(Vec::new()),
            poll_failure: Mutex::new(None),
            receive_failures: Mutex::new(VecDeque::new()),
            settle_failures: Mutex::new(VecDeque::new()),
            confirmed: Mutex::new(true),
            received: Mutex::new(Vec::new()),
            settled: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            confirm_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_notarization(mut self) -> Self {
        self.notarize = true;
        self
    }

    pub fn deposit(&self, candidate: CandidateSwap) {
        self.deposits.lock().unwrap().push(candidate);
    }

    pub fn fail_polls(&self, message: Option<&str>) {
        *self.poll_failure.lock().unwrap() = message.map(str::to_string);
    }

    pub fn fail_next_receive(&self, permanent: bool) {
        self.receive_failures.lock().unwrap().push_back(permanent);
    }

    pub fn fail_next_settle(&self, permanent: bool) {
        self.settle_failures.lock().unwrap().push_back(permanent);
    }

    pub fn set_confirmed(&self, confirmed: bool) {
        *self.confirmed.lock().unwrap() = confirmed;
    }

    pub fn receive_count(&self) -> usize {
        self.received.lock().unwrap().len()
    }

    pub fn settle_count(&self) -> usize {
        self.settled.lock().unwrap().len()
    }

    pub fn confirm_count(&self) -> usize {
        self.confirm_calls.load(Ordering::SeqCst)
    }

    fn failure(&self, queue: &Mutex<VecDeque<bool>>, leg: &str) -> Option<AppError> {
        queue.lock().unwrap().pop_front().map(|permanent| AppError::Settlement {
            chain: self.name.clone(),
            message: format!("scripted {} failure", leg),
            permanent,
        })
    }
}

#[async_trait]
impl ChainAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&self, checkpoint: u64) -> AppResult<Vec<CandidateSwap>> {
        if let Some(message) = self.poll_failure.lock().unwrap().clone() {
            return Err(AppError::fetch(&self.name, message));
        }
        let mut found: Vec<_> = self
            .deposits
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.height > checkpoint)
            .cloned()
            .collect();
        found.sort_by_key(|c| c.height);
        Ok(found)
    }

    async fn send_funds(&self, request: &TransferRequest) -> AppResult<TxHash> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(request.clone());
        let hash = TxHash::new(format!("{}-deposit-{}", self.name, sent.len()));

        let mut deposits = self.deposits.lock().unwrap();
        let height = deposits.iter().map(|c| c.height).max().unwrap_or(0) + 1;
        deposits.push(CandidateSwap {
            source_hash: hash.clone(),
            source_chain: self.name.clone(),
            source_address: request.source_address.clone(),
            destination_chain: request.destination_chain.clone(),
            destination_address: None,
            symbol: request.symbol.clone(),
            amount: request.amount,
            height,
        });
        Ok(hash)
    }

    async fn receive_funds(&self, swap: &SwapRecord) -> AppResult<TxHash> {
        if let Some(error) = self.failure(&self.receive_failures, "receive") {
            return Err(error);
        }
        let mut received = self.received.lock().unwrap();
        received.push(swap.clone());
        Ok(TxHash::new(format!("{}-receive-{}", self.name, received.len())))
    }

    async fn settle_transaction(&self, source_hash: &TxHash, origin_chain: &str) -> AppResult<TxHash> {
        if let Some(error) = self.failure(&self.settle_failures, "settle") {
            return Err(error);
        }
        let mut settled = self.settled.lock().unwrap();
        settled.push((source_hash.clone(), origin_chain.to_string()));
        Ok(TxHash::new(format!("{}-settle-{}", self.name, settled.len())))
    }

    fn requires_notarization(&self) -> bool {
        self.notarize
    }

    async fn confirm_transaction(&self, _hash: &TxHash) -> AppResult<bool> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.confirmed.lock().unwrap())
    }
}

/// Local chain node with canned tokens, platforms and address history
#[derive(Default)]
pub struct MockLocalChain {
    tokens: Mutex<HashMap<String, LocalToken>>,
    platforms: Mutex<Vec<PlatformInfo>>,
    addresses: Mutex<HashMap<(String, String), String>>,
    transfers: Mutex<HashMap<String, Vec<LocalTransfer>>>,
    raw: Mutex<Vec<String>>,
    broadcast_failures: Mutex<VecDeque<String>>,
    confirmed: Mutex<HashMap<TxHash, u64>>,
}

impl MockLocalChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_token(&self, token: LocalToken) {
        self.tokens.lock().unwrap().insert(token.symbol.clone(), token);
    }

    pub fn add_platform(&self, platform: PlatformInfo) {
        self.platforms.lock().unwrap().push(platform);
    }

    pub fn map_address(&self, native: &str, chain: &str, mapped: &str) {
        self.addresses
            .lock()
            .unwrap()
            .insert((native.to_string(), chain.to_string()), mapped.to_string());
    }

    pub fn add_transfer(&self, address: &str, transfer: LocalTransfer) {
        self.transfers
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default()
            .push(transfer);
    }

    pub fn fail_next_broadcast(&self, message: &str) {
        self.broadcast_failures.lock().unwrap().push_back(message.to_string());
    }

    pub fn confirm(&self, hash: &TxHash, height: u64) {
        self.confirmed.lock().unwrap().insert(hash.clone(), height);
    }

    pub fn raw_transactions(&self) -> Vec<String> {
        self.raw.lock().unwrap().clone()
    }
}

#[async_trait]
impl LocalChainApi for MockLocalChain {
    async fn get_token(&self, symbol: &str) -> AppResult<LocalToken> {
        self.tokens
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .ok_or_else(|| AppError::fetch("phantasma", format!("unknown token {}", symbol)))
    }

    async fn get_platforms(&self) -> AppResult<Vec<PlatformInfo>> {
        Ok(self.platforms.lock().unwrap().clone())
    }

    async fn resolve_swap_address(&self, native_address: &str, chain: &str) -> AppResult<Option<String>> {
        Ok(self
            .addresses
            .lock()
            .unwrap()
            .get(&(native_address.to_string(), chain.to_string()))
            .cloned())
    }

    async fn send_raw_transaction(&self, raw_hex: &str) -> AppResult<TxHash> {
        if let Some(message) = self.broadcast_failures.lock().unwrap().pop_front() {
            return Err(AppError::send("phantasma", message));
        }

        let bytes = hex::decode(raw_hex).map_err(|e| AppError::send("phantasma", e.to_string()))?;
        let signed = SignedTransaction::try_from_slice(&bytes)
            .map_err(|e| AppError::send("phantasma", e.to_string()))?;

        self.raw.lock().unwrap().push(raw_hex.to_string());
        Ok(transaction_id(&signed.payload))
    }

    async fn get_address_transactions(
        &self,
        address: &str,
        page: u32,
        page_size: u32,
    ) -> AppResult<LocalTransferPage> {
        let mut history = self
            .transfers
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_default();
        history.sort_by(|a, b| b.height.cmp(&a.height));

        let size = page_size.max(1) as usize;
        let total_pages = history.len().div_ceil(size).max(1) as u32;
        let transfers = history
            .into_iter()
            .skip((page.saturating_sub(1) as usize) * size)
            .take(size)
            .collect();

        Ok(LocalTransferPage {
            page,
            total_pages,
            transfers,
        })
    }

    async fn get_transaction(&self, hash: &TxHash) -> AppResult<Option<LocalTransactionStatus>> {
        Ok(self
            .confirmed
            .lock()
            .unwrap()
            .get(hash)
            .map(|height| LocalTransactionStatus {
                hash: hash.to_string(),
                height: Some(*height),
            }))
    }
}

/// neoscan serving fixed pages, page 1 first
pub struct MockNeoScan {
    pages: Vec<Vec<AbstractEntry>>,
    failure: Mutex<Option<String>>,
}

impl MockNeoScan {
    pub fn new(pages: Vec<Vec<AbstractEntry>>) -> Self {
        Self {
            pages,
            failure: Mutex::new(None),
        }
    }

    pub fn fail_next(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }
}

#[async_trait]
impl NeoScanApi for MockNeoScan {
    async fn address_abstracts(&self, _address: &str, page: u32) -> AppResult<AbstractsPage> {
        if let Some(message) = self.failure.lock().unwrap().take() {
            return Err(AppError::fetch("neo", message));
        }
        let entries = self
            .pages
            .get(page.saturating_sub(1) as usize)
            .cloned()
            .unwrap_or_default();
        Ok(AbstractsPage {
            total_pages: self.pages.len() as u32,
            page_number: page,
            entries,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NeoTransfer {
    pub asset_id: String,
    pub from: String,
    pub to: String,
    pub amount: Decimal,
}

/// Wallet node recording every transfer it builds
#[derive(Default)]
pub struct MockNeoNode {
    sent: Mutex<Vec<NeoTransfer>>,
    confirmations: Mutex<HashMap<TxHash, u64>>,
    wallet: Mutex<Vec<String>>,
    wallet_unreachable: Mutex<bool>,
}

impl MockNeoNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wallet_key(self, address: &str) -> Self {
        self.wallet.lock().unwrap().push(address.to_string());
        self
    }

    pub fn set_wallet_unreachable(&self) {
        *self.wallet_unreachable.lock().unwrap() = true;
    }

    pub fn sent(&self) -> Vec<NeoTransfer> {
        self.sent.lock().unwrap().clone()
    }

    pub fn confirm(&self, hash: &TxHash, confirmations: u64) {
        self.confirmations.lock().unwrap().insert(hash.clone(), confirmations);
    }
}

#[async_trait]
impl NeoNodeApi for MockNeoNode {
    async fn send_from(&self, asset_id: &str, from: &str, to: &str, amount: Decimal) -> AppResult<TxHash> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(NeoTransfer {
            asset_id: asset_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            amount,
        });
        Ok(TxHash::new(format!("{:064x}", sent.len())))
    }

    async fn wallet_addresses(&self) -> AppResult<Vec<String>> {
        if *self.wallet_unreachable.lock().unwrap() {
            return Err(AppError::fetch("neo", "node unreachable"));
        }
        Ok(self.wallet.lock().unwrap().clone())
    }

    async fn confirmations(&self, txid: &TxHash) -> AppResult<Option<u64>> {
        Ok(self.confirmations.lock().unwrap().get(txid).copied())
    }
}
