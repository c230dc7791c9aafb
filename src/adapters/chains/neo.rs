use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::adapters::confirmation::{wait_for_confirmation, BackoffPolicy};
use crate::adapters::context::SwapContext;
use crate::adapters::paging::{scan_newest_first, Page};
use crate::adapters::token_registry::{normalize_asset_id, TokenInfo};
use crate::adapters::traits::{CandidateSwap, ChainAdapter, TransferRequest};
use crate::clients::neo::AbstractEntry;
use crate::clients::{NeoNodeApi, NeoScanApi};
use crate::error::{AppError, AppResult};
use crate::ledger::models::{SwapRecord, TxHash, NEO_CHAIN};

/// Native assets are addressed by their 64 char asset id, everything else
/// is a NEP-5 contract addressed by its script hash
const NATIVE_ASSETS: [&str; 2] = ["NEO", "GAS"];
const SCRIPT_HASH_LEN: usize = 40;

#[derive(Debug, Clone)]
pub struct NeoAdapterConfig {
    /// Bridge-controlled address deposits are sent to
    pub deposit_address: String,
    pub min_confirmations: u64,
    pub confirmation: BackoffPolicy,
}

/// NEO chain adapter
///
/// Watches the bridge deposit address through neoscan and releases funds
/// from that same address through a wallet-enabled NEO node.
pub struct NeoAdapter {
    config: NeoAdapterConfig,
    ctx: Arc<SwapContext>,
    scan: Arc<dyn NeoScanApi>,
    node: Arc<dyn NeoNodeApi>,
}

impl NeoAdapter {
    pub fn new(
        config: NeoAdapterConfig,
        ctx: Arc<SwapContext>,
        scan: Arc<dyn NeoScanApi>,
        node: Arc<dyn NeoNodeApi>,
    ) -> Self {
        info!("📍 NEO adapter watching {}", config.deposit_address);
        Self {
            config,
            ctx,
            scan,
            node,
        }
    }

    async fn fetch_page(&self, page: u32) -> AppResult<Page<AbstractEntry>> {
        let page = self
            .scan
            .address_abstracts(&self.config.deposit_address, page)
            .await?;
        Ok(Page {
            total_pages: page.total_pages,
            entries: page.entries,
        })
    }

    /// Deposit entry to candidate, `None` for outgoing or unknown-asset entries
    fn to_candidate(&self, entry: AbstractEntry) -> Option<CandidateSwap> {
        if entry.address_to != self.config.deposit_address {
            return None;
        }

        let token = match self.token_by_asset(&entry.asset) {
            Some(token) => token,
            None => {
                warn!(
                    "⚠️  Skipping NEO deposit {} of unregistered asset {}",
                    entry.txid, entry.asset
                );
                return None;
            }
        };

        Some(CandidateSwap {
            source_hash: TxHash::new(&entry.txid),
            source_chain: NEO_CHAIN.to_string(),
            source_address: entry.address_from,
            destination_chain: self.ctx.local_chain().to_string(),
            destination_address: None,
            symbol: token.symbol.clone(),
            amount: entry.amount,
            height: entry.block_height,
        })
    }

    /// neoscan reports NEP-5 assets by the bare 40 char script hash
    fn token_by_asset(&self, asset: &str) -> Option<Arc<TokenInfo>> {
        let tokens = self.ctx.tokens();
        tokens.lookup_by_asset_id(NEO_CHAIN, asset).or_else(|| {
            let script_hash = normalize_asset_id(asset);
            if script_hash.len() != SCRIPT_HASH_LEN {
                return None;
            }
            tokens
                .tokens_for_chain(NEO_CHAIN)
                .into_iter()
                .find(|t| t.asset_id.starts_with(&script_hash))
        })
    }

    fn token(&self, symbol: &str) -> Option<Arc<TokenInfo>> {
        self.ctx.tokens().lookup_by_symbol(NEO_CHAIN, symbol)
    }
}

/// Asset argument the node wallet expects for `token`
fn wallet_asset_id(token: &TokenInfo) -> String {
    if NATIVE_ASSETS.contains(&token.symbol.as_str()) {
        format!("0x{}", token.asset_id)
    } else {
        let end = token.asset_id.len().min(SCRIPT_HASH_LEN);
        format!("0x{}", &token.asset_id[..end])
    }
}

#[async_trait]
impl ChainAdapter for NeoAdapter {
    fn name(&self) -> &str {
        NEO_CHAIN
    }

    async fn poll(&self, checkpoint: u64) -> AppResult<Vec<CandidateSwap>> {
        let entries = scan_newest_first(
            checkpoint,
            |entry: &AbstractEntry| entry.block_height,
            |page| async move { self.fetch_page(page).await },
        )
        .await?;

        let candidates: Vec<_> = entries
            .into_iter()
            .filter_map(|entry| self.to_candidate(entry))
            .collect();

        debug!("NEO poll above {} found {} deposits", checkpoint, candidates.len());
        Ok(candidates)
    }

    async fn send_funds(&self, request: &TransferRequest) -> AppResult<TxHash> {
        if request.destination_chain != self.ctx.local_chain() {
            return Err(AppError::Send {
                chain: NEO_CHAIN.to_string(),
                message: format!("deposits from NEO only bridge to {}", self.ctx.local_chain()),
                permanent: true,
            });
        }

        let token = self.token(&request.symbol).ok_or_else(|| AppError::Send {
            chain: NEO_CHAIN.to_string(),
            message: format!("unregistered token {}", request.symbol),
            permanent: true,
        })?;

        self.node
            .send_from(
                &wallet_asset_id(&token),
                &request.source_address,
                &self.config.deposit_address,
                request.amount,
            )
            .await
    }

    async fn receive_funds(&self, swap: &SwapRecord) -> AppResult<TxHash> {
        let token = self.token(&swap.symbol).ok_or_else(|| {
            AppError::settlement_permanent(NEO_CHAIN, format!("unregistered token {}", swap.symbol))
        })?;

        self.node
            .send_from(
                &wallet_asset_id(&token),
                &self.config.deposit_address,
                &swap.destination_address,
                swap.amount,
            )
            .await
            .map_err(AppError::into_settlement)
    }

    async fn settle_transaction(&self, _source_hash: &TxHash, origin_chain: &str) -> AppResult<TxHash> {
        Err(AppError::settlement_permanent(
            NEO_CHAIN,
            format!("NEO does not notarize transactions from {}", origin_chain),
        ))
    }

    async fn confirm_transaction(&self, hash: &TxHash) -> AppResult<bool> {
        let required = self.config.min_confirmations;
        wait_for_confirmation(&self.config.confirmation, || async move {
            let confirmations = self.node.confirmations(hash).await?;
            Ok::<_, AppError>(confirmations.map_or(false, |c| c >= required))
        })
        .await
    }
}
