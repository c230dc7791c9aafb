use async_trait::async_trait;
use borsh::{BorshDeserialize, BorshSerialize};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::adapters::confirmation::{wait_for_confirmation, BackoffPolicy};
use crate::adapters::context::SwapContext;
use crate::adapters::paging::{scan_newest_first, Page};
use crate::adapters::traits::{CandidateSwap, ChainAdapter, TransferRequest};
use crate::clients::local::LocalTransfer;
use crate::clients::{LocalChainApi, PlatformInfo};
use crate::error::{AppError, AppResult};
use crate::ledger::models::{SwapRecord, TxHash};
use crate::signing::SigningContext;

#[derive(Debug, Clone)]
pub struct LocalAdapterConfig {
    /// Gas price attached to every submitted transaction, in fuel base units
    pub min_fee: u64,
    pub gas_limit: u64,
    pub page_size: u32,
    /// Seconds a submitted transaction stays valid
    pub expiration_secs: i64,
    pub confirmation: BackoffPolicy,
}

impl Default for LocalAdapterConfig {
    fn default() -> Self {
        Self {
            min_fee: 100_000,
            gas_limit: 500,
            page_size: 25,
            expiration_secs: 300,
            confirmation: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub(crate) enum Instruction {
    /// Move `amount` base units of `symbol` from the relayer to `to`
    Transfer {
        to: String,
        symbol: String,
        amount: u128,
        /// Source transaction this release settles, empty for plain deposits
        reference: String,
    },
    /// Notarize `external_hash` from `platform` on the interop contract
    Settle {
        platform: String,
        external_hash: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub(crate) struct UnsignedTransaction {
    pub nexus: String,
    pub sender: [u8; 32],
    pub instruction: Instruction,
    pub gas_price: u64,
    pub gas_limit: u64,
    pub expiration: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub(crate) struct SignedTransaction {
    /// Borsh encoding of an `UnsignedTransaction`
    pub payload: Vec<u8>,
    pub public_key: [u8; 32],
    pub signature: [u8; 64],
}

/// Transaction id: hex sha256 of the unsigned payload
pub(crate) fn transaction_id(payload: &[u8]) -> TxHash {
    TxHash::new(hex::encode(Sha256::digest(payload)))
}

/// Adapter for the chain the bridge is anchored to
///
/// Every external platform has an interop address on this chain; a deposit
/// into it is a swap towards that platform. Releases and notarizations are
/// signed with the relayer key and submitted as raw transactions.
pub struct LocalChainAdapter {
    config: LocalAdapterConfig,
    ctx: Arc<SwapContext>,
    client: Arc<dyn LocalChainApi>,
    signer: Arc<SigningContext>,
}

impl LocalChainAdapter {
    pub fn new(
        config: LocalAdapterConfig,
        ctx: Arc<SwapContext>,
        client: Arc<dyn LocalChainApi>,
        signer: Arc<SigningContext>,
    ) -> Self {
        info!(
            "📍 {} adapter signing as {} ({} interop addresses)",
            ctx.local_chain(),
            signer.address(),
            ctx.platforms().len()
        );
        Self {
            config,
            ctx,
            client,
            signer,
        }
    }

    async fn poll_platform(&self, platform: &PlatformInfo, checkpoint: u64) -> AppResult<Vec<CandidateSwap>> {
        let address = platform.local_address.as_str();
        let page_size = self.config.page_size;

        let transfers = scan_newest_first(
            checkpoint,
            |t: &LocalTransfer| t.height,
            |page| async move {
                let page = self
                    .client
                    .get_address_transactions(address, page, page_size)
                    .await?;
                Ok::<_, AppError>(Page {
                    total_pages: page.total_pages,
                    entries: page.transfers,
                })
            },
        )
        .await?;

        let mut candidates = Vec::new();
        for transfer in transfers {
            if transfer.to != address {
                continue;
            }
            if let Some(candidate) = self.to_candidate(transfer, &platform.platform)? {
                candidates.push(candidate);
            }
        }
        Ok(candidates)
    }

    fn to_candidate(&self, transfer: LocalTransfer, platform: &str) -> AppResult<Option<CandidateSwap>> {
        let chain = self.ctx.local_chain();

        let token = match self.ctx.tokens().lookup_by_symbol(chain, &transfer.symbol) {
            Some(token) => token,
            None => {
                warn!(
                    "⚠️  Skipping {} deposit {} of unregistered token {}",
                    chain, transfer.hash, transfer.symbol
                );
                return Ok(None);
            }
        };

        let raw: u128 = transfer.amount.parse().map_err(|_| {
            AppError::fetch(
                chain,
                format!("transfer {} has malformed amount {:?}", transfer.hash, transfer.amount),
            )
        })?;

        Ok(Some(CandidateSwap {
            source_hash: TxHash::new(&transfer.hash),
            source_chain: chain.to_string(),
            source_address: transfer.from,
            destination_chain: platform.to_string(),
            destination_address: None,
            symbol: token.symbol.clone(),
            amount: token.from_base_units(raw)?,
            height: transfer.height,
        }))
    }

    fn sign(&self, instruction: Instruction) -> AppResult<(TxHash, String)> {
        let chain = self.ctx.local_chain();
        let unsigned = UnsignedTransaction {
            nexus: chain.to_string(),
            sender: self.signer.public_key().to_bytes(),
            instruction,
            gas_price: self.config.min_fee,
            gas_limit: self.config.gas_limit,
            expiration: Utc::now().timestamp() + self.config.expiration_secs,
        };

        let payload = borsh::to_vec(&unsigned).map_err(|e| encoding_error(chain, e))?;
        let id = transaction_id(&payload);
        let signed = SignedTransaction {
            signature: self.signer.sign(&payload).to_bytes(),
            public_key: unsigned.sender,
            payload,
        };
        let raw = borsh::to_vec(&signed).map_err(|e| encoding_error(chain, e))?;

        Ok((id, hex::encode(raw)))
    }

    async fn submit(&self, instruction: Instruction) -> AppResult<TxHash> {
        let (expected, raw) = self.sign(instruction)?;
        let hash = self.client.send_raw_transaction(&raw).await?;

        if hash.is_empty() {
            return Ok(expected);
        }
        if hash != expected {
            warn!("⚠️  Node reported {} for transaction {}", hash, expected);
        }
        debug!("Submitted {} transaction {}", self.ctx.local_chain(), hash);
        Ok(hash)
    }
}

fn encoding_error(chain: &str, error: std::io::Error) -> AppError {
    AppError::Send {
        chain: chain.to_string(),
        message: format!("could not encode transaction: {}", error),
        permanent: true,
    }
}

#[async_trait]
impl ChainAdapter for LocalChainAdapter {
    fn name(&self) -> &str {
        self.ctx.local_chain()
    }

    async fn poll(&self, checkpoint: u64) -> AppResult<Vec<CandidateSwap>> {
        let mut candidates = Vec::new();
        for platform in self.ctx.platforms() {
            candidates.extend(self.poll_platform(platform, checkpoint).await?);
        }
        candidates.sort_by_key(|c| c.height);

        debug!(
            "{} poll above {} found {} deposits",
            self.ctx.local_chain(),
            checkpoint,
            candidates.len()
        );
        Ok(candidates)
    }

    async fn send_funds(&self, request: &TransferRequest) -> AppResult<TxHash> {
        let chain = self.ctx.local_chain();
        let permanent = |message: String| AppError::Send {
            chain: chain.to_string(),
            message,
            permanent: true,
        };

        if request.source_address != self.signer.address() {
            return Err(permanent(format!(
                "can only deposit from the relayer address, not {}",
                request.source_address
            )));
        }

        let platform = self
            .ctx
            .platform(&request.destination_chain)
            .ok_or_else(|| permanent(format!("no interop address for {}", request.destination_chain)))?;

        let token = self
            .ctx
            .tokens()
            .lookup_by_symbol(chain, &request.symbol)
            .ok_or_else(|| permanent(format!("unregistered token {}", request.symbol)))?;

        self.submit(Instruction::Transfer {
            to: platform.local_address.clone(),
            symbol: token.symbol.clone(),
            amount: token.to_base_units(request.amount)?,
            reference: String::new(),
        })
        .await
    }

    async fn receive_funds(&self, swap: &SwapRecord) -> AppResult<TxHash> {
        let chain = self.ctx.local_chain();
        let token = self
            .ctx
            .tokens()
            .lookup_by_symbol(chain, &swap.symbol)
            .ok_or_else(|| AppError::settlement_permanent(chain, format!("unregistered token {}", swap.symbol)))?;

        let amount = token
            .to_base_units(swap.amount)
            .map_err(|e| AppError::settlement_permanent(chain, e.to_string()))?;

        self.submit(Instruction::Transfer {
            to: swap.destination_address.clone(),
            symbol: token.symbol.clone(),
            amount,
            reference: swap.source_hash.to_string(),
        })
        .await
        .map_err(AppError::into_settlement)
    }

    async fn settle_transaction(&self, source_hash: &TxHash, origin_chain: &str) -> AppResult<TxHash> {
        self.submit(Instruction::Settle {
            platform: origin_chain.to_string(),
            external_hash: source_hash.to_string(),
        })
        .await
        .map_err(AppError::into_settlement)
    }

    fn requires_notarization(&self) -> bool {
        true
    }

    async fn confirm_transaction(&self, hash: &TxHash) -> AppResult<bool> {
        wait_for_confirmation(&self.config.confirmation, || async move {
            let status = self.client.get_transaction(hash).await?;
            Ok::<_, AppError>(status.and_then(|s| s.height).is_some())
        })
        .await
    }
}
