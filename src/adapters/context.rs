use std::sync::Arc;
use tracing::debug;

use crate::adapters::token_registry::TokenRegistry;
use crate::clients::{LocalChainApi, PlatformInfo};
use crate::error::{AppError, AppResult};

/// What an adapter may ask of the rest of the relayer
///
/// Token lookup, the interop platforms published by the local chain, and
/// address resolution. Adapters never see the ledger or the orchestrator.
pub struct SwapContext {
    local_chain: String,
    tokens: Arc<TokenRegistry>,
    platforms: Vec<PlatformInfo>,
    local: Arc<dyn LocalChainApi>,
}

impl SwapContext {
    pub fn new(
        local_chain: impl Into<String>,
        tokens: Arc<TokenRegistry>,
        platforms: Vec<PlatformInfo>,
        local: Arc<dyn LocalChainApi>,
    ) -> Self {
        Self {
            local_chain: local_chain.into(),
            tokens,
            platforms,
            local,
        }
    }

    pub fn local_chain(&self) -> &str {
        &self.local_chain
    }

    pub fn tokens(&self) -> &TokenRegistry {
        &self.tokens
    }

    pub fn platforms(&self) -> &[PlatformInfo] {
        &self.platforms
    }

    pub fn platform(&self, chain: &str) -> Option<&PlatformInfo> {
        self.platforms.iter().find(|p| p.platform == chain)
    }

    /// Map a sender's native address on `source_chain` to its address on `destination_chain`
    pub async fn resolve_destination(
        &self,
        native_address: &str,
        source_chain: &str,
        destination_chain: &str,
    ) -> AppResult<String> {
        let resolved = self
            .local
            .resolve_swap_address(native_address, destination_chain)
            .await?;

        match resolved {
            Some(address) => {
                debug!(
                    "Resolved {} on {} to {} on {}",
                    native_address, source_chain, address, destination_chain
                );
                Ok(address)
            }
            None => Err(AppError::AddressResolution {
                chain: source_chain.to_string(),
                destination: destination_chain.to_string(),
                address: native_address.to_string(),
            }),
        }
    }
}
