//! Token registry
//! Maps (chain, asset id) and (chain, symbol) to the same token metadata.

use crate::error::{AppError, AppResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Registered token with metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Chain where the token exists
    pub chain: String,
    /// Human-readable symbol (e.g., SOUL, NEO, GAS)
    pub symbol: String,
    /// Chain-native asset identifier (contract or script hash)
    pub asset_id: String,
    /// Number of decimals in the chain's integer representation
    pub decimals: u8,
}

impl TokenInfo {
    /// Convert a decimal amount into integer chain units
    ///
    /// Fails if the amount is negative, has more fractional digits than the
    /// token supports, or does not fit in 128 bits.
    pub fn to_base_units(&self, amount: Decimal) -> AppResult<u128> {
        if amount.is_sign_negative() {
            return Err(AppError::Configuration(format!(
                "negative amount {} for {}",
                amount, self.symbol
            )));
        }

        let normalized = amount.normalize();
        let scale = normalized.scale();
        if scale > self.decimals as u32 {
            return Err(AppError::Configuration(format!(
                "{} has more than {} decimals for {}",
                amount, self.decimals, self.symbol
            )));
        }

        let mantissa = u128::try_from(normalized.mantissa()).map_err(|_| self.overflow(amount))?;
        10u128
            .checked_pow(self.decimals as u32 - scale)
            .and_then(|factor| mantissa.checked_mul(factor))
            .ok_or_else(|| self.overflow(amount))
    }

    /// Convert integer chain units into a decimal amount
    pub fn from_base_units(&self, raw: u128) -> AppResult<Decimal> {
        let raw = i128::try_from(raw).map_err(|_| self.overflow(Decimal::MAX))?;
        Decimal::try_from_i128_with_scale(raw, self.decimals as u32).map_err(AppError::from)
    }

    fn overflow(&self, amount: Decimal) -> AppError {
        AppError::Configuration(format!(
            "amount {} out of range for {} ({} decimals)",
            amount, self.symbol, self.decimals
        ))
    }
}

/// Token registry
///
/// Populated once at startup and then shared read-only behind an `Arc`.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    /// Tokens by chain and symbol
    tokens_by_symbol: HashMap<String, HashMap<String, Arc<TokenInfo>>>,
    /// Tokens by chain and asset id
    tokens_by_asset: HashMap<String, HashMap<String, Arc<TokenInfo>>>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token; identical re-registration is a no-op
    pub fn register(
        &mut self,
        chain: &str,
        symbol: &str,
        asset_id: &str,
        decimals: u8,
    ) -> AppResult<()> {
        let token = TokenInfo {
            chain: chain.to_string(),
            symbol: symbol.to_string(),
            asset_id: normalize_asset_id(asset_id),
            decimals,
        };

        let by_symbol = self.tokens_by_symbol.get(chain).and_then(|m| m.get(symbol));
        let by_asset = self
            .tokens_by_asset
            .get(chain)
            .and_then(|m| m.get(&token.asset_id));

        match (by_symbol, by_asset) {
            (Some(a), Some(b)) if **a == token && **b == token => return Ok(()),
            (None, None) => {}
            (existing_symbol, existing_asset) => {
                return Err(AppError::Configuration(format!(
                    "conflicting registration for {} on {}: {:?} / {:?} vs {:?}",
                    symbol, chain, existing_symbol, existing_asset, token
                )));
            }
        }

        debug!("Registering token {} on {} ({})", symbol, chain, token.asset_id);

        let token = Arc::new(token);
        self.tokens_by_symbol
            .entry(chain.to_string())
            .or_default()
            .insert(token.symbol.clone(), token.clone());
        self.tokens_by_asset
            .entry(chain.to_string())
            .or_default()
            .insert(token.asset_id.clone(), token);

        Ok(())
    }

    /// Get token by symbol and chain
    pub fn lookup_by_symbol(&self, chain: &str, symbol: &str) -> Option<Arc<TokenInfo>> {
        self.tokens_by_symbol
            .get(chain)
            .and_then(|m| m.get(symbol))
            .cloned()
    }

    /// Get token by chain-native asset id and chain
    pub fn lookup_by_asset_id(&self, chain: &str, asset_id: &str) -> Option<Arc<TokenInfo>> {
        self.tokens_by_asset
            .get(chain)
            .and_then(|m| m.get(&normalize_asset_id(asset_id)))
            .cloned()
    }

    /// Get all tokens for a chain
    pub fn tokens_for_chain(&self, chain: &str) -> Vec<Arc<TokenInfo>> {
        let mut tokens: Vec<_> = self
            .tokens_by_symbol
            .get(chain)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        tokens.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        tokens
    }

    pub fn len(&self) -> usize {
        self.tokens_by_symbol.values().map(|m| m.len()).sum()
    }
}

/// Script hashes are reported with and without `0x` and in mixed case
pub(crate) fn normalize_asset_id(asset_id: &str) -> String {
    let trimmed = asset_id.trim();
    trimmed
        .strip_prefix("0x")
        .unwrap_or(trimmed)
        .to_ascii_lowercase()
}
