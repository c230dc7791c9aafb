use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use crate::adapters::confirmation::BackoffPolicy;
use crate::error::{AppError, AppResult};
use crate::ledger::models::{DEFAULT_LOCAL_CHAIN, ETHEREUM_CHAIN, NEO_CHAIN};

/// Config file read from the working directory when present
const CONFIG_FILE: &str = "relayer";
const ENV_PREFIX: &str = "RELAYER";

#[derive(Debug, Deserialize, Clone)]
pub struct RelayerConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
    #[serde(default)]
    pub local_chain: LocalChainConfig,
    /// Per external chain settings, keyed by chain name
    #[serde(default)]
    pub interop: HashMap<String, InteropChainConfig>,
    pub swap: SwapConfig,
    #[serde(default)]
    pub status: StatusConfig,
    /// Static token list, merged with what the local chain publishes
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocalChainConfig {
    #[serde(default = "default_local_chain")]
    pub name: String,
    #[serde(default = "default_local_rpc_url")]
    pub rpc_url: String,
}

impl Default for LocalChainConfig {
    fn default() -> Self {
        Self {
            name: default_local_chain(),
            rpc_url: default_local_rpc_url(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct InteropChainConfig {
    /// Genesis checkpoint; deposits at or below it are never processed
    pub height: Option<u64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub neoscan_url: Option<String>,
    pub rpc_url: Option<String>,
    pub min_confirmations: Option<u64>,
}

#[derive(Deserialize, Clone)]
pub struct SwapConfig {
    /// Hex ed25519 seed of the relayer key
    pub private_key: String,
    /// Local-chain token symbols the relayer bridges
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Gas price attached to local-chain transactions
    #[serde(default = "default_min_fee")]
    pub min_fee: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub confirmation: BackoffPolicy,
    /// A release still unconfirmed this long after broadcast fails the swap
    #[serde(default = "default_release_timeout_secs")]
    pub release_timeout_secs: u64,
}

// Never print the key
impl fmt::Debug for SwapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwapConfig")
            .field("private_key", &"<redacted>")
            .field("symbols", &self.symbols)
            .field("min_fee", &self.min_fee)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("page_size", &self.page_size)
            .field("confirmation", &self.confirmation)
            .field("release_timeout_secs", &self.release_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatusConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Expose `POST /admin/simulate/:chain`, which moves real funds
    #[serde(default)]
    pub simulation: bool,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_bind_address(),
            simulation: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TokenConfig {
    pub chain: String,
    pub symbol: String,
    pub asset_id: String,
    pub decimals: u8,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

fn default_local_chain() -> String {
    DEFAULT_LOCAL_CHAIN.to_string()
}

fn default_local_rpc_url() -> String {
    "http://localhost:7077/rpc".to_string()
}

fn default_true() -> bool {
    true
}

fn default_min_fee() -> u64 {
    100_000
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_page_size() -> u32 {
    25
}

/// Well past the local chain's transaction expiration
fn default_release_timeout_secs() -> u64 {
    3600
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

/// Height the relayer starts watching `chain` from when nothing is configured
pub fn default_genesis_height(chain: &str) -> u64 {
    match chain {
        NEO_CHAIN | ETHEREUM_CHAIN => 4_261_049,
        _ => 0,
    }
}

impl RelayerConfig {
    /// Load `relayer.toml` (optional) overlaid with `RELAYER__*` env vars
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("swap.symbols")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Checkpoint used for each chain until it first advances
    pub fn genesis_heights(&self) -> HashMap<String, u64> {
        let mut heights: HashMap<String, u64> = [DEFAULT_LOCAL_CHAIN, NEO_CHAIN, ETHEREUM_CHAIN]
            .iter()
            .map(|chain| (chain.to_string(), default_genesis_height(chain)))
            .collect();
        heights
            .entry(self.local_chain.name.clone())
            .or_insert_with(|| default_genesis_height(&self.local_chain.name));

        for (chain, settings) in &self.interop {
            if let Some(height) = settings.height {
                heights.insert(chain.clone(), height);
            }
        }
        heights
    }

    /// Settings for `chain` when present and enabled
    pub fn interop_chain(&self, chain: &str) -> Option<&InteropChainConfig> {
        self.interop.get(chain).filter(|c| c.enabled)
    }

    pub fn swap_log_path(&self) -> PathBuf {
        self.data_dir.join("swaps.log")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.data_dir.join("checkpoints.log")
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.swap.private_key.trim().is_empty() {
            return Err(AppError::Configuration("swap.private_key is required".to_string()));
        }
        if self.swap.poll_interval_secs == 0 {
            return Err(AppError::Configuration(
                "swap.poll_interval_secs must be positive".to_string(),
            ));
        }
        if self.swap.page_size == 0 {
            return Err(AppError::Configuration("swap.page_size must be positive".to_string()));
        }
        if self.swap.release_timeout_secs == 0 {
            return Err(AppError::Configuration(
                "swap.release_timeout_secs must be positive".to_string(),
            ));
        }
        if let Some(neo) = self.interop_chain(NEO_CHAIN) {
            for (field, value) in [
                ("neoscan_url", &neo.neoscan_url),
                ("rpc_url", &neo.rpc_url),
            ] {
                if value.as_deref().map_or(true, str::is_empty) {
                    return Err(AppError::Configuration(format!("interop.neo.{} is required", field)));
                }
            }
        }
        Ok(())
    }
}
