use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::adapters::chains::{LocalAdapterConfig, LocalChainAdapter, NeoAdapter, NeoAdapterConfig};
use crate::adapters::{AdapterRegistry, SwapContext, TokenRegistry};
use crate::clients::{LocalChainApi, NeoNodeApi, NeoRpcClient, NeoScanClient, NexusRpcClient, PlatformInfo};
use crate::config::{RelayerConfig, TokenConfig};
use crate::error::{AppError, AppResult};
use crate::ledger::models::NEO_CHAIN;
use crate::ledger::{CheckpointStore, SwapLedger};
use crate::settlement::Orchestrator;
use crate::signing::SigningContext;

pub async fn initialize_orchestrator(
    config: &RelayerConfig,
    shutdown: watch::Receiver<bool>,
) -> AppResult<Orchestrator> {
    info!("Initializing relayer components ...");

    let signer = Arc::new(SigningContext::from_hex_seed(&config.swap.private_key)?);
    info!("🔑 Relayer address: {}", signer.address());

    let timeout = Duration::from_secs(config.rpc_timeout_secs);
    let local_chain = config.local_chain.name.as_str();
    let local: Arc<dyn LocalChainApi> = Arc::new(NexusRpcClient::new(
        local_chain,
        &config.local_chain.rpc_url,
        timeout,
    )?);

    let tokens = build_token_registry(&config.tokens, &config.swap.symbols, local_chain, local.as_ref()).await?;
    info!("✅ Token registry loaded: {} tokens", tokens.len());

    let platforms = local.get_platforms().await?;
    info!("✅ {} publishes {} interop platforms", local_chain, platforms.len());

    let ctx = Arc::new(SwapContext::new(local_chain, Arc::new(tokens), platforms, local.clone()));
    let adapters = build_adapters(config, ctx.clone(), local, signer, timeout).await?;

    let ledger = SwapLedger::open(config.swap_log_path())?;
    info!("📒 Swap ledger at {}: {} records", ledger.path().display(), ledger.len());
    let checkpoints = CheckpointStore::open(config.checkpoint_path(), config.genesis_heights())?;
    info!("📍 Checkpoints at {}", checkpoints.path().display());

    let release_timeout = Duration::from_secs(config.swap.release_timeout_secs);
    Ok(Orchestrator::new(Arc::new(adapters), ctx, ledger, checkpoints, shutdown)
        .with_release_timeout(release_timeout))
}

/// Static tokens from configuration plus every bridged symbol as the local chain describes it
pub async fn build_token_registry(
    configured: &[TokenConfig],
    symbols: &[String],
    local_chain: &str,
    local: &dyn LocalChainApi,
) -> AppResult<TokenRegistry> {
    let mut registry = TokenRegistry::new();

    for token in configured {
        registry.register(&token.chain, &token.symbol, &token.asset_id, token.decimals)?;
    }

    for symbol in symbols {
        let token = local.get_token(symbol).await?;
        registry.register(local_chain, &token.symbol, &token.symbol, token.decimals)?;
        for external in &token.external {
            registry.register(&external.platform, &token.symbol, &external.hash, token.decimals)?;
        }
    }

    Ok(registry)
}

/// Whether the address derived for `chain` is the one the local chain expects
fn platform_address_matches(platforms: &[PlatformInfo], chain: &str, derived: &str) -> bool {
    match platforms.iter().find(|p| p.platform == chain) {
        Some(platform) if platform.external_address != derived => {
            error!(
                "❌ {} address mismatch, should be {} but swap key derives {}. Check the swap key.",
                chain, platform.external_address, derived
            );
            false
        }
        _ => true,
    }
}

/// Releases go out with `sendfrom`, so the node wallet must hold the bridge key.
/// An unreachable node is not a reason to refuse startup.
async fn neo_wallet_holds(node: &dyn NeoNodeApi, address: &str) -> bool {
    match node.wallet_addresses().await {
        Ok(addresses) if addresses.iter().any(|a| a == address) => true,
        Ok(_) => {
            error!("❌ NEO node wallet does not hold the key for {}. Import the swap key.", address);
            false
        }
        Err(e) => {
            warn!("⚠️  Could not list NEO wallet addresses: {}", e);
            true
        }
    }
}

pub async fn build_adapters(
    config: &RelayerConfig,
    ctx: Arc<SwapContext>,
    local: Arc<dyn LocalChainApi>,
    signer: Arc<SigningContext>,
    timeout: Duration,
) -> AppResult<AdapterRegistry> {
    let mut registry = AdapterRegistry::new();

    info!("⚙️  Initializing chain adapters...");

    let local_config = LocalAdapterConfig {
        min_fee: config.swap.min_fee,
        page_size: config.swap.page_size,
        confirmation: config.swap.confirmation,
        ..LocalAdapterConfig::default()
    };
    registry.register(Arc::new(LocalChainAdapter::new(local_config, ctx.clone(), local, signer.clone())));

    let mut chains: Vec<&String> = config.interop.keys().collect();
    chains.sort();

    for chain in chains {
        if chain == ctx.local_chain() {
            continue;
        }
        let Some(settings) = config.interop_chain(chain) else {
            info!("{} interop disabled", chain);
            continue;
        };

        match chain.as_str() {
            NEO_CHAIN => {
                let keys = signer.neo_keys()?;
                info!("🔑 NEO address: {} (script hash {})", keys.address(), keys.script_hash());
                if !platform_address_matches(ctx.platforms(), NEO_CHAIN, keys.address()) {
                    continue;
                }

                let scan = NeoScanClient::new(required(settings.neoscan_url.as_deref(), "neoscan_url")?, timeout)?;
                let node = NeoRpcClient::new(required(settings.rpc_url.as_deref(), "rpc_url")?, timeout)?;
                if !neo_wallet_holds(&node, keys.address()).await {
                    continue;
                }

                let neo_config = NeoAdapterConfig {
                    deposit_address: keys.address().to_string(),
                    min_confirmations: settings.min_confirmations.unwrap_or(1),
                    confirmation: config.swap.confirmation,
                };

                registry.register(Arc::new(NeoAdapter::new(
                    neo_config,
                    ctx.clone(),
                    Arc::new(scan),
                    Arc::new(node),
                )));
                info!("✅ NEO adapter registered");
            }
            other => {
                warn!("⚠️  No adapter implementation for {}, skipping", other);
            }
        }
    }

    Ok(registry)
}

fn required<'a>(value: Option<&'a str>, field: &str) -> AppResult<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Configuration(format!("interop.neo.{} is required", field)))
}
