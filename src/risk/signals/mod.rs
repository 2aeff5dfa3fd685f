//! Signal source implementations
//!
//! - `market`: DexScreener pair liquidity, volume and volatility
//! - `quality`: RugCheck report score and risk levels
//! - `onchain`: mint account owner, data and rent balance over RPC
//! - `pattern`: local heuristics on the address string

use solana_client::nonblocking::rpc_client::RpcClient;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::dexscreener::DexScreenerClient;
use crate::error::Result;
use crate::risk::RiskAggregator;

pub mod market;
pub mod onchain;
pub mod pattern;
pub mod quality;

pub use market::MarketSignalSource;
pub use onchain::{AccountFetcher, OnchainSignalSource};
pub use pattern::PatternSignalSource;
pub use quality::QualitySignalSource;

/// Build an aggregator with all four production sources registered
pub fn build_aggregator(
    config: &Config,
    dexscreener: Arc<DexScreenerClient>,
    rpc: Arc<RpcClient>,
) -> Result<RiskAggregator> {
    let mut aggregator = RiskAggregator::new(&config.risk);

    aggregator.register_source(Arc::new(MarketSignalSource::new(
        dexscreener,
        config.risk.market.clone(),
    )));

    aggregator.register_source(Arc::new(QualitySignalSource::new(
        config.api.rugcheck_url.clone(),
        Some(config.api.rugcheck_api_key.clone()),
        Duration::from_secs(config.api.http_timeout_secs),
        config.risk.quality.clone(),
    )));

    aggregator.register_source(Arc::new(OnchainSignalSource::new(
        rpc,
        config.risk.onchain.clone(),
    )));

    aggregator.register_source(Arc::new(PatternSignalSource::new(
        config.risk.pattern.clone(),
    )?));

    tracing::info!(
        sources = aggregator.source_count(),
        timeout_secs = config.risk.source_timeout_secs,
        "Risk aggregator ready"
    );

    Ok(aggregator)
}
