//! CLI command implementations

use anyhow::Result;
use dialoguer::Confirm;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::signature::{Keypair, Signer};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::dexscreener::DexScreenerClient;
use crate::discovery::build_discoverer;
use crate::engine::{LifecycleSettings, PositionLifecycleController};
use crate::position::{JupiterPricing, PositionLedger};
use crate::risk::signals::build_aggregator;
use crate::risk::TokenAddress;
use crate::trading::jupiter::load_keypair;
use crate::trading::{ExecutionMode, JupiterClient, JupiterExecutor, TradeExecutor};

fn rpc_client(config: &Config) -> Arc<RpcClient> {
    Arc::new(RpcClient::new_with_timeout_and_commitment(
        config.rpc.endpoint.clone(),
        Duration::from_millis(config.rpc.timeout_ms),
        CommitmentConfig::confirmed(),
    ))
}

fn dexscreener(config: &Config) -> Arc<DexScreenerClient> {
    Arc::new(
        DexScreenerClient::new(
            config.api.dexscreener_url.clone(),
            Duration::from_secs(config.api.http_timeout_secs),
        )
        .with_rate_limits(
            Duration::from_millis(config.api.dexscreener_pairs_interval_ms),
            Duration::from_millis(config.api.dexscreener_listing_interval_ms),
        ),
    )
}

/// Load the trading keypair from KEYPAIR_PATH, refusing group/world-readable files
fn load_signer() -> Result<Keypair> {
    let keypair_path = std::env::var("KEYPAIR_PATH")
        .map_err(|_| anyhow::anyhow!("KEYPAIR_PATH environment variable not set"))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = std::fs::metadata(&keypair_path)
            .map_err(|e| anyhow::anyhow!("Cannot read keypair file {}: {}", keypair_path, e))?;
        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            anyhow::bail!(
                "Keypair file {} has insecure permissions {:o}. Run 'chmod 600 {}' to fix.",
                keypair_path,
                mode & 0o777,
                keypair_path
            );
        }
    }

    Ok(load_keypair(&keypair_path)?)
}

/// Start the lifecycle loop
pub async fn start(config: &Config, dry_run: bool, yes: bool) -> Result<()> {
    let mode = if dry_run {
        ExecutionMode::Simulated
    } else {
        ExecutionMode::Live
    };

    if mode == ExecutionMode::Simulated {
        warn!("Running in DRY-RUN mode - swaps are quoted but never submitted");
    } else if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Trade LIVE with up to ${} across {} positions?",
                config.trading.available_capital_usd, config.trading.max_positions
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            info!("Start cancelled by user");
            return Ok(());
        }
    }

    info!(
        mode = %mode,
        trade_usd = config.trading.trade_amount_usd,
        capital_usd = config.trading.available_capital_usd,
        max_positions = config.trading.max_positions,
        target_pct = config.trading.profit_target_pct,
        stop_loss_pct = config.trading.stop_loss_pct,
        "Starting screener bot"
    );

    let rpc = rpc_client(config);
    let dex = dexscreener(config);
    let jupiter = Arc::new(JupiterClient::new(
        config.api.jupiter_url.clone(),
        Duration::from_secs(config.api.http_timeout_secs),
    ));

    let executor: Arc<dyn TradeExecutor> = match mode {
        ExecutionMode::Live => {
            let signer = load_signer()?;
            info!(wallet = %signer.pubkey(), "Loaded keypair");
            Arc::new(JupiterExecutor::live(
                jupiter.clone(),
                rpc.clone(),
                Arc::new(signer),
                config.trading.quote_mint.clone(),
                config.trading.quote_decimals,
            ))
        }
        ExecutionMode::Simulated => Arc::new(JupiterExecutor::simulated(
            jupiter.clone(),
            rpc.clone(),
            config.trading.quote_mint.clone(),
            config.trading.quote_decimals,
        )),
    };
    let pricing = Arc::new(JupiterPricing::new(
        jupiter,
        config.trading.quote_mint.clone(),
        config.trading.quote_decimals,
        config.trading.slippage_bps,
    ));

    let aggregator = build_aggregator(config, dex.clone(), rpc)?;
    let discoverer = build_discoverer(config, dex);
    info!(feeds = discoverer.feed_count(), "Discovery ready");

    let mut controller = PositionLifecycleController::new(
        discoverer,
        aggregator,
        PositionLedger::from_config(config),
        executor,
        pricing,
        LifecycleSettings::from_config(config),
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping after the current cycle");
            signal_token.cancel();
        }
    });

    controller.run(shutdown).await;
    Ok(())
}

/// Assess one token and print the breakdown
pub async fn assess(config: &Config, mint: &str, json: bool) -> Result<()> {
    let token = TokenAddress::new(mint)?;
    let aggregator = build_aggregator(config, dexscreener(config), rpc_client(config))?;
    let assessment = aggregator.assess(&token).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&assessment)?);
        return Ok(());
    }

    println!("\n=== RISK ASSESSMENT: {} ===\n", token);
    for result in assessment.per_source.values() {
        println!("  {}", result);
    }
    println!();
    println!(
        "Composite: {:.3} -> {} ({} degraded source(s))",
        assessment.composite_score,
        assessment.classification,
        assessment.degraded_count()
    );

    Ok(())
}

/// Run a single discovery pass and print the candidates
pub async fn discover(config: &Config) -> Result<()> {
    let mut discoverer = build_discoverer(config, dexscreener(config));
    let candidates = discoverer.discover().await;

    println!("\n=== DISCOVERED CANDIDATES ({}) ===\n", candidates.len());
    if candidates.is_empty() {
        println!("No new candidates.");
    }
    for c in &candidates {
        let liquidity = c
            .liquidity_usd
            .map(|l| format!("${:.0}", l))
            .unwrap_or_else(|| "-".to_string());
        println!("  {:<46} {:<22} liquidity {}", c.address, c.feed, liquidity);
    }

    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}
