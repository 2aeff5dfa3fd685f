//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::error::Error;

/// USDC mint (quote currency for all trades)
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
/// Wrapped SOL mint
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Base URLs of the HTTP collaborators
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_dexscreener_url")]
    pub dexscreener_url: String,
    #[serde(default = "default_rugcheck_url")]
    pub rugcheck_url: String,
    /// Optional bearer token for higher rate limits
    #[serde(default)]
    pub rugcheck_api_key: String,
    #[serde(default = "default_pumpfun_url")]
    pub pumpfun_url: String,
    #[serde(default = "default_raydium_url")]
    pub raydium_url: String,
    #[serde(default = "default_jupiter_url")]
    pub jupiter_url: String,
    /// Per-request timeout for every HTTP client
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Minimum spacing between DexScreener pair and search requests
    #[serde(default = "default_dexscreener_pairs_interval_ms")]
    pub dexscreener_pairs_interval_ms: u64,
    /// Minimum spacing between DexScreener boost and profile requests
    #[serde(default = "default_dexscreener_listing_interval_ms")]
    pub dexscreener_listing_interval_ms: u64,
    #[serde(default = "default_pumpfun_interval_ms")]
    pub pumpfun_interval_ms: u64,
    #[serde(default = "default_raydium_interval_ms")]
    pub raydium_interval_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            dexscreener_url: default_dexscreener_url(),
            rugcheck_url: default_rugcheck_url(),
            rugcheck_api_key: String::new(),
            pumpfun_url: default_pumpfun_url(),
            raydium_url: default_raydium_url(),
            jupiter_url: default_jupiter_url(),
            http_timeout_secs: default_http_timeout_secs(),
            dexscreener_pairs_interval_ms: default_dexscreener_pairs_interval_ms(),
            dexscreener_listing_interval_ms: default_dexscreener_listing_interval_ms(),
            pumpfun_interval_ms: default_pumpfun_interval_ms(),
            raydium_interval_ms: default_raydium_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// USD committed per position
    #[serde(default = "default_trade_amount_usd")]
    pub trade_amount_usd: f64,
    /// Total USD the ledger may commit at once
    #[serde(default = "default_available_capital_usd")]
    pub available_capital_usd: f64,
    /// Take profit when value reaches entry * (1 + pct/100)
    #[serde(default = "default_profit_target_pct")]
    pub profit_target_pct: f64,
    /// Stop loss when value falls to entry * (1 - pct/100). 0 disables.
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u32,
    /// Mint the bot buys with and sells back into
    #[serde(default = "default_quote_mint")]
    pub quote_mint: String,
    #[serde(default = "default_quote_decimals")]
    pub quote_decimals: u8,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            trade_amount_usd: default_trade_amount_usd(),
            available_capital_usd: default_available_capital_usd(),
            profit_target_pct: default_profit_target_pct(),
            stop_loss_pct: default_stop_loss_pct(),
            max_positions: default_max_positions(),
            slippage_bps: default_slippage_bps(),
            quote_mint: default_quote_mint(),
            quote_decimals: default_quote_decimals(),
        }
    }
}

impl TradingConfig {
    /// Value multiple at which a position is taken profit
    pub fn target_price_ratio(&self) -> f64 {
        1.0 + self.profit_target_pct / 100.0
    }

    /// Value multiple at which a position is stopped out, if enabled
    pub fn stop_loss_ratio(&self) -> Option<f64> {
        if self.stop_loss_pct > 0.0 {
            Some(1.0 - self.stop_loss_pct / 100.0)
        } else {
            None
        }
    }
}

/// Per-source values keyed by signal source
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct SourceValues {
    pub market: f64,
    pub quality: f64,
    pub onchain: f64,
    pub pattern: f64,
}

impl SourceValues {
    pub fn sum(&self) -> f64 {
        self.market + self.quality + self.onchain + self.pattern
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> {
        [
            ("market", self.market),
            ("quality", self.quality),
            ("onchain", self.onchain),
            ("pattern", self.pattern),
        ]
        .into_iter()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Composite weights, must sum to 1.0
    #[serde(default = "default_weights")]
    pub weights: SourceValues,
    /// Scores substituted when a source fails or times out
    #[serde(default = "default_fallback_scores")]
    pub fallback_scores: SourceValues,
    #[serde(default = "default_safe_threshold")]
    pub safe_threshold: f64,
    #[serde(default = "default_risky_threshold")]
    pub risky_threshold: f64,
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,
    #[serde(default)]
    pub market: MarketPolicy,
    #[serde(default)]
    pub quality: QualityPolicy,
    #[serde(default)]
    pub onchain: OnchainPolicy,
    #[serde(default)]
    pub pattern: PatternPolicy,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            weights: default_weights(),
            fallback_scores: default_fallback_scores(),
            safe_threshold: default_safe_threshold(),
            risky_threshold: default_risky_threshold(),
            source_timeout_secs: default_source_timeout_secs(),
            market: MarketPolicy::default(),
            quality: QualityPolicy::default(),
            onchain: OnchainPolicy::default(),
            pattern: PatternPolicy::default(),
        }
    }
}

/// Market-data scoring policy (liquidity, volume, fdv, volatility)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketPolicy {
    pub base_score: f64,
    pub min_liquidity_usd: f64,
    pub min_liquidity_bonus: f64,
    pub floor_liquidity_usd: f64,
    pub floor_liquidity_bonus: f64,
    pub min_volume_24h_usd: f64,
    pub min_volume_bonus: f64,
    pub floor_volume_24h_usd: f64,
    pub floor_volume_bonus: f64,
    pub fdv_bonus: f64,
    pub max_abs_price_change_24h_pct: f64,
    pub stable_price_bonus: f64,
    pub deep_liquidity_usd: f64,
    pub deep_liquidity_bonus: f64,
    /// Score when the token has no trading pairs at all
    pub no_pairs_score: f64,
}

impl Default for MarketPolicy {
    fn default() -> Self {
        Self {
            base_score: 0.15,
            min_liquidity_usd: 2_500.0,
            min_liquidity_bonus: 0.35,
            floor_liquidity_usd: 1_000.0,
            floor_liquidity_bonus: 0.20,
            min_volume_24h_usd: 500.0,
            min_volume_bonus: 0.25,
            floor_volume_24h_usd: 100.0,
            floor_volume_bonus: 0.10,
            fdv_bonus: 0.15,
            max_abs_price_change_24h_pct: 300.0,
            stable_price_bonus: 0.10,
            deep_liquidity_usd: 50_000.0,
            deep_liquidity_bonus: 0.05,
            no_pairs_score: 0.10,
        }
    }
}

/// Third-party quality report scoring policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QualityPolicy {
    pub excellent_min: f64,
    pub excellent_score: f64,
    pub good_min: f64,
    pub good_score: f64,
    pub fair_min: f64,
    pub fair_max_critical: usize,
    pub fair_score: f64,
    pub poor_score: f64,
    /// Risk levels counted as critical
    pub critical_levels: Vec<String>,
    /// Risk levels counted as warnings
    pub warning_levels: Vec<String>,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            excellent_min: 80.0,
            excellent_score: 0.85,
            good_min: 60.0,
            good_score: 0.65,
            fair_min: 40.0,
            fair_max_critical: 1,
            fair_score: 0.45,
            poor_score: 0.25,
            critical_levels: vec!["critical".into(), "high".into(), "danger".into()],
            warning_levels: vec!["warning".into(), "medium".into()],
        }
    }
}

/// On-chain account inspection policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OnchainPolicy {
    pub min_rent_lamports: u64,
    pub base_score: f64,
    pub factor_span: f64,
    pub pass_ratio: f64,
    pub max_issues: usize,
    pub missing_account_score: f64,
}

impl Default for OnchainPolicy {
    fn default() -> Self {
        Self {
            min_rent_lamports: 1_000_000,
            base_score: 0.20,
            factor_span: 0.60,
            pass_ratio: 0.66,
            max_issues: 1,
            missing_account_score: 0.20,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DiversityTier {
    pub min_unique: usize,
    pub score: f64,
}

/// Address-pattern heuristic policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PatternPolicy {
    pub expected_length: usize,
    pub length_factor: f64,
    /// Checked highest-first
    pub diversity_tiers: Vec<DiversityTier>,
    pub diversity_floor: f64,
    pub suspicious_substrings: Vec<String>,
    pub clean_bonus: f64,
    pub mixed_charset_bonus: f64,
    pub pass_threshold: f64,
}

impl Default for PatternPolicy {
    fn default() -> Self {
        Self {
            expected_length: 44,
            length_factor: 0.30,
            diversity_tiers: vec![
                DiversityTier { min_unique: 25, score: 0.40 },
                DiversityTier { min_unique: 20, score: 0.30 },
                DiversityTier { min_unique: 15, score: 0.20 },
            ],
            diversity_floor: 0.10,
            suspicious_substrings: ["1111", "0000", "aaaa", "zzzz", "pump", "2222", "3333", "4444"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            clean_bonus: 0.20,
            mixed_charset_bonus: 0.10,
            pass_threshold: 0.70,
        }
    }
}

/// Discovery feed kinds, polled in the configured order
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    PumpFun,
    DexBoosts,
    DexProfiles,
    DexSearch,
    Raydium,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub feeds: Vec<FeedKind>,
    pub max_candidates_per_cycle: usize,
    pub address_length: usize,
    /// Well-known mints never offered as candidates
    pub ignored_mints: Vec<String>,
    pub boosts_limit: usize,
    pub profiles_limit: usize,
    pub search_queries: Vec<String>,
    pub search_limit: usize,
    pub search_max_age_hours: i64,
    pub search_min_liquidity_usd: f64,
    pub pumpfun_limit: usize,
    pub pumpfun_max_age_hours: i64,
    pub raydium_limit: usize,
    pub raydium_min_tvl_usd: f64,
    pub raydium_max_tvl_usd: f64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            feeds: vec![
                FeedKind::PumpFun,
                FeedKind::DexBoosts,
                FeedKind::DexProfiles,
                FeedKind::DexSearch,
                FeedKind::Raydium,
            ],
            max_candidates_per_cycle: 10,
            address_length: 44,
            ignored_mints: default_ignored_mints(),
            boosts_limit: 10,
            profiles_limit: 5,
            search_queries: vec!["SOL".into(), "USDC".into()],
            search_limit: 10,
            search_max_age_hours: 24,
            search_min_liquidity_usd: 1_000.0,
            pumpfun_limit: 10,
            pumpfun_max_age_hours: 6,
            raydium_limit: 15,
            raydium_min_tvl_usd: 1_000.0,
            raydium_max_tvl_usd: 1_000_000.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,
    /// Sell attempts before a position is marked failed
    #[serde(default = "default_max_sell_attempts")]
    pub max_sell_attempts: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            error_backoff_secs: default_error_backoff_secs(),
            max_sell_attempts: default_max_sell_attempts(),
        }
    }
}

// Default value functions
fn default_rpc_endpoint() -> String {
    std::env::var("RPC_ENDPOINT").unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".into())
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_dexscreener_url() -> String {
    "https://api.dexscreener.com".into()
}

fn default_rugcheck_url() -> String {
    "https://api.rugcheck.xyz".into()
}

fn default_pumpfun_url() -> String {
    "https://frontend-api.pump.fun".into()
}

fn default_raydium_url() -> String {
    "https://api-v3.raydium.io".into()
}

fn default_jupiter_url() -> String {
    "https://quote-api.jup.ag/v6".into()
}

fn default_http_timeout_secs() -> u64 {
    15
}

fn default_dexscreener_pairs_interval_ms() -> u64 {
    200
}

fn default_dexscreener_listing_interval_ms() -> u64 {
    1000
}

fn default_pumpfun_interval_ms() -> u64 {
    2000
}

fn default_raydium_interval_ms() -> u64 {
    1000
}

fn default_trade_amount_usd() -> f64 {
    35.0
}

fn default_available_capital_usd() -> f64 {
    140.0
}

fn default_profit_target_pct() -> f64 {
    2.5
}

fn default_stop_loss_pct() -> f64 {
    15.0
}

fn default_max_positions() -> usize {
    4
}

fn default_slippage_bps() -> u32 {
    50
}

fn default_quote_mint() -> String {
    USDC_MINT.into()
}

fn default_quote_decimals() -> u8 {
    6
}

fn default_weights() -> SourceValues {
    SourceValues {
        market: 0.45,
        quality: 0.30,
        onchain: 0.20,
        pattern: 0.05,
    }
}

fn default_fallback_scores() -> SourceValues {
    SourceValues {
        market: 0.20,
        quality: 0.30,
        onchain: 0.40,
        pattern: 0.50,
    }
}

fn default_safe_threshold() -> f64 {
    0.60
}

fn default_risky_threshold() -> f64 {
    0.45
}

fn default_source_timeout_secs() -> u64 {
    15
}

fn default_ignored_mints() -> Vec<String> {
    vec![
        SOL_MINT.into(),
        USDC_MINT.into(),
        "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB".into(), // USDT
        "mSoLzYCxHdYgdzU16g5QSh3i5K3z3KZK7ytfqcJm7So".into(),  // mSOL
        "7dHbWXmci3dT8UFYWYZweBLXgycu7Y3iL6trKn1Y7ARj".into(), // stSOL
        "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263".into(), // BONK
        "J1toso1uCk3RLmjorhTtrVwY9HJ7X8V9yYac6Y7kGCPn".into(), // JitoSOL
    ]
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_error_backoff_secs() -> u64 {
    30
}

fn default_max_sell_attempts() -> u32 {
    5
}

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

fn is_unit(x: f64) -> bool {
    (0.0..=1.0).contains(&x)
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("rpc.endpoint", default_rpc_endpoint())?
            .set_default("rpc.timeout_ms", default_timeout_ms() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SNIPER__)
            .add_source(
                config::Environment::with_prefix("SNIPER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> crate::error::Result<()> {
        let risk = &self.risk;

        for (name, weight) in risk.weights.iter() {
            if !(weight > 0.0 && weight <= 1.0) {
                return Err(Error::Config(format!(
                    "weight for {} must be in (0, 1], got {}",
                    name, weight
                )));
            }
        }
        let sum = risk.weights.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(Error::Config(format!(
                "risk weights must sum to 1.0, got {}",
                sum
            )));
        }

        if !(risk.risky_threshold > 0.0
            && risk.risky_threshold < risk.safe_threshold
            && risk.safe_threshold <= 1.0)
        {
            return Err(Error::Config(format!(
                "thresholds must satisfy 0 < risky ({}) < safe ({}) <= 1",
                risk.risky_threshold, risk.safe_threshold
            )));
        }

        // A failed source must never pass the safety bar on its own
        for (name, score) in risk.fallback_scores.iter() {
            if !is_unit(score) || score >= risk.safe_threshold {
                return Err(Error::Config(format!(
                    "fallback score for {} must be in [0, {}), got {}",
                    name, risk.safe_threshold, score
                )));
            }
        }

        if risk.source_timeout_secs == 0 {
            return Err(Error::Config("source_timeout_secs must be positive".into()));
        }

        if !is_unit(risk.market.no_pairs_score)
            || !is_unit(risk.onchain.missing_account_score)
            || !is_unit(risk.pattern.pass_threshold)
        {
            return Err(Error::Config("policy scores must be within [0, 1]".into()));
        }

        // Validate trading amounts
        let trading = &self.trading;
        if trading.trade_amount_usd <= 0.0 {
            return Err(Error::Config("trade_amount_usd must be positive".into()));
        }

        if trading.available_capital_usd < trading.trade_amount_usd {
            return Err(Error::Config(format!(
                "available_capital_usd ({}) is smaller than one trade ({})",
                trading.available_capital_usd, trading.trade_amount_usd
            )));
        }

        if trading.max_positions == 0 {
            return Err(Error::Config("max_positions must be at least 1".into()));
        }

        if trading.slippage_bps > 10000 {
            return Err(Error::Config(
                "slippage_bps cannot exceed 10000 (100%)".into(),
            ));
        }

        if trading.profit_target_pct <= 0.0 {
            return Err(Error::Config("profit_target_pct must be positive".into()));
        }

        if trading.stop_loss_pct < 0.0 || trading.stop_loss_pct >= 100.0 {
            return Err(Error::Config("stop_loss_pct must be in [0, 100)".into()));
        }

        if self.lifecycle.poll_interval_secs == 0 {
            return Err(Error::Config("poll_interval_secs must be positive".into()));
        }

        if self.lifecycle.max_sell_attempts == 0 {
            return Err(Error::Config("max_sell_attempts must be at least 1".into()));
        }

        if self.discovery.feeds.is_empty() {
            tracing::warn!("No discovery feeds configured - the bot will never find candidates");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  RPC:
    endpoint: {}
    timeout: {}ms
  Trading:
    trade_amount: ${}
    available_capital: ${}
    profit_target: {}%
    stop_loss: {}
    max_positions: {}
    slippage: {}bps
  Risk:
    weights: market={} quality={} onchain={} pattern={}
    fallbacks: market={} quality={} onchain={} pattern={}
    safe >= {}, risky >= {}
    source_timeout: {}s
  Discovery:
    feeds: {:?}
    max_candidates_per_cycle: {}
    ignored_mints: {}
  Lifecycle:
    poll_interval: {}s
    error_backoff: {}s
    max_sell_attempts: {}
  APIs:
    jupiter: {}
    dexscreener: {}
    rugcheck: {}
    rugcheck_api_key: {}
"#,
            mask_url(&self.rpc.endpoint),
            self.rpc.timeout_ms,
            self.trading.trade_amount_usd,
            self.trading.available_capital_usd,
            self.trading.profit_target_pct,
            if self.trading.stop_loss_pct > 0.0 {
                format!("{}%", self.trading.stop_loss_pct)
            } else {
                "(disabled)".to_string()
            },
            self.trading.max_positions,
            self.trading.slippage_bps,
            self.risk.weights.market,
            self.risk.weights.quality,
            self.risk.weights.onchain,
            self.risk.weights.pattern,
            self.risk.fallback_scores.market,
            self.risk.fallback_scores.quality,
            self.risk.fallback_scores.onchain,
            self.risk.fallback_scores.pattern,
            self.risk.safe_threshold,
            self.risk.risky_threshold,
            self.risk.source_timeout_secs,
            self.discovery.feeds,
            self.discovery.max_candidates_per_cycle,
            self.discovery.ignored_mints.len(),
            self.lifecycle.poll_interval_secs,
            self.lifecycle.error_backoff_secs,
            self.lifecycle.max_sell_attempts,
            mask_url(&self.api.jupiter_url),
            mask_url(&self.api.dexscreener_url),
            mask_url(&self.api.rugcheck_url),
            if self.api.rugcheck_api_key.is_empty() {
                "(not set)"
            } else {
                "***"
            },
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            api: ApiConfig::default(),
            trading: TradingConfig::default(),
            risk: RiskConfig::default(),
            discovery: DiscoveryConfig::default(),
            lifecycle: LifecycleConfig::default(),
        }
    }
}
