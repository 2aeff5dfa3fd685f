// DexScreener API client for pair metrics and new-token discovery
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::Result;
use crate::http;
use crate::ratelimit::RateLimiter;

const PROVIDER: &str = "dexscreener";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenProfile {
    pub url: Option<String>,
    #[serde(rename = "chainId")]
    pub chain_id: String,
    #[serde(rename = "tokenAddress")]
    pub token_address: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBoost {
    pub url: Option<String>,
    #[serde(rename = "chainId")]
    pub chain_id: String,
    #[serde(rename = "tokenAddress")]
    pub token_address: String,
    #[serde(rename = "totalAmount")]
    pub total_amount: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceChange {
    pub m5: Option<f64>,
    pub h1: Option<f64>,
    pub h6: Option<f64>,
    pub h24: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Liquidity {
    pub usd: Option<f64>,
    pub base: Option<f64>,
    pub quote: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Volume {
    pub m5: Option<f64>,
    pub h1: Option<f64>,
    pub h6: Option<f64>,
    pub h24: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairToken {
    pub address: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexPair {
    #[serde(rename = "chainId")]
    pub chain_id: String,
    #[serde(rename = "dexId")]
    pub dex_id: String,
    #[serde(rename = "pairAddress")]
    pub pair_address: String,
    #[serde(rename = "baseToken")]
    pub base_token: PairToken,
    #[serde(rename = "quoteToken")]
    pub quote_token: Option<PairToken>,
    #[serde(rename = "priceUsd")]
    pub price_usd: Option<String>,
    #[serde(rename = "priceChange")]
    pub price_change: Option<PriceChange>,
    pub volume: Option<Volume>,
    pub liquidity: Option<Liquidity>,
    #[serde(rename = "fdv")]
    pub fdv: Option<f64>,
    /// Unix millis
    #[serde(rename = "pairCreatedAt")]
    pub pair_created_at: Option<i64>,
}

impl DexPair {
    pub fn liquidity_usd(&self) -> f64 {
        self.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0)
    }

    pub fn volume_24h_usd(&self) -> f64 {
        self.volume.as_ref().and_then(|v| v.h24).unwrap_or(0.0)
    }

    pub fn price_change_24h_pct(&self) -> f64 {
        self.price_change.as_ref().and_then(|p| p.h24).unwrap_or(0.0)
    }

    pub fn quote_symbol(&self) -> Option<&str> {
        self.quote_token.as_ref().and_then(|q| q.symbol.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairsResponse {
    pub pairs: Option<Vec<DexPair>>,
}

pub struct DexScreenerClient {
    client: reqwest::Client,
    base_url: String,
    /// Pair lookups and search
    pairs_limiter: RateLimiter,
    /// Boost and profile listings
    listing_limiter: RateLimiter,
}

impl DexScreenerClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: http::client(timeout),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            pairs_limiter: RateLimiter::unlimited("dexscreener_pairs"),
            listing_limiter: RateLimiter::unlimited("dexscreener_listings"),
        }
    }

    /// Space requests at least this far apart, per endpoint group
    pub fn with_rate_limits(mut self, pairs_interval: Duration, listing_interval: Duration) -> Self {
        self.pairs_limiter = RateLimiter::new("dexscreener_pairs", pairs_interval);
        self.listing_limiter = RateLimiter::new("dexscreener_listings", listing_interval);
        self
    }

    async fn get_json<T: DeserializeOwned>(&self, limiter: &RateLimiter, path: &str) -> Result<T> {
        limiter.wait_if_needed().await;
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "DexScreener request");
        http::send_json(self.client.get(&url), PROVIDER).await
    }

    /// Fetch latest token profiles
    pub async fn get_latest_profiles(&self) -> Result<Vec<TokenProfile>> {
        self.get_json(&self.listing_limiter, "/token-profiles/latest/v1")
            .await
    }

    /// Fetch latest boosted tokens
    pub async fn get_latest_boosts(&self) -> Result<Vec<TokenBoost>> {
        self.get_json(&self.listing_limiter, "/token-boosts/latest/v1")
            .await
    }

    /// Fetch every pair trading this token
    pub async fn get_token_pairs(&self, mint: &str) -> Result<Vec<DexPair>> {
        let data: PairsResponse = self
            .get_json(&self.pairs_limiter, &format!("/latest/dex/tokens/{}", mint))
            .await?;
        Ok(data.pairs.unwrap_or_default())
    }

    /// Search pairs by free-text query
    pub async fn search_pairs(&self, query: &str) -> Result<Vec<DexPair>> {
        let data: PairsResponse = self
            .get_json(&self.pairs_limiter, &format!("/latest/dex/search?q={}", query))
            .await?;
        Ok(data.pairs.unwrap_or_default())
    }
}

/// Pair with the deepest USD liquidity
pub fn deepest_pair(pairs: &[DexPair]) -> Option<&DexPair> {
    pairs
        .iter()
        .max_by(|a, b| a.liquidity_usd().total_cmp(&b.liquidity_usd()))
}
