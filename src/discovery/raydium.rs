//! Raydium pool listing feed

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::{SOL_MINT, USDC_MINT};
use crate::discovery::{candidate, CandidateToken, DiscoveryFeed};
use crate::error::{Error, Result};
use crate::http;
use crate::ratelimit::RateLimiter;

const PROVIDER: &str = "raydium";
const SCAN_DEPTH: usize = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct PoolMint {
    pub address: String,
    #[serde(default)]
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolInfo {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "mintA")]
    pub mint_a: PoolMint,
    #[serde(rename = "mintB")]
    pub mint_b: PoolMint,
    #[serde(default)]
    pub tvl: f64,
}

impl PoolInfo {
    /// The side of the pool that is not SOL or USDC
    pub fn traded_mint(&self) -> Option<&str> {
        let is_base = |m: &str| m == SOL_MINT || m == USDC_MINT;
        match (is_base(&self.mint_a.address), is_base(&self.mint_b.address)) {
            (true, false) => Some(&self.mint_b.address),
            (false, true) => Some(&self.mint_a.address),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PoolPage {
    #[serde(default)]
    data: Vec<PoolInfo>,
}

#[derive(Debug, Deserialize)]
struct PoolListResponse {
    success: bool,
    #[serde(default)]
    data: Option<PoolPage>,
}

pub struct RaydiumFeed {
    client: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
    limit: usize,
    min_tvl_usd: f64,
    max_tvl_usd: f64,
}

impl RaydiumFeed {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        limit: usize,
        min_tvl_usd: f64,
        max_tvl_usd: f64,
    ) -> Self {
        Self {
            client: http::client(timeout),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            limiter: RateLimiter::unlimited(PROVIDER),
            limit,
            min_tvl_usd,
            max_tvl_usd,
        }
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.limiter = RateLimiter::new(PROVIDER, interval);
        self
    }

    /// Pools inside the TVL band, keyed by their non-base mint
    pub fn select(&self, pools: &[PoolInfo]) -> Vec<CandidateToken> {
        pools
            .iter()
            .take(SCAN_DEPTH)
            .filter(|p| p.tvl > self.min_tvl_usd && p.tvl < self.max_tvl_usd)
            .filter_map(|p| {
                p.traded_mint()
                    .and_then(|m| candidate(m, self.name()))
                    .map(|c| c.with_liquidity(p.tvl))
            })
            .take(self.limit)
            .collect()
    }
}

#[async_trait]
impl DiscoveryFeed for RaydiumFeed {
    fn name(&self) -> &'static str {
        "raydium"
    }

    async fn poll(&self) -> Result<Vec<CandidateToken>> {
        let url = format!("{}/pools/info/list", self.base_url);
        self.limiter.wait_if_needed().await;
        let request = self.client.get(&url).query(&[
            ("poolType", "all"),
            ("poolSortField", "default"),
            ("sortType", "desc"),
            ("pageSize", "50"),
            ("page", "1"),
        ]);
        let resp: PoolListResponse = http::send_json(request, PROVIDER).await?;
        if !resp.success {
            return Err(Error::unavailable(PROVIDER, "pool listing reported failure"));
        }
        let pools = resp.data.map(|d| d.data).unwrap_or_default();
        Ok(self.select(&pools))
    }
}
