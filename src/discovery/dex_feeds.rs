//! DexScreener-backed discovery feeds

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use crate::config::{SOL_MINT, USDC_MINT};
use crate::dexscreener::{DexPair, DexScreenerClient};
use crate::discovery::{candidate, CandidateToken, DiscoveryFeed};
use crate::error::{Error, Result};

const SOLANA: &str = "solana";

/// Latest boosted Solana tokens
pub struct DexBoostsFeed {
    client: Arc<DexScreenerClient>,
    limit: usize,
}

impl DexBoostsFeed {
    pub fn new(client: Arc<DexScreenerClient>, limit: usize) -> Self {
        Self { client, limit }
    }
}

#[async_trait]
impl DiscoveryFeed for DexBoostsFeed {
    fn name(&self) -> &'static str {
        "dexscreener_boosts"
    }

    async fn poll(&self) -> Result<Vec<CandidateToken>> {
        let boosts = self.client.get_latest_boosts().await?;
        Ok(boosts
            .iter()
            .filter(|b| b.chain_id == SOLANA)
            .filter_map(|b| candidate(&b.token_address, self.name()))
            .take(self.limit)
            .collect())
    }
}

/// Latest Solana token profiles
pub struct DexProfilesFeed {
    client: Arc<DexScreenerClient>,
    limit: usize,
}

impl DexProfilesFeed {
    pub fn new(client: Arc<DexScreenerClient>, limit: usize) -> Self {
        Self { client, limit }
    }
}

#[async_trait]
impl DiscoveryFeed for DexProfilesFeed {
    fn name(&self) -> &'static str {
        "dexscreener_profiles"
    }

    async fn poll(&self) -> Result<Vec<CandidateToken>> {
        let profiles = self.client.get_latest_profiles().await?;
        Ok(profiles
            .iter()
            .filter(|p| p.chain_id == SOLANA)
            .filter_map(|p| candidate(&p.token_address, self.name()))
            .take(self.limit)
            .collect())
    }
}

/// Young pairs quoted in SOL or USDC, found through pair search
pub struct DexSearchFeed {
    client: Arc<DexScreenerClient>,
    queries: Vec<String>,
    limit: usize,
    max_age_hours: i64,
    min_liquidity_usd: f64,
}

impl DexSearchFeed {
    pub fn new(
        client: Arc<DexScreenerClient>,
        queries: Vec<String>,
        limit: usize,
        max_age_hours: i64,
        min_liquidity_usd: f64,
    ) -> Self {
        Self {
            client,
            queries,
            limit,
            max_age_hours,
            min_liquidity_usd,
        }
    }

    fn accepts(&self, pair: &DexPair, now_ms: i64) -> bool {
        if pair.chain_id != SOLANA || pair.liquidity_usd() <= self.min_liquidity_usd {
            return false;
        }
        let quoted_in_base = pair
            .quote_token
            .as_ref()
            .map(|q| q.address == SOL_MINT || q.address == USDC_MINT)
            .unwrap_or(false)
            || matches!(pair.quote_symbol(), Some("SOL") | Some("USDC"));
        if !quoted_in_base {
            return false;
        }
        match pair.pair_created_at {
            Some(created_ms) => now_ms - created_ms <= self.max_age_hours * 3_600_000,
            None => false,
        }
    }

    /// Filter search results down to candidates
    pub fn select(&self, pairs: &[DexPair], now_ms: i64) -> Vec<CandidateToken> {
        pairs
            .iter()
            .filter(|p| self.accepts(p, now_ms))
            .filter_map(|p| {
                candidate(&p.base_token.address, self.name()).map(|c| {
                    c.with_liquidity(p.liquidity_usd())
                        .with_volume(p.volume_24h_usd())
                })
            })
            .collect()
    }
}

#[async_trait]
impl DiscoveryFeed for DexSearchFeed {
    fn name(&self) -> &'static str {
        "dexscreener_search"
    }

    async fn poll(&self) -> Result<Vec<CandidateToken>> {
        let now_ms = Utc::now().timestamp_millis();
        let mut found = Vec::new();
        let mut last_error = None;
        let mut succeeded = 0;

        for query in &self.queries {
            match self.client.search_pairs(query).await {
                Ok(pairs) => {
                    succeeded += 1;
                    found.extend(self.select(&pairs, now_ms));
                }
                Err(e) => {
                    tracing::warn!(query = %query, error = %e, "DexScreener search failed");
                    last_error = Some(e);
                }
            }
        }

        if succeeded == 0 {
            return Err(last_error.unwrap_or_else(|| {
                Error::unavailable(self.name(), "no search queries configured")
            }));
        }

        found.truncate(self.limit);
        Ok(found)
    }
}
