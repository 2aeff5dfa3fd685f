//! New-token discovery
//!
//! A [`TokenDiscoverer`] polls every configured [`DiscoveryFeed`] concurrently,
//! merges the results in feed order and never offers the same address twice
//! within one run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, DiscoveryConfig, FeedKind};
use crate::dexscreener::DexScreenerClient;
use crate::error::{Error, Result};
use crate::risk::TokenAddress;

pub mod dex_feeds;
pub mod pumpfun;
pub mod raydium;

pub use dex_feeds::{DexBoostsFeed, DexProfilesFeed, DexSearchFeed};
pub use pumpfun::PumpFunFeed;
pub use raydium::RaydiumFeed;

/// A token reported by a discovery feed
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateToken {
    pub address: TokenAddress,
    pub feed: &'static str,
    pub discovered_at: DateTime<Utc>,
    pub liquidity_usd: Option<f64>,
    pub volume_24h_usd: Option<f64>,
}

impl CandidateToken {
    pub fn new(address: TokenAddress, feed: &'static str) -> Self {
        Self {
            address,
            feed,
            discovered_at: Utc::now(),
            liquidity_usd: None,
            volume_24h_usd: None,
        }
    }

    pub fn with_liquidity(mut self, liquidity_usd: f64) -> Self {
        self.liquidity_usd = Some(liquidity_usd);
        self
    }

    pub fn with_volume(mut self, volume_24h_usd: f64) -> Self {
        self.volume_24h_usd = Some(volume_24h_usd);
        self
    }
}

/// One upstream source of candidate tokens
#[async_trait]
pub trait DiscoveryFeed: Send + Sync {
    fn name(&self) -> &'static str;

    /// Poll once, returning candidates in the feed's native order
    async fn poll(&self) -> Result<Vec<CandidateToken>>;
}

/// Parse an address from an upstream payload, dropping empties
pub(crate) fn candidate(address: &str, feed: &'static str) -> Option<CandidateToken> {
    TokenAddress::new(address)
        .ok()
        .map(|address| CandidateToken::new(address, feed))
}

/// Polls feeds and deduplicates across the whole run
pub struct TokenDiscoverer {
    feeds: Vec<Arc<dyn DiscoveryFeed>>,
    seen: HashSet<TokenAddress>,
    ignored: HashSet<String>,
    address_length: usize,
    max_candidates: usize,
    feed_timeout: Duration,
}

impl TokenDiscoverer {
    pub fn new(config: &DiscoveryConfig, feed_timeout: Duration) -> Self {
        Self {
            feeds: Vec::new(),
            seen: HashSet::new(),
            ignored: config.ignored_mints.iter().cloned().collect(),
            address_length: config.address_length,
            max_candidates: config.max_candidates_per_cycle,
            feed_timeout,
        }
    }

    /// Add a feed. Feeds are merged in registration order.
    pub fn register_feed(&mut self, feed: Arc<dyn DiscoveryFeed>) {
        tracing::debug!(feed = feed.name(), "Registered discovery feed");
        self.feeds.push(feed);
    }

    pub fn feed_count(&self) -> usize {
        self.feeds.len()
    }

    /// Addresses offered so far this run
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn has_seen(&self, address: &TokenAddress) -> bool {
        self.seen.contains(address)
    }

    fn is_eligible(&self, address: &TokenAddress) -> bool {
        (self.address_length == 0 || address.len() == self.address_length)
            && !self.ignored.contains(address.as_str())
    }

    /// Poll every feed once and return never-before-seen candidates
    pub async fn discover(&mut self) -> Vec<CandidateToken> {
        let timeout = self.feed_timeout;
        let polls = self.feeds.iter().map(|feed| async move {
            let outcome = tokio::time::timeout(timeout, feed.poll())
                .await
                .unwrap_or_else(|_| {
                    Err(Error::Timeout(feed.name().to_string(), timeout.as_millis() as u64))
                });
            (feed.name(), outcome)
        });
        let outcomes = join_all(polls).await;

        let mut fresh = Vec::new();
        let mut capped = 0usize;
        for (name, outcome) in outcomes {
            let candidates = match outcome {
                Ok(candidates) => {
                    tracing::debug!(feed = name, count = candidates.len(), "Feed polled");
                    candidates
                }
                Err(e) => {
                    tracing::warn!(feed = name, error = %e, "Discovery feed failed");
                    continue;
                }
            };

            for candidate in candidates {
                if !self.is_eligible(&candidate.address) || self.seen.contains(&candidate.address) {
                    continue;
                }
                // Over the cap: leave unseen so it resurfaces next cycle
                if self.max_candidates > 0 && fresh.len() >= self.max_candidates {
                    capped += 1;
                    continue;
                }
                self.seen.insert(candidate.address.clone());
                fresh.push(candidate);
            }
        }

        tracing::info!(
            fresh = fresh.len(),
            deferred = capped,
            seen_total = self.seen.len(),
            "Discovery complete"
        );

        fresh
    }
}

/// Build the configured production feeds, in configured order
pub fn build_discoverer(config: &Config, dexscreener: Arc<DexScreenerClient>) -> TokenDiscoverer {
    let discovery = &config.discovery;
    let timeout = Duration::from_secs(config.api.http_timeout_secs);
    let mut discoverer = TokenDiscoverer::new(discovery, timeout);

    for kind in &discovery.feeds {
        let feed: Arc<dyn DiscoveryFeed> = match kind {
            FeedKind::PumpFun => Arc::new(PumpFunFeed::new(
                config.api.pumpfun_url.clone(),
                timeout,
                discovery.pumpfun_limit,
                discovery.pumpfun_max_age_hours,
            )
            .with_min_interval(Duration::from_millis(config.api.pumpfun_interval_ms))),
            FeedKind::DexBoosts => {
                Arc::new(DexBoostsFeed::new(dexscreener.clone(), discovery.boosts_limit))
            }
            FeedKind::DexProfiles => {
                Arc::new(DexProfilesFeed::new(dexscreener.clone(), discovery.profiles_limit))
            }
            FeedKind::DexSearch => Arc::new(DexSearchFeed::new(
                dexscreener.clone(),
                discovery.search_queries.clone(),
                discovery.search_limit,
                discovery.search_max_age_hours,
                discovery.search_min_liquidity_usd,
            )),
            FeedKind::Raydium => Arc::new(RaydiumFeed::new(
                config.api.raydium_url.clone(),
                timeout,
                discovery.raydium_limit,
                discovery.raydium_min_tvl_usd,
                discovery.raydium_max_tvl_usd,
            )
            .with_min_interval(Duration::from_millis(config.api.raydium_interval_ms))),
        };
        discoverer.register_feed(feed);
    }

    discoverer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    const A: &str = "7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr";
    const B: &str = "HeLp6NuQkmYB4pYWo2zYs22mESHXPQYzXbB8n4V98jwC";
    const C: &str = "9BB6NFEcjBCtnNLFko2FqVQBq8HHM13kCyYcdQbgpump";
    const USDC: &str = crate::config::USDC_MINT;

    struct StaticFeed {
        name: &'static str,
        addresses: Vec<&'static str>,
    }

    #[async_trait]
    impl DiscoveryFeed for StaticFeed {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn poll(&self) -> Result<Vec<CandidateToken>> {
            Ok(self
                .addresses
                .iter()
                .filter_map(|a| candidate(a, self.name))
                .collect())
        }
    }

    struct BrokenFeed;

    #[async_trait]
    impl DiscoveryFeed for BrokenFeed {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn poll(&self) -> Result<Vec<CandidateToken>> {
            Err(Error::unavailable("broken", "HTTP 503"))
        }
    }

    struct HangingFeed;

    #[async_trait]
    impl DiscoveryFeed for HangingFeed {
        fn name(&self) -> &'static str {
            "hanging"
        }

        async fn poll(&self) -> Result<Vec<CandidateToken>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![CandidateToken::new(TokenAddress::new(C).unwrap(), "hanging")])
        }
    }

    fn feed(name: &'static str, addresses: Vec<&'static str>) -> Arc<dyn DiscoveryFeed> {
        Arc::new(StaticFeed { name, addresses })
    }

    fn discoverer(feeds: Vec<Arc<dyn DiscoveryFeed>>) -> TokenDiscoverer {
        let mut discoverer =
            TokenDiscoverer::new(&DiscoveryConfig::default(), Duration::from_millis(50));
        for f in feeds {
            discoverer.register_feed(f);
        }
        discoverer
    }

    fn addresses(candidates: &[CandidateToken]) -> Vec<&str> {
        candidates.iter().map(|c| c.address.as_str()).collect()
    }

    #[tokio::test]
    async fn test_dedup_across_calls() {
        let mut discoverer = discoverer(vec![feed("first", vec![A, B])]);

        let first = discoverer.discover().await;
        let second = discoverer.discover().await;

        assert_eq!(addresses(&first), vec![A, B]);
        assert!(second.is_empty());
        assert_eq!(discoverer.seen_count(), 2);
    }

    #[tokio::test]
    async fn test_feed_order_and_cross_feed_dedup() {
        let mut discoverer = discoverer(vec![
            feed("first", vec![B, A]),
            feed("second", vec![A, C]),
        ]);

        let found = discoverer.discover().await;

        assert_eq!(addresses(&found), vec![B, A, C]);
        assert_eq!(found[1].feed, "first");
        assert_eq!(found[2].feed, "second");
    }

    #[tokio::test]
    async fn test_failed_and_hanging_feeds_contribute_nothing() {
        let mut discoverer = discoverer(vec![
            Arc::new(BrokenFeed),
            Arc::new(HangingFeed),
            feed("healthy", vec![A]),
        ]);

        let found = discoverer.discover().await;

        assert_eq!(addresses(&found), vec![A]);
        // The hanging feed's token was never offered, so it is not marked seen
        assert!(!discoverer.has_seen(&TokenAddress::new(C).unwrap()));
    }

    #[tokio::test]
    async fn test_ignored_and_wrong_length_filtered() {
        let mut discoverer = discoverer(vec![feed("mixed", vec![USDC, "short", A])]);

        let found = discoverer.discover().await;

        assert_eq!(addresses(&found), vec![A]);
    }

    #[tokio::test]
    async fn test_cap_defers_overflow_to_next_cycle() {
        let mut config = DiscoveryConfig::default();
        config.max_candidates_per_cycle = 2;
        let mut discoverer = TokenDiscoverer::new(&config, Duration::from_millis(50));
        discoverer.register_feed(feed("all", vec![A, B, C]));

        let first = discoverer.discover().await;
        let second = discoverer.discover().await;

        assert_eq!(addresses(&first), vec![A, B]);
        assert_eq!(addresses(&second), vec![C]);
    }

    #[test]
    fn test_build_discoverer_respects_feed_list() {
        let mut config = Config::default();
        config.discovery.feeds = vec![FeedKind::DexBoosts, FeedKind::Raydium];
        let dex = Arc::new(DexScreenerClient::new(
            config.api.dexscreener_url.clone(),
            Duration::from_secs(1),
        ));

        let discoverer = build_discoverer(&config, dex);
        assert_eq!(discoverer.feed_count(), 2);
    }
}
