//! pump.fun recent-coins discovery feed

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::discovery::{candidate, CandidateToken, DiscoveryFeed};
use crate::error::Result;
use crate::http;
use crate::ratelimit::RateLimiter;

const PROVIDER: &str = "pumpfun";
/// How many of the newest coins are inspected per poll
const SCAN_DEPTH: usize = 30;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PumpCoin {
    #[serde(default)]
    pub mint: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub created_timestamp: Option<Value>,
    #[serde(default, rename = "createdAt")]
    pub created_at: Option<Value>,
    #[serde(default)]
    pub usd_market_cap: Option<f64>,
}

impl PumpCoin {
    pub fn mint_address(&self) -> Option<&str> {
        self.mint.as_deref().or(self.address.as_deref())
    }

    /// Creation time, accepting unix seconds, unix millis or RFC 3339
    pub fn created(&self) -> Option<DateTime<Utc>> {
        let raw = self.created_timestamp.as_ref().or(self.created_at.as_ref())?;
        match raw {
            Value::Number(n) => from_unix(n.as_f64()?),
            Value::String(s) => match s.parse::<f64>() {
                Ok(n) => from_unix(n),
                Err(_) => DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|t| t.with_timezone(&Utc)),
            },
            _ => None,
        }
    }
}

fn from_unix(value: f64) -> Option<DateTime<Utc>> {
    let secs = if value > 1e12 { value / 1000.0 } else { value };
    DateTime::from_timestamp(secs as i64, 0)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CoinsResponse {
    List(Vec<PumpCoin>),
    Wrapped { coins: Vec<PumpCoin> },
}

pub struct PumpFunFeed {
    client: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
    limit: usize,
    max_age_hours: i64,
}

impl PumpFunFeed {
    pub fn new(base_url: impl Into<String>, timeout: Duration, limit: usize, max_age_hours: i64) -> Self {
        Self {
            client: http::client(timeout),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            limiter: RateLimiter::unlimited(PROVIDER),
            limit,
            max_age_hours,
        }
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.limiter = RateLimiter::new(PROVIDER, interval);
        self
    }

    /// Keep coins younger than the age limit, newest-first order preserved
    pub fn select(&self, coins: &[PumpCoin], now: DateTime<Utc>) -> Vec<CandidateToken> {
        coins
            .iter()
            .take(SCAN_DEPTH)
            .filter(|coin| match coin.created() {
                Some(created) => (now - created).num_seconds() <= self.max_age_hours * 3600,
                None => false,
            })
            .filter_map(|coin| coin.mint_address().and_then(|m| candidate(m, self.name())))
            .take(self.limit)
            .collect()
    }
}

#[async_trait]
impl DiscoveryFeed for PumpFunFeed {
    fn name(&self) -> &'static str {
        "pumpfun"
    }

    async fn poll(&self) -> Result<Vec<CandidateToken>> {
        let url = format!("{}/coins", self.base_url);
        self.limiter.wait_if_needed().await;
        let request = self.client.get(&url).query(&[
            ("offset", "0"),
            ("limit", "50"),
            ("sort", "created_timestamp"),
            ("order", "DESC"),
        ]);
        let coins = match http::send_json::<CoinsResponse>(request, PROVIDER).await? {
            CoinsResponse::List(coins) => coins,
            CoinsResponse::Wrapped { coins } => coins,
        };
        Ok(self.select(&coins, Utc::now()))
    }
}
