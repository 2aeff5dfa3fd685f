//! Market-data signal from DexScreener pair metrics

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::MarketPolicy;
use crate::dexscreener::{deepest_pair, DexPair, DexScreenerClient};
use crate::error::Result;
use crate::risk::{SignalResult, SignalSource, SourceId, TokenAddress};

/// Scores a token on liquidity, volume, valuation and volatility of its deepest pair
pub struct MarketSignalSource {
    client: Arc<DexScreenerClient>,
    policy: MarketPolicy,
}

impl MarketSignalSource {
    pub fn new(client: Arc<DexScreenerClient>, policy: MarketPolicy) -> Self {
        Self { client, policy }
    }
}

#[async_trait]
impl SignalSource for MarketSignalSource {
    fn id(&self) -> SourceId {
        SourceId::Market
    }

    async fn evaluate(&self, token: &TokenAddress) -> Result<SignalResult> {
        let pairs = self.client.get_token_pairs(token.as_str()).await?;
        Ok(score_pairs(&self.policy, &pairs))
    }
}

/// Score the deepest pair. Monotonic in liquidity and volume.
pub fn score_pairs(policy: &MarketPolicy, pairs: &[DexPair]) -> SignalResult {
    let Some(pair) = deepest_pair(pairs) else {
        return SignalResult::evaluated(
            SourceId::Market,
            policy.no_pairs_score,
            false,
            "No trading pairs found",
        )
        .with_metric("pair_count", 0);
    };

    let liquidity = pair.liquidity_usd();
    let volume = pair.volume_24h_usd();
    let fdv = pair.fdv.unwrap_or(0.0);
    let price_change = pair.price_change_24h_pct();

    let mut score = policy.base_score;

    let liquidity_good = liquidity >= policy.min_liquidity_usd;
    if liquidity_good {
        score += policy.min_liquidity_bonus;
    } else if liquidity >= policy.floor_liquidity_usd {
        score += policy.floor_liquidity_bonus;
    }

    let volume_good = volume >= policy.min_volume_24h_usd;
    if volume_good {
        score += policy.min_volume_bonus;
    } else if volume >= policy.floor_volume_24h_usd {
        score += policy.floor_volume_bonus;
    }

    if fdv > 0.0 {
        score += policy.fdv_bonus;
    }

    let volatility_ok = price_change.abs() <= policy.max_abs_price_change_24h_pct;
    if volatility_ok {
        score += policy.stable_price_bonus;
    }

    if liquidity > policy.deep_liquidity_usd {
        score += policy.deep_liquidity_bonus;
    }

    let score = score.clamp(0.0, 1.0);
    let passed = liquidity_good && volume_good && volatility_ok;

    SignalResult::evaluated(
        SourceId::Market,
        score,
        passed,
        format!(
            "Liquidity ${:.0}, 24h volume ${:.0}, 24h change {:.1}% on {}",
            liquidity, volume, price_change, pair.dex_id
        ),
    )
    .with_metric("liquidity_usd", liquidity)
    .with_metric("volume_24h_usd", volume)
    .with_metric("fdv", fdv)
    .with_metric("price_change_24h_pct", price_change)
    .with_metric("pair_count", pairs.len())
    .with_metric("dex_id", pair.dex_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dexscreener::{Liquidity, PairToken, PriceChange, Volume};

    fn pair(liquidity: f64, volume: f64, fdv: Option<f64>, change: f64) -> DexPair {
        DexPair {
            chain_id: "solana".into(),
            dex_id: "raydium".into(),
            pair_address: format!("pair-{}", liquidity),
            base_token: PairToken {
                address: "mint".into(),
                name: None,
                symbol: None,
            },
            quote_token: None,
            price_usd: None,
            price_change: Some(PriceChange {
                h24: Some(change),
                ..Default::default()
            }),
            volume: Some(Volume {
                h24: Some(volume),
                ..Default::default()
            }),
            liquidity: Some(Liquidity {
                usd: Some(liquidity),
                ..Default::default()
            }),
            fdv,
            pair_created_at: None,
        }
    }

    #[test]
    fn test_no_pairs() {
        let result = score_pairs(&MarketPolicy::default(), &[]);
        assert_eq!(result.score, 0.10);
        assert!(!result.passed);
    }

    #[test]
    fn test_healthy_pair_passes() {
        let result = score_pairs(
            &MarketPolicy::default(),
            &[pair(10_000.0, 5_000.0, Some(250_000.0), 40.0)],
        );
        // 0.15 + 0.35 + 0.25 + 0.15 + 0.10
        assert!((result.score - 1.0).abs() < 1e-9);
        assert!(result.passed);
    }

    #[test]
    fn test_deep_liquidity_is_capped() {
        let result = score_pairs(
            &MarketPolicy::default(),
            &[pair(80_000.0, 5_000.0, Some(1.0), 10.0)],
        );
        assert_eq!(result.score, 1.0);
    }

    #[test]
    fn test_thin_pair_scores_low() {
        let result = score_pairs(&MarketPolicy::default(), &[pair(1_500.0, 150.0, None, 500.0)]);
        // 0.15 + 0.20 + 0.10
        assert!((result.score - 0.45).abs() < 1e-9);
        assert!(!result.passed);
    }

    #[test]
    fn test_uses_deepest_pair() {
        let result = score_pairs(
            &MarketPolicy::default(),
            &[
                pair(500.0, 0.0, None, 0.0),
                pair(3_000.0, 600.0, None, 0.0),
            ],
        );
        assert_eq!(result.raw_metrics["liquidity_usd"], 3_000.0);
        assert!(result.passed);
    }

    #[test]
    fn test_monotonic_in_liquidity() {
        let policy = MarketPolicy::default();
        let mut last = 0.0;
        for liquidity in [0.0, 999.0, 1_000.0, 2_500.0, 50_001.0] {
            let score = score_pairs(&policy, &[pair(liquidity, 0.0, None, 0.0)]).score;
            assert!(score >= last);
            last = score;
        }
    }
}
