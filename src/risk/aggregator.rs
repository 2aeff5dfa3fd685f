//! Concurrent fan-out over signal sources with per-source fallback

use chrono::Utc;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{RiskConfig, SourceValues};
use crate::error::Error;
use crate::risk::{
    Classification, CompositeAssessment, SignalResult, SignalSource, SourceFailure, SourceId,
    TokenAddress,
};

/// Combines every registered source into one classified assessment
pub struct RiskAggregator {
    sources: Vec<Arc<dyn SignalSource>>,
    weights: SourceValues,
    fallback_scores: SourceValues,
    safe_threshold: f64,
    risky_threshold: f64,
    source_timeout: Duration,
}

impl RiskAggregator {
    /// Create an aggregator with no sources registered
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            sources: Vec::new(),
            weights: config.weights,
            fallback_scores: config.fallback_scores,
            safe_threshold: config.safe_threshold,
            risky_threshold: config.risky_threshold,
            source_timeout: Duration::from_secs(config.source_timeout_secs),
        }
    }

    /// Override the per-source timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }

    /// Register a signal source, replacing any source with the same id
    pub fn register_source(&mut self, source: Arc<dyn SignalSource>) {
        let id = source.id();
        self.sources.retain(|s| s.id() != id);
        tracing::debug!(source = %id, "Registered signal source");
        self.sources.push(source);
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    fn fallback(&self, source: SourceId, reason: SourceFailure) -> SignalResult {
        SignalResult::fallback(source, source.select(&self.fallback_scores), reason)
    }

    /// Assess a token. Always returns a classification.
    pub async fn assess(&self, token: &TokenAddress) -> CompositeAssessment {
        let start = Instant::now();
        let timeout = self.source_timeout;

        let calls = self.sources.iter().map(|source| async move {
            let id = source.id();
            let outcome = tokio::time::timeout(timeout, source.evaluate(token)).await;
            (id, outcome)
        });
        let outcomes = join_all(calls).await;

        let mut per_source = BTreeMap::new();
        for (id, outcome) in outcomes {
            let result = match outcome {
                Ok(Ok(result)) => match result.check(id) {
                    Ok(()) => result,
                    Err(reason) => {
                        tracing::warn!(mint = %token, source = %id, %reason, "Malformed signal result");
                        self.fallback(id, SourceFailure::Malformed { reason })
                    }
                },
                Ok(Err(e)) => {
                    tracing::warn!(mint = %token, source = %id, error = %e, "Signal source failed");
                    self.fallback(id, SourceFailure::Error { reason: e.to_string() })
                }
                Err(_) => {
                    let after_ms = timeout.as_millis() as u64;
                    let err = Error::Timeout(id.to_string(), after_ms);
                    tracing::warn!(mint = %token, source = %id, error = %err, "Signal source failed");
                    self.fallback(id, SourceFailure::Timeout { after_ms })
                }
            };
            tracing::debug!(mint = %token, source = %id, score = %result.score, passed = result.passed, "Signal");
            per_source.insert(id, result);
        }

        for id in SourceId::ALL {
            if !per_source.contains_key(&id) {
                per_source.insert(id, self.fallback(id, SourceFailure::NotConfigured));
            }
        }

        let composite_score = composite_score(
            per_source
                .values()
                .map(|r| (r.score, r.source.select(&self.weights))),
        );
        let classification =
            Classification::from_score(composite_score, self.safe_threshold, self.risky_threshold);

        let assessment = CompositeAssessment {
            token: token.clone(),
            assessed_at: Utc::now(),
            per_source,
            composite_score,
            classification,
        };

        tracing::info!(
            mint = %token,
            score = %format_args!("{:.3}", composite_score),
            classification = %classification,
            degraded = assessment.degraded_count(),
            latency_ms = %start.elapsed().as_millis(),
            "Risk assessment complete"
        );

        assessment
    }
}

/// Weighted mean of (score, weight) pairs, clamped to [0, 1]
pub fn composite_score(scored: impl IntoIterator<Item = (f64, f64)>) -> f64 {
    let (weighted, total_weight) = scored
        .into_iter()
        .fold((0.0, 0.0), |(acc, total), (score, weight)| {
            (acc + score * weight, total + weight)
        });

    if total_weight <= 0.0 {
        return 0.0;
    }
    (weighted / total_weight).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use async_trait::async_trait;

    struct FixedSource {
        id: SourceId,
        score: f64,
    }

    #[async_trait]
    impl SignalSource for FixedSource {
        fn id(&self) -> SourceId {
            self.id
        }

        async fn evaluate(&self, _token: &TokenAddress) -> Result<SignalResult> {
            Ok(SignalResult::evaluated(self.id, self.score, self.score >= 0.6, "fixed"))
        }
    }

    struct FailingSource(SourceId);

    #[async_trait]
    impl SignalSource for FailingSource {
        fn id(&self) -> SourceId {
            self.0
        }

        async fn evaluate(&self, _token: &TokenAddress) -> Result<SignalResult> {
            Err(Error::unavailable(self.0.as_str(), "connection refused"))
        }
    }

    struct SlowSource(SourceId);

    #[async_trait]
    impl SignalSource for SlowSource {
        fn id(&self) -> SourceId {
            self.0
        }

        async fn evaluate(&self, _token: &TokenAddress) -> Result<SignalResult> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(SignalResult::evaluated(self.0, 1.0, true, "too late"))
        }
    }

    fn token() -> TokenAddress {
        TokenAddress::new("7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr").unwrap()
    }

    fn aggregator_with(sources: Vec<Arc<dyn SignalSource>>) -> RiskAggregator {
        let mut aggregator =
            RiskAggregator::new(&RiskConfig::default()).with_timeout(Duration::from_millis(50));
        for source in sources {
            aggregator.register_source(source);
        }
        aggregator
    }

    fn fixed(id: SourceId, score: f64) -> Arc<dyn SignalSource> {
        Arc::new(FixedSource { id, score })
    }

    #[tokio::test]
    async fn test_weighted_composite_is_safe() {
        let aggregator = aggregator_with(vec![
            fixed(SourceId::Market, 0.8),
            fixed(SourceId::Quality, 0.7),
            fixed(SourceId::Onchain, 0.9),
            fixed(SourceId::Pattern, 0.6),
        ]);

        let assessment = aggregator.assess(&token()).await;

        assert!((assessment.composite_score - 0.78).abs() < 1e-9);
        assert_eq!(assessment.classification, Classification::Safe);
        assert_eq!(assessment.degraded_count(), 0);
    }

    #[tokio::test]
    async fn test_all_sources_failing_is_unsafe() {
        let aggregator = aggregator_with(
            SourceId::ALL
                .iter()
                .map(|id| Arc::new(FailingSource(*id)) as Arc<dyn SignalSource>)
                .collect(),
        );

        let assessment = aggregator.assess(&token()).await;

        // 0.45*0.20 + 0.30*0.30 + 0.20*0.40 + 0.05*0.50
        assert!((assessment.composite_score - 0.285).abs() < 1e-9);
        assert_eq!(assessment.classification, Classification::Unsafe);
        assert_eq!(assessment.degraded_count(), 4);
        assert!(assessment.per_source.values().all(|r| !r.passed));
    }

    #[tokio::test]
    async fn test_no_sources_registered_still_classifies() {
        let aggregator = aggregator_with(vec![]);

        let assessment = aggregator.assess(&token()).await;

        assert_eq!(assessment.per_source.len(), 4);
        assert_eq!(assessment.classification, Classification::Unsafe);
        assert!(assessment
            .per_source
            .values()
            .all(|r| r.outcome
                == crate::risk::SignalOutcome::Degraded {
                    reason: SourceFailure::NotConfigured
                }));
    }

    #[tokio::test]
    async fn test_timeout_substitutes_fallback() {
        let aggregator = aggregator_with(vec![
            fixed(SourceId::Market, 0.8),
            fixed(SourceId::Quality, 0.7),
            Arc::new(SlowSource(SourceId::Onchain)),
            fixed(SourceId::Pattern, 0.6),
        ]);

        let started = Instant::now();
        let assessment = aggregator.assess(&token()).await;
        assert!(started.elapsed() < Duration::from_millis(400));

        let onchain = &assessment.per_source[&SourceId::Onchain];
        assert_eq!(onchain.score, 0.40);
        assert!(matches!(
            onchain.outcome,
            crate::risk::SignalOutcome::Degraded {
                reason: SourceFailure::Timeout { .. }
            }
        ));
        // 0.36 + 0.21 + 0.08 + 0.03
        assert!((assessment.composite_score - 0.68).abs() < 1e-9);
        assert_eq!(assessment.classification, Classification::Safe);
    }

    #[tokio::test]
    async fn test_out_of_range_score_is_malformed() {
        let aggregator = aggregator_with(vec![
            fixed(SourceId::Market, 1.7),
            fixed(SourceId::Quality, f64::NAN),
            fixed(SourceId::Onchain, 0.9),
            fixed(SourceId::Pattern, 0.6),
        ]);

        let assessment = aggregator.assess(&token()).await;

        for id in [SourceId::Market, SourceId::Quality] {
            assert!(matches!(
                assessment.per_source[&id].outcome,
                crate::risk::SignalOutcome::Degraded {
                    reason: SourceFailure::Malformed { .. }
                }
            ));
        }
        assert!((0.0..=1.0).contains(&assessment.composite_score));
    }

    #[tokio::test]
    async fn test_single_outage_degrades_but_does_not_abort() {
        let aggregator = aggregator_with(vec![
            Arc::new(FailingSource(SourceId::Market)),
            fixed(SourceId::Quality, 0.85),
            fixed(SourceId::Onchain, 0.8),
            fixed(SourceId::Pattern, 0.9),
        ]);

        let assessment = aggregator.assess(&token()).await;

        // 0.09 + 0.255 + 0.16 + 0.045
        assert!((assessment.composite_score - 0.55).abs() < 1e-9);
        assert_eq!(assessment.classification, Classification::Risky);
    }

    #[test]
    fn test_composite_stays_in_unit_interval() {
        let weights = RiskConfig::default().weights;
        let steps = [0.0, 0.25, 0.5, 0.75, 1.0];
        for a in steps {
            for b in steps {
                let score = composite_score([
                    (a, weights.market),
                    (b, weights.quality),
                    (1.0 - a, weights.onchain),
                    (b, weights.pattern),
                ]);
                assert!((0.0..=1.0).contains(&score));
            }
        }
    }

    #[test]
    fn test_composite_with_no_weight_is_zero() {
        assert_eq!(composite_score(std::iter::empty()), 0.0);
    }
}
