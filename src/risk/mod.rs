//! Multi-source token risk assessment
//!
//! Each [`SignalSource`] produces a bounded opinion in [0, 1] about one token.
//! The [`RiskAggregator`] fans out to every source, substitutes a conservative
//! fallback for any source that fails, and classifies the weighted composite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::config::SourceValues;
use crate::error::{Error, Result};

pub mod aggregator;
pub mod signals;

pub use aggregator::RiskAggregator;

/// Token mint address as reported by upstream feeds
///
/// Only emptiness is rejected here; length and alphabet are judged by the
/// pattern heuristic so that odd addresses still get a (low) score.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenAddress(String);

impl TokenAddress {
    pub fn new(address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidAddress("empty address".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Shortened form for log lines
    pub fn short(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() > 12 {
            let head: String = chars[..6].iter().collect();
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("{}...{}", head, tail)
        } else {
            self.0.clone()
        }
    }
}

impl fmt::Display for TokenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TokenAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for TokenAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identity of a signal source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    /// Pair liquidity, volume and volatility
    Market,
    /// Third-party quality report
    Quality,
    /// Mint account inspection over RPC
    Onchain,
    /// Local address heuristic
    Pattern,
}

impl SourceId {
    pub const ALL: [SourceId; 4] = [
        SourceId::Market,
        SourceId::Quality,
        SourceId::Onchain,
        SourceId::Pattern,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Market => "market",
            SourceId::Quality => "quality",
            SourceId::Onchain => "onchain",
            SourceId::Pattern => "pattern",
        }
    }

    /// Pick this source's entry from a per-source value table
    pub fn select(&self, values: &SourceValues) -> f64 {
        match self {
            SourceId::Market => values.market,
            SourceId::Quality => values.quality,
            SourceId::Onchain => values.onchain,
            SourceId::Pattern => values.pattern,
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a source's real opinion was replaced by its fallback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceFailure {
    /// The source returned an error
    Error { reason: String },
    /// The source did not answer within the per-source timeout
    Timeout { after_ms: u64 },
    /// The source answered with an out-of-contract result
    Malformed { reason: String },
    /// No source is registered under this id
    NotConfigured,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFailure::Error { reason } => write!(f, "error: {}", reason),
            SourceFailure::Timeout { after_ms } => write!(f, "timed out after {}ms", after_ms),
            SourceFailure::Malformed { reason } => write!(f, "malformed result: {}", reason),
            SourceFailure::NotConfigured => write!(f, "not configured"),
        }
    }
}

/// Whether a signal is a real opinion or a substituted fallback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SignalOutcome {
    Evaluated,
    Degraded { reason: SourceFailure },
}

/// One source's opinion about one token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalResult {
    pub source: SourceId,
    /// Risk opinion: 0.0 (unsafe) to 1.0 (safe)
    pub score: f64,
    /// Whether the source's own safety bar was met
    pub passed: bool,
    pub message: String,
    pub raw_metrics: BTreeMap<String, serde_json::Value>,
    pub outcome: SignalOutcome,
}

impl SignalResult {
    /// A real opinion from a source
    pub fn evaluated(source: SourceId, score: f64, passed: bool, message: impl Into<String>) -> Self {
        Self {
            source,
            score,
            passed,
            message: message.into(),
            raw_metrics: BTreeMap::new(),
            outcome: SignalOutcome::Evaluated,
        }
    }

    /// Conservative substitute for a failed source. Never passes.
    pub fn fallback(source: SourceId, score: f64, reason: SourceFailure) -> Self {
        Self {
            source,
            score,
            passed: false,
            message: format!("{} unavailable ({}), using fallback", source, reason),
            raw_metrics: BTreeMap::new(),
            outcome: SignalOutcome::Degraded { reason },
        }
    }

    /// Attach a raw metric
    pub fn with_metric(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.raw_metrics.insert(key.to_string(), value.into());
        self
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.outcome, SignalOutcome::Degraded { .. })
    }

    /// Check the result honours the source contract
    pub fn check(&self, expected: SourceId) -> std::result::Result<(), String> {
        if self.source != expected {
            return Err(format!(
                "result tagged {} returned by {}",
                self.source, expected
            ));
        }
        if !self.score.is_finite() {
            return Err(format!("score {} is not finite", self.score));
        }
        if !(0.0..=1.0).contains(&self.score) {
            return Err(format!("score {} outside [0, 1]", self.score));
        }
        Ok(())
    }
}

impl fmt::Display for SignalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:.2} {} - {}",
            self.source,
            self.score,
            if self.passed { "pass" } else { "fail" },
            self.message
        )
    }
}

/// Risk bucket derived from the composite score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Safe,
    Risky,
    Unsafe,
}

impl Classification {
    pub fn from_score(score: f64, safe_threshold: f64, risky_threshold: f64) -> Self {
        if score >= safe_threshold {
            Classification::Safe
        } else if score >= risky_threshold {
            Classification::Risky
        } else {
            Classification::Unsafe
        }
    }

    /// Only SAFE tokens are eligible for entry
    pub fn is_safe(&self) -> bool {
        matches!(self, Classification::Safe)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Safe => write!(f, "SAFE"),
            Classification::Risky => write!(f, "RISKY"),
            Classification::Unsafe => write!(f, "UNSAFE"),
        }
    }
}

/// Final assessment for one token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeAssessment {
    pub token: TokenAddress,
    pub assessed_at: DateTime<Utc>,
    pub per_source: BTreeMap<SourceId, SignalResult>,
    pub composite_score: f64,
    pub classification: Classification,
}

impl CompositeAssessment {
    pub fn is_safe(&self) -> bool {
        self.classification.is_safe()
    }

    /// Number of sources that fell back
    pub fn degraded_count(&self) -> usize {
        self.per_source.values().filter(|r| r.is_degraded()).count()
    }

    /// Multi-line report for operators
    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "{} -> {} ({:.3})",
            self.token, self.classification, self.composite_score
        )];
        for result in self.per_source.values() {
            lines.push(format!("  {}", result));
        }
        lines.join("\n")
    }
}

/// A provider of a risk opinion about a token
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Which slot of the composite this source fills
    fn id(&self) -> SourceId;

    /// Evaluate one token. Timeouts are enforced by the caller.
    async fn evaluate(&self, token: &TokenAddress) -> Result<SignalResult>;
}
