//! Local address-pattern heuristic
//!
//! Needs no network, so it is the one source that answers even during a full
//! upstream outage. It is also the weakest signal and carries the lowest weight.

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;

use crate::config::PatternPolicy;
use crate::error::{Error, Result};
use crate::risk::{SignalResult, SignalSource, SourceId, TokenAddress};

pub struct PatternSignalSource {
    policy: PatternPolicy,
    suspicious: Option<Regex>,
}

impl PatternSignalSource {
    pub fn new(policy: PatternPolicy) -> Result<Self> {
        let suspicious = build_suspicious_regex(&policy.suspicious_substrings)?;
        Ok(Self { policy, suspicious })
    }

    /// Score an address synchronously
    pub fn score(&self, token: &TokenAddress) -> SignalResult {
        score_address(&self.policy, self.suspicious.as_ref(), token.as_str())
    }
}

#[async_trait]
impl SignalSource for PatternSignalSource {
    fn id(&self) -> SourceId {
        SourceId::Pattern
    }

    async fn evaluate(&self, token: &TokenAddress) -> Result<SignalResult> {
        Ok(self.score(token))
    }
}

fn build_suspicious_regex(substrings: &[String]) -> Result<Option<Regex>> {
    if substrings.is_empty() {
        return Ok(None);
    }
    let alternation = substrings
        .iter()
        .map(|s| regex::escape(s))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?i){}", alternation))
        .map(Some)
        .map_err(|e| Error::Config(format!("invalid suspicious substring pattern: {}", e)))
}

fn diversity_score(policy: &PatternPolicy, unique: usize) -> f64 {
    let mut tiers: Vec<_> = policy.diversity_tiers.iter().collect();
    tiers.sort_by(|a, b| b.min_unique.cmp(&a.min_unique));
    tiers
        .into_iter()
        .find(|tier| unique >= tier.min_unique)
        .map(|tier| tier.score)
        .unwrap_or(policy.diversity_floor)
}

/// Sum of independent address factors
pub fn score_address(policy: &PatternPolicy, suspicious: Option<&Regex>, address: &str) -> SignalResult {
    let length = address.chars().count();
    let length_score = if length == policy.expected_length {
        policy.length_factor
    } else {
        0.0
    };

    let unique = address.chars().collect::<HashSet<_>>().len();
    let diversity = diversity_score(policy, unique);

    let matched = suspicious.and_then(|re| re.find(address)).map(|m| m.as_str().to_string());
    let clean_score = if matched.is_none() {
        policy.clean_bonus
    } else {
        0.0
    };

    let has_upper = address.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = address.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = address.chars().any(|c| c.is_ascii_digit());
    let valid_base58 = bs58::decode(address).into_vec().is_ok();
    let charset_score = if has_upper && has_lower && has_digit && valid_base58 {
        policy.mixed_charset_bonus
    } else {
        0.0
    };

    let score = (length_score + diversity + clean_score + charset_score).clamp(0.0, 1.0);
    let passed = score >= policy.pass_threshold;

    let mut message = format!("Length {}, {} unique chars", length, unique);
    if let Some(pattern) = &matched {
        message.push_str(&format!(", suspicious '{}'", pattern));
    }
    if !valid_base58 {
        message.push_str(", not base58");
    }

    SignalResult::evaluated(SourceId::Pattern, score, passed, message)
        .with_metric("length", length)
        .with_metric("length_score", length_score)
        .with_metric("unique_chars", unique)
        .with_metric("diversity_score", diversity)
        .with_metric("suspicious", matched.unwrap_or_default())
        .with_metric("valid_base58", valid_base58)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> PatternSignalSource {
        PatternSignalSource::new(PatternPolicy::default()).unwrap()
    }

    fn score(address: &str) -> SignalResult {
        source().score(&TokenAddress::new(address).unwrap())
    }

    #[test]
    fn test_well_formed_address_passes() {
        let result = score("7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr");
        // 0.30 + 0.40 + 0.20 + 0.10
        assert!((result.score - 1.0).abs() < 1e-9);
        assert!(result.passed);
    }

    #[test]
    fn test_wrong_length_scores_zero_on_length() {
        let result = score("7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2h");
        assert_eq!(result.raw_metrics["length"], 43);
        assert_eq!(result.raw_metrics["length_score"], 0.0);
        assert!((result.score - 0.70).abs() < 1e-9);
    }

    #[test]
    fn test_suspicious_substring_is_case_insensitive() {
        let result = score("9BB6NFEcjBCtnNLFko2FqVQBq8HHM13kCyYcdQbgPUMP");
        assert_eq!(result.raw_metrics["suspicious"], "PUMP");
        // 0.30 + 0.40 + 0.10
        assert!((result.score - 0.80).abs() < 1e-9);
    }

    #[test]
    fn test_low_diversity_short_address_fails() {
        let result = score("abc");
        assert!((result.score - 0.30).abs() < 1e-9);
        assert!(!result.passed);
    }

    #[test]
    fn test_non_base58_loses_charset_bonus() {
        // '0' and 'O' are outside the base58 alphabet
        let result = score("0GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hO");
        assert_eq!(result.raw_metrics["valid_base58"], false);
        assert!((result.score - 0.90).abs() < 1e-9);
    }

    #[test]
    fn test_diversity_tiers() {
        let policy = PatternPolicy::default();
        assert_eq!(diversity_score(&policy, 30), 0.40);
        assert_eq!(diversity_score(&policy, 20), 0.30);
        assert_eq!(diversity_score(&policy, 15), 0.20);
        assert_eq!(diversity_score(&policy, 3), 0.10);
    }

    #[test]
    fn test_empty_substring_list() {
        let mut policy = PatternPolicy::default();
        policy.suspicious_substrings.clear();
        let source = PatternSignalSource::new(policy).unwrap();
        let token = TokenAddress::new("9BB6NFEcjBCtnNLFko2FqVQBq8HHM13kCyYcdQbgpump").unwrap();
        assert_eq!(source.score(&token).raw_metrics["suspicious"], "");
    }
}
