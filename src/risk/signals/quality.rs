//! Third-party quality signal from RugCheck token reports

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::QualityPolicy;
use crate::error::Result;
use crate::http;
use crate::risk::{SignalResult, SignalSource, SourceId, TokenAddress};

const PROVIDER: &str = "rugcheck";

#[derive(Debug, Clone, Deserialize)]
pub struct RiskItem {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QualityReport {
    /// 0-100
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub risks: Vec<RiskItem>,
}

pub struct QualitySignalSource {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    policy: QualityPolicy,
}

impl QualitySignalSource {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
        policy: QualityPolicy,
    ) -> Self {
        Self {
            client: http::client(timeout),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            policy,
        }
    }

    async fn fetch_report(&self, token: &TokenAddress) -> Result<QualityReport> {
        let url = format!("{}/v1/tokens/{}/report", self.base_url, token);
        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        http::send_json(request, PROVIDER).await
    }
}

#[async_trait]
impl SignalSource for QualitySignalSource {
    fn id(&self) -> SourceId {
        SourceId::Quality
    }

    async fn evaluate(&self, token: &TokenAddress) -> Result<SignalResult> {
        let report = self.fetch_report(token).await?;
        Ok(score_report(&self.policy, &report))
    }
}

fn level_in(level: &str, levels: &[String]) -> bool {
    levels.iter().any(|l| l.eq_ignore_ascii_case(level))
}

/// Bucket a quality report into a score
pub fn score_report(policy: &QualityPolicy, report: &QualityReport) -> SignalResult {
    let critical = report
        .risks
        .iter()
        .filter(|r| level_in(&r.level, &policy.critical_levels))
        .count();
    let warnings = report
        .risks
        .iter()
        .filter(|r| level_in(&r.level, &policy.warning_levels))
        .count();

    let (score, passed, status) = if report.score >= policy.excellent_min && critical == 0 {
        (policy.excellent_score, true, "Safe")
    } else if report.score >= policy.good_min && critical == 0 {
        (policy.good_score, true, "Caution")
    } else if report.score >= policy.fair_min && critical <= policy.fair_max_critical {
        (policy.fair_score, false, "Risky")
    } else {
        (policy.poor_score, false, "Unsafe")
    };

    let mut message = format!("{} - score {}/100", status, report.score);
    if critical > 0 {
        message.push_str(&format!(", critical: {}", critical));
    }
    if warnings > 0 {
        message.push_str(&format!(", warnings: {}", warnings));
    }

    let risk_names: Vec<String> = report.risks.iter().map(|r| r.name.clone()).collect();

    SignalResult::evaluated(SourceId::Quality, score, passed, message)
        .with_metric("report_score", report.score)
        .with_metric("critical_risks", critical)
        .with_metric("warning_risks", warnings)
        .with_metric("risks", risk_names)
}
