//! Position lifecycle controller
//!
//! One loop drives every token through
//! discovered -> assessed -> open -> closing -> closed.
//! Each cycle runs its phases strictly in order: discovery, assessment,
//! opening, then monitoring. Shutdown is only observed between cycles.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::discovery::TokenDiscoverer;
use crate::error::{Error, Result};
use crate::position::{check_exit, PositionLedger, PositionState, PricingSource};
use crate::risk::{RiskAggregator, TokenAddress};
use crate::trading::TradeExecutor;

/// Trading knobs the controller needs on every cycle
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub trade_amount_usd: f64,
    pub target_price_ratio: f64,
    pub stop_loss_ratio: Option<f64>,
    pub slippage_bps: u32,
    pub poll_interval: Duration,
    pub error_backoff: Duration,
}

impl LifecycleSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            trade_amount_usd: config.trading.trade_amount_usd,
            target_price_ratio: config.trading.target_price_ratio(),
            stop_loss_ratio: config.trading.stop_loss_ratio(),
            slippage_bps: config.trading.slippage_bps,
            poll_interval: Duration::from_secs(config.lifecycle.poll_interval_secs),
            error_backoff: Duration::from_secs(config.lifecycle.error_backoff_secs),
        }
    }
}

/// What happened during one cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub discovered: usize,
    pub assessed: usize,
    pub safe: usize,
    pub opened: usize,
    /// Safe candidates dropped for lack of a slot or capital
    pub skipped_capacity: usize,
    pub buy_failures: usize,
    pub exits_triggered: usize,
    pub closed: usize,
    pub sell_failures: usize,
    /// Positions that exhausted their sell retries this cycle
    pub failed: usize,
    pub pricing_failures: usize,
}

pub struct PositionLifecycleController {
    discoverer: TokenDiscoverer,
    aggregator: RiskAggregator,
    ledger: PositionLedger,
    executor: Arc<dyn TradeExecutor>,
    pricing: Arc<dyn PricingSource>,
    settings: LifecycleSettings,
}

impl PositionLifecycleController {
    pub fn new(
        discoverer: TokenDiscoverer,
        aggregator: RiskAggregator,
        ledger: PositionLedger,
        executor: Arc<dyn TradeExecutor>,
        pricing: Arc<dyn PricingSource>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            discoverer,
            aggregator,
            ledger,
            executor,
            pricing,
            settings,
        }
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    /// Run until the token is cancelled. Open positions are left as they are.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(
            poll_secs = self.settings.poll_interval.as_secs(),
            trade_usd = self.settings.trade_amount_usd,
            "Lifecycle loop started"
        );

        let mut cycle: u64 = 0;
        loop {
            cycle += 1;
            let delay = match self.run_cycle().await {
                Ok(report) => {
                    debug!(cycle, ?report, "Cycle report");
                    info!(cycle, ledger = %self.ledger.summary(), "Cycle complete");
                    self.settings.poll_interval
                }
                Err(e) => {
                    let fault = match e {
                        Error::LoopFault(_) => e,
                        other => Error::LoopFault(other.to_string()),
                    };
                    error!(cycle, error = %fault, "Cycle failed, backing off");
                    self.settings.error_backoff
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let live = self.ledger.live_count();
        if live > 0 {
            warn!(live, "Shutting down with live positions, they are not liquidated");
        }
        info!(ledger = %self.ledger.summary(), "Lifecycle loop stopped");
    }

    /// One full pass: discover, assess, open, monitor
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        let candidates = self.discoverer.discover().await;
        report.discovered = candidates.len();

        let mut safe: Vec<TokenAddress> = Vec::new();
        for candidate in candidates {
            if self.ledger.is_tracked(&candidate.address) {
                continue;
            }
            let assessment = self.aggregator.assess(&candidate.address).await;
            report.assessed += 1;
            if assessment.is_safe() {
                safe.push(candidate.address);
            } else {
                debug!(
                    mint = %candidate.address,
                    classification = %assessment.classification,
                    "Candidate rejected"
                );
            }
        }
        report.safe = safe.len();

        for token in safe {
            self.try_open(token, &mut report).await?;
        }

        self.monitor(&mut report).await?;

        Ok(report)
    }

    async fn try_open(&mut self, token: TokenAddress, report: &mut CycleReport) -> Result<()> {
        let amount = self.settings.trade_amount_usd;
        match self.ledger.can_open(amount) {
            Ok(()) => {}
            Err(e) if e.is_ledger_violation() => {
                info!(mint = %token, reason = %e, "Safe candidate skipped");
                report.skipped_capacity += 1;
                return Ok(());
            }
            Err(e) => return Err(fault(e)),
        }

        let receipt = match self
            .executor
            .buy(&token, amount, self.settings.slippage_bps)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(mint = %token, error = %e, "Buy failed, no position recorded");
                report.buy_failures += 1;
                return Ok(());
            }
        };

        self.ledger
            .open(
                token,
                amount,
                receipt.token_amount,
                self.settings.target_price_ratio,
                receipt.tx_ref,
            )
            .map_err(fault)?;
        report.opened += 1;
        Ok(())
    }

    async fn monitor(&mut self, report: &mut CycleReport) -> Result<()> {
        let live: Vec<_> = self.ledger.live_positions().cloned().collect();

        for position in live {
            let token = position.token.clone();
            let value = match self.pricing.current_value(&position).await {
                Ok(v) => {
                    self.ledger.record_value(&token, v).map_err(fault)?;
                    v
                }
                Err(e) => {
                    report.pricing_failures += 1;
                    if e.is_source_unavailable() {
                        warn!(mint = %token, error = %e, "Pricing failed");
                    } else {
                        error!(mint = %token, error = %e, "Pricing failed");
                    }
                    // Closing positions still sell, valued at the last known price
                    if position.state != PositionState::Closing {
                        continue;
                    }
                    position.last_value_usd.unwrap_or(position.entry_capital_usd)
                }
            };

            if position.state == PositionState::Open {
                let Some(trigger) = check_exit(&position, value, self.settings.stop_loss_ratio) else {
                    debug!(
                        mint = %token,
                        pnl_pct = %format_args!("{:.2}", position.pnl_pct(value)),
                        "Holding"
                    );
                    continue;
                };
                info!(
                    mint = %token,
                    trigger = %trigger,
                    value_usd = %format_args!("{:.4}", value),
                    pnl_pct = %format_args!("{:.2}", position.pnl_pct(value)),
                    "Exit triggered"
                );
                self.ledger.begin_close(&token, trigger).map_err(fault)?;
                report.exits_triggered += 1;
            }

            match self
                .executor
                .sell(&token, position.token_amount, self.settings.slippage_bps)
                .await
            {
                Ok(receipt) => {
                    let proceeds = receipt.usd_received.unwrap_or(value);
                    self.ledger
                        .complete_close(&token, proceeds, receipt.tx_ref)
                        .map_err(fault)?;
                    report.closed += 1;
                }
                Err(e) => {
                    report.sell_failures += 1;
                    let state = self.ledger.record_sell_failure(&token, &e).map_err(fault)?;
                    if state == PositionState::Failed {
                        report.failed += 1;
                    }
                }
            }
        }

        Ok(())
    }
}

fn fault(e: Error) -> Error {
    Error::LoopFault(e.to_string())
}
