//! Position ledger
//!
//! Owns every position record and enforces the slot and capital limits.
//! The lifecycle loop is the single writer, so no locking is needed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::position::exit::ExitTrigger;
use crate::risk::TokenAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PositionState {
    Open,
    Closing,
    Closed,
    /// Sell retries exhausted, needs manual intervention
    Failed,
}

impl PositionState {
    /// Open or Closing
    pub fn is_live(&self) -> bool {
        matches!(self, PositionState::Open | PositionState::Closing)
    }
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PositionState::Open => "Open",
            PositionState::Closing => "Closing",
            PositionState::Closed => "Closed",
            PositionState::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// A unit of committed capital against one token
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub token: TokenAddress,
    /// USD spent on entry
    pub entry_capital_usd: f64,
    /// Raw token units received
    pub token_amount: u64,
    pub target_price_ratio: f64,
    pub buy_tx_ref: String,
    pub opened_at: DateTime<Utc>,
    pub state: PositionState,
    pub sell_attempts: u32,
    pub last_sell_error: Option<String>,
    pub exit_trigger: Option<ExitTrigger>,
    /// Last valuation seen by the monitor
    pub last_value_usd: Option<f64>,
    pub closed_at: Option<DateTime<Utc>>,
    pub sell_tx_ref: Option<String>,
    pub realized_profit_usd: Option<f64>,
}

impl Position {
    /// Value at which take profit fires
    pub fn target_value_usd(&self) -> f64 {
        self.entry_capital_usd * self.target_price_ratio
    }

    /// Unrealized P&L percentage at the given value
    pub fn pnl_pct(&self, value_usd: f64) -> f64 {
        if self.entry_capital_usd == 0.0 {
            return 0.0;
        }
        (value_usd - self.entry_capital_usd) / self.entry_capital_usd * 100.0
    }
}

/// Per-run trading statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct TradeStats {
    pub opened: u32,
    pub closed: u32,
    pub winners: u32,
    pub losers: u32,
    pub failed: u32,
    pub realized_profit_usd: f64,
}

impl TradeStats {
    pub fn record_close(&mut self, profit_usd: f64) {
        self.closed += 1;
        if profit_usd >= 0.0 {
            self.winners += 1;
        } else {
            self.losers += 1;
        }
        self.realized_profit_usd += profit_usd;
    }

    pub fn win_rate(&self) -> f64 {
        if self.closed == 0 {
            return 0.0;
        }
        (self.winners as f64 / self.closed as f64) * 100.0
    }
}

pub struct PositionLedger {
    positions: Vec<Position>,
    max_positions: usize,
    available_capital_usd: f64,
    max_sell_attempts: u32,
    stats: TradeStats,
}

impl PositionLedger {
    pub fn new(max_positions: usize, available_capital_usd: f64, max_sell_attempts: u32) -> Self {
        Self {
            positions: Vec::new(),
            max_positions,
            available_capital_usd,
            max_sell_attempts,
            stats: TradeStats::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.trading.max_positions,
            config.trading.available_capital_usd,
            config.lifecycle.max_sell_attempts,
        )
    }

    /// Number of Open or Closing positions
    pub fn live_count(&self) -> usize {
        self.positions.iter().filter(|p| p.state.is_live()).count()
    }

    pub fn live_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter().filter(|p| p.state.is_live())
    }

    /// Capital tied up in live and failed positions
    ///
    /// A failed position still holds tokens of unknown value, so its entry
    /// capital stays committed until resolved by hand.
    pub fn committed_capital(&self) -> f64 {
        self.positions
            .iter()
            .filter(|p| p.state != PositionState::Closed)
            .map(|p| p.entry_capital_usd)
            .sum()
    }

    /// Check that a position of this size fits
    pub fn can_open(&self, amount_usd: f64) -> Result<()> {
        let open = self.live_count();
        if open >= self.max_positions {
            return Err(Error::MaxPositionsReached {
                open,
                max: self.max_positions,
            });
        }

        let committed = self.committed_capital();
        if committed + amount_usd > self.available_capital_usd + f64::EPSILON {
            return Err(Error::CapitalExceeded {
                committed,
                requested: amount_usd,
                available: self.available_capital_usd,
            });
        }

        Ok(())
    }

    /// Whether the token has ever been held in this run
    pub fn is_tracked(&self, token: &TokenAddress) -> bool {
        self.positions.iter().any(|p| &p.token == token)
    }

    /// Most recent position for the token
    pub fn get(&self, token: &TokenAddress) -> Option<&Position> {
        self.positions.iter().rev().find(|p| &p.token == token)
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn stats(&self) -> &TradeStats {
        &self.stats
    }

    fn live_mut(&mut self, token: &TokenAddress) -> Result<&mut Position> {
        self.positions
            .iter_mut()
            .find(|p| &p.token == token && p.state.is_live())
            .ok_or_else(|| Error::PositionNotFound(token.to_string()))
    }

    /// Record a filled buy as an Open position
    pub fn open(
        &mut self,
        token: TokenAddress,
        entry_capital_usd: f64,
        token_amount: u64,
        target_price_ratio: f64,
        buy_tx_ref: String,
    ) -> Result<&Position> {
        if !(entry_capital_usd.is_finite() && entry_capital_usd > 0.0) {
            return Err(Error::InvalidAmount {
                token: token.to_string(),
                amount: entry_capital_usd,
            });
        }
        if self.live_positions().any(|p| p.token == token) {
            return Err(Error::PositionAlreadyOpen(token.to_string()));
        }
        self.can_open(entry_capital_usd)?;

        info!(
            mint = %token,
            capital_usd = entry_capital_usd,
            token_amount,
            tx = %buy_tx_ref,
            "Opened position"
        );

        self.positions.push(Position {
            token,
            entry_capital_usd,
            token_amount,
            target_price_ratio,
            buy_tx_ref,
            opened_at: Utc::now(),
            state: PositionState::Open,
            sell_attempts: 0,
            last_sell_error: None,
            exit_trigger: None,
            last_value_usd: None,
            closed_at: None,
            sell_tx_ref: None,
            realized_profit_usd: None,
        });
        self.stats.opened += 1;

        let idx = self.positions.len() - 1;
        Ok(&self.positions[idx])
    }

    /// Record the latest valuation without changing state
    pub fn record_value(&mut self, token: &TokenAddress, value_usd: f64) -> Result<()> {
        self.live_mut(token)?.last_value_usd = Some(value_usd);
        Ok(())
    }

    /// Open -> Closing
    pub fn begin_close(&mut self, token: &TokenAddress, trigger: ExitTrigger) -> Result<()> {
        let position = self.live_mut(token)?;
        if position.state != PositionState::Open {
            return Err(Error::InvalidTransition {
                token: token.to_string(),
                from: position.state.to_string(),
                to: PositionState::Closing.to_string(),
            });
        }
        position.state = PositionState::Closing;
        position.exit_trigger = Some(trigger);
        info!(mint = %token, trigger = %trigger, "Position closing");
        Ok(())
    }

    /// Closing -> Closed, releasing capital. Returns realized profit.
    pub fn complete_close(
        &mut self,
        token: &TokenAddress,
        sell_value_usd: f64,
        sell_tx_ref: String,
    ) -> Result<f64> {
        let position = self.live_mut(token)?;
        if position.state != PositionState::Closing {
            return Err(Error::InvalidTransition {
                token: token.to_string(),
                from: position.state.to_string(),
                to: PositionState::Closed.to_string(),
            });
        }
        if !(sell_value_usd.is_finite() && sell_value_usd >= 0.0) {
            return Err(Error::InvalidAmount {
                token: token.to_string(),
                amount: sell_value_usd,
            });
        }

        let profit = sell_value_usd - position.entry_capital_usd;
        position.state = PositionState::Closed;
        position.closed_at = Some(Utc::now());
        position.sell_tx_ref = Some(sell_tx_ref);
        position.realized_profit_usd = Some(profit);
        position.last_sell_error = None;

        self.stats.record_close(profit);
        info!(
            mint = %token,
            profit_usd = %format_args!("{:.2}", profit),
            win_rate = %format_args!("{:.1}%", self.stats.win_rate()),
            realized_usd = %format_args!("{:.2}", self.stats.realized_profit_usd),
            "Position closed"
        );
        Ok(profit)
    }

    /// Count a failed sell; after the attempt limit the position becomes Failed
    pub fn record_sell_failure(
        &mut self,
        token: &TokenAddress,
        error: impl ToString,
    ) -> Result<PositionState> {
        let max_attempts = self.max_sell_attempts;
        let position = self.live_mut(token)?;
        if position.state != PositionState::Closing {
            return Err(Error::InvalidTransition {
                token: token.to_string(),
                from: position.state.to_string(),
                to: PositionState::Failed.to_string(),
            });
        }

        position.sell_attempts += 1;
        position.last_sell_error = Some(error.to_string());

        if position.sell_attempts >= max_attempts {
            position.state = PositionState::Failed;
            position.closed_at = Some(Utc::now());
            self.stats.failed += 1;
            warn!(
                mint = %token,
                attempts = max_attempts,
                "Sell retries exhausted, position needs manual intervention"
            );
            return Ok(PositionState::Failed);
        }

        warn!(
            mint = %token,
            attempt = position.sell_attempts,
            max = max_attempts,
            error = position.last_sell_error.as_deref().unwrap_or_default(),
            "Sell failed, will retry"
        );
        Ok(PositionState::Closing)
    }

    /// One-line ledger summary for logs
    pub fn summary(&self) -> String {
        let failed = self
            .positions
            .iter()
            .filter(|p| p.state == PositionState::Failed)
            .count();
        format!(
            "live {}/{}, failed {}, committed ${:.2}/${:.2}, closed {} (win rate {:.1}%), realized ${:.2}",
            self.live_count(),
            self.max_positions,
            failed,
            self.committed_capital(),
            self.available_capital_usd,
            self.stats.closed,
            self.stats.win_rate(),
            self.stats.realized_profit_usd,
        )
    }
}
