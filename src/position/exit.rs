//! Exit rules for open positions
//!
//! Exits are best-effort: the monitor only sees the value once per cycle,
//! so a fast move can gap straight through the stop.

use serde::Serialize;
use std::fmt;

use crate::position::ledger::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitTrigger {
    TakeProfit,
    StopLoss,
}

impl fmt::Display for ExitTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitTrigger::TakeProfit => f.write_str("take_profit"),
            ExitTrigger::StopLoss => f.write_str("stop_loss"),
        }
    }
}

/// Decide whether a position should be closed at the given value
///
/// Take profit wins when both would fire (only possible with a
/// nonsensical config).
pub fn check_exit(
    position: &Position,
    current_value_usd: f64,
    stop_loss_ratio: Option<f64>,
) -> Option<ExitTrigger> {
    if current_value_usd >= position.target_value_usd() {
        return Some(ExitTrigger::TakeProfit);
    }

    if let Some(ratio) = stop_loss_ratio {
        if current_value_usd <= position.entry_capital_usd * ratio {
            return Some(ExitTrigger::StopLoss);
        }
    }

    None
}
