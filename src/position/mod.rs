//! Position tracking: ledger, exit rules and valuation

pub mod exit;
pub mod ledger;
pub mod pricing;

pub use exit::{check_exit, ExitTrigger};
pub use ledger::{Position, PositionLedger, PositionState, TradeStats};
pub use pricing::{JupiterPricing, PricingSource};
