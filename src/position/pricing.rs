//! Position valuation

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::position::ledger::Position;
use crate::trading::jupiter::JupiterClient;

/// Values a held position in USD
#[async_trait]
pub trait PricingSource: Send + Sync {
    async fn current_value(&self, position: &Position) -> Result<f64>;
}

/// Values a position by quoting its full token amount back into the quote mint
pub struct JupiterPricing {
    jupiter: Arc<JupiterClient>,
    quote_mint: String,
    quote_decimals: u8,
    slippage_bps: u32,
}

impl JupiterPricing {
    pub fn new(
        jupiter: Arc<JupiterClient>,
        quote_mint: impl Into<String>,
        quote_decimals: u8,
        slippage_bps: u32,
    ) -> Self {
        Self {
            jupiter,
            quote_mint: quote_mint.into(),
            quote_decimals,
            slippage_bps,
        }
    }
}

#[async_trait]
impl PricingSource for JupiterPricing {
    async fn current_value(&self, position: &Position) -> Result<f64> {
        if position.token_amount == 0 {
            return Err(Error::EmptyBalance(position.token.to_string()));
        }

        let quote = self
            .jupiter
            .quote(
                position.token.as_str(),
                &self.quote_mint,
                position.token_amount,
                self.slippage_bps,
            )
            .await?;
        let value = quote.out_amount as f64 / 10f64.powi(self.quote_decimals as i32);

        debug!(
            mint = %position.token,
            value_usd = %format_args!("{:.4}", value),
            target_usd = %format_args!("{:.4}", position.target_value_usd()),
            "Priced position"
        );
        Ok(value)
    }
}
