//! Trade execution
//!
//! Buys and sells go through Jupiter routes. Live mode signs and submits
//! swaps; simulated mode quotes real routes but never touches the chain.

pub mod jupiter;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

use crate::error::Result;
use crate::risk::TokenAddress;

pub use jupiter::{JupiterClient, JupiterExecutor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Live,
    Simulated,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Live => f.write_str("LIVE"),
            ExecutionMode::Simulated => f.write_str("SIMULATED"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuyReceipt {
    pub tx_ref: String,
    /// Raw token units received
    pub token_amount: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SellReceipt {
    pub tx_ref: String,
    /// Proceeds in USD, when the executor knows them
    pub usd_received: Option<f64>,
}

#[async_trait]
pub trait TradeExecutor: Send + Sync {
    async fn buy(&self, token: &TokenAddress, usd_amount: f64, slippage_bps: u32) -> Result<BuyReceipt>;

    async fn sell(&self, token: &TokenAddress, token_amount: u64, slippage_bps: u32) -> Result<SellReceipt>;
}
