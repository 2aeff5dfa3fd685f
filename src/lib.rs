//! Safe Sniper Library
//!
//! Multi-source token risk scoring and position lifecycle management for
//! Solana tokens.

pub mod cli;
pub mod config;
pub mod dexscreener;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod http;
pub mod position;
pub mod ratelimit;
pub mod risk;
pub mod trading;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
