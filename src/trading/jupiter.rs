//! Jupiter v6 quote and swap client, plus the executor built on it
//!
//! API reference: https://station.jup.ag/docs/apis/swap-api
//!
//! The swap endpoint returns an unsigned versioned transaction that we sign
//! locally and submit through our own RPC.

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::transaction::VersionedTransaction;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::http;
use crate::risk::TokenAddress;
use crate::trading::{BuyReceipt, ExecutionMode, SellReceipt, TradeExecutor};

const PROVIDER: &str = "jupiter";

/// A route quote. The raw body is kept because the swap call wants it back verbatim.
#[derive(Debug, Clone)]
pub struct Quote {
    pub in_amount: u64,
    pub out_amount: u64,
    pub raw: Value,
}

impl Quote {
    fn from_value(raw: Value) -> Result<Self> {
        let amount = |field: &str| -> Result<u64> {
            raw.get(field)
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| Error::MalformedResponse {
                    provider: PROVIDER.to_string(),
                    reason: format!("missing or invalid {}", field),
                })
        };
        Ok(Self {
            in_amount: amount("inAmount")?,
            out_amount: amount("outAmount")?,
            raw,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    swap_transaction: String,
}

pub struct JupiterClient {
    client: reqwest::Client,
    base_url: String,
}

impl JupiterClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: http::client(timeout),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Quote swapping `amount` raw units of `input_mint` into `output_mint`
    pub async fn quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u32,
    ) -> Result<Quote> {
        let url = format!("{}/quote", self.base_url);
        let request = self.client.get(&url).query(&[
            ("inputMint", input_mint.to_string()),
            ("outputMint", output_mint.to_string()),
            ("amount", amount.to_string()),
            ("slippageBps", slippage_bps.to_string()),
        ]);
        let raw: Value = http::send_json(request, PROVIDER).await?;
        if let Some(err) = raw.get("error").and_then(|e| e.as_str()) {
            return Err(Error::unavailable(PROVIDER, err));
        }
        let quote = Quote::from_value(raw)?;
        debug!(
            input = input_mint,
            output = output_mint,
            in_amount = quote.in_amount,
            out_amount = quote.out_amount,
            "Jupiter quote"
        );
        Ok(quote)
    }

    /// Build the unsigned swap transaction for a quote
    pub async fn swap_transaction(&self, quote: &Quote, user: &Pubkey) -> Result<VersionedTransaction> {
        let url = format!("{}/swap", self.base_url);
        let body = json!({
            "quoteResponse": quote.raw,
            "userPublicKey": user.to_string(),
            "wrapAndUnwrapSol": true,
            "dynamicComputeUnitLimit": true,
        });
        let resp: SwapResponse = http::send_json(self.client.post(&url).json(&body), PROVIDER).await?;
        decode_transaction(&resp.swap_transaction)
    }
}

/// Decode a base64 bincode-serialized versioned transaction
pub fn decode_transaction(encoded: &str) -> Result<VersionedTransaction> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| Error::Deserialization(format!("swap transaction base64: {}", e)))?;
    bincode::deserialize(&bytes)
        .map_err(|e| Error::Deserialization(format!("swap transaction bincode: {}", e)))
}

/// Buys and sells through Jupiter
pub struct JupiterExecutor {
    jupiter: Arc<JupiterClient>,
    rpc: Arc<RpcClient>,
    signer: Option<Arc<Keypair>>,
    quote_mint: String,
    quote_decimals: u8,
}

impl JupiterExecutor {
    /// Executor that signs and submits real swaps
    pub fn live(
        jupiter: Arc<JupiterClient>,
        rpc: Arc<RpcClient>,
        signer: Arc<Keypair>,
        quote_mint: impl Into<String>,
        quote_decimals: u8,
    ) -> Self {
        Self {
            jupiter,
            rpc,
            signer: Some(signer),
            quote_mint: quote_mint.into(),
            quote_decimals,
        }
    }

    /// Executor that quotes real routes but never submits
    pub fn simulated(
        jupiter: Arc<JupiterClient>,
        rpc: Arc<RpcClient>,
        quote_mint: impl Into<String>,
        quote_decimals: u8,
    ) -> Self {
        Self {
            jupiter,
            rpc,
            signer: None,
            quote_mint: quote_mint.into(),
            quote_decimals,
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        if self.signer.is_some() {
            ExecutionMode::Live
        } else {
            ExecutionMode::Simulated
        }
    }

    fn quote_units(&self, usd: f64) -> u64 {
        (usd * 10f64.powi(self.quote_decimals as i32)).round() as u64
    }

    fn quote_usd(&self, units: u64) -> f64 {
        units as f64 / 10f64.powi(self.quote_decimals as i32)
    }

    /// Raw balance held in the wallet's associated token account
    async fn token_balance(&self, wallet: &Pubkey, token: &TokenAddress) -> Result<u64> {
        let mint = Pubkey::from_str(token.as_str())
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", token, e)))?;
        let ata = spl_associated_token_account::get_associated_token_address(wallet, &mint);
        let balance = self.rpc.get_token_account_balance(&ata).await?;
        balance
            .amount
            .parse::<u64>()
            .map_err(|e| Error::Deserialization(format!("token balance {}: {}", balance.amount, e)))
    }

    /// Sign a swap and submit it, retrying transient RPC failures
    async fn sign_and_send(&self, signer: &Keypair, quote: &Quote) -> Result<String> {
        let unsigned = self.jupiter.swap_transaction(quote, &signer.pubkey()).await?;
        let signed = VersionedTransaction::try_new(unsigned.message, &[signer])
            .map_err(|e| Error::SwapSubmission(format!("signing failed: {}", e)))?;

        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(2),
            max_elapsed_time: Some(Duration::from_secs(20)),
            ..Default::default()
        };

        let signature = retry(backoff, || async {
            match self.rpc.send_and_confirm_transaction(&signed).await {
                Ok(sig) => Ok(sig),
                Err(e) => {
                    let e = Error::from(e);
                    if e.is_retryable() {
                        warn!("Retryable swap submission error: {}", e);
                        Err(backoff::Error::transient(e))
                    } else {
                        error!("Permanent swap submission error: {}", e);
                        Err(backoff::Error::permanent(e))
                    }
                }
            }
        })
        .await?;

        Ok(signature.to_string())
    }
}

fn simulated_ref() -> String {
    format!("sim_{}", chrono::Utc::now().timestamp_millis())
}

#[async_trait]
impl TradeExecutor for JupiterExecutor {
    async fn buy(&self, token: &TokenAddress, usd_amount: f64, slippage_bps: u32) -> Result<BuyReceipt> {
        let amount = self.quote_units(usd_amount);
        let quote = self
            .jupiter
            .quote(&self.quote_mint, token.as_str(), amount, slippage_bps)
            .await
            .map_err(Error::buy_failed)?;
        if quote.out_amount == 0 {
            return Err(Error::buy_failed("route returns zero tokens"));
        }

        let tx_ref = match &self.signer {
            Some(signer) => self
                .sign_and_send(signer, &quote)
                .await
                .map_err(Error::buy_failed)?,
            None => simulated_ref(),
        };

        info!(
            mint = %token,
            usd = usd_amount,
            token_amount = quote.out_amount,
            tx = %tx_ref,
            mode = %self.mode(),
            "Buy executed"
        );
        Ok(BuyReceipt {
            tx_ref,
            token_amount: quote.out_amount,
        })
    }

    async fn sell(&self, token: &TokenAddress, token_amount: u64, slippage_bps: u32) -> Result<SellReceipt> {
        let amount = match &self.signer {
            Some(signer) => {
                let held = self
                    .token_balance(&signer.pubkey(), token)
                    .await
                    .map_err(Error::sell_failed)?;
                if held == 0 {
                    return Err(Error::EmptyBalance(token.to_string()));
                }
                if held < token_amount {
                    warn!(
                        mint = %token,
                        recorded = token_amount,
                        held,
                        "Wallet holds fewer tokens than recorded, selling actual balance"
                    );
                }
                held.min(token_amount)
            }
            None => token_amount,
        };

        let quote = self
            .jupiter
            .quote(token.as_str(), &self.quote_mint, amount, slippage_bps)
            .await
            .map_err(Error::sell_failed)?;

        let tx_ref = match &self.signer {
            Some(signer) => self
                .sign_and_send(signer, &quote)
                .await
                .map_err(Error::sell_failed)?,
            None => simulated_ref(),
        };

        let usd_received = self.quote_usd(quote.out_amount);
        info!(
            mint = %token,
            token_amount = amount,
            usd = %format_args!("{:.4}", usd_received),
            tx = %tx_ref,
            mode = %self.mode(),
            "Sell executed"
        );
        Ok(SellReceipt {
            tx_ref,
            usd_received: Some(usd_received),
        })
    }
}

/// Load a keypair from a JSON byte-array file
pub fn load_keypair(path: &str) -> Result<Keypair> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| Error::InvalidKeypair(format!("Failed to read {}: {}", path, e)))?;
    let bytes: Vec<u8> = serde_json::from_str(&data)
        .map_err(|e| Error::InvalidKeypair(format!("Failed to parse {}: {}", path, e)))?;
    Keypair::from_bytes(&bytes).map_err(|e| Error::InvalidKeypair(e.to_string()))
}
