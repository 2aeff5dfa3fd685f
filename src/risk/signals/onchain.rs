//! On-chain signal from the token's mint account

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::account::Account;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::OnchainPolicy;
use crate::error::{Error, Result};
use crate::risk::{SignalResult, SignalSource, SourceId, TokenAddress};

/// Token-2022 program
pub const TOKEN_2022_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");

/// SPL mint layout: mint_authority COption<Pubkey> (36) | supply (8) | decimals (1)
/// | is_initialized (1) | freeze_authority COption<Pubkey> (36)
const MINT_LEN: usize = 82;
const FREEZE_AUTHORITY_OFFSET: usize = 46;

/// Account lookup, split out so tests can run without a validator
#[async_trait]
pub trait AccountFetcher: Send + Sync {
    async fn fetch_account(&self, address: &Pubkey) -> Result<Option<Account>>;
}

#[async_trait]
impl AccountFetcher for RpcClient {
    async fn fetch_account(&self, address: &Pubkey) -> Result<Option<Account>> {
        let response = self
            .get_account_with_commitment(address, self.commitment())
            .await?;
        Ok(response.value)
    }
}

pub struct OnchainSignalSource {
    fetcher: Arc<dyn AccountFetcher>,
    policy: OnchainPolicy,
}

impl OnchainSignalSource {
    pub fn new(fetcher: Arc<dyn AccountFetcher>, policy: OnchainPolicy) -> Self {
        Self { fetcher, policy }
    }
}

#[async_trait]
impl SignalSource for OnchainSignalSource {
    fn id(&self) -> SourceId {
        SourceId::Onchain
    }

    async fn evaluate(&self, token: &TokenAddress) -> Result<SignalResult> {
        let mint = Pubkey::from_str(token.as_str())
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", token, e)))?;

        let account = self.fetcher.fetch_account(&mint).await?;
        Ok(score_account(&self.policy, account.as_ref()))
    }
}

fn is_token_program(owner: &Pubkey) -> bool {
    *owner == spl_token::ID || *owner == TOKEN_2022_PROGRAM_ID
}

fn coption_is_some(tag: &[u8]) -> bool {
    tag == [1, 0, 0, 0]
}

/// Score a mint account. A missing account is an opinion, not a failure.
pub fn score_account(policy: &OnchainPolicy, account: Option<&Account>) -> SignalResult {
    let Some(account) = account else {
        return SignalResult::evaluated(
            SourceId::Onchain,
            policy.missing_account_score,
            false,
            "Mint account not found",
        );
    };

    let has_data = !account.data.is_empty();
    let owner_ok = is_token_program(&account.owner);
    let rent_ok = account.lamports >= policy.min_rent_lamports;

    let mut issues = Vec::new();
    if !has_data {
        issues.push("no account data");
    }
    if !owner_ok {
        issues.push("not owned by a token program");
    }
    if !rent_ok {
        issues.push("low lamport balance");
    }

    let factors = 3.0;
    let good = factors - issues.len() as f64;
    let ratio = good / factors;
    let score = (policy.base_score + ratio * policy.factor_span).clamp(0.0, 1.0);
    let passed = ratio >= policy.pass_ratio && issues.len() <= policy.max_issues;

    let message = if issues.is_empty() {
        "Mint account looks healthy".to_string()
    } else {
        format!("Issues: {}", issues.join(", "))
    };

    let mut result = SignalResult::evaluated(SourceId::Onchain, score, passed, message)
        .with_metric("owner", account.owner.to_string())
        .with_metric("lamports", account.lamports)
        .with_metric("data_len", account.data.len())
        .with_metric("good_factor_ratio", ratio);

    // Authorities are reported for operators but not scored
    if owner_ok && account.data.len() >= MINT_LEN {
        let data = &account.data;
        result = result
            .with_metric("mint_authority_active", coption_is_some(&data[0..4]))
            .with_metric(
                "freeze_authority_active",
                coption_is_some(&data[FREEZE_AUTHORITY_OFFSET..FREEZE_AUTHORITY_OFFSET + 4]),
            );
    }

    result
}
