//! Error types for the screener bot

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the screener bot
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid keypair: {0}")]
    InvalidKeypair(String),

    // Upstream data errors (signal sources, discovery feeds, pricing)
    #[error("{provider} unavailable: {reason}")]
    SourceUnavailable { provider: String, reason: String },

    #[error("{0} timed out after {1}ms")]
    Timeout(String, u64),

    #[error("Malformed response from {provider}: {reason}")]
    MalformedResponse { provider: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Rate limited by {0}")]
    RateLimited(String),

    // RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Invalid token address: {0}")]
    InvalidAddress(String),

    // Trading errors
    #[error("{side} execution failed: {reason}")]
    ExecutionFailure { side: &'static str, reason: String },

    #[error("Swap submission failed: {0}")]
    SwapSubmission(String),

    #[error("No token balance to sell for {0}")]
    EmptyBalance(String),

    // Ledger errors
    #[error("Max positions reached: {open} live, limit is {max}")]
    MaxPositionsReached { open: usize, max: usize },

    #[error("Capital exceeded: committed ${committed} + requested ${requested} > available ${available}")]
    CapitalExceeded {
        committed: f64,
        requested: f64,
        available: f64,
    },

    #[error("Position already open: {0}")]
    PositionAlreadyOpen(String),

    #[error("Invalid amount for {token}: {amount}")]
    InvalidAmount { token: String, amount: f64 },

    #[error("Position not found: {0}")]
    PositionNotFound(String),

    #[error("Invalid position transition for {token}: {from} -> {to}")]
    InvalidTransition {
        token: String,
        from: String,
        to: String,
    },

    // Loop errors
    #[error("Cycle fault: {0}")]
    LoopFault(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Shorthand for a failed upstream call
    pub fn unavailable(provider: impl Into<String>, reason: impl ToString) -> Self {
        Error::SourceUnavailable {
            provider: provider.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for a failed buy
    pub fn buy_failed(reason: impl ToString) -> Self {
        Error::ExecutionFailure {
            side: "buy",
            reason: reason.to_string(),
        }
    }

    /// Shorthand for a failed sell
    pub fn sell_failed(reason: impl ToString) -> Self {
        Error::ExecutionFailure {
            side: "sell",
            reason: reason.to_string(),
        }
    }

    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Rpc(_)
                | Error::Http(_)
                | Error::Timeout(..)
                | Error::RateLimited(_)
                | Error::SourceUnavailable { .. }
                | Error::SwapSubmission(_)
        )
    }

    /// Check if this error came from an unreliable upstream rather than our own state
    pub fn is_source_unavailable(&self) -> bool {
        matches!(
            self,
            Error::SourceUnavailable { .. }
                | Error::Timeout(..)
                | Error::MalformedResponse { .. }
                | Error::Http(_)
                | Error::RateLimited(_)
                | Error::Rpc(_)
                | Error::Deserialization(_)
        )
    }

    /// Check if this error is a ledger capacity or state violation
    pub fn is_ledger_violation(&self) -> bool {
        matches!(
            self,
            Error::MaxPositionsReached { .. }
                | Error::CapitalExceeded { .. }
                | Error::PositionAlreadyOpen(_)
                | Error::PositionNotFound(_)
                | Error::InvalidAmount { .. }
                | Error::InvalidTransition { .. }
        )
    }
}

// Conversion from solana_client errors
impl From<solana_client::client_error::ClientError> for Error {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        Error::Rpc(e.to_string())
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::Deserialization(e.to_string())
        } else {
            Error::Http(e.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Deserialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Rpc("connection reset".into()).is_retryable());
        assert!(Error::Timeout("rugcheck".into(), 15_000).is_retryable());
        assert!(!Error::Config("bad weights".into()).is_retryable());
        assert!(!Error::buy_failed("no route").is_retryable());
    }

    #[test]
    fn test_ledger_violation_classification() {
        let err = Error::MaxPositionsReached { open: 4, max: 4 };
        assert!(err.is_ledger_violation());
        assert!(!err.is_source_unavailable());
        assert_eq!(err.to_string(), "Max positions reached: 4 live, limit is 4");
    }

    #[test]
    fn test_execution_failure_display() {
        let err = Error::sell_failed("blockhash expired");
        assert_eq!(err.to_string(), "sell execution failed: blockhash expired");
    }
}
