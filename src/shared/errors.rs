//! Error handling for the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error classification surfaced in receipts and aggregated
/// into the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    RateLimited,
    Quote,
    Slippage,
    QuoteStale,
    InsufficientBalance,
    Auth,
    Verification,
    Config,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Quote => "quote",
            ErrorKind::Slippage => "slippage",
            ErrorKind::QuoteStale => "quote_stale",
            ErrorKind::InsufficientBalance => "insufficient_balance",
            ErrorKind::Auth => "auth",
            ErrorKind::Verification => "verification",
            ErrorKind::Config => "config",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Whether a swap attempt may be retried after this kind of failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Transport
                | ErrorKind::RateLimited
                | ErrorKind::Slippage
                | ErrorKind::QuoteStale
        )
    }
}

/// Swap-level errors produced by the DEX client and the swap runner.
#[derive(Error, Debug, Clone)]
pub enum SwapError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("quote rejected: {0}")]
    QuoteRejected(String),

    #[error("slippage tolerance exceeded: {0}")]
    SlippageExceeded(String),

    #[error("quote is stale")]
    QuoteStale,

    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("signing failed: {0}")]
    Signature(String),

    #[error("swap verification failed: {0}")]
    VerificationFailed(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl SwapError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SwapError::Transport(_) => ErrorKind::Transport,
            SwapError::RateLimited(_) => ErrorKind::RateLimited,
            SwapError::QuoteRejected(_) => ErrorKind::Quote,
            SwapError::SlippageExceeded(_) => ErrorKind::Slippage,
            SwapError::QuoteStale => ErrorKind::QuoteStale,
            SwapError::InsufficientBalance(_) => ErrorKind::InsufficientBalance,
            SwapError::Signature(_) => ErrorKind::Auth,
            SwapError::VerificationFailed(_) => ErrorKind::Verification,
            SwapError::Unknown(_) => ErrorKind::Unknown,
        }
    }
}

/// General application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Wallet source error: {0}")]
    WalletError(String),

    #[error("Report error: {0}")]
    ReportError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<SwapError> for AppError {
    fn from(err: SwapError) -> Self {
        AppError::ExecutionError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Unknown(err.to_string())
    }
}
