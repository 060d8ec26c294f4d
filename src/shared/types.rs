//! Common types used across the application

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::time::Instant;

use crate::shared::errors::ErrorKind;

/// Token representation. `mint` is canonical; `symbol` is a display alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub mint: Pubkey,
    pub symbol: Option<String>,
    pub decimals: u8,
}

impl Token {
    pub fn display(&self) -> String {
        self.symbol.clone().unwrap_or_else(|| self.mint.to_string())
    }
}

/// A wallet participating in a run. `index` is stable within the run
/// and used as a tie-breaker for ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub index: usize,
    pub address: String,
    pub has_signing_key: bool,
}

/// Swap direction. Purely semantic labeling; does not change logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Buy,
    Sell,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Buy => "buy",
            Operation::Sell => "sell",
        }
    }
}

/// Per-wallet amount strategy. All amounts are in input-token base units.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Strategy {
    /// Every wallet swaps the same amount.
    Fixed { base: u64 },
    /// Each wallet swaps `floor(balance * fraction)`, fraction in (0, 1].
    Percentage { fraction: f64 },
    /// Uniform draw in `[min, max]` per wallet, seeded by the run id.
    Random { min: u64, max: u64 },
    /// Element-wise amounts; length must equal the selected wallet count.
    Custom { amounts: Vec<u64> },
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Fixed { .. } => "fixed",
            Strategy::Percentage { .. } => "percentage",
            Strategy::Random { .. } => "random",
            Strategy::Custom { .. } => "custom",
        }
    }
}

/// Concurrency discipline for dispatching per-wallet swaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Mode {
    /// Wallet-index order with a sleep between consecutive completions.
    Sequential { delay_ms: u64 },
    /// Up to `max_concurrent` swaps in flight at once.
    Parallel { max_concurrent: usize },
    /// Consecutive groups of `size` run concurrently, with a sleep
    /// between groups. The final group may be smaller.
    Batch { size: usize, delay_ms: u64 },
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Sequential { .. } => "sequential",
            Mode::Parallel { .. } => "parallel",
            Mode::Batch { .. } => "batch",
        }
    }
}

/// Run-level swap configuration, immutable after validation.
#[derive(Debug, Clone, Serialize)]
pub struct SwapRequest {
    pub operation: Operation,
    pub input_token: Token,
    pub output_token: Token,
    pub strategy: Strategy,
    pub mode: Mode,
    pub slippage_bps: u16,
    pub verify: bool,
    pub max_retries: u32,
    pub retry_backoff_base_ms: u64,
    pub collect_fee: bool,
    pub minimum_input_amount: u64,
    pub run_deadline_ms: Option<u64>,
}

/// Planner admission verdict for one wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Ok,
    BelowMinimum,
    InsufficientBalance,
    Skip,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Ok => "ok",
            Verdict::BelowMinimum => "below_minimum",
            Verdict::InsufficientBalance => "insufficient_balance",
            Verdict::Skip => "skip",
        }
    }

    pub fn is_admitted(&self) -> bool {
        matches!(self, Verdict::Ok)
    }
}

/// Per-wallet plan, created once per run and never mutated after admission.
#[derive(Debug, Clone, Serialize)]
pub struct WalletPlan {
    pub wallet: Wallet,
    pub input_amount: u64,
    pub verdict: Verdict,
}

/// A short-lived quote from the aggregator. `route_id` is opaque and the
/// raw `response` is handed back verbatim on execute.
#[derive(Debug, Clone)]
pub struct Quote {
    pub in_amount: u64,
    pub out_amount: u64,
    pub route_id: String,
    pub price_impact_bps: i32,
    pub fetched_at: Instant,
    pub response: serde_json::Value,
}

impl Quote {
    pub fn age_ms(&self) -> u64 {
        self.fetched_at.elapsed().as_millis() as u64
    }
}

/// Terminal status of one wallet's swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapStatus {
    Success,
    Failed,
    Skipped,
}

impl SwapStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapStatus::Success => "success",
            SwapStatus::Failed => "failed",
            SwapStatus::Skipped => "skipped",
        }
    }
}

/// Terminal, immutable record of one wallet's run.
///
/// `status == Success` implies `transaction_id` is present; skipped
/// receipts carry neither a transaction id nor an output amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapReceipt {
    pub wallet_index: usize,
    pub status: SwapStatus,
    pub input_amount: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_amount: Option<u64>,
    #[serde(rename = "transaction_id", skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_amount: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_impact_bps: Option<i32>,
    pub duration_ms: u64,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl SwapReceipt {
    pub fn is_successful(&self) -> bool {
        self.status == SwapStatus::Success
    }
}

/// How the run terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    DeadlineExpired,
    Cancelled,
    AbortedConfig,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::DeadlineExpired => "deadline_expired",
            RunStatus::Cancelled => "cancelled",
            RunStatus::AbortedConfig => "aborted_config",
        }
    }
}

/// Which wallets from the source participate in the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletSelection {
    All,
    FirstN(usize),
    Custom(Vec<usize>),
}
