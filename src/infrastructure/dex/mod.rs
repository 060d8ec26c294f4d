//! DEX aggregator clients.
//!
//! `DexClient` is the only seam between the orchestration core and the
//! remote aggregator; it is shared across runners and must be safe for
//! concurrent use. Transport-level retry lives here, business errors
//! surface immediately to the swap runner.

pub mod http;
pub mod mock;
pub mod wire;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;

use crate::shared::errors::SwapError;
use crate::shared::types::Quote;

pub use http::{DexClientConfig, HttpDexClient};
pub use mock::{MockDexClient, MockExecute};

/// Parameters for a quote request.
#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub amount: u64,
    pub slippage_bps: u16,
    pub only_direct_routes: bool,
}

/// Options applied at execute time.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteOpts {
    pub wrap_and_unwrap_sol: bool,
    pub collect_fee: bool,
    pub verify: bool,
}

/// Result of a submitted swap.
///
/// `verified == false` means the transaction was submitted but the
/// post-execute credit check did not confirm; the caller decides how to
/// surface that (the transaction id is still meaningful).
#[derive(Debug, Clone)]
pub struct ExecutedSwap {
    pub tx_id: String,
    pub output_amount: u64,
    pub fee_amount: Option<u64>,
    pub new_balance: Option<u64>,
    pub verified: bool,
}

#[async_trait]
pub trait DexClient: Send + Sync {
    /// Symbol-to-mint map of tokens the aggregator supports. May be
    /// cached for the duration of a run.
    async fn supported_tokens(&self) -> Result<HashMap<String, Pubkey>, SwapError>;

    /// Fetch a swap quote.
    async fn quote(&self, req: &QuoteRequest) -> Result<Quote, SwapError>;

    /// Submit a swap for a previously fetched quote. The private key
    /// must already be normalized to base58.
    async fn execute(
        &self,
        private_key: &str,
        quote: &Quote,
        opts: &ExecuteOpts,
    ) -> Result<ExecutedSwap, SwapError>;
}
