//! Scripted aggregator stub for dry runs and tests.
//!
//! Quotes and executions produce synthetic results without touching the
//! network. Per-key execute scripts let tests stage failures for
//! individual wallets; unscripted calls succeed.

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::infrastructure::dex::{DexClient, ExecuteOpts, ExecutedSwap, QuoteRequest};
use crate::shared::errors::SwapError;
use crate::shared::types::Quote;

/// One scripted execute outcome for a wallet key.
#[derive(Debug, Clone)]
pub enum MockExecute {
    Success { verified: bool },
    Fail(SwapError),
}

pub struct MockDexClient {
    tokens: HashMap<String, Pubkey>,
    /// Output base units per input base unit.
    rate: f64,
    price_impact_bps: i32,
    quote_delay: Duration,
    execute_delay: Duration,
    quote_failures: Mutex<VecDeque<SwapError>>,
    execute_scripts: Mutex<HashMap<String, VecDeque<MockExecute>>>,
    tx_counter: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    executes_started: AtomicUsize,
}

impl MockDexClient {
    pub fn new(rate: f64, price_impact_bps: i32) -> Self {
        let mut tokens = HashMap::new();
        for (symbol, mint) in [
            ("SOL", "So11111111111111111111111111111111111111112"),
            ("USDC", "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
            ("USDT", "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB"),
            ("BONK", "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263"),
        ] {
            tokens.insert(symbol.to_string(), Pubkey::from_str(mint).unwrap());
        }
        Self {
            tokens,
            rate,
            price_impact_bps,
            quote_delay: Duration::from_millis(0),
            execute_delay: Duration::from_millis(0),
            quote_failures: Mutex::new(VecDeque::new()),
            execute_scripts: Mutex::new(HashMap::new()),
            tx_counter: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            executes_started: AtomicUsize::new(0),
        }
    }

    pub fn with_delays(mut self, quote: Duration, execute: Duration) -> Self {
        self.quote_delay = quote;
        self.execute_delay = execute;
        self
    }

    /// Stage errors returned by the next quote calls, in call order.
    pub fn push_quote_failure(&self, err: SwapError) {
        self.quote_failures.lock().unwrap().push_back(err);
    }

    /// Stage execute outcomes for a specific private key, consumed in order.
    pub fn script_execute(&self, private_key: &str, outcomes: Vec<MockExecute>) {
        self.execute_scripts
            .lock()
            .unwrap()
            .insert(private_key.to_string(), outcomes.into());
    }

    /// Highest number of concurrently in-flight executes observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Total execute calls started, including scripted failures.
    pub fn executes_started(&self) -> usize {
        self.executes_started.load(Ordering::SeqCst)
    }

    fn next_tx_id(&self) -> String {
        format!("MOCKTX{}", self.tx_counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl DexClient for MockDexClient {
    async fn supported_tokens(&self) -> Result<HashMap<String, Pubkey>, SwapError> {
        Ok(self.tokens.clone())
    }

    async fn quote(&self, req: &QuoteRequest) -> Result<Quote, SwapError> {
        if self.quote_delay > Duration::ZERO {
            tokio::time::sleep(self.quote_delay).await;
        }
        if let Some(err) = self.quote_failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        let out_amount = (req.amount as f64 * self.rate) as u64;
        let response = serde_json::json!({
            "inputMint": req.input_mint.to_string(),
            "outputMint": req.output_mint.to_string(),
            "inAmount": req.amount.to_string(),
            "outAmount": out_amount.to_string(),
            "priceImpactPct": (self.price_impact_bps as f64 / 100.0).to_string(),
            "slippageBps": req.slippage_bps,
        });
        Ok(Quote {
            in_amount: req.amount,
            out_amount,
            route_id: "mock-route".to_string(),
            price_impact_bps: self.price_impact_bps,
            fetched_at: Instant::now(),
            response,
        })
    }

    async fn execute(
        &self,
        private_key: &str,
        quote: &Quote,
        opts: &ExecuteOpts,
    ) -> Result<ExecutedSwap, SwapError> {
        self.executes_started.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if self.execute_delay > Duration::ZERO {
            tokio::time::sleep(self.execute_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self
            .execute_scripts
            .lock()
            .unwrap()
            .get_mut(private_key)
            .and_then(|outcomes| outcomes.pop_front());

        match scripted {
            Some(MockExecute::Fail(err)) => Err(err),
            Some(MockExecute::Success { verified }) => Ok(ExecutedSwap {
                tx_id: self.next_tx_id(),
                output_amount: quote.out_amount,
                fee_amount: opts.collect_fee.then(|| quote.in_amount / 1000),
                new_balance: None,
                verified,
            }),
            None => Ok(ExecutedSwap {
                tx_id: self.next_tx_id(),
                output_amount: quote.out_amount,
                fee_amount: opts.collect_fee.then(|| quote.in_amount / 1000),
                new_balance: None,
                verified: true,
            }),
        }
    }
}
