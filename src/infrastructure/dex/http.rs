//! HTTP client for the Jupiter-style swap aggregator.

use rand::Rng;
use reqwest::StatusCode;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use async_trait::async_trait;

use crate::infrastructure::dex::wire::{
    QuoteRequestWire, QuoteResponseWire, SwapRequestWire, SwapResponseWire,
};
use crate::infrastructure::dex::{DexClient, ExecuteOpts, ExecutedSwap, QuoteRequest};
use crate::shared::errors::SwapError;
use crate::shared::types::Quote;

#[derive(Debug, Clone)]
pub struct DexClientConfig {
    pub base_url: String,
    pub quote_timeout_ms: u64,
    pub execute_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_base_ms: u64,
}

impl Default for DexClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            quote_timeout_ms: 10_000,
            execute_timeout_ms: 60_000,
            max_retries: 3,
            retry_backoff_base_ms: 500,
        }
    }
}

pub struct HttpDexClient {
    http: reqwest::Client,
    config: DexClientConfig,
    token_cache: Mutex<Option<HashMap<String, Pubkey>>>,
}

impl HttpDexClient {
    pub fn new(config: DexClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            token_cache: Mutex::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Whether to retry after `err`, and for how long to back off.
    /// Transport-level failures only; business errors surface at once.
    fn transport_retry_after(&self, err: &SwapError, attempt: u32) -> Option<Duration> {
        let max_attempts = self.config.max_retries + 1;
        let transport_level = matches!(err, SwapError::Transport(_) | SwapError::RateLimited(_));
        if !transport_level || attempt >= max_attempts {
            return None;
        }
        let mut delay_ms = self
            .config
            .retry_backoff_base_ms
            .saturating_mul(1u64 << (attempt - 1).min(16));
        if matches!(err, SwapError::RateLimited(_)) {
            // Throttling gets extra jitter to spread reconnects.
            delay_ms += rand::thread_rng().gen_range(0..=delay_ms / 2 + 1);
        }
        Some(Duration::from_millis(delay_ms))
    }

    async fn fetch_tokens_once(&self, url: &str) -> Result<HashMap<String, Pubkey>, SwapError> {
        let response = self
            .http
            .get(url)
            .timeout(Duration::from_millis(self.config.quote_timeout_ms))
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_failure(status, &body, true));
        }

        let raw: HashMap<String, String> = response.json().await.map_err(transport)?;
        let mut tokens = HashMap::with_capacity(raw.len());
        for (symbol, mint) in raw {
            let mint = Pubkey::from_str(&mint)
                .map_err(|e| SwapError::Unknown(format!("bad mint for {}: {}", symbol, e)))?;
            tokens.insert(symbol.to_uppercase(), mint);
        }
        Ok(tokens)
    }

    async fn quote_once(
        &self,
        url: &str,
        payload: &QuoteRequestWire,
    ) -> Result<Quote, SwapError> {
        let response = self
            .http
            .post(url)
            .timeout(Duration::from_millis(self.config.quote_timeout_ms))
            .json(payload)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_failure(status, &body, true));
        }

        let envelope: serde_json::Value = response.json().await.map_err(transport)?;
        // Some deployments wrap the canonical quote in an envelope.
        let raw = envelope.get("quoteResponse").unwrap_or(&envelope).clone();
        let wire: QuoteResponseWire = serde_json::from_value(raw.clone())
            .map_err(|e| SwapError::QuoteRejected(format!("malformed quote: {}", e)))?;

        let quote = Quote {
            in_amount: parse_amount(&wire.in_amount, "inAmount")?,
            out_amount: parse_amount(&wire.out_amount, "outAmount")?,
            route_id: wire.route_id.clone().unwrap_or_default(),
            price_impact_bps: wire.price_impact_bps(),
            fetched_at: Instant::now(),
            response: raw,
        };
        debug!(
            "quote {} -> {} (impact {} bps, {} route steps)",
            quote.in_amount,
            quote.out_amount,
            quote.price_impact_bps,
            wire.route_steps()
        );
        Ok(quote)
    }
}

fn transport(err: reqwest::Error) -> SwapError {
    if err.is_timeout() {
        SwapError::Transport(format!("request timed out: {}", err))
    } else {
        SwapError::Transport(err.to_string())
    }
}

fn classify_http_failure(status: StatusCode, body: &str, is_quote: bool) -> SwapError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return SwapError::RateLimited(format!("HTTP 429: {}", body));
    }
    if status.is_server_error() {
        return SwapError::Transport(format!("HTTP {}: {}", status, body));
    }
    if is_quote {
        SwapError::QuoteRejected(format!("HTTP {}: {}", status, body))
    } else {
        classify_execute_failure(body)
    }
}

/// Map an aggregator failure message onto the swap error taxonomy.
fn classify_execute_failure(message: &str) -> SwapError {
    let lower = message.to_lowercase();
    if lower.contains("slippage") {
        SwapError::SlippageExceeded(message.to_string())
    } else if lower.contains("insufficient") {
        SwapError::InsufficientBalance(message.to_string())
    } else if lower.contains("stale") || lower.contains("expired") {
        SwapError::QuoteStale
    } else if lower.contains("signature") || lower.contains("private key") {
        SwapError::Signature(message.to_string())
    } else if lower.contains("verif") {
        SwapError::VerificationFailed(message.to_string())
    } else {
        SwapError::Unknown(message.to_string())
    }
}

fn parse_amount(raw: &str, field: &str) -> Result<u64, SwapError> {
    raw.parse::<u64>()
        .map_err(|_| SwapError::Unknown(format!("unparseable {} in quote response: {}", field, raw)))
}

#[async_trait]
impl DexClient for HttpDexClient {
    async fn supported_tokens(&self) -> Result<HashMap<String, Pubkey>, SwapError> {
        {
            let cache = self.token_cache.lock().await;
            if let Some(tokens) = cache.as_ref() {
                return Ok(tokens.clone());
            }
        }

        let url = self.url("/api/tokens");
        let mut attempt = 1;
        let tokens = loop {
            match self.fetch_tokens_once(&url).await {
                Ok(tokens) => break tokens,
                Err(err) => match self.transport_retry_after(&err, attempt) {
                    Some(delay) => {
                        warn!("token list retry {} in {:?}: {}", attempt, delay, err);
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(err),
                },
            }
        };

        info!("loaded {} supported tokens", tokens.len());
        *self.token_cache.lock().await = Some(tokens.clone());
        Ok(tokens)
    }

    async fn quote(&self, req: &QuoteRequest) -> Result<Quote, SwapError> {
        let payload = QuoteRequestWire {
            input_mint: req.input_mint.to_string(),
            output_mint: req.output_mint.to_string(),
            amount: req.amount,
            slippage_bps: req.slippage_bps,
            only_direct_routes: req.only_direct_routes,
            as_legacy_transaction: false,
            platform_fee_bps: 0,
        };
        let url = self.url("/api/jupiter/quote");

        let mut attempt = 1;
        loop {
            match self.quote_once(&url, &payload).await {
                Ok(quote) => return Ok(quote),
                Err(err) => match self.transport_retry_after(&err, attempt) {
                    Some(delay) => {
                        warn!("quote retry {} in {:?}: {}", attempt, delay, err);
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(err),
                },
            }
        }
    }

    async fn execute(
        &self,
        private_key: &str,
        quote: &Quote,
        opts: &ExecuteOpts,
    ) -> Result<ExecutedSwap, SwapError> {
        let payload = SwapRequestWire {
            user_wallet_private_key_base58: private_key.to_string(),
            quote_response: quote.response.clone(),
            wrap_and_unwrap_sol: opts.wrap_and_unwrap_sol,
            as_legacy_transaction: false,
            collect_fees: opts.collect_fee,
            verify_swap: opts.verify,
        };

        // No client-level retry here: re-posting a swap after an
        // ambiguous network failure risks double submission. The swap
        // runner owns the execute retry decision.
        let response = self
            .http
            .post(self.url("/api/jupiter/swap"))
            .timeout(Duration::from_millis(self.config.execute_timeout_ms))
            .json(&payload)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_failure(status, &body, false));
        }

        let wire: SwapResponseWire = response.json().await.map_err(transport)?;
        if wire.status != "success" {
            let message = wire
                .message
                .unwrap_or_else(|| format!("swap status {}", wire.status));
            return Err(classify_execute_failure(&message));
        }

        let tx_id = wire
            .transaction_id
            .ok_or_else(|| SwapError::Unknown("success response without transactionId".into()))?;
        let output_amount = match wire.out_amount.as_deref() {
            Some(raw) => parse_amount(raw, "outAmount")?,
            None => quote.out_amount,
        };
        // Fee collection is best-effort; a failed fee leg never fails the swap.
        let fee_amount = wire
            .fee_collection
            .as_ref()
            .filter(|fee| fee.status == "success")
            .and_then(|fee| fee.fee_amount);

        Ok(ExecutedSwap {
            tx_id,
            output_amount,
            fee_amount,
            new_balance: wire.new_balance,
            verified: wire.verified.unwrap_or(true),
        })
    }
}
