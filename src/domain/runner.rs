//! Per-wallet swap state machine.
//!
//! Drives one wallet through quote -> execute -> verify with bounded
//! retries. Transport-level and slippage-class failures are retried
//! within the attempt budget; other business errors are terminal for
//! the wallet. Every transition is published to the progress bus.

use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::events::EventKind;
use crate::domain::progress::EventPublisher;
use crate::infrastructure::dex::{DexClient, ExecuteOpts, QuoteRequest};
use crate::infrastructure::wallets::WalletSource;
use crate::shared::errors::{ErrorKind, SwapError};
use crate::shared::types::{Quote, SwapReceipt, SwapRequest, SwapStatus, WalletPlan};
use crate::shared::utils::normalize_private_key;

enum Decision {
    Retry { delay_ms: u64, reason: ErrorKind },
    Fail { kind: ErrorKind, detail: String },
}

pub struct SwapRunner {
    client: Arc<dyn DexClient>,
    wallets: Arc<dyn WalletSource>,
    request: Arc<SwapRequest>,
    cancel: CancellationToken,
    quote_ttl_ms: u64,
}

impl SwapRunner {
    pub fn new(
        client: Arc<dyn DexClient>,
        wallets: Arc<dyn WalletSource>,
        request: Arc<SwapRequest>,
        cancel: CancellationToken,
        quote_ttl_ms: u64,
    ) -> Self {
        Self {
            client,
            wallets,
            request,
            cancel,
            quote_ttl_ms,
        }
    }

    /// Run one wallet's plan to a terminal receipt. Never panics and
    /// never returns early without a receipt.
    pub async fn run(&self, plan: &WalletPlan, publisher: &EventPublisher) -> SwapReceipt {
        let started = Instant::now();
        let index = plan.wallet.index;

        if !plan.verdict.is_admitted() {
            let reason = plan.verdict.as_str().to_string();
            publisher
                .publish(EventKind::Skipped {
                    reason: reason.clone(),
                })
                .await;
            return self.skipped_receipt(plan, reason, 0, started);
        }

        if self.cancel.is_cancelled() {
            publisher
                .publish(EventKind::Skipped {
                    reason: "cancelled".to_string(),
                })
                .await;
            return self.skipped_receipt(plan, "cancelled".to_string(), 0, started);
        }

        publisher
            .publish(EventKind::PlanAdmitted {
                input_amount: plan.input_amount,
            })
            .await;

        let max_attempts = self.request.max_retries + 1;
        let mut attempts: u32 = 0;
        let mut held_quote: Option<Quote> = None;

        loop {
            if self.cancel.is_cancelled() {
                publisher
                    .publish(EventKind::Skipped {
                        reason: "cancelled".to_string(),
                    })
                    .await;
                return self.skipped_receipt(plan, "cancelled".to_string(), attempts, started);
            }

            attempts += 1;

            // Reuse a held quote only while it is fresh.
            let quote = match held_quote.take() {
                Some(quote) if quote.age_ms() <= self.quote_ttl_ms => quote,
                _ => {
                    publisher
                        .publish(EventKind::QuoteStarted { attempt: attempts })
                        .await;
                    match self.fetch_quote(plan).await {
                        Ok(quote) => {
                            publisher
                                .publish(EventKind::QuoteReady {
                                    out_amount: quote.out_amount,
                                    price_impact_bps: quote.price_impact_bps,
                                })
                                .await;
                            quote
                        }
                        Err(err) => match self.decide(&err, attempts, max_attempts) {
                            Decision::Fail { kind, detail } => {
                                publisher
                                    .publish(EventKind::Failed {
                                        kind,
                                        detail: detail.clone(),
                                    })
                                    .await;
                                return self.failed_receipt(
                                    plan, kind, detail, None, attempts, started,
                                );
                            }
                            Decision::Retry { delay_ms, reason } => {
                                publisher
                                    .publish(EventKind::RetryScheduled {
                                        attempt: attempts,
                                        delay_ms,
                                        reason,
                                    })
                                    .await;
                                if self.backoff(delay_ms).await.is_err() {
                                    publisher
                                        .publish(EventKind::Skipped {
                                            reason: "cancelled".to_string(),
                                        })
                                        .await;
                                    return self.skipped_receipt(
                                        plan,
                                        "cancelled".to_string(),
                                        attempts,
                                        started,
                                    );
                                }
                                continue;
                            }
                        },
                    }
                }
            };

            let key = match self.signing_key(index).await {
                Ok(key) => key,
                Err(err) => {
                    let detail = err.to_string();
                    publisher
                        .publish(EventKind::Failed {
                            kind: ErrorKind::Auth,
                            detail: detail.clone(),
                        })
                        .await;
                    return self.failed_receipt(
                        plan,
                        ErrorKind::Auth,
                        detail,
                        Some(&quote),
                        attempts,
                        started,
                    );
                }
            };

            publisher
                .publish(EventKind::ExecuteStarted { attempt: attempts })
                .await;
            let opts = ExecuteOpts {
                wrap_and_unwrap_sol: true,
                collect_fee: self.request.collect_fee,
                verify: self.request.verify,
            };

            match self.client.execute(&key, &quote, &opts).await {
                Ok(executed) => {
                    publisher
                        .publish(EventKind::ExecuteSubmitted {
                            tx_id: executed.tx_id.clone(),
                        })
                        .await;

                    if !self.request.verify || executed.verified {
                        publisher.publish(EventKind::Verified).await;
                        return SwapReceipt {
                            wallet_index: index,
                            status: SwapStatus::Success,
                            input_amount: plan.input_amount,
                            output_amount: Some(executed.output_amount),
                            tx_id: Some(executed.tx_id),
                            fee_amount: executed.fee_amount,
                            price_impact_bps: Some(quote.price_impact_bps),
                            duration_ms: started.elapsed().as_millis() as u64,
                            attempts,
                            error_kind: None,
                            error_detail: None,
                        };
                    }

                    // Submitted but the credit check did not confirm.
                    let detail = "output credit not confirmed".to_string();
                    publisher
                        .publish(EventKind::Failed {
                            kind: ErrorKind::Verification,
                            detail: detail.clone(),
                        })
                        .await;
                    return SwapReceipt {
                        wallet_index: index,
                        status: SwapStatus::Failed,
                        input_amount: plan.input_amount,
                        output_amount: Some(executed.output_amount),
                        tx_id: Some(executed.tx_id),
                        fee_amount: executed.fee_amount,
                        price_impact_bps: Some(quote.price_impact_bps),
                        duration_ms: started.elapsed().as_millis() as u64,
                        attempts,
                        error_kind: Some(ErrorKind::Verification),
                        error_detail: Some(detail),
                    };
                }
                Err(err) => match self.decide(&err, attempts, max_attempts) {
                    Decision::Fail { kind, detail } => {
                        publisher
                            .publish(EventKind::Failed {
                                kind,
                                detail: detail.clone(),
                            })
                            .await;
                        return self.failed_receipt(
                            plan,
                            kind,
                            detail,
                            Some(&quote),
                            attempts,
                            started,
                        );
                    }
                    Decision::Retry { delay_ms, reason } => {
                        // Slippage and staleness need a fresh quote; a
                        // transport blip may reuse the held one while fresh.
                        if matches!(reason, ErrorKind::Transport | ErrorKind::RateLimited) {
                            held_quote = Some(quote);
                        }
                        publisher
                            .publish(EventKind::RetryScheduled {
                                attempt: attempts,
                                delay_ms,
                                reason,
                            })
                            .await;
                        if self.backoff(delay_ms).await.is_err() {
                            publisher
                                .publish(EventKind::Skipped {
                                    reason: "cancelled".to_string(),
                                })
                                .await;
                            return self.skipped_receipt(
                                plan,
                                "cancelled".to_string(),
                                attempts,
                                started,
                            );
                        }
                    }
                },
            }
        }
    }

    async fn fetch_quote(&self, plan: &WalletPlan) -> Result<Quote, SwapError> {
        let req = QuoteRequest {
            input_mint: self.request.input_token.mint,
            output_mint: self.request.output_token.mint,
            amount: plan.input_amount,
            slippage_bps: self.request.slippage_bps,
            only_direct_routes: false,
        };
        self.client.quote(&req).await
    }

    async fn signing_key(&self, index: usize) -> Result<String, SwapError> {
        let key = self.wallets.signing_key(index).await?;
        normalize_private_key(&key)
    }

    fn decide(&self, err: &SwapError, attempts: u32, max_attempts: u32) -> Decision {
        let kind = err.kind();
        if kind.is_retryable() && attempts < max_attempts {
            Decision::Retry {
                delay_ms: self.backoff_delay_ms(attempts),
                reason: kind,
            }
        } else {
            Decision::Fail {
                kind,
                detail: err.to_string(),
            }
        }
    }

    /// Nominal delay `base * 2^(attempt-1)` plus a jitter fraction in
    /// [0, 0.25] of the nominal value.
    fn backoff_delay_ms(&self, attempt: u32) -> u64 {
        let nominal = self
            .request
            .retry_backoff_base_ms
            .saturating_mul(1u64 << (attempt.saturating_sub(1)).min(16));
        let jitter = rand::thread_rng().gen_range(0.0..=0.25);
        nominal + (nominal as f64 * jitter) as u64
    }

    /// Sleep for the backoff delay; `Err` means cancellation fired.
    async fn backoff(&self, delay_ms: u64) -> Result<(), ()> {
        debug!("backing off {}ms", delay_ms);
        tokio::select! {
            _ = self.cancel.cancelled() => Err(()),
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => Ok(()),
        }
    }

    fn skipped_receipt(
        &self,
        plan: &WalletPlan,
        reason: String,
        attempts: u32,
        started: Instant,
    ) -> SwapReceipt {
        SwapReceipt {
            wallet_index: plan.wallet.index,
            status: SwapStatus::Skipped,
            input_amount: plan.input_amount,
            output_amount: None,
            tx_id: None,
            fee_amount: None,
            price_impact_bps: None,
            duration_ms: started.elapsed().as_millis() as u64,
            attempts,
            error_kind: None,
            error_detail: Some(reason),
        }
    }

    fn failed_receipt(
        &self,
        plan: &WalletPlan,
        kind: ErrorKind,
        detail: String,
        quote: Option<&Quote>,
        attempts: u32,
        started: Instant,
    ) -> SwapReceipt {
        SwapReceipt {
            wallet_index: plan.wallet.index,
            status: SwapStatus::Failed,
            input_amount: plan.input_amount,
            output_amount: None,
            tx_id: None,
            fee_amount: None,
            price_impact_bps: quote.map(|q| q.price_impact_bps),
            duration_ms: started.elapsed().as_millis() as u64,
            attempts,
            error_kind: Some(kind),
            error_detail: Some(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::progress::ProgressBus;
    use crate::infrastructure::dex::{MockDexClient, MockExecute};
    use crate::infrastructure::wallets::StaticWalletSource;
    use crate::shared::types::{
        Mode, Operation, Strategy, Token, Verdict, Wallet,
    };
    use solana_sdk::pubkey::Pubkey;

    fn request(max_retries: u32, verify: bool) -> Arc<SwapRequest> {
        Arc::new(SwapRequest {
            operation: Operation::Buy,
            input_token: Token {
                mint: Pubkey::new_unique(),
                symbol: Some("SOL".into()),
                decimals: 9,
            },
            output_token: Token {
                mint: Pubkey::new_unique(),
                symbol: Some("USDC".into()),
                decimals: 6,
            },
            strategy: Strategy::Fixed { base: 100_000_000 },
            mode: Mode::Sequential { delay_ms: 0 },
            slippage_bps: 50,
            verify,
            max_retries,
            retry_backoff_base_ms: 100,
            collect_fee: false,
            minimum_input_amount: 0,
            run_deadline_ms: None,
        })
    }

    fn plan(index: usize, amount: u64, verdict: Verdict) -> WalletPlan {
        WalletPlan {
            wallet: Wallet {
                index,
                address: format!("wallet{}", index),
                has_signing_key: true,
            },
            input_amount: amount,
            verdict,
        }
    }

    fn runner(
        client: Arc<MockDexClient>,
        wallets: Arc<StaticWalletSource>,
        request: Arc<SwapRequest>,
        cancel: CancellationToken,
    ) -> SwapRunner {
        SwapRunner::new(client, wallets, request, cancel, 10_000)
    }

    #[tokio::test]
    async fn inadmissible_plan_skips_without_remote_calls() {
        let client = Arc::new(MockDexClient::new(1.0, 10));
        let wallets = Arc::new(StaticWalletSource::with_balances(&[1_000]));
        let (bus, mut rx) = ProgressBus::new(16);
        let runner = runner(
            client.clone(),
            wallets,
            request(3, true),
            CancellationToken::new(),
        );

        let receipt = runner
            .run(&plan(0, 10, Verdict::BelowMinimum), &bus.publisher(0))
            .await;

        assert_eq!(receipt.status, SwapStatus::Skipped);
        assert_eq!(receipt.attempts, 0);
        assert!(receipt.tx_id.is_none());
        assert_eq!(receipt.error_detail.as_deref(), Some("below_minimum"));
        assert_eq!(client.executes_started(), 0);

        let event = rx.recv().await.unwrap();
        assert!(matches!(event.kind, EventKind::Skipped { .. }));
    }

    #[tokio::test]
    async fn happy_path_produces_success_receipt_and_ordered_events() {
        let client = Arc::new(MockDexClient::new(0.096, 50));
        let wallets = Arc::new(StaticWalletSource::with_balances(&[1_000_000_000]));
        let (bus, mut rx) = ProgressBus::new(16);
        let runner = runner(
            client,
            wallets,
            request(0, false),
            CancellationToken::new(),
        );

        let receipt = runner
            .run(&plan(0, 100_000_000, Verdict::Ok), &bus.publisher(0))
            .await;

        assert_eq!(receipt.status, SwapStatus::Success);
        assert_eq!(receipt.attempts, 1);
        assert_eq!(receipt.output_amount, Some(9_600_000));
        assert_eq!(receipt.price_impact_bps, Some(50));
        assert!(receipt.tx_id.is_some());

        let mut names = Vec::new();
        drop(bus);
        while let Ok(event) = rx.try_recv() {
            names.push(event.kind.name());
        }
        assert_eq!(
            names,
            vec![
                "plan_admitted",
                "quote_started",
                "quote_ready",
                "execute_started",
                "execute_submitted",
                "verified",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slippage_retries_with_fresh_quote_then_succeeds() {
        let client = Arc::new(MockDexClient::new(1.0, 10));
        client.script_execute(
            "key0",
            vec![
                MockExecute::Fail(SwapError::SlippageExceeded("guard hit".into())),
                MockExecute::Success { verified: true },
            ],
        );
        let wallets = Arc::new(StaticWalletSource::with_balances(&[1_000_000]));
        let (bus, _rx) = ProgressBus::new(64);
        let runner = runner(client, wallets, request(2, false), CancellationToken::new());

        let receipt = runner
            .run(&plan(0, 500_000, Verdict::Ok), &bus.publisher(0))
            .await;

        assert_eq!(receipt.status, SwapStatus::Success);
        assert_eq!(receipt.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_budget_is_capped_at_max_retries_plus_one() {
        let client = Arc::new(MockDexClient::new(1.0, 10));
        client.script_execute(
            "key0",
            vec![
                MockExecute::Fail(SwapError::SlippageExceeded("1".into())),
                MockExecute::Fail(SwapError::SlippageExceeded("2".into())),
                MockExecute::Fail(SwapError::SlippageExceeded("3".into())),
                MockExecute::Fail(SwapError::SlippageExceeded("4".into())),
            ],
        );
        let wallets = Arc::new(StaticWalletSource::with_balances(&[1_000_000]));
        let (bus, _rx) = ProgressBus::new(64);
        let runner = runner(
            client.clone(),
            wallets,
            request(2, false),
            CancellationToken::new(),
        );

        let receipt = runner
            .run(&plan(0, 500_000, Verdict::Ok), &bus.publisher(0))
            .await;

        assert_eq!(receipt.status, SwapStatus::Failed);
        assert_eq!(receipt.error_kind, Some(ErrorKind::Slippage));
        assert_eq!(receipt.attempts, 3);
        assert_eq!(client.executes_started(), 3);
    }

    #[tokio::test]
    async fn insufficient_balance_is_terminal_without_retry() {
        let client = Arc::new(MockDexClient::new(1.0, 10));
        client.script_execute(
            "key0",
            vec![MockExecute::Fail(SwapError::InsufficientBalance(
                "0 lamports".into(),
            ))],
        );
        let wallets = Arc::new(StaticWalletSource::with_balances(&[1_000_000]));
        let (bus, _rx) = ProgressBus::new(64);
        let runner = runner(
            client.clone(),
            wallets,
            request(5, false),
            CancellationToken::new(),
        );

        let receipt = runner
            .run(&plan(0, 500_000, Verdict::Ok), &bus.publisher(0))
            .await;

        assert_eq!(receipt.status, SwapStatus::Failed);
        assert_eq!(receipt.error_kind, Some(ErrorKind::InsufficientBalance));
        assert_eq!(receipt.attempts, 1);
        assert_eq!(client.executes_started(), 1);
    }

    #[tokio::test]
    async fn missing_signing_key_fails_as_auth() {
        let client = Arc::new(MockDexClient::new(1.0, 10));
        let wallets = Arc::new(StaticWalletSource::with_balances(&[1_000_000]).without_key(0));
        let (bus, _rx) = ProgressBus::new(64);
        let runner = runner(
            client.clone(),
            wallets,
            request(3, false),
            CancellationToken::new(),
        );

        let receipt = runner
            .run(&plan(0, 500_000, Verdict::Ok), &bus.publisher(0))
            .await;

        assert_eq!(receipt.status, SwapStatus::Failed);
        assert_eq!(receipt.error_kind, Some(ErrorKind::Auth));
        assert_eq!(receipt.attempts, 1);
        assert_eq!(client.executes_started(), 0);
    }

    #[tokio::test]
    async fn quote_rejection_is_terminal() {
        let client = Arc::new(MockDexClient::new(1.0, 10));
        client.push_quote_failure(SwapError::QuoteRejected("no route".into()));
        let wallets = Arc::new(StaticWalletSource::with_balances(&[1_000_000]));
        let (bus, _rx) = ProgressBus::new(64);
        let runner = runner(
            client.clone(),
            wallets,
            request(3, false),
            CancellationToken::new(),
        );

        let receipt = runner
            .run(&plan(0, 500_000, Verdict::Ok), &bus.publisher(0))
            .await;

        assert_eq!(receipt.status, SwapStatus::Failed);
        assert_eq!(receipt.error_kind, Some(ErrorKind::Quote));
        assert_eq!(receipt.attempts, 1);
        assert_eq!(client.executes_started(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_on_quote_is_retried() {
        let client = Arc::new(MockDexClient::new(1.0, 10));
        client.push_quote_failure(SwapError::Transport("connection reset".into()));
        let wallets = Arc::new(StaticWalletSource::with_balances(&[1_000_000]));
        let (bus, _rx) = ProgressBus::new(64);
        let runner = runner(client, wallets, request(2, false), CancellationToken::new());

        let receipt = runner
            .run(&plan(0, 500_000, Verdict::Ok), &bus.publisher(0))
            .await;

        assert_eq!(receipt.status, SwapStatus::Success);
        assert_eq!(receipt.attempts, 2);
    }

    #[tokio::test]
    async fn verification_failure_keeps_transaction_id() {
        let client = Arc::new(MockDexClient::new(1.0, 10));
        client.script_execute("key0", vec![MockExecute::Success { verified: false }]);
        let wallets = Arc::new(StaticWalletSource::with_balances(&[1_000_000]));
        let (bus, _rx) = ProgressBus::new(64);
        let runner = runner(client, wallets, request(0, true), CancellationToken::new());

        let receipt = runner
            .run(&plan(0, 500_000, Verdict::Ok), &bus.publisher(0))
            .await;

        assert_eq!(receipt.status, SwapStatus::Failed);
        assert_eq!(receipt.error_kind, Some(ErrorKind::Verification));
        assert!(receipt.tx_id.is_some());
        assert!(receipt.output_amount.is_some());
    }

    #[tokio::test]
    async fn cancellation_before_start_skips() {
        let client = Arc::new(MockDexClient::new(1.0, 10));
        let wallets = Arc::new(StaticWalletSource::with_balances(&[1_000_000]));
        let (bus, _rx) = ProgressBus::new(64);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let runner = runner(client.clone(), wallets, request(0, false), cancel);

        let receipt = runner
            .run(&plan(0, 500_000, Verdict::Ok), &bus.publisher(0))
            .await;

        assert_eq!(receipt.status, SwapStatus::Skipped);
        assert_eq!(receipt.error_detail.as_deref(), Some("cancelled"));
        assert_eq!(client.executes_started(), 0);
    }

    #[tokio::test]
    async fn backoff_is_exponential_modulo_jitter() {
        let client = Arc::new(MockDexClient::new(1.0, 10));
        let wallets = Arc::new(StaticWalletSource::with_balances(&[1_000_000]));
        let runner = runner(
            client,
            wallets,
            request(5, false),
            CancellationToken::new(),
        );

        for attempt in 1..=5u32 {
            let nominal = 100u64 << (attempt - 1);
            let delay = runner.backoff_delay_ms(attempt);
            assert!(delay >= nominal, "attempt {}: {} < {}", attempt, delay, nominal);
            assert!(
                delay <= nominal + nominal / 4,
                "attempt {}: {} above jitter bound",
                attempt,
                delay
            );
        }
    }
}
