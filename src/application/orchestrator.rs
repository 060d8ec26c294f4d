//! Top-level run driver.
//!
//! Validates the run configuration, snapshots balances once, plans
//! per-wallet amounts, dispatches the scheduler, and folds the event
//! stream into the final report. A run always produces a complete
//! report; pre-execution validation failures yield an `aborted_config`
//! report with no receipts.

use chrono::Utc;
use solana_sdk::pubkey::Pubkey;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::application::scheduler::Scheduler;
use crate::domain::aggregator::{ResultAggregator, RunContext};
use crate::domain::planner;
use crate::domain::progress::{ProgressBus, ProgressRenderer};
use crate::domain::runner::SwapRunner;
use crate::infrastructure::dex::DexClient;
use crate::infrastructure::wallets::WalletSource;
use crate::report::{ConfigSnapshot, ExecutionSummary, ReportMetadata, RunReport, VolumeSummary};
use crate::shared::config::TokenInfo;
use crate::shared::errors::AppError;
use crate::shared::types::{
    Mode, RunStatus, Strategy, SwapRequest, Token, Wallet, WalletPlan, WalletSelection,
};
use crate::shared::utils::{generate_run_id, seed_from_run_id};

pub struct Orchestrator {
    client: Arc<dyn DexClient>,
    wallets: Arc<dyn WalletSource>,
    cancel: CancellationToken,
    quote_ttl_ms: u64,
    mock: bool,
}

struct PreparedRun {
    total_wallets: usize,
    plans: Vec<WalletPlan>,
}

impl Orchestrator {
    pub fn new(
        client: Arc<dyn DexClient>,
        wallets: Arc<dyn WalletSource>,
        cancel: CancellationToken,
        quote_ttl_ms: u64,
        mock: bool,
    ) -> Self {
        Self {
            client,
            wallets,
            cancel,
            quote_ttl_ms,
            mock,
        }
    }

    /// Resolve a configured token to its canonical mint, using the
    /// aggregator's token list for bare symbols.
    pub async fn resolve_token(&self, info: &TokenInfo) -> Result<Token, AppError> {
        if let Some(mint) = &info.mint {
            let mint = Pubkey::from_str(mint)
                .map_err(|e| AppError::ConfigError(format!("invalid mint {}: {}", mint, e)))?;
            return Ok(Token {
                mint,
                symbol: Some(info.symbol.clone()),
                decimals: info.decimals,
            });
        }

        let tokens = self
            .client
            .supported_tokens()
            .await
            .map_err(|e| AppError::ConfigError(format!("token list unavailable: {}", e)))?;
        if let Some(mint) = tokens.get(&info.symbol.to_uppercase()) {
            return Ok(Token {
                mint: *mint,
                symbol: Some(info.symbol.clone()),
                decimals: info.decimals,
            });
        }
        // Long strings may themselves be mint addresses.
        if info.symbol.len() >= 32 {
            if let Ok(mint) = Pubkey::from_str(&info.symbol) {
                return Ok(Token {
                    mint,
                    symbol: None,
                    decimals: info.decimals,
                });
            }
        }
        Err(AppError::ConfigError(format!(
            "unsupported token: {}",
            info.symbol
        )))
    }

    /// Execute a full run. Always returns a complete report.
    pub async fn run(&self, request: SwapRequest, selection: WalletSelection) -> RunReport {
        let run_id = generate_run_id();
        let started_at = Utc::now();
        info!(
            "🚀 run {}: {} {} → {} ({} strategy, {} mode)",
            run_id,
            request.operation.as_str(),
            request.input_token.display(),
            request.output_token.display(),
            request.strategy.name(),
            request.mode.name(),
        );

        match self.prepare(&request, &selection, &run_id).await {
            Ok(prepared) => self.execute(run_id, request, prepared, started_at).await,
            Err(err) => {
                error!("run aborted before execution: {}", err);
                aborted_report(run_id, &request, self.mock, started_at, err.to_string())
            }
        }
    }

    async fn prepare(
        &self,
        request: &SwapRequest,
        selection: &WalletSelection,
        run_id: &str,
    ) -> Result<PreparedRun, AppError> {
        validate_request(request)?;

        let all_wallets = self.wallets.list_wallets().await?;
        let total_wallets = all_wallets.len();
        let selected = select_wallets(all_wallets, selection)?;
        if selected.is_empty() {
            return Err(AppError::ConfigError("no wallets selected".into()));
        }

        // Single balance snapshot per run; verification re-reads are the
        // runner's concern.
        let mut balances = Vec::with_capacity(selected.len());
        for wallet in &selected {
            balances.push(
                self.wallets
                    .balance(&wallet.address, &request.input_token.mint)
                    .await?,
            );
        }

        let plans = planner::plan_amounts(
            &selected,
            &balances,
            &request.strategy,
            request.minimum_input_amount,
            seed_from_run_id(run_id),
        )?;
        planner::log_summary(&plans, &request.strategy);

        if !plans.iter().any(|p| p.verdict.is_admitted()) {
            return Err(AppError::ConfigError(
                "no wallet passed admission; nothing to execute".into(),
            ));
        }

        Ok(PreparedRun {
            total_wallets,
            plans,
        })
    }

    async fn execute(
        &self,
        run_id: String,
        request: SwapRequest,
        prepared: PreparedRun,
        started_at: chrono::DateTime<Utc>,
    ) -> RunReport {
        let cancel = self.cancel.child_token();
        let deadline_fired = Arc::new(AtomicBool::new(false));
        if let Some(deadline_ms) = request.run_deadline_ms {
            let cancel = cancel.clone();
            let deadline_fired = deadline_fired.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(Duration::from_millis(deadline_ms)) => {
                        deadline_fired.store(true, Ordering::SeqCst);
                        info!("⏰ run deadline of {}ms expired", deadline_ms);
                        cancel.cancel();
                    }
                }
            });
        }

        let (bus, mut rx) = ProgressBus::new(256);
        let selected_wallets = prepared.plans.len();
        let consumer = tokio::spawn(async move {
            let mut renderer = ProgressRenderer::new(selected_wallets);
            let mut aggregator = ResultAggregator::new();
            while let Some(event) = rx.recv().await {
                renderer.observe(&event);
                aggregator.observe_event(&event);
            }
            aggregator
        });

        let request = Arc::new(request);
        let runner = Arc::new(SwapRunner::new(
            self.client.clone(),
            self.wallets.clone(),
            request.clone(),
            cancel.clone(),
            self.quote_ttl_ms,
        ));
        let scheduler = Scheduler::new(request.mode, cancel.clone());
        let receipts = scheduler.run(prepared.plans, runner, &bus).await;

        // Closing the bus lets the consumer drain every published event
        // before the report is finalized.
        drop(bus);
        let mut aggregator = match consumer.await {
            Ok(aggregator) => aggregator,
            Err(err) => {
                error!("progress consumer failed: {}", err);
                ResultAggregator::new()
            }
        };
        for receipt in receipts {
            aggregator.record_receipt(receipt);
        }

        let status = if cancel.is_cancelled() {
            if deadline_fired.load(Ordering::SeqCst) {
                RunStatus::DeadlineExpired
            } else {
                RunStatus::Cancelled
            }
        } else {
            RunStatus::Completed
        };
        cancel.cancel();

        let context = RunContext {
            run_id,
            configuration: snapshot(&request, self.mock),
            total_wallets: prepared.total_wallets,
            selected_wallets,
            started_at,
        };
        let report = aggregator.finalize(context, status, Utc::now(), None);
        info!("{}", report.console_summary());
        report
    }
}

fn validate_request(request: &SwapRequest) -> Result<(), AppError> {
    if request.slippage_bps > 10_000 {
        return Err(AppError::ConfigError(format!(
            "slippage_bps {} out of range [0, 10000]",
            request.slippage_bps
        )));
    }
    if request.retry_backoff_base_ms == 0 {
        return Err(AppError::ConfigError(
            "retry_backoff_base_ms must be positive".into(),
        ));
    }
    if request.input_token.mint == request.output_token.mint {
        return Err(AppError::ConfigError(
            "input and output tokens cannot be the same".into(),
        ));
    }
    match &request.strategy {
        Strategy::Fixed { base } => {
            if *base == 0 {
                return Err(AppError::ConfigError(
                    "fixed strategy requires a positive amount".into(),
                ));
            }
        }
        Strategy::Percentage { fraction } => {
            if !(*fraction > 0.0 && *fraction <= 1.0) {
                return Err(AppError::ConfigError(format!(
                    "percentage fraction {} out of range (0, 1]",
                    fraction
                )));
            }
        }
        Strategy::Random { min, max } => {
            if min > max {
                return Err(AppError::ConfigError(format!(
                    "random range is inverted: {} > {}",
                    min, max
                )));
            }
        }
        Strategy::Custom { amounts } => {
            if amounts.is_empty() {
                return Err(AppError::ConfigError(
                    "custom strategy requires at least one amount".into(),
                ));
            }
        }
    }
    match &request.mode {
        Mode::Parallel { max_concurrent } => {
            if *max_concurrent == 0 {
                return Err(AppError::ConfigError(
                    "parallel mode requires max_concurrent >= 1".into(),
                ));
            }
        }
        Mode::Batch { size, .. } => {
            if *size == 0 {
                return Err(AppError::ConfigError("batch mode requires size >= 1".into()));
            }
        }
        Mode::Sequential { .. } => {}
    }
    Ok(())
}

fn select_wallets(
    wallets: Vec<Wallet>,
    selection: &WalletSelection,
) -> Result<Vec<Wallet>, AppError> {
    let mut selected = match selection {
        WalletSelection::All => wallets,
        WalletSelection::FirstN(n) => wallets.into_iter().take(*n).collect(),
        WalletSelection::Custom(indices) => {
            let mut picked = Vec::with_capacity(indices.len());
            for &index in indices {
                let wallet = wallets.iter().find(|w| w.index == index).ok_or_else(|| {
                    AppError::ConfigError(format!("wallet index {} out of range", index))
                })?;
                picked.push(wallet.clone());
            }
            picked
        }
    };
    selected.sort_by_key(|w| w.index);
    selected.dedup_by_key(|w| w.index);
    Ok(selected)
}

fn snapshot(request: &SwapRequest, mock: bool) -> ConfigSnapshot {
    ConfigSnapshot {
        operation: request.operation.as_str().to_string(),
        input_token: request.input_token.display(),
        output_token: request.output_token.display(),
        input_mint: request.input_token.mint.to_string(),
        output_mint: request.output_token.mint.to_string(),
        strategy: request.strategy.clone(),
        mode: request.mode,
        slippage_bps: request.slippage_bps,
        verify: request.verify,
        collect_fee: request.collect_fee,
        max_retries: request.max_retries,
        minimum_input_amount: request.minimum_input_amount,
        run_deadline_ms: request.run_deadline_ms,
        mock,
    }
}

fn aborted_report(
    run_id: String,
    request: &SwapRequest,
    mock: bool,
    started_at: chrono::DateTime<Utc>,
    error_message: String,
) -> RunReport {
    let ended_at = Utc::now();
    RunReport {
        metadata: ReportMetadata {
            run_id,
            generated_at: ended_at,
            report_version: "1.0".to_string(),
        },
        configuration: snapshot(request, mock),
        execution_summary: ExecutionSummary {
            status: RunStatus::AbortedConfig,
            started_at,
            ended_at,
            duration_ms: (ended_at - started_at).num_milliseconds().max(0) as u64,
            total_wallets: 0,
            selected_wallets: 0,
            successful_swaps: 0,
            failed_swaps: 0,
            skipped_swaps: 0,
            success_rate_percent: 0.0,
            error_classification: BTreeMap::from([("config".to_string(), 1)]),
            error_message: Some(error_message),
        },
        volume_summary: VolumeSummary {
            total_input_volume: 0,
            total_output_volume: 0,
            total_fees_collected: 0,
            average_price_impact_bps: None,
        },
        swap_results: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::dex::{MockDexClient, MockExecute};
    use crate::infrastructure::wallets::StaticWalletSource;
    use crate::shared::errors::SwapError;
    use crate::shared::types::{Mode, Operation, SwapStatus};

    const SOL: u64 = 1_000_000_000;

    fn sol_token() -> Token {
        Token {
            mint: Pubkey::from_str("So11111111111111111111111111111111111111112").unwrap(),
            symbol: Some("SOL".into()),
            decimals: 9,
        }
    }

    fn usdc_token() -> Token {
        Token {
            mint: Pubkey::from_str("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v").unwrap(),
            symbol: Some("USDC".into()),
            decimals: 6,
        }
    }

    fn request(strategy: Strategy, mode: Mode, max_retries: u32) -> SwapRequest {
        SwapRequest {
            operation: Operation::Buy,
            input_token: sol_token(),
            output_token: usdc_token(),
            strategy,
            mode,
            slippage_bps: 50,
            verify: false,
            max_retries,
            retry_backoff_base_ms: 100,
            collect_fee: false,
            minimum_input_amount: 0,
            run_deadline_ms: None,
        }
    }

    fn orchestrator(
        client: Arc<MockDexClient>,
        wallets: Arc<StaticWalletSource>,
    ) -> Orchestrator {
        Orchestrator::new(client, wallets, CancellationToken::new(), 10_000, true)
    }

    #[tokio::test]
    async fn fixed_sequential_all_succeed() {
        let client = Arc::new(MockDexClient::new(0.096, 50));
        let wallets = Arc::new(StaticWalletSource::with_balances(&[SOL, SOL, SOL]));
        let orchestrator = orchestrator(client, wallets);

        let report = orchestrator
            .run(
                request(
                    Strategy::Fixed {
                        base: SOL / 10,
                    },
                    Mode::Sequential { delay_ms: 0 },
                    0,
                ),
                WalletSelection::All,
            )
            .await;

        let summary = &report.execution_summary;
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.successful_swaps, 3);
        assert_eq!(summary.failed_swaps, 0);
        assert_eq!(summary.skipped_swaps, 0);
        assert_eq!(report.volume_summary.total_input_volume, 300_000_000);
        assert_eq!(report.volume_summary.total_output_volume, 28_800_000);
        assert_eq!(report.volume_summary.average_price_impact_bps, Some(50.0));
        assert!(report
            .swap_results
            .iter()
            .all(|r| r.tx_id.is_some() && r.attempts == 1));
    }

    #[tokio::test]
    async fn percentage_parallel_skips_underfunded_wallet() {
        let client = Arc::new(MockDexClient::new(1.0, 10));
        let wallets = Arc::new(StaticWalletSource::with_balances(&[SOL, 0, SOL / 2]));
        let orchestrator = orchestrator(client, wallets);

        let mut req = request(
            Strategy::Percentage { fraction: 0.5 },
            Mode::Parallel { max_concurrent: 2 },
            0,
        );
        req.minimum_input_amount = SOL / 100;

        let report = orchestrator.run(req, WalletSelection::All).await;
        let summary = &report.execution_summary;

        assert_eq!(summary.successful_swaps, 2);
        assert_eq!(summary.skipped_swaps, 1);
        assert_eq!(
            summary.successful_swaps + summary.failed_swaps + summary.skipped_swaps,
            3
        );
        assert_eq!(report.volume_summary.total_input_volume, 750_000_000);

        let skipped = &report.swap_results[1];
        assert_eq!(skipped.status, SwapStatus::Skipped);
        assert!(skipped.tx_id.is_none());
        assert!(skipped.output_amount.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn random_batch_retries_slippage_and_pauses_between_groups() {
        let client = Arc::new(
            MockDexClient::new(1.0, 10)
                .with_delays(Duration::ZERO, Duration::from_millis(10)),
        );
        for key in ["key0", "key1"] {
            client.script_execute(
                key,
                vec![
                    MockExecute::Fail(SwapError::SlippageExceeded("guard".into())),
                    MockExecute::Success { verified: true },
                ],
            );
        }
        let wallets = Arc::new(StaticWalletSource::with_balances(&[SOL; 4]));
        let orchestrator = orchestrator(client, wallets);

        let started = tokio::time::Instant::now();
        let report = orchestrator
            .run(
                request(
                    Strategy::Random {
                        min: SOL / 20,
                        max: SOL / 4,
                    },
                    Mode::Batch {
                        size: 2,
                        delay_ms: 100,
                    },
                    2,
                ),
                WalletSelection::All,
            )
            .await;
        let elapsed = started.elapsed();

        let summary = &report.execution_summary;
        assert_eq!(summary.successful_swaps, 4);
        assert!(report.swap_results[0].attempts >= 2);
        assert!(report.swap_results[1].attempts >= 2);
        assert_eq!(report.swap_results[2].attempts, 1);
        assert!(elapsed >= Duration::from_millis(100), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_skips_remaining_wallets() {
        let client = Arc::new(
            MockDexClient::new(1.0, 10)
                .with_delays(Duration::ZERO, Duration::from_millis(500)),
        );
        let wallets = Arc::new(StaticWalletSource::with_balances(&[SOL; 4]));
        let orchestrator = orchestrator(client, wallets);

        let mut req = request(
            Strategy::Fixed { base: SOL / 10 },
            Mode::Sequential { delay_ms: 1_000 },
            0,
        );
        req.run_deadline_ms = Some(1_700);

        let report = orchestrator.run(req, WalletSelection::All).await;
        let summary = &report.execution_summary;

        assert_eq!(summary.status, RunStatus::DeadlineExpired);
        assert_eq!(summary.successful_swaps, 2);
        assert_eq!(summary.skipped_swaps, 2);
        assert_eq!(report.swap_results[0].status, SwapStatus::Success);
        assert_eq!(report.swap_results[1].status, SwapStatus::Success);
        assert_eq!(report.swap_results[2].status, SwapStatus::Skipped);
        assert_eq!(report.swap_results[3].status, SwapStatus::Skipped);
    }

    #[tokio::test]
    async fn custom_length_mismatch_aborts_before_execution() {
        let client = Arc::new(MockDexClient::new(1.0, 10));
        let wallets = Arc::new(StaticWalletSource::with_balances(&[SOL, SOL, SOL]));
        let orchestrator = orchestrator(client.clone(), wallets);

        let report = orchestrator
            .run(
                request(
                    Strategy::Custom {
                        amounts: vec![SOL / 10, SOL / 5],
                    },
                    Mode::Sequential { delay_ms: 0 },
                    0,
                ),
                WalletSelection::All,
            )
            .await;

        let summary = &report.execution_summary;
        assert_eq!(summary.status, RunStatus::AbortedConfig);
        assert!(report.swap_results.is_empty());
        assert_eq!(summary.error_classification["config"], 1);
        assert_eq!(client.executes_started(), 0);
    }

    #[tokio::test]
    async fn verification_failure_is_reported_with_transaction_id() {
        let client = Arc::new(MockDexClient::new(1.0, 10));
        client.script_execute("key0", vec![MockExecute::Success { verified: false }]);
        let wallets = Arc::new(StaticWalletSource::with_balances(&[SOL]));
        let orchestrator = orchestrator(client, wallets);

        let mut req = request(
            Strategy::Fixed { base: SOL / 10 },
            Mode::Sequential { delay_ms: 0 },
            0,
        );
        req.verify = true;

        let report = orchestrator.run(req, WalletSelection::All).await;
        let summary = &report.execution_summary;

        assert_eq!(summary.failed_swaps, 1);
        assert_eq!(summary.error_classification["verification"], 1);
        let receipt = &report.swap_results[0];
        assert_eq!(receipt.status, SwapStatus::Failed);
        assert!(receipt.tx_id.is_some());
        // Unverified output never counts toward volume.
        assert_eq!(report.volume_summary.total_output_volume, 0);
    }

    #[tokio::test]
    async fn no_admitted_wallet_aborts() {
        let client = Arc::new(MockDexClient::new(1.0, 10));
        let wallets = Arc::new(StaticWalletSource::with_balances(&[100, 100]));
        let orchestrator = orchestrator(client, wallets);

        let report = orchestrator
            .run(
                request(
                    Strategy::Fixed { base: SOL },
                    Mode::Sequential { delay_ms: 0 },
                    0,
                ),
                WalletSelection::All,
            )
            .await;

        assert_eq!(report.execution_summary.status, RunStatus::AbortedConfig);
        assert!(report.swap_results.is_empty());
    }

    #[tokio::test]
    async fn first_n_selection_limits_the_fleet() {
        let client = Arc::new(MockDexClient::new(1.0, 10));
        let wallets = Arc::new(StaticWalletSource::with_balances(&[SOL; 5]));
        let orchestrator = orchestrator(client, wallets);

        let report = orchestrator
            .run(
                request(
                    Strategy::Fixed { base: SOL / 10 },
                    Mode::Sequential { delay_ms: 0 },
                    0,
                ),
                WalletSelection::FirstN(2),
            )
            .await;

        assert_eq!(report.execution_summary.selected_wallets, 2);
        assert_eq!(report.execution_summary.total_wallets, 5);
        assert_eq!(report.execution_summary.successful_swaps, 2);
    }

    #[tokio::test]
    async fn custom_selection_rejects_out_of_range_index() {
        let client = Arc::new(MockDexClient::new(1.0, 10));
        let wallets = Arc::new(StaticWalletSource::with_balances(&[SOL, SOL]));
        let orchestrator = orchestrator(client, wallets);

        let report = orchestrator
            .run(
                request(
                    Strategy::Fixed { base: SOL / 10 },
                    Mode::Sequential { delay_ms: 0 },
                    0,
                ),
                WalletSelection::Custom(vec![0, 7]),
            )
            .await;

        assert_eq!(report.execution_summary.status, RunStatus::AbortedConfig);
    }

    #[tokio::test]
    async fn resolve_token_by_symbol_and_mint() {
        let client = Arc::new(MockDexClient::new(1.0, 10));
        let wallets = Arc::new(StaticWalletSource::with_balances(&[SOL]));
        let orchestrator = orchestrator(client, wallets);

        let by_symbol = orchestrator
            .resolve_token(&TokenInfo {
                symbol: "sol".into(),
                mint: None,
                decimals: 9,
            })
            .await
            .unwrap();
        assert_eq!(by_symbol.mint, sol_token().mint);

        let by_mint = orchestrator
            .resolve_token(&TokenInfo {
                symbol: "whatever".into(),
                mint: Some(usdc_token().mint.to_string()),
                decimals: 6,
            })
            .await
            .unwrap();
        assert_eq!(by_mint.mint, usdc_token().mint);

        let unknown = orchestrator
            .resolve_token(&TokenInfo {
                symbol: "NOPE".into(),
                mint: None,
                decimals: 0,
            })
            .await;
        assert!(unknown.is_err());
    }

    #[tokio::test]
    async fn external_cancellation_is_reported_as_cancelled() {
        let client = Arc::new(MockDexClient::new(1.0, 10));
        let wallets = Arc::new(StaticWalletSource::with_balances(&[SOL; 3]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let orchestrator = Orchestrator::new(client, wallets, cancel, 10_000, true);

        let report = orchestrator
            .run(
                request(
                    Strategy::Fixed { base: SOL / 10 },
                    Mode::Sequential { delay_ms: 0 },
                    0,
                ),
                WalletSelection::All,
            )
            .await;

        assert_eq!(report.execution_summary.status, RunStatus::Cancelled);
        assert_eq!(report.execution_summary.skipped_swaps, 3);
    }
}
