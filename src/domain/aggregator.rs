//! Folds lifecycle events and terminal receipts into the run report.
//!
//! The aggregator is a pure fold over its inputs: replaying the same
//! stream through a fresh instance yields an identical report (the
//! timestamps come from the caller). It accumulates from the single
//! bus consumer task, so no locking is needed.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::warn;

use crate::domain::events::{EventKind, LifecycleEvent};
use crate::report::{
    ConfigSnapshot, ExecutionSummary, ReportMetadata, RunReport, VolumeSummary,
};
use crate::shared::types::{RunStatus, SwapReceipt, SwapStatus};

/// Everything the aggregator cannot learn from the stream itself.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub configuration: ConfigSnapshot,
    pub total_wallets: usize,
    pub selected_wallets: usize,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ResultAggregator {
    receipts: BTreeMap<usize, SwapReceipt>,
    terminal_events: BTreeMap<usize, usize>,
    retries_observed: usize,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe_event(&mut self, event: &LifecycleEvent) {
        if event.kind.is_terminal() {
            *self.terminal_events.entry(event.wallet_index).or_insert(0) += 1;
        }
        if let EventKind::RetryScheduled { .. } = event.kind {
            self.retries_observed += 1;
        }
    }

    /// Record a terminal receipt. One receipt per wallet is kept; a
    /// duplicate overwrites the previous entry with a warning.
    pub fn record_receipt(&mut self, receipt: SwapReceipt) {
        let index = receipt.wallet_index;
        if self.receipts.insert(index, receipt).is_some() {
            warn!("duplicate receipt for wallet {}, keeping the last", index);
        }
    }

    pub fn retries_observed(&self) -> usize {
        self.retries_observed
    }

    pub fn finalize(
        self,
        context: RunContext,
        status: RunStatus,
        ended_at: DateTime<Utc>,
        error_message: Option<String>,
    ) -> RunReport {
        for (wallet, count) in &self.terminal_events {
            if *count != 1 {
                warn!("wallet {} saw {} terminal events", wallet, count);
            }
        }

        let receipts: Vec<SwapReceipt> = self.receipts.into_values().collect();
        let successful = receipts
            .iter()
            .filter(|r| r.status == SwapStatus::Success)
            .count();
        let failed = receipts
            .iter()
            .filter(|r| r.status == SwapStatus::Failed)
            .count();
        let skipped = receipts
            .iter()
            .filter(|r| r.status == SwapStatus::Skipped)
            .count();

        let mut error_classification: BTreeMap<String, usize> = BTreeMap::new();
        for receipt in receipts.iter().filter(|r| r.status == SwapStatus::Failed) {
            let kind = receipt
                .error_kind
                .map(|k| k.as_str().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            *error_classification.entry(kind).or_insert(0) += 1;
        }

        // Volume totals cover successful swaps only.
        let total_input_volume: u64 = receipts
            .iter()
            .filter(|r| r.is_successful())
            .map(|r| r.input_amount)
            .sum();
        let total_output_volume: u64 = receipts
            .iter()
            .filter(|r| r.is_successful())
            .filter_map(|r| r.output_amount)
            .sum();
        let total_fees_collected: u64 = receipts.iter().filter_map(|r| r.fee_amount).sum();

        // Input-weighted mean over successes; null without successes.
        let impact_weight: u64 = receipts
            .iter()
            .filter(|r| r.is_successful() && r.price_impact_bps.is_some())
            .map(|r| r.input_amount)
            .sum();
        let average_price_impact_bps = if impact_weight > 0 {
            let weighted: f64 = receipts
                .iter()
                .filter(|r| r.is_successful())
                .filter_map(|r| {
                    r.price_impact_bps
                        .map(|bps| r.input_amount as f64 * bps as f64)
                })
                .sum();
            Some(weighted / impact_weight as f64)
        } else {
            None
        };

        let success_rate_percent = if receipts.is_empty() {
            0.0
        } else {
            successful as f64 * 100.0 / receipts.len() as f64
        };

        let duration_ms = (ended_at - context.started_at).num_milliseconds().max(0) as u64;

        RunReport {
            metadata: ReportMetadata {
                run_id: context.run_id,
                generated_at: ended_at,
                report_version: "1.0".to_string(),
            },
            configuration: context.configuration,
            execution_summary: ExecutionSummary {
                status,
                started_at: context.started_at,
                ended_at,
                duration_ms,
                total_wallets: context.total_wallets,
                selected_wallets: context.selected_wallets,
                successful_swaps: successful,
                failed_swaps: failed,
                skipped_swaps: skipped,
                success_rate_percent,
                error_classification,
                error_message,
            },
            volume_summary: VolumeSummary {
                total_input_volume,
                total_output_volume,
                total_fees_collected,
                average_price_impact_bps,
            },
            swap_results: receipts,
        }
    }
}
