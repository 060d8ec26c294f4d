// src/report.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::shared::types::{Mode, RunStatus, Strategy, SwapReceipt};

/// Canonical run report. The JSON rendering is the source of truth;
/// CSV is a value-preserving projection of `swap_results`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub metadata: ReportMetadata,
    pub configuration: ConfigSnapshot,
    pub execution_summary: ExecutionSummary,
    pub volume_summary: VolumeSummary,
    pub swap_results: Vec<SwapReceipt>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub report_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigSnapshot {
    pub operation: String,
    pub input_token: String,
    pub output_token: String,
    pub input_mint: String,
    pub output_mint: String,
    pub strategy: Strategy,
    pub mode: Mode,
    pub slippage_bps: u16,
    pub verify: bool,
    pub collect_fee: bool,
    pub max_retries: u32,
    pub minimum_input_amount: u64,
    pub run_deadline_ms: Option<u64>,
    pub mock: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSummary {
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub total_wallets: usize,
    pub selected_wallets: usize,
    pub successful_swaps: usize,
    pub failed_swaps: usize,
    pub skipped_swaps: usize,
    pub success_rate_percent: f64,
    pub error_classification: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeSummary {
    pub total_input_volume: u64,
    pub total_output_volume: u64,
    pub total_fees_collected: u64,
    pub average_price_impact_bps: Option<f64>,
}

impl RunReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// One row per swap result, preserving the JSON field values.
    pub fn to_csv(&self) -> String {
        let mut out = String::from(
            "wallet_index,status,transaction_id,input_amount,output_amount,fee_amount,price_impact_bps,error_kind,error_detail,attempts,duration_ms\n",
        );
        for receipt in &self.swap_results {
            let row = [
                receipt.wallet_index.to_string(),
                receipt.status.as_str().to_string(),
                receipt.tx_id.clone().unwrap_or_default(),
                receipt.input_amount.to_string(),
                receipt
                    .output_amount
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
                receipt
                    .fee_amount
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
                receipt
                    .price_impact_bps
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
                receipt
                    .error_kind
                    .map(|k| k.as_str().to_string())
                    .unwrap_or_default(),
                csv_quote(receipt.error_detail.as_deref().unwrap_or_default()),
                receipt.attempts.to_string(),
                receipt.duration_ms.to_string(),
            ];
            out.push_str(&row.join(","));
            out.push('\n');
        }
        out
    }

    /// Operator-facing one-screen summary.
    pub fn console_summary(&self) -> String {
        let summary = &self.execution_summary;
        let volume = &self.volume_summary;
        let mut lines = vec![
            format!(
                "🏁 Run {} {} in {}ms",
                self.metadata.run_id,
                summary.status.as_str(),
                summary.duration_ms
            ),
            format!(
                "   {} {} → {}",
                self.configuration.operation,
                self.configuration.input_token,
                self.configuration.output_token
            ),
            format!(
                "   swaps: {} ok / {} failed / {} skipped of {} ({:.1}%)",
                summary.successful_swaps,
                summary.failed_swaps,
                summary.skipped_swaps,
                summary.selected_wallets,
                summary.success_rate_percent
            ),
            format!(
                "   volume: {} in / {} out, fees {}",
                volume.total_input_volume, volume.total_output_volume, volume.total_fees_collected
            ),
        ];
        if let Some(impact) = volume.average_price_impact_bps {
            lines.push(format!("   avg price impact: {:.1} bps", impact));
        }
        for (kind, count) in &summary.error_classification {
            lines.push(format!("   ⚠️  {} × {}", count, kind));
        }
        lines.join("\n")
    }

    /// Write the report to a timestamped file under `dir`.
    pub fn save<P: AsRef<Path>>(&self, dir: P, format: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(dir.as_ref()).context("create report directory")?;
        let filename = format!(
            "{}_report_{}.{}",
            self.configuration.operation,
            self.metadata.generated_at.format("%Y%m%d_%H%M%S"),
            format,
        );
        let path = dir.as_ref().join(filename);
        let body = match format {
            "json" => self.to_json().context("serialize report")?,
            "csv" => self.to_csv(),
            other => anyhow::bail!("unsupported report format: {}", other),
        };
        std::fs::write(&path, body).context("write report file")?;
        Ok(path)
    }
}

fn csv_quote(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
