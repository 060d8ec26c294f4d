use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};

use crate::shared::errors::AppError;
use crate::shared::types::{Mode, Operation, Strategy, WalletSelection};
use crate::shared::utils::to_base_units;

#[derive(Debug, Clone, Deserialize)]
pub struct DexCfg {
    pub base_url: String,
    #[serde(default = "default_quote_timeout_ms")]
    pub quote_timeout_ms: u64,
    #[serde(default = "default_execute_timeout_ms")]
    pub execute_timeout_ms: u64,
    /// Quotes older than this are re-fetched instead of executed.
    #[serde(default = "default_quote_ttl_ms")]
    pub quote_ttl_ms: u64,
}

fn default_quote_timeout_ms() -> u64 {
    10_000
}

fn default_execute_timeout_ms() -> u64 {
    60_000
}

fn default_quote_ttl_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenCfg {
    pub input: TokenInfo,
    pub output: TokenInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenInfo {
    pub symbol: String,
    /// Resolved via the aggregator token list when omitted.
    pub mint: Option<String>,
    pub decimals: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeCfg {
    pub operation: String,
    pub slippage_bps: u16,
    #[serde(default = "default_true")]
    pub verify: bool,
    #[serde(default)]
    pub collect_fee: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub retry_backoff_base_ms: u64,
    /// Minimum per-wallet input amount in UI units of the input token.
    #[serde(default)]
    pub minimum_input_amount: f64,
    pub run_deadline_ms: Option<u64>,
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Deserialize)]
pub struct AmountsCfg {
    pub strategy: String,
    pub base_amount: Option<f64>,
    pub percentage: Option<f64>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub custom_amounts: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionCfg {
    pub mode: String,
    #[serde(default)]
    pub delay_between_swaps_ms: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub delay_between_batches_ms: u64,
}

fn default_max_concurrent() -> usize {
    5
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_delay_ms() -> u64 {
    2_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletsCfg {
    pub file: String,
    #[serde(default = "default_selection")]
    pub selection: String,
    pub count: Option<usize>,
    pub indices: Option<Vec<usize>>,
}

fn default_selection() -> String {
    "all".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportCfg {
    #[serde(default = "default_report_dir")]
    pub output_dir: String,
    #[serde(default = "default_report_format")]
    pub format: String,
}

fn default_report_dir() -> String {
    "data/reports".to_string()
}

fn default_report_format() -> String {
    "json".to_string()
}

impl Default for ReportCfg {
    fn default() -> Self {
        Self {
            output_dir: default_report_dir(),
            format: default_report_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub dex: DexCfg,
    pub tokens: TokenCfg,
    pub trade: TradeCfg,
    pub amounts: AmountsCfg,
    pub execution: ExecutionCfg,
    pub wallets: WalletsCfg,
    #[serde(default)]
    pub report: ReportCfg,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path.as_ref())
            .with_context(|| format!("read config file {}", path.as_ref().display()))?;
        let cfg: Self = toml::from_str(&s).context("parse config file")?;
        Ok(cfg)
    }

    pub fn operation(&self) -> Result<Operation, AppError> {
        match self.trade.operation.to_lowercase().as_str() {
            "buy" => Ok(Operation::Buy),
            "sell" => Ok(Operation::Sell),
            other => Err(AppError::ConfigError(format!(
                "unknown operation: {}",
                other
            ))),
        }
    }

    /// Build the amount strategy, converting UI amounts to base units of
    /// the input token.
    pub fn strategy(&self) -> Result<Strategy, AppError> {
        let decimals = self.tokens.input.decimals;
        match self.amounts.strategy.to_lowercase().as_str() {
            "fixed" => {
                let base = self.amounts.base_amount.ok_or_else(|| {
                    AppError::ConfigError("fixed strategy requires base_amount".into())
                })?;
                if base <= 0.0 {
                    return Err(AppError::ConfigError(
                        "fixed strategy requires positive base_amount".into(),
                    ));
                }
                Ok(Strategy::Fixed {
                    base: to_base_units(base, decimals),
                })
            }
            "percentage" => {
                let fraction = self.amounts.percentage.ok_or_else(|| {
                    AppError::ConfigError("percentage strategy requires percentage".into())
                })?;
                Ok(Strategy::Percentage { fraction })
            }
            "random" => {
                let min = self.amounts.min_amount.ok_or_else(|| {
                    AppError::ConfigError("random strategy requires min_amount".into())
                })?;
                let max = self.amounts.max_amount.ok_or_else(|| {
                    AppError::ConfigError("random strategy requires max_amount".into())
                })?;
                Ok(Strategy::Random {
                    min: to_base_units(min, decimals),
                    max: to_base_units(max, decimals),
                })
            }
            "custom" => {
                let amounts = self.amounts.custom_amounts.clone().ok_or_else(|| {
                    AppError::ConfigError("custom strategy requires custom_amounts".into())
                })?;
                Ok(Strategy::Custom {
                    amounts: amounts
                        .into_iter()
                        .map(|a| to_base_units(a, decimals))
                        .collect(),
                })
            }
            other => Err(AppError::ConfigError(format!(
                "unknown amount strategy: {}",
                other
            ))),
        }
    }

    pub fn mode(&self) -> Result<Mode, AppError> {
        match self.execution.mode.to_lowercase().as_str() {
            "sequential" => Ok(Mode::Sequential {
                delay_ms: self.execution.delay_between_swaps_ms,
            }),
            "parallel" => Ok(Mode::Parallel {
                max_concurrent: self.execution.max_concurrent,
            }),
            "batch" => Ok(Mode::Batch {
                size: self.execution.batch_size,
                delay_ms: self.execution.delay_between_batches_ms,
            }),
            other => Err(AppError::ConfigError(format!(
                "unknown execution mode: {}",
                other
            ))),
        }
    }

    pub fn wallet_selection(&self) -> Result<WalletSelection, AppError> {
        match self.wallets.selection.to_lowercase().as_str() {
            "all" => Ok(WalletSelection::All),
            "first_n" => {
                let n = self.wallets.count.ok_or_else(|| {
                    AppError::ConfigError("first_n selection requires count".into())
                })?;
                if n == 0 {
                    return Err(AppError::ConfigError(
                        "first_n selection requires positive count".into(),
                    ));
                }
                Ok(WalletSelection::FirstN(n))
            }
            "custom" => {
                let indices = self.wallets.indices.clone().ok_or_else(|| {
                    AppError::ConfigError("custom selection requires indices".into())
                })?;
                Ok(WalletSelection::Custom(indices))
            }
            other => Err(AppError::ConfigError(format!(
                "unknown wallet selection: {}",
                other
            ))),
        }
    }
}

/// Write a starter configuration for the given operation.
pub fn write_template<P: AsRef<Path>>(operation: Operation, path: P) -> Result<()> {
    let template = match operation {
        Operation::Buy => BUY_TEMPLATE,
        Operation::Sell => SELL_TEMPLATE,
    };
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent).context("create template directory")?;
    }
    fs::write(path.as_ref(), template)
        .with_context(|| format!("write template {}", path.as_ref().display()))?;
    Ok(())
}

const BUY_TEMPLATE: &str = r#"[dex]
base_url = "http://localhost:8080"

[tokens.input]
symbol = "SOL"
decimals = 9

[tokens.output]
symbol = "USDC"
decimals = 6

[trade]
operation = "buy"
slippage_bps = 100
verify = true
collect_fee = false
max_retries = 3
retry_backoff_base_ms = 500
minimum_input_amount = 0.001

[amounts]
strategy = "fixed"
base_amount = 0.1

[execution]
mode = "sequential"
delay_between_swaps_ms = 500

[wallets]
file = "wallets.json"
selection = "all"

[report]
output_dir = "data/reports"
format = "json"
"#;

const SELL_TEMPLATE: &str = r#"[dex]
base_url = "http://localhost:8080"

[tokens.input]
symbol = "USDC"
decimals = 6

[tokens.output]
symbol = "SOL"
decimals = 9

[trade]
operation = "sell"
slippage_bps = 100
verify = true
collect_fee = false
max_retries = 3
retry_backoff_base_ms = 500
minimum_input_amount = 0.01

[amounts]
strategy = "percentage"
percentage = 0.5

[execution]
mode = "sequential"
delay_between_swaps_ms = 500

[wallets]
file = "wallets.json"
selection = "all"

[report]
output_dir = "data/reports"
format = "json"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Config {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn buy_template_parses_and_converts() {
        let cfg = parse(BUY_TEMPLATE);
        assert_eq!(cfg.operation().unwrap(), Operation::Buy);
        assert_eq!(
            cfg.strategy().unwrap(),
            Strategy::Fixed { base: 100_000_000 }
        );
        assert_eq!(cfg.mode().unwrap(), Mode::Sequential { delay_ms: 500 });
        assert_eq!(cfg.wallet_selection().unwrap(), WalletSelection::All);
        assert_eq!(cfg.dex.quote_ttl_ms, 10_000);
    }

    #[test]
    fn sell_template_uses_percentage() {
        let cfg = parse(SELL_TEMPLATE);
        assert_eq!(cfg.operation().unwrap(), Operation::Sell);
        assert_eq!(
            cfg.strategy().unwrap(),
            Strategy::Percentage { fraction: 0.5 }
        );
    }

    #[test]
    fn missing_strategy_field_is_config_error() {
        let mut cfg = parse(BUY_TEMPLATE);
        cfg.amounts.strategy = "random".into();
        cfg.amounts.min_amount = None;
        assert!(matches!(cfg.strategy(), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn custom_amounts_convert_to_base_units() {
        let mut cfg = parse(BUY_TEMPLATE);
        cfg.amounts.strategy = "custom".into();
        cfg.amounts.custom_amounts = Some(vec![0.1, 0.2]);
        assert_eq!(
            cfg.strategy().unwrap(),
            Strategy::Custom {
                amounts: vec![100_000_000, 200_000_000]
            }
        );
    }
}
