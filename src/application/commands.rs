//! CLI commands and handlers
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::orchestrator::Orchestrator;
use crate::infrastructure::dex::{DexClient, DexClientConfig, HttpDexClient, MockDexClient};
use crate::infrastructure::wallets::{FileWalletSource, WalletSource};
use crate::shared::config::{write_template, Config};
use crate::shared::errors::AppError;
use crate::shared::types::{Operation, RunStatus, SwapRequest};
use crate::shared::utils::to_base_units;

/// Main CLI application
#[derive(Parser)]
#[command(name = "swapfleet")]
#[command(about = "Multi-wallet SPL token swap orchestrator")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "Config.toml")]
    pub config: PathBuf,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Execute a swap run from the configuration file
    Run {
        /// Use the scripted aggregator stub instead of the network
        #[arg(long, default_value_t = false)]
        mock: bool,

        /// Override the report output directory
        #[arg(long)]
        report_dir: Option<String>,

        /// Override the report format (json or csv)
        #[arg(long)]
        format: Option<String>,

        /// Skip writing the report file
        #[arg(long, default_value_t = false)]
        no_save: bool,
    },

    /// Write a starter configuration file
    Template {
        /// Operation the template is for: buy or sell
        #[arg(long)]
        operation: String,

        /// Output path for the template
        #[arg(long)]
        output: PathBuf,
    },

    /// List tokens supported by the aggregator
    Tokens,
}

/// Command execution service
pub struct CommandExecutor;

impl CommandExecutor {
    pub async fn execute(cli: &Cli) -> Result<(), AppError> {
        match &cli.command {
            Commands::Run {
                mock,
                report_dir,
                format,
                no_save,
            } => {
                Self::run_swaps(
                    &cli.config,
                    *mock,
                    report_dir.as_deref(),
                    format.as_deref(),
                    *no_save,
                )
                .await
            }
            Commands::Template { operation, output } => Self::create_template(operation, output),
            Commands::Tokens => Self::list_tokens(&cli.config).await,
        }
    }

    async fn run_swaps(
        config_path: &PathBuf,
        mock: bool,
        report_dir: Option<&str>,
        format: Option<&str>,
        no_save: bool,
    ) -> Result<(), AppError> {
        let config = load_config(config_path)?;
        let client = build_client(&config, mock);
        let wallets: Arc<dyn WalletSource> = Arc::new(
            FileWalletSource::from_file(&config.wallets.file)
                .map_err(|e| AppError::WalletError(e.to_string()))?,
        );

        let cancel = CancellationToken::new();
        let ctrl_c_cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling run");
                ctrl_c_cancel.cancel();
            }
        });

        let orchestrator = Orchestrator::new(
            client,
            wallets,
            cancel,
            config.dex.quote_ttl_ms,
            mock,
        );
        let request = build_request(&orchestrator, &config).await?;
        let selection = config.wallet_selection()?;

        let report = orchestrator.run(request, selection).await;
        println!("{}", report.console_summary());

        if !no_save {
            let dir = report_dir.unwrap_or(&config.report.output_dir);
            let format = format.unwrap_or(&config.report.format);
            let path = report
                .save(dir, format)
                .map_err(|e| AppError::ReportError(e.to_string()))?;
            info!("📄 report saved to {}", path.display());
        }

        if report.execution_summary.status == RunStatus::AbortedConfig {
            return Err(AppError::ConfigError(
                report
                    .execution_summary
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "run aborted before execution".into()),
            ));
        }
        Ok(())
    }

    fn create_template(operation: &str, output: &PathBuf) -> Result<(), AppError> {
        let operation = match operation.to_lowercase().as_str() {
            "buy" => Operation::Buy,
            "sell" => Operation::Sell,
            other => {
                return Err(AppError::ConfigError(format!(
                    "unknown operation: {}",
                    other
                )))
            }
        };
        write_template(operation, output).map_err(|e| AppError::ConfigError(e.to_string()))?;
        println!("✅ template written to {}", output.display());
        Ok(())
    }

    async fn list_tokens(config_path: &PathBuf) -> Result<(), AppError> {
        let config = load_config(config_path)?;
        let client = build_client(&config, false);
        let tokens = client
            .supported_tokens()
            .await
            .map_err(|e| AppError::ConfigError(format!("token list unavailable: {}", e)))?;

        let mut sorted: Vec<_> = tokens.into_iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        println!("Supported tokens ({}):", sorted.len());
        for (symbol, mint) in sorted {
            println!("  {:<8} {}", symbol, mint);
        }
        Ok(())
    }
}

fn load_config(path: &PathBuf) -> Result<Config, AppError> {
    Config::from_file(path).map_err(|e| AppError::ConfigError(e.to_string()))
}

fn build_client(config: &Config, mock: bool) -> Arc<dyn DexClient> {
    if mock {
        // Flat synthetic pricing with a small impact, like a quiet pool.
        Arc::new(MockDexClient::new(1.0, 25))
    } else {
        Arc::new(HttpDexClient::new(DexClientConfig {
            base_url: config.dex.base_url.clone(),
            quote_timeout_ms: config.dex.quote_timeout_ms,
            execute_timeout_ms: config.dex.execute_timeout_ms,
            max_retries: config.trade.max_retries,
            retry_backoff_base_ms: config.trade.retry_backoff_base_ms,
        }))
    }
}

async fn build_request(
    orchestrator: &Orchestrator,
    config: &Config,
) -> Result<SwapRequest, AppError> {
    let input_token = orchestrator.resolve_token(&config.tokens.input).await?;
    let output_token = orchestrator.resolve_token(&config.tokens.output).await?;

    Ok(SwapRequest {
        operation: config.operation()?,
        minimum_input_amount: to_base_units(
            config.trade.minimum_input_amount,
            config.tokens.input.decimals,
        ),
        strategy: config.strategy()?,
        mode: config.mode()?,
        slippage_bps: config.trade.slippage_bps,
        verify: config.trade.verify,
        max_retries: config.trade.max_retries,
        retry_backoff_base_ms: config.trade.retry_backoff_base_ms,
        collect_fee: config.trade.collect_fee,
        run_deadline_ms: config.trade.run_deadline_ms,
        input_token,
        output_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_command_parses_flags() {
        let cli = Cli::parse_from([
            "swapfleet",
            "--config",
            "Other.toml",
            "run",
            "--mock",
            "--format",
            "csv",
        ]);
        assert_eq!(cli.config, PathBuf::from("Other.toml"));
        match cli.command {
            Commands::Run { mock, format, .. } => {
                assert!(mock);
                assert_eq!(format.as_deref(), Some("csv"));
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn template_command_requires_operation_and_output() {
        let result = Cli::try_parse_from(["swapfleet", "template", "--operation", "buy"]);
        assert!(result.is_err());

        let cli = Cli::parse_from([
            "swapfleet",
            "template",
            "--operation",
            "sell",
            "--output",
            "Sell.toml",
        ]);
        match cli.command {
            Commands::Template { operation, output } => {
                assert_eq!(operation, "sell");
                assert_eq!(output, PathBuf::from("Sell.toml"));
            }
            _ => panic!("expected template command"),
        }
    }
}
