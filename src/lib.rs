//! Swapfleet - multi-wallet SPL token swap orchestrator
//! Plans per-wallet amounts, schedules swaps under a concurrency
//! discipline, and aggregates receipts into a run report.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod report;
pub mod shared;

// Re-export main types for convenience
pub use application::orchestrator::Orchestrator;
pub use application::scheduler::Scheduler;
pub use domain::aggregator::ResultAggregator;
pub use domain::runner::SwapRunner;
pub use infrastructure::dex::{DexClient, HttpDexClient, MockDexClient};
pub use report::RunReport;
