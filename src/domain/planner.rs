//! Per-wallet amount planning and admission.
//!
//! The planner is pure: given the fleet snapshot, a strategy, and the
//! run seed it always produces the same plans. It performs no I/O and
//! never mutates wallet state.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::shared::errors::AppError;
use crate::shared::types::{Strategy, Verdict, Wallet, WalletPlan};

/// Summary of an admission pass, logged before execution starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub admitted: usize,
    pub below_minimum: usize,
    pub insufficient_balance: usize,
    pub total_planned_volume: u64,
}

/// Compute one plan per wallet.
///
/// `wallets` and `balances` are parallel slices ordered by wallet index;
/// the `random` strategy draws in that order so the sequence is
/// reproducible from `seed`. A `custom` amount list whose length does
/// not match the wallet count is a configuration error surfaced before
/// any execution.
pub fn plan_amounts(
    wallets: &[Wallet],
    balances: &[u64],
    strategy: &Strategy,
    minimum_input_amount: u64,
    seed: u64,
) -> Result<Vec<WalletPlan>, AppError> {
    if let Strategy::Custom { amounts } = strategy {
        if amounts.len() != wallets.len() {
            return Err(AppError::ConfigError(format!(
                "custom amounts length {} does not match selected wallet count {}",
                amounts.len(),
                wallets.len()
            )));
        }
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut plans = Vec::with_capacity(wallets.len());

    for (wallet, &balance) in wallets.iter().zip(balances) {
        let amount = match strategy {
            Strategy::Fixed { base } => *base,
            Strategy::Percentage { fraction } => (balance as f64 * fraction).floor() as u64,
            Strategy::Random { min, max } => rng.gen_range(*min..=*max),
            Strategy::Custom { amounts } => amounts[plans.len()],
        };

        let verdict = if amount < minimum_input_amount {
            Verdict::BelowMinimum
        } else if amount > balance {
            Verdict::InsufficientBalance
        } else {
            Verdict::Ok
        };

        plans.push(WalletPlan {
            wallet: wallet.clone(),
            input_amount: amount,
            verdict,
        });
    }

    Ok(plans)
}

pub fn summarize(plans: &[WalletPlan]) -> PlanSummary {
    let mut summary = PlanSummary {
        admitted: 0,
        below_minimum: 0,
        insufficient_balance: 0,
        total_planned_volume: 0,
    };
    for plan in plans {
        match plan.verdict {
            Verdict::Ok => {
                summary.admitted += 1;
                summary.total_planned_volume += plan.input_amount;
            }
            Verdict::BelowMinimum => summary.below_minimum += 1,
            Verdict::InsufficientBalance => summary.insufficient_balance += 1,
            Verdict::Skip => {}
        }
    }
    summary
}

pub fn log_summary(plans: &[WalletPlan], strategy: &Strategy) {
    let summary = summarize(plans);
    info!(
        "planned {} of {} wallets with {} strategy (volume {}, below minimum {}, insufficient {})",
        summary.admitted,
        plans.len(),
        strategy.name(),
        summary.total_planned_volume,
        summary.below_minimum,
        summary.insufficient_balance,
    );
}
