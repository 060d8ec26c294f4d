//! Dispatches per-wallet swap runs under one of three concurrency
//! disciplines. Plans are admitted in ascending wallet-index order in
//! every mode; cancellation stops new admissions while runners that
//! already started reach a terminal state on their own.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::progress::ProgressBus;
use crate::domain::runner::SwapRunner;
use crate::shared::types::{Mode, SwapReceipt, WalletPlan};

pub struct Scheduler {
    mode: Mode,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(mode: Mode, cancel: CancellationToken) -> Self {
        Self { mode, cancel }
    }

    /// Run every plan to a terminal receipt. The returned receipts are
    /// ordered by wallet index.
    pub async fn run(
        &self,
        plans: Vec<WalletPlan>,
        runner: Arc<SwapRunner>,
        bus: &ProgressBus,
    ) -> Vec<SwapReceipt> {
        info!(
            "dispatching {} plans in {} mode",
            plans.len(),
            self.mode.name()
        );
        match self.mode {
            Mode::Sequential { delay_ms } => self.run_sequential(plans, runner, bus, delay_ms).await,
            Mode::Parallel { max_concurrent } => {
                self.run_parallel(plans, runner, bus, max_concurrent).await
            }
            Mode::Batch { size, delay_ms } => self.run_batch(plans, runner, bus, size, delay_ms).await,
        }
    }

    async fn run_sequential(
        &self,
        plans: Vec<WalletPlan>,
        runner: Arc<SwapRunner>,
        bus: &ProgressBus,
        delay_ms: u64,
    ) -> Vec<SwapReceipt> {
        let total = plans.len();
        let mut receipts = Vec::with_capacity(total);
        for (position, plan) in plans.into_iter().enumerate() {
            let publisher = bus.publisher(plan.wallet.index);
            receipts.push(runner.run(&plan, &publisher).await);

            let is_last = position + 1 == total;
            if !is_last && delay_ms > 0 && !self.cancel.is_cancelled() {
                self.idle(delay_ms).await;
            }
        }
        receipts
    }

    async fn run_parallel(
        &self,
        plans: Vec<WalletPlan>,
        runner: Arc<SwapRunner>,
        bus: &ProgressBus,
        max_concurrent: usize,
    ) -> Vec<SwapReceipt> {
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let mut handles = Vec::with_capacity(plans.len());

        // Spawn in index order; the semaphore queue is fair, so
        // admission follows spawn order.
        for plan in plans {
            let semaphore = semaphore.clone();
            let runner = runner.clone();
            let publisher = bus.publisher(plan.wallet.index);
            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("scheduler semaphore closed");
                runner.run(&plan, &publisher).await
            });
            handles.push(handle);
        }

        let mut receipts = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(receipt) => receipts.push(receipt),
                Err(err) => warn!("swap task aborted: {}", err),
            }
        }
        receipts
    }

    async fn run_batch(
        &self,
        plans: Vec<WalletPlan>,
        runner: Arc<SwapRunner>,
        bus: &ProgressBus,
        size: usize,
        delay_ms: u64,
    ) -> Vec<SwapReceipt> {
        let size = size.max(1);
        let groups: Vec<Vec<WalletPlan>> = plans.chunks(size).map(|c| c.to_vec()).collect();
        let total_groups = groups.len();
        let mut receipts = Vec::new();

        for (group_index, group) in groups.into_iter().enumerate() {
            info!(
                "executing batch {}/{} ({} swaps)",
                group_index + 1,
                total_groups,
                group.len()
            );
            let futures = group.into_iter().map(|plan| {
                let runner = runner.clone();
                let publisher = bus.publisher(plan.wallet.index);
                async move { runner.run(&plan, &publisher).await }
            });
            receipts.extend(join_all(futures).await);

            let is_last = group_index + 1 == total_groups;
            if !is_last && delay_ms > 0 && !self.cancel.is_cancelled() {
                self.idle(delay_ms).await;
            }
        }
        receipts
    }

    /// Sleep between operations; returns early on cancellation.
    async fn idle(&self, delay_ms: u64) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
        }
    }
}
