//! Progress bus: many runners publish lifecycle events into one bounded
//! channel; a single consumer drains them for rendering and aggregation.
//!
//! Publishing never blocks a runner on a slow consumer for coalescable
//! events: when the channel is full, non-terminal non-retry events are
//! dropped. Terminal and retry events are always delivered.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::events::{EventKind, LifecycleEvent};

pub struct ProgressBus {
    tx: mpsc::Sender<LifecycleEvent>,
}

impl ProgressBus {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// A per-wallet publisher. Each runner owns exactly one, which keeps
    /// event order per wallet FIFO.
    pub fn publisher(&self, wallet_index: usize) -> EventPublisher {
        EventPublisher {
            tx: self.tx.clone(),
            wallet_index,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }
}

#[derive(Clone)]
pub struct EventPublisher {
    tx: mpsc::Sender<LifecycleEvent>,
    wallet_index: usize,
    seq: Arc<AtomicU64>,
}

impl EventPublisher {
    pub async fn publish(&self, kind: EventKind) {
        let event = LifecycleEvent {
            wallet_index: self.wallet_index,
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            kind,
        };

        if event.kind.is_terminal() || event.kind.is_retry() {
            // Must not be lost; backpressure is acceptable here.
            if self.tx.send(event).await.is_err() {
                warn!("progress bus closed before terminal event delivery");
            }
        } else if let Err(mpsc::error::TrySendError::Full(event)) = self.tx.try_send(event) {
            debug!(
                "progress bus full, dropping {} for wallet {}",
                event.kind.name(),
                event.wallet_index
            );
        }
    }
}

/// Console renderer for the event stream.
#[derive(Debug, Default)]
pub struct ProgressRenderer {
    total: usize,
    verified: usize,
    failed: usize,
    skipped: usize,
}

impl ProgressRenderer {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn observe(&mut self, event: &LifecycleEvent) {
        match &event.kind {
            EventKind::Verified => {
                self.verified += 1;
                info!(
                    "✅ wallet {} verified ({}/{} done)",
                    event.wallet_index,
                    self.done(),
                    self.total
                );
            }
            EventKind::Failed { kind, detail } => {
                self.failed += 1;
                warn!(
                    "❌ wallet {} failed [{}]: {} ({}/{} done)",
                    event.wallet_index,
                    kind.as_str(),
                    detail,
                    self.done(),
                    self.total
                );
            }
            EventKind::Skipped { reason } => {
                self.skipped += 1;
                info!(
                    "⏭️  wallet {} skipped: {} ({}/{} done)",
                    event.wallet_index,
                    reason,
                    self.done(),
                    self.total
                );
            }
            EventKind::RetryScheduled {
                attempt,
                delay_ms,
                reason,
            } => {
                info!(
                    "🔁 wallet {} retry {} in {}ms ({})",
                    event.wallet_index,
                    attempt,
                    delay_ms,
                    reason.as_str()
                );
            }
            EventKind::ExecuteSubmitted { tx_id } => {
                debug!("wallet {} submitted {}", event.wallet_index, tx_id);
            }
            _ => {}
        }
    }

    fn done(&self) -> usize {
        self.verified + self.failed + self.skipped
    }
}
