//! Lifecycle events published by swap runners and consumed by the
//! progress bus. Events are totally ordered per wallet by `seq`;
//! no ordering is promised across wallets.

use serde::Serialize;

use crate::shared::errors::ErrorKind;

#[derive(Debug, Clone, Serialize)]
pub struct LifecycleEvent {
    pub wallet_index: usize,
    /// Monotonic per-wallet sequence number.
    pub seq: u64,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    PlanAdmitted {
        input_amount: u64,
    },
    QuoteStarted {
        attempt: u32,
    },
    QuoteReady {
        out_amount: u64,
        price_impact_bps: i32,
    },
    ExecuteStarted {
        attempt: u32,
    },
    ExecuteSubmitted {
        tx_id: String,
    },
    Verified,
    Failed {
        kind: ErrorKind,
        detail: String,
    },
    Skipped {
        reason: String,
    },
    RetryScheduled {
        attempt: u32,
        delay_ms: u64,
        reason: ErrorKind,
    },
}

impl EventKind {
    /// Terminal transitions must never be dropped by the bus.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventKind::Verified | EventKind::Failed { .. } | EventKind::Skipped { .. }
        )
    }

    pub fn is_retry(&self) -> bool {
        matches!(self, EventKind::RetryScheduled { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::PlanAdmitted { .. } => "plan_admitted",
            EventKind::QuoteStarted { .. } => "quote_started",
            EventKind::QuoteReady { .. } => "quote_ready",
            EventKind::ExecuteStarted { .. } => "execute_started",
            EventKind::ExecuteSubmitted { .. } => "execute_submitted",
            EventKind::Verified => "verified",
            EventKind::Failed { .. } => "failed",
            EventKind::Skipped { .. } => "skipped",
            EventKind::RetryScheduled { .. } => "retry_scheduled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_and_retry_classification() {
        assert!(EventKind::Verified.is_terminal());
        assert!(EventKind::Skipped {
            reason: "cancelled".into()
        }
        .is_terminal());
        assert!(!EventKind::QuoteStarted { attempt: 1 }.is_terminal());
        assert!(EventKind::RetryScheduled {
            attempt: 1,
            delay_ms: 500,
            reason: ErrorKind::Transport,
        }
        .is_retry());
    }
}
