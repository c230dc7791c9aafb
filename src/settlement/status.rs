use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::adapters::CandidateSwap;
use crate::ledger::models::{Checkpoint, SwapRecord, SwapStatus};
use crate::ledger::{CheckpointStore, SwapLedger};

/// Read-only view of relayer progress, published after every tick
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub chains: Vec<String>,
    pub checkpoints: Vec<Checkpoint>,
    /// Records per status, every status present
    pub counts: BTreeMap<String, usize>,
    pub total: usize,
    /// Failed swaps awaiting operator attention
    pub failed: Vec<SwapRecord>,
    /// Deposits that could not be recorded at all, since startup
    pub rejected: Vec<RejectedDeposit>,
    pub last_tick: Option<DateTime<Utc>>,
}

impl StatusSnapshot {
    pub fn capture(
        chains: Vec<String>,
        ledger: &SwapLedger,
        checkpoints: &CheckpointStore,
        rejected: &[RejectedDeposit],
        last_tick: Option<DateTime<Utc>>,
    ) -> Self {
        let stats = ledger.stats();
        let counts = SwapStatus::all()
            .iter()
            .map(|status| {
                let count = stats.counts.get(status).copied().unwrap_or(0);
                (status.to_string(), count)
            })
            .collect();

        Self {
            chains,
            checkpoints: checkpoints.all(),
            counts,
            total: stats.total,
            failed: ledger.failed(),
            rejected: rejected.to_vec(),
            last_tick,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedDeposit {
    #[serde(flatten)]
    pub deposit: CandidateSwap,
    pub reason: String,
    pub rejected_at: DateTime<Utc>,
}

/// Per-tick tally, logged by the scheduler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub settled: usize,
    pub failed: usize,
    /// Swaps left non-terminal, retried next tick
    pub pending: usize,
    /// Duplicates and collisions dropped without action
    pub discarded: usize,
    /// Chains whose poll failed this tick
    pub poll_failures: usize,
    pub interrupted: bool,
}
