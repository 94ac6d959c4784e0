//! Per-cycle report: one entry per configured pair, in configuration order.

use pairwatch_core::data::FetchError;
use pairwatch_core::domain::{PositionState, Signal};
use pairwatch_core::spread::EngineError;
use pairwatch_core::store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::notifier::NotifyError;

/// A per-pair failure, isolated at the orchestrator boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CycleError {
    #[error("fetch {symbol}: {source}")]
    Fetch {
        symbol: String,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CycleError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CycleError::Fetch { .. } => FailureKind::Fetch,
            CycleError::Engine(EngineError::InsufficientData { .. }) => FailureKind::InsufficientData,
            CycleError::Engine(EngineError::InvalidPrice { .. }) => FailureKind::InvalidPrice,
            CycleError::Notify(_) => FailureKind::Notify,
            CycleError::Store(_) => FailureKind::Store,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Fetch,
    InsufficientData,
    InvalidPrice,
    Notify,
    Store,
}

/// What happened to a pair this cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PairStatus {
    /// No signal.
    Quiet,
    /// Signal delivered and the new state committed.
    Notified { idempotency_key: String },
    /// Signal dropped because the cooldown has not elapsed. State unchanged.
    CooldownSuppressed,
    /// Another cycle holds or already applied a transition for this pair.
    /// Nothing was sent.
    StaleRead,
    /// Delivered, but the commit found the record changed underneath it.
    CommitConflict { idempotency_key: String },
    Failed { kind: FailureKind, message: String },
}

impl PairStatus {
    pub fn failed(err: &CycleError) -> Self {
        PairStatus::Failed {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, PairStatus::Failed { .. } | PairStatus::CommitConflict { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairReport {
    /// `A:B`.
    pub pair: String,
    /// `None` when the pair failed before a z-score existed.
    pub z: Option<f64>,
    pub correlation: Option<f64>,
    /// Open time of the candle the z-score was computed on.
    pub candle_ts: Option<i64>,
    pub prior_state: PositionState,
    /// State stored after this cycle.
    pub resulting_state: PositionState,
    pub signal: Option<Signal>,
    pub cooldown_elapsed: bool,
    #[serde(flatten)]
    pub status: PairStatus,
}

impl PairReport {
    /// A pair whose state was read (or defaulted) and then failed.
    pub fn failure(pair: String, prior_state: PositionState, cooldown_elapsed: bool, err: &CycleError) -> Self {
        Self {
            pair,
            z: None,
            correlation: None,
            candle_ts: None,
            prior_state,
            resulting_state: prior_state,
            signal: None,
            cooldown_elapsed,
            status: PairStatus::failed(err),
        }
    }

    /// Whether a signal was dropped by the cooldown gate.
    pub fn cooldown_suppressed(&self) -> bool {
        self.status == PairStatus::CooldownSuppressed
    }
}

/// Outcome of one evaluation cycle across all configured pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Epoch ms the cycle was evaluated at.
    pub now_ms: i64,
    pub pairs: Vec<PairReport>,
}

impl CycleReport {
    pub fn failures(&self) -> impl Iterator<Item = &PairReport> {
        self.pairs.iter().filter(|p| p.status.is_failure())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn notified_count(&self) -> usize {
        self.pairs
            .iter()
            .filter(|p| matches!(p.status, PairStatus::Notified { .. }))
            .count()
    }
}
