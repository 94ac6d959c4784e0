//! Position state store.
//!
//! One `AlertRecord` per pair, stored as a single JSON value under
//! `alert:{A}:{B}`. Every write is a compare-and-set on the record's
//! `version`: a writer that read version `v` can only write if the record is
//! still at `v`, so two overlapping cycles can never both apply a transition
//! computed from the same read. The final check is the backend's conditional
//! swap, so this holds for separate processes sharing one `SqliteKv` file.
//!
//! Alert delivery is bracketed by a claim:
//! 1. `claim` marks the transition pending (CAS on the read version).
//! 2. the caller notifies.
//! 3. `commit` applies the new state and clears the claim, or `release`
//!    clears the claim after a failed delivery.
//!
//! A claim older than the lease is treated as abandoned and may be re-claimed,
//! so a crash between notify and commit leads to a repeated alert (carrying the
//! same idempotency key), never a lost one.

pub mod kv;
pub mod record;

pub use kv::{KvBackend, MemoryKv, SqliteKv, DEFAULT_BUSY_TIMEOUT};
pub use record::{idempotency_key, AlertRecord, PendingTransition};

use crate::domain::{PairKey, PositionState};
use std::sync::Arc;
use thiserror::Error;

/// Default claim lease: 5 minutes.
pub const DEFAULT_LEASE_MS: i64 = 5 * 60 * 1000;

const KEY_PREFIX: &str = "alert:";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt record at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Result of a compare-and-set write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The write was applied; carries the record as now stored.
    Applied(AlertRecord),
    /// Another writer got there first (or a live claim blocks this one).
    Stale { current: AlertRecord },
}

impl CasOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, CasOutcome::Applied(_))
    }
}

/// Durable per-pair position state with versioned writes.
pub struct PositionStore {
    kv: Arc<dyn KvBackend>,
    lease_ms: i64,
}

impl std::fmt::Debug for PositionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionStore").field("lease_ms", &self.lease_ms).finish_non_exhaustive()
    }
}

impl PositionStore {
    pub fn new(kv: Arc<dyn KvBackend>) -> Self {
        Self::with_lease(kv, DEFAULT_LEASE_MS)
    }

    pub fn with_lease(kv: Arc<dyn KvBackend>, lease_ms: i64) -> Self {
        Self { kv, lease_ms }
    }

    /// Convenience: an in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKv::new()))
    }

    pub fn lease_ms(&self) -> i64 {
        self.lease_ms
    }

    pub fn key_for(pair: &PairKey) -> String {
        format!("{KEY_PREFIX}{}:{}", pair.a, pair.b)
    }

    /// Current record; `{FLAT, 0}` if the pair was never written.
    pub fn get(&self, pair: &PairKey) -> Result<AlertRecord, StoreError> {
        self.read_key(&Self::key_for(pair))
    }

    /// Place a pending claim if the record is still at `expected_version` and
    /// has no live claim.
    pub fn claim(
        &self,
        pair: &PairKey,
        expected_version: u64,
        pending: PendingTransition,
        now_ms: i64,
    ) -> Result<CasOutcome, StoreError> {
        let lease_ms = self.lease_ms;
        self.compare_and_set(pair, expected_version, |current| {
            if !current.is_claimable(now_ms, lease_ms) {
                return None;
            }
            Some(AlertRecord {
                pending: Some(pending),
                ..current.clone()
            })
        })
    }

    /// Apply `new_state` with `last_alert_ts = alert_ts` and clear any claim.
    pub fn commit(
        &self,
        pair: &PairKey,
        expected_version: u64,
        new_state: PositionState,
        alert_ts: i64,
    ) -> Result<CasOutcome, StoreError> {
        self.compare_and_set(pair, expected_version, |_| {
            Some(AlertRecord {
                state: new_state,
                last_alert_ts: alert_ts,
                version: 0,
                pending: None,
            })
        })
    }

    /// Drop a claim without changing state or `last_alert_ts`.
    pub fn release(&self, pair: &PairKey, expected_version: u64) -> Result<CasOutcome, StoreError> {
        self.compare_and_set(pair, expected_version, |current| {
            Some(AlertRecord {
                pending: None,
                ..current.clone()
            })
        })
    }

    /// All stored records, sorted by pair id.
    pub fn records(&self) -> Result<Vec<(String, AlertRecord)>, StoreError> {
        let keys = self.kv.keys_with_prefix(KEY_PREFIX)?;
        keys.into_iter()
            .map(|key| {
                let record = self.read_key(&key)?;
                let id = key.trim_start_matches(KEY_PREFIX).to_string();
                Ok((id, record))
            })
            .collect()
    }

    // ── Internals ──

    fn read_key(&self, key: &str) -> Result<AlertRecord, StoreError> {
        let raw = self.kv.get(key)?;
        parse_record(key, raw.as_deref())
    }

    /// Read, check, then swap conditionally on the exact bytes read. `update`
    /// returns `None` to refuse the write; the version is bumped here, not by
    /// `update`. Losing the swap to another writer reports `Stale`.
    fn compare_and_set<F>(&self, pair: &PairKey, expected_version: u64, update: F) -> Result<CasOutcome, StoreError>
    where
        F: FnOnce(&AlertRecord) -> Option<AlertRecord>,
    {
        let key = Self::key_for(pair);
        let raw = self.kv.get(&key)?;
        let current = parse_record(&key, raw.as_deref())?;
        if current.version != expected_version {
            return Ok(CasOutcome::Stale { current });
        }
        let Some(mut next) = update(&current) else {
            return Ok(CasOutcome::Stale { current });
        };
        next.version = current.version + 1;

        let json = serde_json::to_string(&next).map_err(|e| StoreError::Serialization(e.to_string()))?;
        if self.kv.compare_and_swap(&key, raw.as_deref(), &json)? {
            Ok(CasOutcome::Applied(next))
        } else {
            Ok(CasOutcome::Stale {
                current: self.read_key(&key)?,
            })
        }
    }
}

fn parse_record(key: &str, raw: Option<&str>) -> Result<AlertRecord, StoreError> {
    match raw {
        None => Ok(AlertRecord::default()),
        Some(raw) => serde_json::from_str(raw).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        }),
    }
}
