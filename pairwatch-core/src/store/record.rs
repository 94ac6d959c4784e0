//! Persisted per-pair alert record.

use crate::domain::{PairKey, PositionState, Signal};
use serde::{Deserialize, Serialize};

/// Durable state of one pair. Absent records read as the default `{FLAT, 0}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlertRecord {
    pub state: PositionState,
    /// Epoch ms of the last delivered notification (0 = never).
    pub last_alert_ts: i64,
    /// Incremented on every successful write; the compare-and-set token.
    #[serde(default)]
    pub version: u64,
    /// Transition claimed by an in-flight cycle, not yet committed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingTransition>,
}

impl AlertRecord {
    /// Whether a claim may be placed at `now_ms`: no pending transition, or
    /// one older than `lease_ms` (its cycle is presumed dead).
    pub fn is_claimable(&self, now_ms: i64, lease_ms: i64) -> bool {
        match &self.pending {
            None => true,
            Some(p) => now_ms.saturating_sub(p.claimed_at) >= lease_ms,
        }
    }
}

/// A transition an in-flight cycle is about to notify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransition {
    pub from: PositionState,
    pub to: PositionState,
    pub signal: Signal,
    /// Epoch ms when the claim was placed.
    pub claimed_at: i64,
    /// Open time of the candle the signal was computed on.
    pub candle_ts: i64,
    pub idempotency_key: String,
}

impl PendingTransition {
    pub fn new(pair: &PairKey, from: PositionState, to: PositionState, signal: Signal, candle_ts: i64, claimed_at: i64) -> Self {
        Self {
            from,
            to,
            signal,
            claimed_at,
            candle_ts,
            idempotency_key: idempotency_key(pair, from, to, signal, candle_ts),
        }
    }
}

/// Deterministic key for a transition: identical for a retried delivery of
/// the same transition on the same candle, so receivers can drop duplicates.
pub fn idempotency_key(pair: &PairKey, from: PositionState, to: PositionState, signal: Signal, candle_ts: i64) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(pair.a.as_bytes());
    hasher.update(b"\0");
    hasher.update(pair.b.as_bytes());
    hasher.update(b"\0");
    hasher.update(from.to_string().as_bytes());
    hasher.update(b">");
    hasher.update(to.to_string().as_bytes());
    hasher.update(b"\0");
    hasher.update(signal.to_string().as_bytes());
    hasher.update(&candle_ts.to_le_bytes());
    hasher.finalize().to_hex()[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_record_is_flat_zero() {
        let r = AlertRecord::default();
        assert_eq!(r.state, PositionState::Flat);
        assert_eq!(r.last_alert_ts, 0);
        assert_eq!(r.version, 0);
        assert!(r.pending.is_none());
    }

    #[test]
    fn legacy_json_without_version_parses() {
        let r: AlertRecord = serde_json::from_str(r#"{"state":"LONG","last_alert_ts":5}"#).unwrap();
        assert_eq!(r.state, PositionState::Long);
        assert_eq!(r.version, 0);
        assert!(r.pending.is_none());
    }

    #[test]
    fn claimable_respects_lease() {
        let pair = PairKey::new("A", "B");
        let mut r = AlertRecord::default();
        assert!(r.is_claimable(0, 1_000));

        r.pending = Some(PendingTransition::new(&pair, PositionState::Flat, PositionState::Long, Signal::EntryLong, 10, 5_000));
        assert!(!r.is_claimable(5_500, 1_000));
        assert!(r.is_claimable(6_000, 1_000));
    }

    #[test]
    fn idempotency_key_is_stable_and_discriminating() {
        let pair = PairKey::new("BTCUSDT", "ETHUSDT");
        let k1 = idempotency_key(&pair, PositionState::Flat, PositionState::Long, Signal::EntryLong, 100);
        let k2 = idempotency_key(&pair, PositionState::Flat, PositionState::Long, Signal::EntryLong, 100);
        let other_candle = idempotency_key(&pair, PositionState::Flat, PositionState::Long, Signal::EntryLong, 200);
        let other_pair = idempotency_key(&PairKey::new(pair.b.clone(), pair.a.clone()), PositionState::Flat, PositionState::Long, Signal::EntryLong, 100);

        assert_eq!(k1, k2);
        assert_eq!(k1.len(), 16);
        assert_ne!(k1, other_candle);
        assert_ne!(k1, other_pair);
    }
}
