//! Signal classifier — pure state-transition function.
//!
//! Maps `(current state, z, thresholds)` to `(next state, signal)`:
//!
//! | current        | condition      | next      | signal        |
//! |----------------|----------------|-----------|---------------|
//! | FLAT           | z <= -entry    | LONG      | ENTRY_LONG    |
//! | FLAT           | z >= +entry    | SHORT     | ENTRY_SHORT   |
//! | FLAT           | otherwise      | FLAT      | none          |
//! | LONG or SHORT  | \|z\| <= exit  | FLAT      | EXIT          |
//! | LONG or SHORT  | otherwise      | unchanged | none          |
//!
//! The classifier never sees persisted state; the caller supplies the state it
//! read. A NaN z satisfies no condition and leaves the state unchanged.

use crate::domain::{PositionState, Signal};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifierError {
    #[error("thresholds must be finite (entry_z={entry_z}, exit_z={exit_z})")]
    NonFinite { entry_z: f64, exit_z: f64 },

    #[error("exit_z must be >= 0, got {0}")]
    NegativeExit(f64),

    #[error("entry_z ({entry_z}) must be strictly greater than exit_z ({exit_z})")]
    Inverted { entry_z: f64, exit_z: f64 },
}

/// Entry/exit z thresholds with `entry_z > exit_z >= 0` enforced at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    entry_z: f64,
    exit_z: f64,
}

impl Thresholds {
    pub fn new(entry_z: f64, exit_z: f64) -> Result<Self, ClassifierError> {
        if !entry_z.is_finite() || !exit_z.is_finite() {
            return Err(ClassifierError::NonFinite { entry_z, exit_z });
        }
        if exit_z < 0.0 {
            return Err(ClassifierError::NegativeExit(exit_z));
        }
        if entry_z <= exit_z {
            return Err(ClassifierError::Inverted { entry_z, exit_z });
        }
        Ok(Self { entry_z, exit_z })
    }

    pub fn entry_z(&self) -> f64 {
        self.entry_z
    }

    pub fn exit_z(&self) -> f64 {
        self.exit_z
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            entry_z: 2.0,
            exit_z: 0.5,
        }
    }
}

impl<'de> Deserialize<'de> for Thresholds {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            entry_z: f64,
            exit_z: f64,
        }
        let raw = Raw::deserialize(deserializer)?;
        Thresholds::new(raw.entry_z, raw.exit_z).map_err(serde::de::Error::custom)
    }
}

/// Outcome of one classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub next: PositionState,
    pub signal: Option<Signal>,
}

impl Transition {
    fn stay(state: PositionState) -> Self {
        Self {
            next: state,
            signal: None,
        }
    }
}

/// Classify a z-score given the caller's current state.
pub fn classify(state: PositionState, z: f64, thresholds: &Thresholds) -> Transition {
    match state {
        PositionState::Flat => {
            if z <= -thresholds.entry_z {
                Transition {
                    next: PositionState::Long,
                    signal: Some(Signal::EntryLong),
                }
            } else if z >= thresholds.entry_z {
                Transition {
                    next: PositionState::Short,
                    signal: Some(Signal::EntryShort),
                }
            } else {
                Transition::stay(state)
            }
        }
        PositionState::Long | PositionState::Short => {
            if z.abs() <= thresholds.exit_z {
                Transition {
                    next: PositionState::Flat,
                    signal: Some(Signal::Exit),
                }
            } else {
                Transition::stay(state)
            }
        }
    }
}

/// Coarse strength bucket of a z-score, for scanner listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStrength {
    StrongBuy,
    WeakBuy,
    Neutral,
    WeakSell,
    StrongSell,
}

impl SignalStrength {
    /// `|z| > 2` is strong, `|z| > 1` is weak. A high spread sells A.
    pub fn from_z(z: f64) -> Self {
        if z > 2.0 {
            SignalStrength::StrongSell
        } else if z < -2.0 {
            SignalStrength::StrongBuy
        } else if z > 1.0 {
            SignalStrength::WeakSell
        } else if z < -1.0 {
            SignalStrength::WeakBuy
        } else {
            SignalStrength::Neutral
        }
    }
}
