//! Position states tracked per pair and the signals emitted on transitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tracked spread position for a pair. Never an actual exchange position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionState {
    #[default]
    Flat,
    /// Long the spread: long A, short B (entered on a depressed spread).
    Long,
    /// Short the spread: short A, long B (entered on an elevated spread).
    Short,
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PositionState::Flat => "FLAT",
            PositionState::Long => "LONG",
            PositionState::Short => "SHORT",
        };
        f.pad(s)
    }
}

/// Signal emitted by a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    EntryLong,
    EntryShort,
    Exit,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Signal::EntryLong => "ENTRY_LONG",
            Signal::EntryShort => "ENTRY_SHORT",
            Signal::Exit => "EXIT",
        };
        f.pad(s)
    }
}
