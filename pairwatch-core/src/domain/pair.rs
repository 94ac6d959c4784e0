//! PairKey — an ordered pair of asset symbols.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered pair (A, B). The spread is `ln(A / B)`, so `(A, B)` and `(B, A)`
/// are different pairs with opposite spread sign.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub a: String,
    pub b: String,
}

impl PairKey {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
        }
    }

    /// Stable textual identity used as the storage key suffix: `A:B`.
    pub fn id(&self) -> String {
        format!("{}:{}", self.a, self.b)
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.a, self.b)
    }
}
