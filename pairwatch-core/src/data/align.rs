//! Two-series alignment.
//!
//! Both legs are truncated to their common trailing length: the last `n`
//! candles of each, where `n` is the shorter length. Open times are not
//! matched; the exchange returns both legs on the same interval grid.

use crate::domain::Candle;

/// Trailing-aligned views of two candle series.
#[derive(Debug, Clone, Copy)]
pub struct AlignedPair<'a> {
    pub a: &'a [Candle],
    pub b: &'a [Candle],
}

impl AlignedPair<'_> {
    pub fn len(&self) -> usize {
        self.a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }

    /// Number of positions whose open times differ between the legs.
    pub fn timestamp_mismatches(&self) -> usize {
        self.a
            .iter()
            .zip(self.b)
            .filter(|(x, y)| x.open_time != y.open_time)
            .count()
    }
}

/// Truncate both series to their common trailing length.
pub fn align_trailing<'a>(a: &'a [Candle], b: &'a [Candle]) -> AlignedPair<'a> {
    let n = a.len().min(b.len());
    AlignedPair {
        a: &a[a.len() - n..],
        b: &b[b.len() - n..],
    }
}
