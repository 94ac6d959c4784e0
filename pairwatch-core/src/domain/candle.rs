//! Candle — the fundamental market data unit.

use serde::{Deserialize, Serialize};

/// A single kline reduced to what the spread engine consumes.
///
/// A candle series is a `Vec<Candle>` ordered by `open_time` ascending.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Open time in epoch milliseconds.
    pub open_time: i64,
    pub close: f64,
}

impl Candle {
    pub fn new(open_time: i64, close: f64) -> Self {
        Self { open_time, close }
    }

    /// A close that can enter a log ratio: finite and strictly positive.
    pub fn has_valid_close(&self) -> bool {
        self.close.is_finite() && self.close > 0.0
    }
}

/// Extract close prices from a series, preserving order.
pub fn closes(series: &[Candle]) -> Vec<f64> {
    series.iter().map(|c| c.close).collect()
}

/// True when open times are strictly increasing.
pub fn is_strictly_ascending(series: &[Candle]) -> bool {
    series.windows(2).all(|w| w[0].open_time < w[1].open_time)
}
