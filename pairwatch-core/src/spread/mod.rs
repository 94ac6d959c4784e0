//! Spread/correlation engine.
//!
//! The canonical spread is the log price ratio `s[i] = ln(a[i] / b[i])`. It is
//! invariant to rescaling either leg's price, so the z-score does not depend on
//! quote units. Raw-ratio spreads (`a / b - 1`) are not used anywhere.
//!
//! `compute_zscore` is a pure function: identical inputs always produce an
//! identical `ZScoreResult`. Nothing is cached between calls.

pub mod stats;

use crate::data::align_trailing;
use crate::domain::Candle;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use stats::{mean, pearson, sample_std};

/// Errors from the spread engine. Both are recoverable at the pair level.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("insufficient data: aligned length {got}, need at least {need}")]
    InsufficientData { got: usize, need: usize },

    #[error("invalid price at index {index} of leg {leg}: {value}")]
    InvalidPrice { leg: char, index: usize, value: f64 },
}

/// Rolling-window parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineParams {
    /// Number of trailing spread observations used for mean and std.
    pub window: usize,
    /// Number of candles requested per leg.
    pub lookback: usize,
    /// Floor on the aligned series length.
    pub min_samples: usize,
    /// Extra observations required beyond `window`.
    pub slack: usize,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            window: 100,
            lookback: 200,
            min_samples: 50,
            slack: 5,
        }
    }
}

impl EngineParams {
    /// Minimum aligned length: `max(min_samples, window + slack)`.
    pub fn required_len(&self) -> usize {
        self.min_samples.max(self.window + self.slack)
    }
}

/// Output of one z-score computation. A value object, produced fresh per cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZScoreResult {
    pub z: f64,
    /// Latest spread, `ln(price_a / price_b)`.
    pub spread: f64,
    pub price_a: f64,
    pub price_b: f64,
    /// Open time (epoch ms) of the latest candle of leg A.
    pub timestamp: i64,
    pub interval: String,
    pub window: usize,
    pub lookback: usize,
    /// Rolling mean of the trailing window.
    pub mean: f64,
    /// Rolling sample std of the trailing window.
    pub std: f64,
    /// Pearson correlation of the aligned close prices.
    pub correlation: f64,
    /// Aligned series length the result was computed from.
    pub samples: usize,
    /// Aligned positions whose open times differ between the legs.
    #[serde(default)]
    pub misaligned: usize,
}

/// Log-spread series `ln(a[i] / b[i])`.
pub fn log_spread(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(pa, pb)| (pa / pb).ln()).collect()
}

/// Z-score of the last element of `series` against its trailing `window`.
///
/// Returns `(z, mean, std)`. A flat window (std == 0) yields z == 0.
pub fn rolling_zscore(series: &[f64], window: usize) -> (f64, f64, f64) {
    let start = series.len().saturating_sub(window);
    let recent = &series[start..];
    let m = mean(recent);
    let s = sample_std(recent);
    let last = series.last().copied().unwrap_or(f64::NAN);
    let z = if s == 0.0 { 0.0 } else { (last - m) / s };
    (z, m, s)
}

/// Compute the spread z-score for two candle series.
///
/// Both series are truncated to their common trailing length first. Fails with
/// `InsufficientData` when that length is below `params.required_len()`, and
/// with `InvalidPrice` when a close is not finite and positive.
pub fn compute_zscore(
    a: &[Candle],
    b: &[Candle],
    interval: &str,
    params: &EngineParams,
) -> Result<ZScoreResult, EngineError> {
    let aligned = align_trailing(a, b);
    let n = aligned.len();
    let need = params.required_len();
    if n < need || n == 0 {
        return Err(EngineError::InsufficientData { got: n, need });
    }

    let closes_a = checked_closes('A', aligned.a)?;
    let closes_b = checked_closes('B', aligned.b)?;

    let spread_series = log_spread(&closes_a, &closes_b);
    let (z, m, s) = rolling_zscore(&spread_series, params.window);

    Ok(ZScoreResult {
        z,
        spread: spread_series[n - 1],
        price_a: closes_a[n - 1],
        price_b: closes_b[n - 1],
        timestamp: aligned.a[n - 1].open_time,
        interval: interval.to_string(),
        window: params.window,
        lookback: params.lookback,
        mean: m,
        std: s,
        correlation: pearson(&closes_a, &closes_b),
        samples: n,
        misaligned: aligned.timestamp_mismatches(),
    })
}

fn checked_closes(leg: char, series: &[Candle]) -> Result<Vec<f64>, EngineError> {
    series
        .iter()
        .enumerate()
        .map(|(index, c)| {
            if c.has_valid_close() {
                Ok(c.close)
            } else {
                Err(EngineError::InvalidPrice {
                    leg,
                    index,
                    value: c.close,
                })
            }
        })
        .collect()
}

/// Correlation of two aligned candle series' close prices.
pub fn correlation(a: &[Candle], b: &[Candle]) -> f64 {
    let aligned = align_trailing(a, b);
    pearson(&crate::domain::closes(aligned.a), &crate::domain::closes(aligned.b))
}
