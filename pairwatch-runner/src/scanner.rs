//! Correlation scanner: rank candidate symbols against a base symbol.
//!
//! For every candidate, fetch both series, compute price correlation and the
//! log-spread z-score of `base / candidate`, and keep candidates whose
//! `|correlation|` reaches the floor. Per-candidate failures are collected
//! alongside the matches.
//!
//! Without an explicit candidate list the scan draws from the exchange's
//! tradable symbols in the base's quote asset (first `DEFAULT_UNIVERSE_SIZE`).
//! `ScanReport::signals` turns matches into a ranked mean-reversion list.

use pairwatch_core::data::{CandleFetcher, FetchError, SymbolUniverse};
use pairwatch_core::domain::Interval;
use pairwatch_core::signal::SignalStrength;
use pairwatch_core::spread::{compute_zscore, EngineParams};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::report::CycleError;

/// Candidates drawn from the universe when none are given.
pub const DEFAULT_UNIVERSE_SIZE: usize = 50;

/// Smallest `|z|` that enters the signal list.
pub const SIGNAL_MIN_ABS_Z: f64 = 1.5;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub interval: Interval,
    pub params: EngineParams,
    /// Minimum `|correlation|` to keep a candidate.
    pub min_correlation: f64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            interval: Interval::default(),
            params: EngineParams::default(),
            min_correlation: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanMatch {
    pub symbol: String,
    pub correlation: f64,
    pub z: f64,
    pub spread: f64,
    pub strength: SignalStrength,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanFailure {
    pub symbol: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub base: String,
    /// Sorted by `|correlation|`, strongest first.
    pub matches: Vec<ScanMatch>,
    pub failures: Vec<ScanFailure>,
}

/// Scan `candidates` against `base`.
pub fn scan_correlated(
    fetcher: &dyn CandleFetcher,
    base: &str,
    candidates: &[String],
    options: &ScanOptions,
) -> ScanReport {
    let interval = options.interval.as_str();
    let limit = options.params.lookback;

    let base_series = match fetcher.fetch(base, interval, limit) {
        Ok(series) => series,
        Err(source) => {
            let err = CycleError::Fetch {
                symbol: base.to_string(),
                source,
            };
            warn!(error = %err, "base symbol fetch failed");
            return ScanReport {
                base: base.to_string(),
                matches: Vec::new(),
                failures: vec![ScanFailure {
                    symbol: base.to_string(),
                    message: err.to_string(),
                }],
            };
        }
    };

    let outcomes: Vec<Result<Option<ScanMatch>, ScanFailure>> = candidates
        .par_iter()
        .filter(|c| c.as_str() != base)
        .map(|symbol| {
            let evaluate = || -> Result<Option<ScanMatch>, CycleError> {
                let series = fetcher.fetch(symbol, interval, limit).map_err(|source| CycleError::Fetch {
                    symbol: symbol.clone(),
                    source,
                })?;
                let r = compute_zscore(&base_series, &series, interval, &options.params)?;
                debug!(symbol = %symbol, corr = r.correlation, z = r.z, "candidate scored");
                if r.correlation.is_nan() || r.correlation.abs() < options.min_correlation {
                    return Ok(None);
                }
                Ok(Some(ScanMatch {
                    symbol: symbol.clone(),
                    correlation: r.correlation,
                    z: r.z,
                    spread: r.spread,
                    strength: SignalStrength::from_z(r.z),
                }))
            };
            evaluate().map_err(|e| ScanFailure {
                symbol: symbol.clone(),
                message: e.to_string(),
            })
        })
        .collect();

    let mut report = ScanReport {
        base: base.to_string(),
        ..ScanReport::default()
    };
    for outcome in outcomes {
        match outcome {
            Ok(Some(m)) => report.matches.push(m),
            Ok(None) => {}
            Err(f) => report.failures.push(f),
        }
    }
    report
        .matches
        .sort_by(|x, y| y.correlation.abs().total_cmp(&x.correlation.abs()));
    report
}

/// Quote asset of a symbol such as `BTCUSDT`, if it ends in a known one.
pub fn quote_asset(symbol: &str) -> Option<&'static str> {
    ["USDT", "USDC", "FDUSD", "BTC", "ETH", "BNB"]
        .into_iter()
        .find(|q| symbol.len() > q.len() && symbol.ends_with(q))
}

/// First `max` tradable symbols sharing `base`'s quote asset, `base` excluded.
pub fn universe_candidates(
    universe: &dyn SymbolUniverse,
    base: &str,
    max: usize,
) -> Result<Vec<String>, FetchError> {
    let quote = quote_asset(base)
        .ok_or_else(|| FetchError::BadRequest(format!("cannot tell the quote asset of '{base}'")))?;
    let symbols = universe.tradable_symbols(quote)?;
    Ok(symbols.into_iter().filter(|s| s != base).take(max).collect())
}

/// What to do about a scanned spread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanAction {
    /// `|z| > 2`
    Trade,
    /// `|z| > 1.5`
    Watch,
    Ignore,
}

impl ScanAction {
    pub fn from_z(z: f64) -> Self {
        let magnitude = z.abs();
        if magnitude > 2.0 {
            ScanAction::Trade
        } else if magnitude > 1.5 {
            ScanAction::Watch
        } else {
            ScanAction::Ignore
        }
    }
}

/// One entry of the ranked signal list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSignal {
    pub symbol: String,
    pub correlation: f64,
    pub z: f64,
    pub strength: SignalStrength,
    pub action: ScanAction,
    /// `30 * |z|`, clamped to `60..=95`.
    pub confidence: f64,
}

impl ScanSignal {
    fn from_match(m: &ScanMatch) -> Self {
        Self {
            symbol: m.symbol.clone(),
            correlation: m.correlation,
            z: m.z,
            strength: m.strength,
            action: ScanAction::from_z(m.z),
            confidence: (m.z.abs() * 30.0).clamp(60.0, 95.0),
        }
    }
}

impl ScanReport {
    /// Matches with `|z| >= SIGNAL_MIN_ABS_Z`, strongest `|z|` first, at most
    /// `limit` of them.
    pub fn signals(&self, limit: usize) -> Vec<ScanSignal> {
        let mut signals: Vec<ScanSignal> = self
            .matches
            .iter()
            .filter(|m| m.z.abs() >= SIGNAL_MIN_ABS_Z)
            .map(ScanSignal::from_match)
            .collect();
        signals.sort_by(|x, y| y.z.abs().total_cmp(&x.z.abs()));
        signals.truncate(limit);
        signals
    }
}
