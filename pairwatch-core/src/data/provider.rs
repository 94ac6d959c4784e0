//! Candle fetcher trait and structured error types.
//!
//! The `CandleFetcher` trait abstracts over price sources (the exchange kline
//! endpoint, synthetic walks, scripted fixtures) so the orchestrator can be
//! driven against fakes in tests. Caching sits above this trait.

use crate::domain::Candle;
use thiserror::Error;

/// Errors from retrieving a candle series.
///
/// Every variant is recoverable at the pair level: the orchestrator skips the
/// pair for this cycle and leaves its state untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP {status} for {symbol}")]
    Status { symbol: String, status: u16 },

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("malformed kline payload: {0}")]
    Malformed(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("hard stop: provider is refusing requests (circuit breaker open)")]
    CircuitOpen,
}

/// Source of ordered candle series.
pub trait CandleFetcher: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch up to `limit` most recent candles for `symbol`, ascending by open time.
    fn fetch(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>, FetchError>;
}

impl<T: CandleFetcher + ?Sized> CandleFetcher for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>, FetchError> {
        (**self).fetch(symbol, interval, limit)
    }
}

impl<T: CandleFetcher + ?Sized> CandleFetcher for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>, FetchError> {
        (**self).fetch(symbol, interval, limit)
    }
}

/// Source of the symbols a scan may consider.
pub trait SymbolUniverse: Send + Sync {
    /// Symbols currently trading against `quote_asset`, in source order.
    fn tradable_symbols(&self, quote_asset: &str) -> Result<Vec<String>, FetchError>;
}
