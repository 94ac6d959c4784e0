//! Market data: fetcher trait, exchange adapter, circuit breaker, cache,
//! alignment and synthetic series.

pub mod align;
pub mod binance;
pub mod cache;
pub mod circuit_breaker;
pub mod provider;
pub mod synthetic;

pub use align::{align_trailing, AlignedPair};
pub use binance::{parse_exchange_symbols, BinanceConfig, BinanceFetcher, MAX_LIMIT};
pub use cache::{CachedFetcher, CandleCache};
pub use circuit_breaker::CircuitBreaker;
pub use provider::{CandleFetcher, FetchError, SymbolUniverse};
pub use synthetic::SyntheticFetcher;
