//! PairWatch Core — candle data, spread engine, signal classifier, position store.
//!
//! This crate holds everything that decides *whether* an alert fires:
//! - Domain types (candles, intervals, pairs, position states, signals)
//! - Candle fetching behind the `CandleFetcher` trait (Binance, synthetic, cached)
//! - Log-spread z-score and price correlation
//! - Pure FLAT/LONG/SHORT state-transition classifier
//! - Versioned per-pair state store with claim/commit/release writes
//!
//! Orchestration, configuration, and notification live in `pairwatch-runner`.

pub mod data;
pub mod domain;
pub mod signal;
pub mod spread;
pub mod store;
