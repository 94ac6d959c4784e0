//! Synthetic candle source for dry runs and benchmarks.
//!
//! Every symbol follows a geometric random walk driven by a shared market
//! factor plus its own idiosyncratic noise, so any two synthetic symbols are
//! positively correlated and their log-spread mean-reverts loosely. Seeds are
//! derived with BLAKE3 from the master seed and the symbol name, which makes a
//! series a pure function of `(seed, symbol, interval, limit, end_time)`.
//!
//! Synthetic series are clearly fake and must never feed real notifications.

use super::provider::{CandleFetcher, FetchError, SymbolUniverse};
use crate::domain::{Candle, Interval, IntervalError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Base assets listed by the synthetic universe.
const SYNTHETIC_BASES: &[&str] = &["BTC", "ETH", "BNB", "SOL", "XRP", "ADA", "DOGE", "AVAX", "DOT", "LINK"];

/// Deterministic correlated random-walk candles.
#[derive(Debug, Clone)]
pub struct SyntheticFetcher {
    master_seed: u64,
    /// Open time of the most recent candle, in epoch ms (floored to the interval).
    end_time_ms: i64,
    /// Per-bar shock size of the shared factor.
    market_vol: f64,
    /// Per-bar shock size of each symbol's own noise.
    idio_vol: f64,
}

impl SyntheticFetcher {
    pub fn new(master_seed: u64, end_time_ms: i64) -> Self {
        Self {
            master_seed,
            end_time_ms,
            market_vol: 0.01,
            idio_vol: 0.004,
        }
    }

    pub fn with_volatility(mut self, market_vol: f64, idio_vol: f64) -> Self {
        self.market_vol = market_vol;
        self.idio_vol = idio_vol;
        self
    }

    fn rng(&self, stream: &str) -> StdRng {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(stream.as_bytes());
        StdRng::from_seed(*hasher.finalize().as_bytes())
    }

    /// Generate `limit` candles ending at `end_time_ms`.
    pub fn generate(&self, symbol: &str, interval: &Interval, limit: usize) -> Vec<Candle> {
        let step = interval.millis();
        let last_open = self.end_time_ms - self.end_time_ms.rem_euclid(step);
        let first_open = last_open - step * (limit as i64 - 1);

        let mut market = self.rng(&format!("market/{interval}"));
        let mut own = self.rng(&format!("symbol/{symbol}/{interval}"));

        let base_price: f64 = own.gen_range(1.0..1_000.0);
        let beta: f64 = own.gen_range(0.6..1.4);

        let mut log_price = base_price.ln();
        (0..limit)
            .map(|i| {
                let market_shock: f64 = market.gen_range(-1.0..1.0) * self.market_vol;
                let own_shock: f64 = own.gen_range(-1.0..1.0) * self.idio_vol;
                log_price += beta * market_shock + own_shock;
                Candle {
                    open_time: first_open + step * i as i64,
                    close: log_price.exp(),
                }
            })
            .collect()
    }
}

impl CandleFetcher for SyntheticFetcher {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>, FetchError> {
        let interval: Interval = interval
            .parse()
            .map_err(|e: IntervalError| FetchError::BadRequest(e.to_string()))?;
        Ok(self.generate(symbol, &interval, limit))
    }
}

impl SymbolUniverse for SyntheticFetcher {
    fn tradable_symbols(&self, quote_asset: &str) -> Result<Vec<String>, FetchError> {
        Ok(SYNTHETIC_BASES.iter().map(|base| format!("{base}{quote_asset}")).collect())
    }
}
