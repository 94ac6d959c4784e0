//! Binance spot kline fetcher.
//!
//! Fetches `GET /api/v3/klines` with a bounded timeout, retries transient
//! failures with exponential backoff and consults the shared circuit breaker.
//! `GET /api/v3/exchangeInfo` supplies the symbol universe for scans.
//!
//! Payloads are validated strictly: every row must carry an integer open time
//! and a close that parses to a finite positive number, and rows must be
//! strictly ascending. Anything else is `FetchError::Malformed`; non-numeric
//! values never reach the engine.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{CandleFetcher, FetchError, SymbolUniverse};
use crate::domain::candle::is_strictly_ascending;
use crate::domain::{Candle, Interval};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum `limit` accepted by the kline endpoint.
pub const MAX_LIMIT: usize = 1000;

/// Connection settings for the kline endpoint.
#[derive(Debug, Clone)]
pub struct BinanceConfig {
    pub base_url: String,
    /// Per-request timeout, covering connect and body read.
    pub timeout: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".into(),
            timeout: Duration::from_secs(10),
            max_retries: 2,
            base_delay: Duration::from_millis(250),
        }
    }
}

/// Error body returned by the exchange, e.g. `{"code":-1121,"msg":"Invalid symbol."}`.
#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

const INVALID_SYMBOL: i64 = -1121;

/// Binance kline source.
pub struct BinanceFetcher {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    config: BinanceConfig,
}

impl BinanceFetcher {
    pub fn new(config: BinanceConfig, circuit_breaker: Arc<CircuitBreaker>) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .user_agent(concat!("pairwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            circuit_breaker,
            config,
        })
    }

    fn klines_url(&self, symbol: &str, interval: &Interval, limit: usize) -> String {
        format!(
            "{}/api/v3/klines?symbol={symbol}&interval={interval}&limit={limit}",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn exchange_info_url(&self) -> String {
        format!("{}/api/v3/exchangeInfo", self.config.base_url.trim_end_matches('/'))
    }

    fn refuse_if_open(&self, what: &str) -> Result<(), FetchError> {
        if self.circuit_breaker.is_allowed() {
            return Ok(());
        }
        debug!(what, remaining = ?self.circuit_breaker.remaining_cooldown(), "circuit open, request refused");
        Err(FetchError::CircuitOpen)
    }

    /// GET `url` with retries; returns the body of a 2xx response. `what` names
    /// the request in errors (a symbol, or the endpoint).
    fn get_with_retry(&self, url: &str, what: &str) -> Result<String, FetchError> {
        self.refuse_if_open(what)?;
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = self.config.base_delay * 2u32.pow(attempt - 1);
                debug!(what, attempt, ?delay, "retrying request");
                std::thread::sleep(delay);
            }

            self.refuse_if_open(what)?;

            let resp = match self.client.get(url).send() {
                Ok(resp) => resp,
                Err(e) => {
                    self.circuit_breaker.record_failure();
                    let err = if e.is_timeout() {
                        FetchError::Timeout {
                            timeout_ms: self.config.timeout.as_millis() as u64,
                        }
                    } else {
                        FetchError::Transport(e.to_string())
                    };
                    if e.is_timeout() || e.is_connect() {
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            };

            let status = resp.status();

            // 418 follows repeated 429s: the IP is banned.
            if status == reqwest::StatusCode::FORBIDDEN || status.as_u16() == 418 {
                warn!(what, status = status.as_u16(), "exchange ban response, opening circuit");
                self.circuit_breaker.trip();
                return Err(FetchError::CircuitOpen);
            }

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                self.circuit_breaker.record_failure();
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                last_error = Some(FetchError::RateLimited {
                    retry_after_secs: retry_after,
                });
                continue;
            }

            let body = match resp.text() {
                Ok(body) => body,
                Err(e) => {
                    self.circuit_breaker.record_failure();
                    last_error = Some(if e.is_timeout() {
                        FetchError::Timeout {
                            timeout_ms: self.config.timeout.as_millis() as u64,
                        }
                    } else {
                        FetchError::Transport(format!("failed to read body for {what}: {e}"))
                    });
                    continue;
                }
            };

            if status.is_client_error() {
                return Err(classify_client_error(what, status.as_u16(), &body));
            }

            if !status.is_success() {
                self.circuit_breaker.record_failure();
                last_error = Some(FetchError::Status {
                    symbol: what.to_string(),
                    status: status.as_u16(),
                });
                continue;
            }

            self.circuit_breaker.record_success();
            return Ok(body);
        }

        Err(last_error.unwrap_or_else(|| FetchError::Transport("max retries exceeded".into())))
    }
}

impl CandleFetcher for BinanceFetcher {
    fn name(&self) -> &str {
        "binance"
    }

    fn fetch(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>, FetchError> {
        let interval: Interval = interval
            .parse()
            .map_err(|e: crate::domain::IntervalError| FetchError::BadRequest(e.to_string()))?;
        if limit == 0 || limit > MAX_LIMIT {
            return Err(FetchError::BadRequest(format!(
                "limit must be in 1..={MAX_LIMIT}, got {limit}"
            )));
        }
        if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(FetchError::BadRequest(format!("invalid symbol '{symbol}'")));
        }
        let body = self.get_with_retry(&self.klines_url(symbol, &interval, limit), symbol)?;
        parse_klines(&body)
    }
}

impl SymbolUniverse for BinanceFetcher {
    fn tradable_symbols(&self, quote_asset: &str) -> Result<Vec<String>, FetchError> {
        let body = self.get_with_retry(&self.exchange_info_url(), "exchangeInfo")?;
        parse_exchange_symbols(&body, quote_asset)
    }
}

/// Map a 4xx body to a fetch error.
fn classify_client_error(symbol: &str, status: u16, body: &str) -> FetchError {
    match serde_json::from_str::<ApiError>(body) {
        Ok(err) if err.code == INVALID_SYMBOL => FetchError::SymbolNotFound {
            symbol: symbol.to_string(),
        },
        Ok(err) => FetchError::BadRequest(format!("{} ({})", err.msg, err.code)),
        Err(_) => FetchError::Status {
            symbol: symbol.to_string(),
            status,
        },
    }
}

/// Parse a kline response body.
///
/// Row layout: `[openTime, open, high, low, close, volume, closeTime, ...]`
/// with prices encoded as decimal strings.
pub fn parse_klines(body: &str) -> Result<Vec<Candle>, FetchError> {
    let rows: Vec<Vec<Value>> = serde_json::from_str(body)
        .map_err(|e| FetchError::Malformed(format!("expected an array of kline rows: {e}")))?;

    let mut candles = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        if row.len() < 5 {
            return Err(FetchError::Malformed(format!(
                "row {i} has {} fields, expected at least 5",
                row.len()
            )));
        }

        let open_time = row[0]
            .as_i64()
            .ok_or_else(|| FetchError::Malformed(format!("row {i}: open time is not an integer")))?;

        let close = parse_price(&row[4])
            .ok_or_else(|| FetchError::Malformed(format!("row {i}: close is not a number: {}", row[4])))?;

        if !(close.is_finite() && close > 0.0) {
            return Err(FetchError::Malformed(format!(
                "row {i}: close must be finite and positive, got {close}"
            )));
        }

        candles.push(Candle { open_time, close });
    }

    if !is_strictly_ascending(&candles) {
        return Err(FetchError::Malformed("open times are not strictly ascending".into()));
    }

    Ok(candles)
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    status: String,
    quote_asset: String,
}

/// Parse an `exchangeInfo` body into the symbols with status `TRADING` quoted
/// in `quote_asset`, in the order the exchange lists them.
pub fn parse_exchange_symbols(body: &str, quote_asset: &str) -> Result<Vec<String>, FetchError> {
    let info: ExchangeInfo = serde_json::from_str(body)
        .map_err(|e| FetchError::Malformed(format!("unexpected exchangeInfo payload: {e}")))?;
    Ok(info
        .symbols
        .into_iter()
        .filter(|s| s.status == "TRADING" && s.quote_asset == quote_asset)
        .map(|s| s.symbol)
        .collect())
}

/// Prices arrive as decimal strings; bare JSON numbers are accepted too.
fn parse_price(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}
