//! Monitor configuration: TOML file, environment overrides, validation.
//!
//! ```toml
//! entry_z = 2.0
//! exit_z = 0.5
//! cooldown_minutes = 30
//! interval = "1h"
//! lookback = 200
//! window = 100
//! min_samples = 50
//! pairs = [{ a = "BTCUSDT", b = "ETHUSDT" }]
//!
//! [fetch]
//! timeout_secs = 10
//!
//! [notify]
//! timeout_secs = 10
//!
//! [store]
//! path = "pairwatch-state.db"
//! ```
//!
//! Every field has a default. Invalid configurations are rejected by
//! `validate()`; the monitor refuses to run rather than operate with inverted
//! thresholds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use pairwatch_core::data::{BinanceConfig, MAX_LIMIT};
use pairwatch_core::domain::{Interval, IntervalError, PairKey};
use pairwatch_core::signal::{ClassifierError, Thresholds};
use pairwatch_core::spread::EngineParams;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("parse config TOML: {0}")]
    Parse(String),

    #[error("environment variable {var}={value:?} is not valid: {reason}")]
    Env { var: String, value: String, reason: String },

    #[error("invalid thresholds: {0}")]
    Thresholds(#[from] ClassifierError),

    #[error("invalid interval: {0}")]
    Interval(#[from] IntervalError),

    #[error("window must be > 0")]
    ZeroWindow,

    #[error("lookback must be > 0")]
    ZeroLookback,

    #[error("window ({window}) must not exceed lookback ({lookback})")]
    WindowExceedsLookback { window: usize, lookback: usize },

    #[error("lookback ({lookback}) is below the {required} candles every evaluation needs (max of min_samples, window + slack)")]
    LookbackTooShort { lookback: usize, required: usize },

    #[error("lookback ({lookback}) exceeds the exchange limit of {max} candles")]
    LookbackExceedsLimit { lookback: usize, max: usize },

    #[error("no pairs configured")]
    NoPairs,

    #[error("pair {0} has identical legs")]
    IdenticalLegs(String),

    #[error("fetch timeout must be > 0")]
    ZeroTimeout,

    #[error("notify timeout must be > 0")]
    ZeroNotifyTimeout,
}

/// One monitored pair as written in TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairConfig {
    pub a: String,
    pub b: String,
}

impl From<&PairConfig> for PairKey {
    fn from(p: &PairConfig) -> Self {
        PairKey::new(p.a.clone(), p.b.clone())
    }
}

/// Market-data client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub retries: u32,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".into(),
            timeout_secs: 10,
            retries: 2,
            cache_ttl_secs: 60,
            cache_capacity: 100,
        }
    }
}

impl FetchConfig {
    pub fn binance(&self) -> BinanceConfig {
        BinanceConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            max_retries: self.retries,
            ..BinanceConfig::default()
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Alert delivery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Upper bound on one delivery; a slower send counts as a failed one.
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

impl NotifyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database holding every pair's `AlertRecord`.
    pub path: PathBuf,
    /// How long a write waits for another process's lock.
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("pairwatch-state.db"),
            busy_timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// JSONL file receiving one line per cycle. `None` disables history.
    pub path: Option<PathBuf>,
}

/// Complete monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub entry_z: f64,
    pub exit_z: f64,
    pub cooldown_minutes: u64,
    pub interval: Interval,
    pub lookback: usize,
    pub window: usize,
    pub min_samples: usize,
    pub slack: usize,
    /// Evaluate pairs concurrently within a cycle.
    pub parallel: bool,
    pub pairs: Vec<PairConfig>,
    pub fetch: FetchConfig,
    pub notify: NotifyConfig,
    pub store: StoreConfig,
    pub history: HistoryConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let engine = EngineParams::default();
        let thresholds = Thresholds::default();
        Self {
            entry_z: thresholds.entry_z(),
            exit_z: thresholds.exit_z(),
            cooldown_minutes: 30,
            interval: Interval::default(),
            lookback: engine.lookback,
            window: engine.window,
            min_samples: engine.min_samples,
            slack: engine.slack,
            parallel: true,
            pairs: Vec::new(),
            fetch: FetchConfig::default(),
            notify: NotifyConfig::default(),
            store: StoreConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Load from a TOML file, apply environment overrides, validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file without overrides or validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary lookup (`ENTRY_Z`, `EXIT_Z`,
    /// `COOLDOWN_MIN`, `Z_INTERVAL`, `Z_LOOKBACK`, `Z_WINDOW`, `Z_MIN_SAMPLES`).
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parsed(&lookup, "ENTRY_Z")? {
            self.entry_z = v;
        }
        if let Some(v) = parsed(&lookup, "EXIT_Z")? {
            self.exit_z = v;
        }
        if let Some(v) = parsed(&lookup, "COOLDOWN_MIN")? {
            self.cooldown_minutes = v;
        }
        if let Some(v) = parsed(&lookup, "Z_INTERVAL")? {
            self.interval = v;
        }
        if let Some(v) = parsed(&lookup, "Z_LOOKBACK")? {
            self.lookback = v;
        }
        if let Some(v) = parsed(&lookup, "Z_WINDOW")? {
            self.window = v;
        }
        if let Some(v) = parsed(&lookup, "Z_MIN_SAMPLES")? {
            self.min_samples = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds()?;
        if self.window == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.lookback == 0 {
            return Err(ConfigError::ZeroLookback);
        }
        if self.window > self.lookback {
            return Err(ConfigError::WindowExceedsLookback {
                window: self.window,
                lookback: self.lookback,
            });
        }
        let required = self.engine_params().required_len();
        if required > self.lookback {
            return Err(ConfigError::LookbackTooShort {
                lookback: self.lookback,
                required,
            });
        }
        if self.lookback > MAX_LIMIT {
            return Err(ConfigError::LookbackExceedsLimit {
                lookback: self.lookback,
                max: MAX_LIMIT,
            });
        }
        if self.pairs.is_empty() {
            return Err(ConfigError::NoPairs);
        }
        if let Some(p) = self.pairs.iter().find(|p| p.a == p.b) {
            return Err(ConfigError::IdenticalLegs(format!("{}:{}", p.a, p.b)));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.notify.timeout_secs == 0 {
            return Err(ConfigError::ZeroNotifyTimeout);
        }
        Ok(())
    }

    pub fn thresholds(&self) -> Result<Thresholds, ConfigError> {
        Ok(Thresholds::new(self.entry_z, self.exit_z)?)
    }

    pub fn engine_params(&self) -> EngineParams {
        EngineParams {
            window: self.window,
            lookback: self.lookback,
            min_samples: self.min_samples,
            slack: self.slack,
        }
    }

    pub fn pair_keys(&self) -> Vec<PairKey> {
        self.pairs.iter().map(PairKey::from).collect()
    }
}

fn parsed<T, F>(lookup: &F, var: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|e: T::Err| ConfigError::Env {
            var: var.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
