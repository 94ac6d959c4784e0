//! PairWatch Runner — alert orchestration, configuration, reports, scanner.
//!
//! This crate builds on `pairwatch-core` to provide:
//! - Monitor configuration from TOML with environment overrides
//! - Notifier contract, alert formatting and a bounded-timeout wrapper
//! - The alert orchestrator (one evaluation cycle across all pairs)
//! - Per-cycle reports and their JSONL history
//! - Correlation scanner, ranked signal list and CSV candle export

pub mod config;
pub mod export;
pub mod history;
pub mod notifier;
pub mod orchestrator;
pub mod report;
pub mod scanner;

pub use config::{ConfigError, FetchConfig, HistoryConfig, MonitorConfig, NotifyConfig, PairConfig, StoreConfig};
pub use export::{candles_to_csv, write_candles_csv};
pub use history::CycleHistory;
pub use notifier::{format_alert, AlertContext, ConsoleNotifier, Notifier, NotifyError, TimeoutNotifier};
pub use orchestrator::{AlertOrchestrator, CycleSettings};
pub use report::{CycleError, CycleReport, FailureKind, PairReport, PairStatus};
pub use scanner::{
    quote_asset, scan_correlated, universe_candidates, ScanAction, ScanFailure, ScanMatch, ScanOptions, ScanReport,
    ScanSignal, DEFAULT_UNIVERSE_SIZE, SIGNAL_MIN_ABS_Z,
};
