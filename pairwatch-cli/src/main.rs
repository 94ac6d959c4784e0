//! PairWatch CLI — alert cycles, correlation scans, candle export, state dump.
//!
//! Commands:
//! - `cycle` — run one evaluation cycle over the configured pairs
//! - `scan` — rank candidates by correlation against a base symbol
//! - `candles` — fetch a candle series and print or save it as CSV
//! - `state` — print the stored per-pair records
//! - `history` — print the most recent recorded cycles

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pairwatch_core::data::{
    BinanceFetcher, CachedFetcher, CandleCache, CandleFetcher, CircuitBreaker, SymbolUniverse, SyntheticFetcher,
};
use pairwatch_core::domain::Interval;
use pairwatch_core::spread::EngineParams;
use pairwatch_core::store::{PositionStore, SqliteKv};
use pairwatch_runner::{
    candles_to_csv, scan_correlated, universe_candidates, write_candles_csv, AlertOrchestrator, ConsoleNotifier,
    CycleHistory, CycleReport, CycleSettings, FetchConfig, MonitorConfig, PairStatus, ScanOptions, ScanReport,
    TimeoutNotifier, DEFAULT_UNIVERSE_SIZE,
};

/// Seed for `--synthetic` runs.
const SYNTHETIC_SEED: u64 = 42;

#[derive(Parser)]
#[command(
    name = "pairwatch",
    about = "PairWatch — pair spread z-score monitor and alerter"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one evaluation cycle over every configured pair.
    Cycle {
        /// Path to the monitor TOML config.
        #[arg(long)]
        config: PathBuf,

        /// Use synthetic candles and an in-memory store (no network, no state written).
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Print the cycle report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Rank candidate symbols by price correlation with a base symbol.
    Scan {
        /// Base symbol (leg A of every spread).
        #[arg(long, default_value = "BTCUSDT")]
        base: String,

        /// Candidate symbols. Defaults to the exchange's tradable symbols in
        /// the base's quote asset.
        #[arg(long, num_args = 1..)]
        candidates: Vec<String>,

        /// How many universe symbols to scan when no candidates are given.
        #[arg(long, default_value_t = DEFAULT_UNIVERSE_SIZE)]
        universe_size: usize,

        /// Minimum |correlation| to list a candidate.
        #[arg(long, default_value_t = 0.7)]
        min_corr: f64,

        #[arg(long, default_value = "1h")]
        interval: String,

        /// Candles fetched per symbol.
        #[arg(long, default_value_t = 200)]
        limit: usize,

        /// Rolling z-score window.
        #[arg(long, default_value_t = 100)]
        window: usize,

        /// Print the ranked mean-reversion signal list (at most N entries)
        /// instead of the correlation table.
        #[arg(long, value_name = "N")]
        signals: Option<usize>,

        #[arg(long, default_value_t = false)]
        synthetic: bool,
    },
    /// Fetch a candle series and print it (or save it) as CSV.
    Candles {
        symbol: String,

        #[arg(long, default_value = "1h")]
        interval: String,

        #[arg(long, default_value_t = 100)]
        limit: usize,

        /// Write CSV here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,

        #[arg(long, default_value_t = false)]
        synthetic: bool,
    },
    /// Print the stored state of every pair.
    State {
        /// Path to the monitor TOML config.
        #[arg(long)]
        config: PathBuf,
    },
    /// Print the most recent cycles from the configured history file.
    History {
        /// Path to the monitor TOML config.
        #[arg(long)]
        config: PathBuf,

        #[arg(long, default_value_t = 10)]
        last: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Cycle {
            config,
            synthetic,
            json,
        } => run_cycle_cmd(&config, synthetic, json),
        Commands::Scan {
            base,
            candidates,
            universe_size,
            min_corr,
            interval,
            limit,
            window,
            signals,
            synthetic,
        } => {
            let args = ScanArgs {
                base,
                candidates,
                universe_size,
                min_corr,
                interval,
                limit,
                window,
                signals,
                synthetic,
            };
            run_scan(&args)
        }
        Commands::Candles {
            symbol,
            interval,
            limit,
            out,
            synthetic,
        } => run_candles(&symbol, &interval, limit, out.as_deref(), synthetic),
        Commands::State { config } => run_state(&config),
        Commands::History { config, last } => run_history(&config, last),
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn iso(ms: i64) -> String {
    if ms == 0 {
        return "never".into();
    }
    DateTime::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| ms.to_string())
}

/// Candle source and symbol universe. Live runs share one exchange client; the
/// candle side goes through the TTL cache.
struct Sources {
    candles: Arc<dyn CandleFetcher>,
    universe: Arc<dyn SymbolUniverse>,
}

fn build_sources(fetch: &FetchConfig, synthetic: bool) -> Result<Sources> {
    if synthetic {
        warn!("using SYNTHETIC candles; results are not market data");
        let fetcher = Arc::new(SyntheticFetcher::new(SYNTHETIC_SEED, now_ms()));
        return Ok(Sources {
            candles: fetcher.clone(),
            universe: fetcher,
        });
    }
    let breaker = Arc::new(CircuitBreaker::default_exchange());
    let binance = Arc::new(
        BinanceFetcher::new(fetch.binance(), breaker).context("failed to build exchange client")?,
    );
    let cache = Arc::new(CandleCache::new(fetch.cache_ttl(), fetch.cache_capacity));
    Ok(Sources {
        candles: Arc::new(CachedFetcher::new(Arc::clone(&binance), cache)),
        universe: binance,
    })
}

fn open_store(config: &MonitorConfig) -> Result<PositionStore> {
    let path = &config.store.path;
    let kv = SqliteKv::open(path.clone(), config.store.busy_timeout())
        .with_context(|| format!("failed to open state store {}", path.display()))?;
    Ok(PositionStore::new(Arc::new(kv)))
}

fn load_config(path: &Path) -> Result<MonitorConfig> {
    MonitorConfig::load(path).with_context(|| format!("invalid config {}", path.display()))
}

// ── cycle ──

fn run_cycle_cmd(config_path: &Path, synthetic: bool, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let settings = CycleSettings::from_config(&config)?;

    let sources = build_sources(&config.fetch, synthetic)?;
    let store = if synthetic {
        PositionStore::in_memory()
    } else {
        open_store(&config)?
    };
    let notifier = TimeoutNotifier::new(ConsoleNotifier, config.notify.timeout());

    let orchestrator = AlertOrchestrator::new(settings, sources.candles, Arc::new(notifier), Arc::new(store));
    let report = orchestrator.run_cycle(now_ms());

    if let (Some(path), false) = (&config.history.path, synthetic) {
        if let Err(e) = CycleHistory::new(path.clone()).append(&report) {
            warn!(error = %e, path = %path.display(), "failed to append cycle history");
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_cycle(&report);
    }

    if report.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_cycle(report: &CycleReport) {
    println!("Cycle at {}", iso(report.now_ms));
    println!(
        "{:<22} {:>8} {:>7} {:<6} {:<6} {:<12} STATUS",
        "PAIR", "Z", "CORR", "FROM", "TO", "SIGNAL"
    );
    for p in &report.pairs {
        let z = p.z.map_or_else(|| "-".to_string(), |z| format!("{z:.2}"));
        let corr = p.correlation.map_or_else(|| "-".to_string(), |c| format!("{c:.3}"));
        let signal = p.signal.map_or_else(|| "-".to_string(), |s| s.to_string());
        let status = match &p.status {
            PairStatus::Quiet => "quiet".to_string(),
            PairStatus::Notified { idempotency_key } => format!("notified [{idempotency_key}]"),
            PairStatus::CooldownSuppressed => "cooldown".to_string(),
            PairStatus::StaleRead => "stale read (skipped)".to_string(),
            PairStatus::CommitConflict { idempotency_key } => format!("commit conflict [{idempotency_key}]"),
            PairStatus::Failed { message, .. } => format!("FAILED: {message}"),
        };
        println!(
            "{:<22} {:>8} {:>7} {:<6} {:<6} {:<12} {status}",
            p.pair, z, corr, p.prior_state, p.resulting_state, signal
        );
    }
    println!(
        "{} pair(s), {} notified, {} failed",
        report.pairs.len(),
        report.notified_count(),
        report.failures().count()
    );
}

// ── scan ──

struct ScanArgs {
    base: String,
    candidates: Vec<String>,
    universe_size: usize,
    min_corr: f64,
    interval: String,
    limit: usize,
    window: usize,
    signals: Option<usize>,
    synthetic: bool,
}

fn run_scan(args: &ScanArgs) -> Result<()> {
    let interval: Interval = args.interval.parse()?;
    if args.window == 0 || args.window > args.limit {
        bail!("--window must be in 1..={}, got {}", args.limit, args.window);
    }
    let params = EngineParams {
        window: args.window,
        lookback: args.limit,
        ..EngineParams::default()
    };
    let sources = build_sources(&FetchConfig::default(), args.synthetic)?;

    let candidates = if args.candidates.is_empty() {
        let drawn = universe_candidates(sources.universe.as_ref(), &args.base, args.universe_size)
            .context("failed to load the symbol universe")?;
        info!(candidates = drawn.len(), "scanning tradable symbols");
        drawn
    } else {
        args.candidates.clone()
    };

    let options = ScanOptions {
        interval,
        params,
        min_correlation: args.min_corr,
    };
    let report = scan_correlated(sources.candles.as_ref(), &args.base, &candidates, &options);
    info!(matches = report.matches.len(), failures = report.failures.len(), "scan complete");

    match args.signals {
        Some(limit) => print_signals(&report, limit),
        None => print_matches(&report),
    }
    for f in &report.failures {
        eprintln!("Error for {}: {}", f.symbol, f.message);
    }
    Ok(())
}

fn print_matches(report: &ScanReport) {
    println!("Base: {}", report.base);
    println!("{:<14} {:>7} {:>8} {:>10}  STRENGTH", "SYMBOL", "CORR", "Z", "SPREAD");
    for m in &report.matches {
        println!(
            "{:<14} {:>7.3} {:>8.2} {:>10.6}  {:?}",
            m.symbol, m.correlation, m.z, m.spread, m.strength
        );
    }
}

fn print_signals(report: &ScanReport, limit: usize) {
    let signals = report.signals(limit);
    println!("Base: {} ({} signal(s))", report.base, signals.len());
    println!("{:<14} {:>8} {:>7} {:<8} {:>5}  STRENGTH", "SYMBOL", "Z", "CORR", "ACTION", "CONF");
    for s in &signals {
        println!(
            "{:<14} {:>8.2} {:>7.3} {:<8} {:>5.0}  {:?}",
            s.symbol,
            s.z,
            s.correlation,
            format!("{:?}", s.action),
            s.confidence,
            s.strength
        );
    }
}

// ── candles ──

fn run_candles(symbol: &str, interval: &str, limit: usize, out: Option<&Path>, synthetic: bool) -> Result<()> {
    let interval: Interval = interval.parse()?;
    let sources = build_sources(&FetchConfig::default(), synthetic)?;
    let candles = sources
        .candles
        .fetch(symbol, interval.as_str(), limit)
        .with_context(|| format!("failed to fetch {symbol}"))?;

    match out {
        Some(path) => {
            write_candles_csv(path, &candles)?;
            println!("{} candles written to {}", candles.len(), path.display());
        }
        None => print!("{}", candles_to_csv(&candles)?),
    }
    Ok(())
}

// ── state ──

fn run_state(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;

    let records = store.records()?;
    if records.is_empty() {
        println!("No stored records in {}", config.store.path.display());
        return Ok(());
    }
    let now = now_ms();
    println!("{:<22} {:<6} {:<22} {:>7}  PENDING", "PAIR", "STATE", "LAST ALERT", "VERSION");
    for (id, r) in records {
        let pending = r.pending.as_ref().map_or_else(
            || "-".to_string(),
            |p| {
                // A claim past its lease belongs to a cycle that died mid-delivery.
                let lease = if r.is_claimable(now, store.lease_ms()) {
                    "abandoned"
                } else {
                    "live"
                };
                format!(
                    "{} → {} since {} [{}] {lease}",
                    p.from,
                    p.to,
                    iso(p.claimed_at),
                    p.idempotency_key
                )
            },
        );
        println!(
            "{:<22} {:<6} {:<22} {:>7}  {pending}",
            id,
            r.state,
            iso(r.last_alert_ts),
            r.version
        );
    }
    Ok(())
}

// ── history ──

fn run_history(config_path: &Path, last: usize) -> Result<()> {
    let config = load_config(config_path)?;
    let Some(path) = config.history.path else {
        bail!("no [history] path configured in {}", config_path.display());
    };
    let history = CycleHistory::new(path);
    let reports = history
        .read_all()
        .with_context(|| format!("failed to read {}", history.path().display()))?;

    if reports.is_empty() {
        println!("No recorded cycles in {}", history.path().display());
        return Ok(());
    }
    let skip = reports.len().saturating_sub(last);
    for report in &reports[skip..] {
        let statuses: Vec<String> = report
            .pairs
            .iter()
            .filter(|p| !matches!(p.status, PairStatus::Quiet))
            .map(|p| format!("{} {}", p.pair, status_label(&p.status)))
            .collect();
        println!(
            "{}  {} pair(s), {} notified, {} failed  {}",
            iso(report.now_ms),
            report.pairs.len(),
            report.notified_count(),
            report.failures().count(),
            statuses.join(", ")
        );
    }
    Ok(())
}

fn status_label(status: &PairStatus) -> &'static str {
    match status {
        PairStatus::Quiet => "quiet",
        PairStatus::Notified { .. } => "notified",
        PairStatus::CooldownSuppressed => "cooldown",
        PairStatus::StaleRead => "stale-read",
        PairStatus::CommitConflict { .. } => "commit-conflict",
        PairStatus::Failed { .. } => "failed",
    }
}
