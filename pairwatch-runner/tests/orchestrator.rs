//! Orchestrator scenarios against scripted fakes.
//!
//! `StaticFetcher` serves fixed close series per symbol; `RecordingNotifier`
//! captures every delivered message and can be switched to fail.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use pairwatch_core::data::{CandleFetcher, FetchError};
use pairwatch_core::domain::{Candle, Interval, PairKey, PositionState, Signal};
use pairwatch_core::signal::Thresholds;
use pairwatch_core::spread::EngineParams;
use pairwatch_core::store::{CasOutcome, MemoryKv, PendingTransition, PositionStore, SqliteKv, DEFAULT_BUSY_TIMEOUT};
use pairwatch_runner::{
    AlertOrchestrator, CycleSettings, FailureKind, Notifier, NotifyError, PairReport, PairStatus, TimeoutNotifier,
};
use proptest::prelude::*;

const T0: i64 = 1_700_000_000_000;
const MINUTE: i64 = 60_000;

// ── Fakes ────────────────────────────────────────────────────────────

#[derive(Default)]
struct StaticFetcher {
    series: Mutex<HashMap<String, Vec<f64>>>,
}

impl StaticFetcher {
    fn set(&self, symbol: &str, closes: Vec<f64>) {
        self.series.lock().unwrap().insert(symbol.to_string(), closes);
    }
}

impl CandleFetcher for StaticFetcher {
    fn name(&self) -> &str {
        "static"
    }

    fn fetch(&self, symbol: &str, _interval: &str, limit: usize) -> Result<Vec<Candle>, FetchError> {
        let map = self.series.lock().unwrap();
        let closes = map.get(symbol).ok_or_else(|| FetchError::SymbolNotFound {
            symbol: symbol.to_string(),
        })?;
        let start = closes.len().saturating_sub(limit);
        Ok(closes[start..]
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle::new(i as i64 * 3_600_000, c))
            .collect())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    fn send(&self, text: &str) -> Result<(), NotifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Rejected("channel down".into()));
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

/// 29 closes alternating 100 / 101, then `last`. Against a constant 100 leg,
/// last = 80 gives z ≈ -4.2, 120 gives z ≈ +4.1 and 100.5 gives z ≈ 0.
fn series(last: f64) -> Vec<f64> {
    let mut v: Vec<f64> = (0..29).map(|i| if i % 2 == 0 { 100.0 } else { 101.0 }).collect();
    v.push(last);
    v
}

fn flat_leg() -> Vec<f64> {
    vec![100.0; 30]
}

fn settings(pairs: &[(&str, &str)]) -> CycleSettings {
    CycleSettings {
        thresholds: Thresholds::new(2.0, 0.5).unwrap(),
        params: EngineParams {
            window: 20,
            lookback: 30,
            min_samples: 20,
            slack: 0,
        },
        interval: Interval::default(),
        cooldown_minutes: 30,
        pairs: pairs.iter().map(|(a, b)| PairKey::new(*a, *b)).collect(),
        parallel: true,
    }
}

struct Harness {
    fetcher: Arc<StaticFetcher>,
    notifier: Arc<RecordingNotifier>,
    store: Arc<PositionStore>,
    orch: AlertOrchestrator,
}

fn harness(pairs: &[(&str, &str)]) -> Harness {
    let fetcher = Arc::new(StaticFetcher::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let store = Arc::new(PositionStore::in_memory());
    let orch = AlertOrchestrator::new(settings(pairs), fetcher.clone(), notifier.clone(), store.clone());
    Harness {
        fetcher,
        notifier,
        store,
        orch,
    }
}

fn ab() -> PairKey {
    PairKey::new("AAA", "BBB")
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn entry_long_then_exit() {
    let h = harness(&[("AAA", "BBB")]);
    h.fetcher.set("BBB", flat_leg());

    h.fetcher.set("AAA", series(80.0));
    let report = h.orch.run_cycle(T0);
    let p = &report.pairs[0];
    assert!(p.z.unwrap() <= -2.0, "z = {:?}", p.z);
    assert_eq!(p.prior_state, PositionState::Flat);
    assert_eq!(p.resulting_state, PositionState::Long);
    assert_eq!(p.signal, Some(Signal::EntryLong));
    assert!(matches!(p.status, PairStatus::Notified { .. }));

    let record = h.store.get(&ab()).unwrap();
    assert_eq!(record.state, PositionState::Long);
    assert_eq!(record.last_alert_ts, T0);
    assert!(record.pending.is_none());

    h.fetcher.set("AAA", series(100.5));
    let report = h.orch.run_cycle(T0 + 31 * MINUTE);
    let p = &report.pairs[0];
    assert!(p.z.unwrap().abs() <= 0.5, "z = {:?}", p.z);
    assert_eq!(p.signal, Some(Signal::Exit));
    assert_eq!(p.resulting_state, PositionState::Flat);

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent[0].starts_with("<b>ENTRY_LONG</b>"));
    assert!(sent[1].starts_with("<b>EXIT</b>"));
    assert_eq!(h.store.get(&ab()).unwrap().state, PositionState::Flat);
}

#[test]
fn high_z_enters_short() {
    let h = harness(&[("AAA", "BBB")]);
    h.fetcher.set("BBB", flat_leg());
    h.fetcher.set("AAA", series(120.0));

    let p = h.orch.run_cycle(T0).pairs.remove(0);
    assert_eq!(p.signal, Some(Signal::EntryShort));
    assert_eq!(h.store.get(&ab()).unwrap().state, PositionState::Short);
}

#[test]
fn cooldown_suppresses_signal_without_state_change() {
    let h = harness(&[("AAA", "BBB")]);
    h.fetcher.set("BBB", flat_leg());
    h.fetcher.set("AAA", series(80.0));
    h.orch.run_cycle(T0);
    let before = h.store.get(&ab()).unwrap();

    // Exit-worthy z only 10 minutes later.
    h.fetcher.set("AAA", series(100.5));
    let p = h.orch.run_cycle(T0 + 10 * MINUTE).pairs.remove(0);
    assert_eq!(p.signal, Some(Signal::Exit));
    assert!(!p.cooldown_elapsed);
    assert!(p.cooldown_suppressed());
    assert_eq!(p.resulting_state, PositionState::Long);

    assert_eq!(h.store.get(&ab()).unwrap(), before);
    assert_eq!(h.notifier.sent().len(), 1);
}

#[test]
fn notifier_failure_leaves_state_unchanged_and_retries() {
    let h = harness(&[("AAA", "BBB")]);
    h.fetcher.set("BBB", flat_leg());
    h.fetcher.set("AAA", series(80.0));
    h.notifier.fail.store(true, Ordering::SeqCst);

    let p = h.orch.run_cycle(T0).pairs.remove(0);
    assert!(matches!(
        p.status,
        PairStatus::Failed {
            kind: FailureKind::Notify,
            ..
        }
    ));
    assert_eq!(p.resulting_state, PositionState::Flat);

    let record = h.store.get(&ab()).unwrap();
    assert_eq!(record.state, PositionState::Flat);
    assert_eq!(record.last_alert_ts, 0);
    assert!(record.pending.is_none(), "failed delivery must release its claim");

    // Channel recovers: the same transition is delivered on the next cycle.
    h.notifier.fail.store(false, Ordering::SeqCst);
    let p = h.orch.run_cycle(T0 + MINUTE).pairs.remove(0);
    assert!(matches!(p.status, PairStatus::Notified { .. }));
    assert_eq!(h.store.get(&ab()).unwrap().state, PositionState::Long);
}

#[test]
fn per_pair_failures_are_isolated() {
    let h = harness(&[("AAA", "MISSING"), ("SHORT", "BBB"), ("AAA", "BBB")]);
    h.fetcher.set("AAA", series(80.0));
    h.fetcher.set("BBB", flat_leg());
    h.fetcher.set("SHORT", vec![100.0; 5]);

    let report = h.orch.run_cycle(T0);
    let ids: Vec<&str> = report.pairs.iter().map(|p| p.pair.as_str()).collect();
    assert_eq!(ids, vec!["AAA:MISSING", "SHORT:BBB", "AAA:BBB"]);

    let kind = |p: &PairReport| match &p.status {
        PairStatus::Failed { kind, .. } => Some(*kind),
        _ => None,
    };
    assert_eq!(kind(&report.pairs[0]), Some(FailureKind::Fetch));
    assert_eq!(kind(&report.pairs[1]), Some(FailureKind::InsufficientData));
    assert!(matches!(report.pairs[2].status, PairStatus::Notified { .. }));
    assert_eq!(report.failures().count(), 2);

    assert_eq!(h.store.get(&PairKey::new("AAA", "MISSING")).unwrap().version, 0);
    assert_eq!(h.store.get(&PairKey::new("SHORT", "BBB")).unwrap().version, 0);
}

#[test]
fn repeated_quiet_cycles_write_nothing() {
    let h = harness(&[("AAA", "BBB")]);
    h.fetcher.set("BBB", flat_leg());
    h.fetcher.set("AAA", series(100.5));
    for i in 0..5 {
        let p = h.orch.run_cycle(T0 + i * 60 * MINUTE).pairs.remove(0);
        assert_eq!(p.status, PairStatus::Quiet);
    }
    assert_eq!(h.store.get(&ab()).unwrap().version, 0);
    assert!(h.notifier.sent().is_empty());
}

/// Notifier that, while delivering, lets a second orchestrator evaluate the
/// same pair against the shared store.
struct OverlappingNotifier {
    other: OnceLock<AlertOrchestrator>,
    overlapped: Mutex<Vec<PairReport>>,
}

impl Notifier for OverlappingNotifier {
    fn name(&self) -> &str {
        "overlapping"
    }

    fn send(&self, _text: &str) -> Result<(), NotifyError> {
        if let Some(other) = self.other.get() {
            let report = other.evaluate_pair(&ab(), T0);
            self.overlapped.lock().unwrap().push(report);
        }
        Ok(())
    }
}

#[test]
fn overlapping_cycle_detects_stale_read() {
    let fetcher = Arc::new(StaticFetcher::default());
    fetcher.set("AAA", series(80.0));
    fetcher.set("BBB", flat_leg());
    let store = Arc::new(PositionStore::in_memory());

    let second_notifier = Arc::new(RecordingNotifier::default());
    let second = AlertOrchestrator::new(
        settings(&[("AAA", "BBB")]),
        fetcher.clone(),
        second_notifier.clone(),
        store.clone(),
    );
    let first_notifier = Arc::new(OverlappingNotifier {
        other: OnceLock::new(),
        overlapped: Mutex::new(Vec::new()),
    });
    assert!(first_notifier.other.set(second).is_ok());
    let first = AlertOrchestrator::new(
        settings(&[("AAA", "BBB")]),
        fetcher,
        first_notifier.clone(),
        store.clone(),
    );

    let p = first.run_cycle(T0).pairs.remove(0);
    assert!(matches!(p.status, PairStatus::Notified { .. }));

    let overlapped = first_notifier.overlapped.lock().unwrap();
    assert_eq!(overlapped.len(), 1);
    assert_eq!(overlapped[0].prior_state, PositionState::Flat);
    assert_eq!(overlapped[0].status, PairStatus::StaleRead);
    assert!(second_notifier.sent().is_empty());

    let record = store.get(&ab()).unwrap();
    assert_eq!(record.state, PositionState::Long);
    assert!(record.pending.is_none());
}

/// Slow channel so concurrent cycles really overlap.
struct SlowNotifier {
    delay: Duration,
    count: Mutex<usize>,
}

impl Notifier for SlowNotifier {
    fn name(&self) -> &str {
        "slow"
    }

    fn send(&self, _text: &str) -> Result<(), NotifyError> {
        std::thread::sleep(self.delay);
        *self.count.lock().unwrap() += 1;
        Ok(())
    }
}

#[test]
fn concurrent_cycles_notify_exactly_once() {
    let fetcher = Arc::new(StaticFetcher::default());
    fetcher.set("AAA", series(80.0));
    fetcher.set("BBB", flat_leg());
    let notifier = Arc::new(SlowNotifier {
        delay: Duration::from_millis(50),
        count: Mutex::new(0),
    });
    let orch = Arc::new(AlertOrchestrator::new(
        settings(&[("AAA", "BBB")]),
        fetcher,
        notifier.clone(),
        Arc::new(PositionStore::in_memory()),
    ));

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let orch = Arc::clone(&orch);
            std::thread::spawn(move || orch.run_cycle(T0))
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(*notifier.count.lock().unwrap(), 1);
    assert_eq!(orch.store().get(&ab()).unwrap().state, PositionState::Long);
}

#[test]
fn orphaned_claim_is_retaken_with_same_idempotency_key() {
    let fetcher = Arc::new(StaticFetcher::default());
    fetcher.set("AAA", series(80.0));
    fetcher.set("BBB", flat_leg());
    let notifier = Arc::new(RecordingNotifier::default());
    let store = Arc::new(PositionStore::with_lease(Arc::new(MemoryKv::new()), 5 * MINUTE));

    // A previous process claimed the same transition on the same candle and
    // died before committing.
    let last_candle_ts = 29 * 3_600_000;
    let orphan = PendingTransition::new(
        &ab(),
        PositionState::Flat,
        PositionState::Long,
        Signal::EntryLong,
        last_candle_ts,
        T0 - 10 * MINUTE,
    );
    let orphan_key = orphan.idempotency_key.clone();
    assert!(matches!(
        store.claim(&ab(), 0, orphan, T0 - 10 * MINUTE).unwrap(),
        CasOutcome::Applied(_)
    ));

    let orch = AlertOrchestrator::new(settings(&[("AAA", "BBB")]), fetcher, notifier.clone(), store.clone());
    let p = orch.run_cycle(T0).pairs.remove(0);
    assert_eq!(
        p.status,
        PairStatus::Notified {
            idempotency_key: orphan_key.clone()
        }
    );
    assert!(notifier.sent()[0].contains(&orphan_key));
    assert_eq!(store.get(&ab()).unwrap().state, PositionState::Long);
}

#[test]
fn live_claim_blocks_delivery() {
    let h = harness(&[("AAA", "BBB")]);
    h.fetcher.set("AAA", series(80.0));
    h.fetcher.set("BBB", flat_leg());

    let pending = PendingTransition::new(&ab(), PositionState::Flat, PositionState::Long, Signal::EntryLong, 0, T0);
    h.store.claim(&ab(), 0, pending, T0).unwrap();

    let p = h.orch.run_cycle(T0 + MINUTE).pairs.remove(0);
    assert_eq!(p.status, PairStatus::StaleRead);
    assert!(h.notifier.sent().is_empty());
}

/// Serves `inner`, except that fetches for `stalled` time out.
struct StallingFetcher {
    inner: StaticFetcher,
    stalled: &'static str,
}

impl CandleFetcher for StallingFetcher {
    fn name(&self) -> &str {
        "stalling"
    }

    fn fetch(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>, FetchError> {
        if symbol == self.stalled {
            return Err(FetchError::Timeout { timeout_ms: 10_000 });
        }
        self.inner.fetch(symbol, interval, limit)
    }
}

#[test]
fn fetch_timeout_fails_only_its_pair() {
    let inner = StaticFetcher::default();
    inner.set("AAA", series(80.0));
    inner.set("BBB", flat_leg());
    inner.set("CCC", series(120.0));
    let fetcher = Arc::new(StallingFetcher { inner, stalled: "SLOW" });
    let notifier = Arc::new(RecordingNotifier::default());
    let store = Arc::new(PositionStore::in_memory());
    let orch = AlertOrchestrator::new(
        settings(&[("AAA", "BBB"), ("SLOW", "BBB"), ("CCC", "BBB")]),
        fetcher,
        notifier.clone(),
        store.clone(),
    );

    let report = orch.run_cycle(T0);
    assert!(matches!(
        &report.pairs[1].status,
        PairStatus::Failed {
            kind: FailureKind::Fetch,
            message,
        } if message == "fetch SLOW: request timed out after 10000ms"
    ));
    assert!(matches!(report.pairs[0].status, PairStatus::Notified { .. }));
    assert!(matches!(report.pairs[2].status, PairStatus::Notified { .. }));
    assert_eq!(notifier.sent().len(), 2);

    assert_eq!(store.get(&PairKey::new("SLOW", "BBB")).unwrap().version, 0);
    assert_eq!(store.get(&ab()).unwrap().state, PositionState::Long);
    assert_eq!(store.get(&PairKey::new("CCC", "BBB")).unwrap().state, PositionState::Short);
}

#[test]
fn hung_channel_times_out_and_releases_claim() {
    let fetcher = Arc::new(StaticFetcher::default());
    fetcher.set("AAA", series(80.0));
    fetcher.set("BBB", flat_leg());
    let hung = SlowNotifier {
        delay: Duration::from_millis(500),
        count: Mutex::new(0),
    };
    let notifier = Arc::new(TimeoutNotifier::new(hung, Duration::from_millis(20)));
    let store = Arc::new(PositionStore::in_memory());
    let orch = AlertOrchestrator::new(settings(&[("AAA", "BBB")]), fetcher, notifier, store.clone());

    let p = orch.run_cycle(T0).pairs.remove(0);
    assert!(matches!(
        p.status,
        PairStatus::Failed {
            kind: FailureKind::Notify,
            ..
        }
    ));
    assert_eq!(p.resulting_state, PositionState::Flat);

    let record = store.get(&ab()).unwrap();
    assert_eq!(record.state, PositionState::Flat);
    assert_eq!(record.last_alert_ts, 0);
    assert!(record.pending.is_none(), "timed-out delivery must release its claim");
}

fn sqlite_store(path: &std::path::Path) -> Arc<PositionStore> {
    Arc::new(PositionStore::new(Arc::new(
        SqliteKv::open(path, DEFAULT_BUSY_TIMEOUT).unwrap(),
    )))
}

#[test]
fn overlapping_processes_on_one_state_file_send_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");
    let fetcher = Arc::new(StaticFetcher::default());
    fetcher.set("AAA", series(80.0));
    fetcher.set("BBB", flat_leg());

    // Each orchestrator owns its own connection, as separate processes would.
    let second_notifier = Arc::new(RecordingNotifier::default());
    let second = AlertOrchestrator::new(
        settings(&[("AAA", "BBB")]),
        fetcher.clone(),
        second_notifier.clone(),
        sqlite_store(&path),
    );
    let first_notifier = Arc::new(OverlappingNotifier {
        other: OnceLock::new(),
        overlapped: Mutex::new(Vec::new()),
    });
    assert!(first_notifier.other.set(second).is_ok());
    let first_store = sqlite_store(&path);
    let first = AlertOrchestrator::new(
        settings(&[("AAA", "BBB")]),
        fetcher,
        first_notifier.clone(),
        first_store.clone(),
    );

    let p = first.run_cycle(T0).pairs.remove(0);
    assert!(matches!(p.status, PairStatus::Notified { .. }));

    let overlapped = first_notifier.overlapped.lock().unwrap();
    assert_eq!(overlapped.len(), 1);
    assert_eq!(overlapped[0].status, PairStatus::StaleRead);
    assert!(second_notifier.sent().is_empty());

    let reopened = sqlite_store(&path).get(&ab()).unwrap();
    assert_eq!(reopened.state, PositionState::Long);
    assert_eq!(reopened.version, first_store.get(&ab()).unwrap().version);
    assert!(reopened.pending.is_none());
}

#[test]
fn concurrent_cycles_on_separate_connections_notify_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");
    let fetcher = Arc::new(StaticFetcher::default());
    fetcher.set("AAA", series(80.0));
    fetcher.set("BBB", flat_leg());
    let notifier = Arc::new(SlowNotifier {
        delay: Duration::from_millis(50),
        count: Mutex::new(0),
    });

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let orch = AlertOrchestrator::new(
                settings(&[("AAA", "BBB")]),
                fetcher.clone(),
                notifier.clone(),
                sqlite_store(&path),
            );
            std::thread::spawn(move || orch.run_cycle(T0))
        })
        .collect();
    let reports: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(*notifier.count.lock().unwrap(), 1);
    let notified = reports
        .iter()
        .filter(|r| matches!(r.pairs[0].status, PairStatus::Notified { .. }))
        .count();
    assert_eq!(notified, 1);
    assert!(reports.iter().all(|r| !r.has_failures()));
    assert_eq!(sqlite_store(&path).get(&ab()).unwrap().state, PositionState::Long);
}

// ── Properties ───────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// FLAT with |z| < entry stays FLAT across any number of cycles and never
    /// touches the store.
    #[test]
    fn flat_is_idempotent_inside_entry_band(last in 100.0..101.0_f64, cycles in 1usize..5) {
        let h = harness(&[("AAA", "BBB")]);
        h.fetcher.set("BBB", flat_leg());
        h.fetcher.set("AAA", series(last));
        for i in 0..cycles {
            let p = h.orch.run_cycle(T0 + i as i64 * 60 * MINUTE).pairs.remove(0);
            prop_assert!(p.z.unwrap().abs() < 2.0);
            prop_assert_eq!(p.resulting_state, PositionState::Flat);
        }
        prop_assert_eq!(h.store.get(&ab()).unwrap().version, 0);
        prop_assert!(h.notifier.sent().is_empty());
    }
}
