//! Alert orchestrator: one evaluation cycle across all configured pairs.
//!
//! Per pair, strictly in order:
//! read record → fetch both legs → z-score → classify → [claim → notify →
//! commit | release]. Pairs are independent and run concurrently on the rayon
//! pool when `parallel` is set; a failure in one pair is reported and never
//! stops the others.
//!
//! State only advances after a confirmed delivery. The claim taken before
//! notifying is a compare-and-set on the version read at the start of the
//! pair's evaluation, so an overlapping cycle that read the same record cannot
//! also notify.

use std::sync::Arc;

use pairwatch_core::data::CandleFetcher;
use pairwatch_core::domain::{Interval, PairKey, PositionState, Signal};
use pairwatch_core::signal::{classify, Thresholds};
use pairwatch_core::spread::{compute_zscore, EngineParams, ZScoreResult};
use pairwatch_core::store::{AlertRecord, CasOutcome, PendingTransition, PositionStore};
use rayon::prelude::*;
use tracing::{debug, info, info_span, warn};

use crate::config::{ConfigError, MonitorConfig};
use crate::notifier::{format_alert, AlertContext, Notifier};
use crate::report::{CycleError, CycleReport, PairReport, PairStatus};

/// Evaluation settings, validated.
#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub thresholds: Thresholds,
    pub params: EngineParams,
    pub interval: Interval,
    pub cooldown_minutes: u64,
    pub pairs: Vec<PairKey>,
    pub parallel: bool,
}

impl CycleSettings {
    pub fn from_config(config: &MonitorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            thresholds: config.thresholds()?,
            params: config.engine_params(),
            interval: config.interval.clone(),
            cooldown_minutes: config.cooldown_minutes,
            pairs: config.pair_keys(),
            parallel: config.parallel,
        })
    }

    fn cooldown_ms(&self) -> i64 {
        i64::try_from(self.cooldown_minutes.saturating_mul(60_000)).unwrap_or(i64::MAX)
    }
}

pub struct AlertOrchestrator {
    settings: CycleSettings,
    fetcher: Arc<dyn CandleFetcher>,
    notifier: Arc<dyn Notifier>,
    store: Arc<PositionStore>,
}

impl AlertOrchestrator {
    pub fn new(
        settings: CycleSettings,
        fetcher: Arc<dyn CandleFetcher>,
        notifier: Arc<dyn Notifier>,
        store: Arc<PositionStore>,
    ) -> Self {
        Self {
            settings,
            fetcher,
            notifier,
            store,
        }
    }

    pub fn settings(&self) -> &CycleSettings {
        &self.settings
    }

    pub fn store(&self) -> &PositionStore {
        &self.store
    }

    /// Run one cycle evaluated at `now_ms` (epoch ms).
    pub fn run_cycle(&self, now_ms: i64) -> CycleReport {
        info!(
            pairs = self.settings.pairs.len(),
            fetcher = self.fetcher.name(),
            notifier = self.notifier.name(),
            "cycle start"
        );

        let pairs: Vec<PairReport> = if self.settings.parallel {
            self.settings
                .pairs
                .par_iter()
                .map(|pair| self.evaluate_pair(pair, now_ms))
                .collect()
        } else {
            self.settings
                .pairs
                .iter()
                .map(|pair| self.evaluate_pair(pair, now_ms))
                .collect()
        };

        let report = CycleReport { now_ms, pairs };
        info!(
            notified = report.notified_count(),
            failed = report.failures().count(),
            "cycle done"
        );
        report
    }

    /// Evaluate a single pair. Never panics on per-pair errors; every outcome
    /// is encoded in the returned report.
    pub fn evaluate_pair(&self, pair: &PairKey, now_ms: i64) -> PairReport {
        let span = info_span!("pair", pair = %pair);
        let _enter = span.enter();

        let record = match self.store.get(pair) {
            Ok(r) => r,
            Err(e) => {
                let err = CycleError::from(e);
                warn!(error = %err, "state read failed");
                return PairReport::failure(pair.id(), PositionState::Flat, false, &err);
            }
        };
        let cooldown_elapsed = now_ms.saturating_sub(record.last_alert_ts) >= self.settings.cooldown_ms();

        let result = match self.compute(pair) {
            Ok(r) => r,
            Err(err) => {
                warn!(error = %err, "pair skipped this cycle");
                return PairReport::failure(pair.id(), record.state, cooldown_elapsed, &err);
            }
        };

        if result.misaligned > 0 {
            warn!(misaligned = result.misaligned, "leg open times disagree after trailing alignment");
        }

        let transition = classify(record.state, result.z, &self.settings.thresholds);
        debug!(
            z = result.z,
            corr = result.correlation,
            state = %record.state,
            next = %transition.next,
            "classified"
        );

        let mut report = PairReport {
            pair: pair.id(),
            z: Some(result.z),
            correlation: Some(result.correlation),
            candle_ts: Some(result.timestamp),
            prior_state: record.state,
            resulting_state: record.state,
            signal: transition.signal,
            cooldown_elapsed,
            status: PairStatus::Quiet,
        };

        let Some(signal) = transition.signal else {
            return report;
        };
        if !cooldown_elapsed {
            info!(signal = %signal, last_alert_ts = record.last_alert_ts, "signal suppressed by cooldown");
            report.status = PairStatus::CooldownSuppressed;
            return report;
        }

        match self.deliver(pair, &record, transition.next, signal, &result, now_ms) {
            Ok((status, resulting)) => {
                report.status = status;
                report.resulting_state = resulting;
            }
            Err(err) => {
                warn!(error = %err, signal = %signal, "delivery failed; state left unchanged");
                report.status = PairStatus::failed(&err);
            }
        }
        report
    }

    /// Fetch both legs and compute the z-score.
    fn compute(&self, pair: &PairKey) -> Result<ZScoreResult, CycleError> {
        let interval = self.settings.interval.as_str();
        let limit = self.settings.params.lookback;
        let fetch = |symbol: &str| {
            self.fetcher.fetch(symbol, interval, limit).map_err(|source| CycleError::Fetch {
                symbol: symbol.to_string(),
                source,
            })
        };

        let (a, b) = if self.settings.parallel {
            rayon::join(|| fetch(&pair.a), || fetch(&pair.b))
        } else {
            (fetch(&pair.a), fetch(&pair.b))
        };
        let (a, b) = (a?, b?);

        Ok(compute_zscore(&a, &b, interval, &self.settings.params)?)
    }

    /// Claim, notify, then commit or release. Returns the pair status and the
    /// state stored afterwards.
    fn deliver(
        &self,
        pair: &PairKey,
        record: &AlertRecord,
        next: PositionState,
        signal: Signal,
        result: &ZScoreResult,
        now_ms: i64,
    ) -> Result<(PairStatus, PositionState), CycleError> {
        let pending = PendingTransition::new(pair, record.state, next, signal, result.timestamp, now_ms);
        let key = pending.idempotency_key.clone();

        let claimed = match self.store.claim(pair, record.version, pending, now_ms)? {
            CasOutcome::Applied(r) => r,
            CasOutcome::Stale { current } => {
                info!(
                    read_version = record.version,
                    current_version = current.version,
                    "stale read; another cycle owns this transition"
                );
                return Ok((PairStatus::StaleRead, current.state));
            }
        };

        let text = format_alert(
            &AlertContext {
                pair,
                from: record.state,
                to: next,
                signal,
                entry_z: self.settings.thresholds.entry_z(),
                exit_z: self.settings.thresholds.exit_z(),
                cooldown_minutes: self.settings.cooldown_minutes,
                idempotency_key: &key,
            },
            result,
        );

        if let Err(e) = self.notifier.send(&text) {
            if let Err(release_err) = self.store.release(pair, claimed.version) {
                // The claim lapses after the lease.
                warn!(error = %release_err, "claim release failed");
            }
            return Err(e.into());
        }

        match self.store.commit(pair, claimed.version, next, now_ms)? {
            CasOutcome::Applied(r) => {
                info!(signal = %signal, state = %r.state, key = %key, "alert delivered");
                Ok((PairStatus::Notified { idempotency_key: key }, r.state))
            }
            CasOutcome::Stale { current } => {
                warn!(key = %key, "delivered but commit found a newer record");
                Ok((PairStatus::CommitConflict { idempotency_key: key }, current.state))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::ConsoleNotifier;
    use pairwatch_core::data::SyntheticFetcher;

    fn settings(pairs: Vec<PairKey>) -> CycleSettings {
        CycleSettings {
            thresholds: Thresholds::default(),
            params: EngineParams::default(),
            interval: Interval::default(),
            cooldown_minutes: 30,
            pairs,
            parallel: true,
        }
    }

    #[test]
    fn settings_from_invalid_config_fail() {
        let config = MonitorConfig::default();
        assert!(matches!(CycleSettings::from_config(&config), Err(ConfigError::NoPairs)));
    }

    #[test]
    fn synthetic_cycle_reports_every_pair_in_order() {
        let pairs = vec![
            PairKey::new("BTCUSDT", "ETHUSDT"),
            PairKey::new("SOLUSDT", "AVAXUSDT"),
            PairKey::new("BNBUSDT", "XRPUSDT"),
        ];
        let orch = AlertOrchestrator::new(
            settings(pairs.clone()),
            Arc::new(SyntheticFetcher::new(7, 1_700_000_000_000)),
            Arc::new(ConsoleNotifier),
            Arc::new(PositionStore::in_memory()),
        );
        let report = orch.run_cycle(1_700_000_000_000);
        let ids: Vec<&str> = report.pairs.iter().map(|p| p.pair.as_str()).collect();
        assert_eq!(ids, vec!["BTCUSDT:ETHUSDT", "SOLUSDT:AVAXUSDT", "BNBUSDT:XRPUSDT"]);
        assert!(!report.has_failures());
        assert!(report.pairs.iter().all(|p| p.z.is_some()));
    }
}
