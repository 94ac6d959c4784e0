//! Candle export — CSV for external analysis tools.
//!
//! Columns: `open_time` (epoch ms), `open_time_iso` (RFC 3339 UTC), `close`.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat};
use pairwatch_core::domain::Candle;

/// Render a candle series as CSV.
pub fn candles_to_csv(candles: &[Candle]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record(["open_time", "open_time_iso", "close"])?;
    for c in candles {
        let iso = DateTime::from_timestamp_millis(c.open_time)
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default();
        wtr.write_record([c.open_time.to_string(), iso, c.close.to_string()])?;
    }

    let bytes = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

/// Write a candle series as CSV to `path`, creating parent directories.
pub fn write_candles_csv(path: &Path, candles: &[Candle]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let csv = candles_to_csv(candles)?;
    std::fs::write(path, csv).with_context(|| format!("failed to write {}", path.display()))
}
