//! Cycle history — JSONL append-only persistence of cycle reports.
//!
//! One `CycleReport` per line. Each line is an independent JSON object, so a
//! partial write damages at most the last line; malformed lines are skipped on
//! read.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::report::CycleReport;

/// JSONL history file.
pub struct CycleHistory {
    path: PathBuf,
}

impl CycleHistory {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Append one report as a single line.
    pub fn append(&self, report: &CycleReport) -> io::Result<()> {
        let json = serde_json::to_string(report).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{json}")?;
        file.flush()?;
        debug!(path = %self.path.display(), pairs = report.pairs.len(), "cycle appended to history");
        Ok(())
    }

    /// Read every well-formed report, oldest first.
    pub fn read_all(&self) -> io::Result<Vec<CycleReport>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&self.path)?;
        let reader = io::BufReader::new(file);
        let mut reports = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CycleReport>(&line) {
                Ok(report) => reports.push(report),
                Err(e) => debug!(error = %e, "skipping malformed history line"),
            }
        }

        Ok(reports)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
