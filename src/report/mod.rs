//! Durable detection logs.
//!
//! Every artifact lives in the output directory and is named after the local
//! date it was written on:
//! - `<date>-threats.json`: JSON array of detection records
//! - `<date>-threats-structured.log`: readable block per detection
//! - `<date>-threats-table.log`: framed table, one row per detection
//! - `<date>-threats.csv`: one row per detection
//! - `<date>-clean-scans.log`: one line per session without findings
//! - `<date>-scan-summary.txt`: boxed summary per session

pub mod csv_log;
pub mod json;
pub mod text;

use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::types::{DetectionRecord, ScanSummary};
use chrono::{Local, NaiveDate};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Kinds of files written by the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    ThreatsJson,
    ThreatsStructured,
    ThreatsTable,
    ThreatsCsv,
    CleanScans,
    ScanSummary,
}

impl Artifact {
    /// File name suffix following the `<date>-` prefix.
    pub fn suffix(&self) -> &'static str {
        match self {
            Artifact::ThreatsJson => "threats.json",
            Artifact::ThreatsStructured => "threats-structured.log",
            Artifact::ThreatsTable => "threats-table.log",
            Artifact::ThreatsCsv => "threats.csv",
            Artifact::CleanScans => "clean-scans.log",
            Artifact::ScanSummary => "scan-summary.txt",
        }
    }
}

/// Single writer for all detection artifacts.
pub struct LogSink {
    output_dir: PathBuf,
    writer: Mutex<()>,
}

impl LogSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            writer: Mutex::new(()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.output_dir())
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path of an artifact for the given date.
    pub fn artifact_path(&self, artifact: Artifact, date: NaiveDate) -> PathBuf {
        self.output_dir
            .join(format!("{}-{}", date.format("%Y-%m-%d"), artifact.suffix()))
    }

    fn today_path(&self, artifact: Artifact) -> PathBuf {
        self.artifact_path(artifact, Local::now().date_naive())
    }

    fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| Error::sink_write(&self.output_dir, e))
    }

    /// Persist one detection to the JSON, structured, table and CSV logs.
    pub fn record(&self, record: &DetectionRecord) -> Result<()> {
        let _guard = self
            .writer
            .lock()
            .map_err(|_| Error::lock_poisoned("detection log writer"))?;
        self.ensure_dir()?;

        let json_path = self.today_path(Artifact::ThreatsJson);
        json::append_record(&json_path, record).map_err(|e| Error::sink_write(&json_path, e))?;

        let log_path = self.today_path(Artifact::ThreatsStructured);
        text::append(&log_path, &text::detection_block(record))
            .map_err(|e| Error::sink_write(&log_path, e))?;

        let table_path = self.today_path(Artifact::ThreatsTable);
        let mut row = String::new();
        if is_missing_or_empty(&table_path) {
            row.push_str(&text::table_header());
        }
        row.push_str(&text::table_row(record));
        text::append(&table_path, &row).map_err(|e| Error::sink_write(&table_path, e))?;

        let csv_path = self.today_path(Artifact::ThreatsCsv);
        csv_log::append_record(&csv_path, record).map_err(|e| Error::sink_write(&csv_path, e))?;

        log::debug!("Recorded detection of {}", record.infected_file);
        Ok(())
    }

    /// Append a clean-scan line for a session with no findings.
    pub fn record_clean(&self, summary: &ScanSummary) -> Result<()> {
        let _guard = self
            .writer
            .lock()
            .map_err(|_| Error::lock_poisoned("detection log writer"))?;
        self.ensure_dir()?;

        let path = self.today_path(Artifact::CleanScans);
        text::append(&path, &text::clean_line(summary)).map_err(|e| Error::sink_write(&path, e))
    }

    /// Append the boxed session summary.
    pub fn write_summary(&self, summary: &ScanSummary) -> Result<()> {
        let _guard = self
            .writer
            .lock()
            .map_err(|_| Error::lock_poisoned("detection log writer"))?;
        self.ensure_dir()?;

        let path = self.today_path(Artifact::ScanSummary);
        text::append(&path, &text::summary_box(summary)).map_err(|e| Error::sink_write(&path, e))?;
        log::info!("Scan summary written to {:?}", path);
        Ok(())
    }

    /// Read back the JSON detection log of a given day.
    pub fn read_records(&self, date: NaiveDate) -> Result<Vec<DetectionRecord>> {
        let path = self.artifact_path(Artifact::ThreatsJson, date);
        json::read_records(&path).map_err(|e| match e {
            json::JsonLogError::Serialize(e) => Error::Json(e),
            json::JsonLogError::Io(e) => Error::Io(format!("{}: {}", path.display(), e)),
        })
    }
}

fn is_missing_or_empty(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true)
}
