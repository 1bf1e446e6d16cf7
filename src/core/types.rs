//! Core type definitions used throughout hashsweep.

use crate::detection::signature::SignatureMetadata;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Timestamp layout used in every detection artifact.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a local timestamp the way detection artifacts expect it.
pub fn format_timestamp(time: &DateTime<Local>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// Identity of the host running the scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostIdentity {
    pub hostname: String,
    pub ip: String,
    pub os: String,
}

/// A file discovered during traversal, with metadata captured at discovery.
#[derive(Debug, Clone)]
pub struct ScanTarget {
    /// Path to the file
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: DateTime<Local>,
    /// Creation time (modification time where the platform has none)
    pub created: DateTime<Local>,
}

impl ScanTarget {
    /// Build a target from a path and its filesystem metadata.
    pub fn from_metadata(path: impl Into<PathBuf>, metadata: &Metadata) -> Self {
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let created = metadata.created().unwrap_or(modified);

        Self {
            path: path.into(),
            size: metadata.len(),
            modified: DateTime::<Local>::from(modified),
            created: DateTime::<Local>::from(created),
        }
    }

    /// Stat a path and build a target from it.
    pub fn stat(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Ok(Self::from_metadata(path, &metadata))
    }
}

/// Outcome of classifying one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanResult {
    /// Digest absent from the signature set
    Clean,
    /// Digest present in the signature set
    Threat {
        digest: String,
        created_at: DateTime<Local>,
        modified_at: DateTime<Local>,
    },
}

impl ScanResult {
    /// Whether this result is a detection.
    pub fn is_threat(&self) -> bool {
        matches!(self, ScanResult::Threat { .. })
    }
}

/// Phase of a scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPhase {
    Init,
    Discovering,
    Dispatching,
    Draining,
    Completed,
}

impl std::fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanPhase::Init => write!(f, "Initializing"),
            ScanPhase::Discovering => write!(f, "Discovering"),
            ScanPhase::Dispatching => write!(f, "Scanning"),
            ScanPhase::Draining => write!(f, "Draining"),
            ScanPhase::Completed => write!(f, "Completed"),
        }
    }
}

/// Final status of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    /// Scan is currently running
    Running,
    /// Scan completed successfully
    Completed,
    /// Scan was cancelled by user
    Cancelled,
    /// Scan failed with error
    Failed,
}

/// Summary of a scan session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Unique scan identifier
    pub scan_id: String,
    /// Host the scan ran on
    pub host: HostIdentity,
    /// Root path that was scanned
    pub root: PathBuf,
    /// When the scan started
    pub start_time: DateTime<Local>,
    /// When the scan ended
    pub end_time: Option<DateTime<Local>>,
    /// Final status
    pub status: ScanStatus,
    /// Files seen by traversal (eligible or not)
    pub discovered: u64,
    /// Eligible files dispatched to workers
    pub submitted: u64,
    /// Files hashed and classified
    pub scanned: u64,
    /// Files whose digest matched a signature
    pub infected: u64,
    /// Files that could not be read
    pub errors: u64,
    /// Files rejected by the filter
    pub skipped: u64,
    /// Total bytes hashed
    pub bytes_scanned: u64,
    /// Wall-clock scan time in seconds
    pub elapsed_secs: f64,
    /// Signature database in use
    pub signatures: Option<SignatureMetadata>,
}

impl ScanSummary {
    /// Create a new, running scan summary.
    pub fn new(host: HostIdentity, root: impl Into<PathBuf>) -> Self {
        Self {
            scan_id: uuid::Uuid::new_v4().to_string(),
            host,
            root: root.into(),
            start_time: Local::now(),
            end_time: None,
            status: ScanStatus::Running,
            discovered: 0,
            submitted: 0,
            scanned: 0,
            infected: 0,
            errors: 0,
            skipped: 0,
            bytes_scanned: 0,
            elapsed_secs: 0.0,
            signatures: None,
        }
    }

    /// Throughput in files per second; zero when no time has elapsed.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.scanned as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }

    /// Whether the session found no threats.
    pub fn is_clean(&self) -> bool {
        self.infected == 0
    }

    /// Mark the scan as completed.
    pub fn complete(&mut self) {
        self.end_time = Some(Local::now());
        self.status = ScanStatus::Completed;
    }

    /// Mark the scan as cancelled.
    pub fn cancel(&mut self) {
        self.end_time = Some(Local::now());
        self.status = ScanStatus::Cancelled;
    }

    /// Mark the scan as failed.
    pub fn fail(&mut self) {
        self.end_time = Some(Local::now());
        self.status = ScanStatus::Failed;
    }
}

/// Durable record of one detection.
///
/// Field names match the JSON and CSV artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// When the detection was made
    pub datetime: String,
    pub scan_id: String,
    pub os: String,
    pub hostname: String,
    pub ip: String,
    /// Absolute path of the matching file
    pub infected_file: String,
    pub sha256: String,
    pub created_at: String,
    pub modified_at: String,
}

impl DetectionRecord {
    /// Build a record for a threat found during the given session.
    pub fn new(
        scan_id: &str,
        host: &HostIdentity,
        path: &Path,
        digest: &str,
        created_at: &DateTime<Local>,
        modified_at: &DateTime<Local>,
    ) -> Self {
        Self {
            datetime: format_timestamp(&Local::now()),
            scan_id: scan_id.to_string(),
            os: host.os.clone(),
            hostname: host.hostname.clone(),
            ip: host.ip.clone(),
            infected_file: path.display().to_string(),
            sha256: digest.to_string(),
            created_at: format_timestamp(created_at),
            modified_at: format_timestamp(modified_at),
        }
    }
}
