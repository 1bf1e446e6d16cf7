//! Scan counters, progress snapshots and console reporting.

use crate::core::types::{ScanPhase, ScanSummary};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// Callback invoked with progress snapshots.
pub type ProgressCallback = Arc<dyn Fn(ScanProgress) + Send + Sync>;

/// Point-in-time view of a scan.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    /// Current phase
    pub phase: ScanPhase,
    /// Files seen by traversal
    pub discovered: u64,
    /// Eligible files handed to workers
    pub submitted: u64,
    /// Files hashed and classified
    pub scanned: u64,
    /// Files matching a signature
    pub infected: u64,
    /// Files that could not be read
    pub errors: u64,
    /// Files rejected by the filter
    pub skipped: u64,
    /// Bytes hashed
    pub bytes_scanned: u64,
    /// Exact number of eligible files, when a counting pass ran
    pub total: Option<u64>,
    /// Time since the scan started (frozen once finished)
    pub elapsed: Duration,
    /// Whether the scan was cancelled
    pub is_cancelled: bool,
}

impl ScanProgress {
    /// Files finished, successfully or not.
    pub fn processed(&self) -> u64 {
        self.scanned + self.errors
    }

    /// Calculate scan rate (files per second).
    pub fn files_per_second(&self) -> f64 {
        let elapsed = self.elapsed.as_secs_f64();
        if elapsed > 0.0 {
            self.scanned as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Calculate scan rate (bytes per second).
    pub fn bytes_per_second(&self) -> f64 {
        let elapsed = self.elapsed.as_secs_f64();
        if elapsed > 0.0 {
            self.bytes_scanned as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Denominator for percentages: the counted total, or the growing number
    /// of submitted files in single-pass mode.
    pub fn denominator(&self) -> u64 {
        self.total.unwrap_or(self.submitted)
    }

    /// Calculate completion percentage.
    pub fn percentage(&self) -> f64 {
        let denominator = self.denominator();
        if denominator > 0 {
            (self.processed() as f64 / denominator as f64 * 100.0).min(100.0)
        } else {
            100.0
        }
    }

    /// Estimate remaining time; only known when a counting pass ran.
    pub fn estimated_remaining(&self) -> Option<Duration> {
        let total = self.total?;
        let processed = self.processed();
        if processed == 0 || processed >= total {
            return None;
        }
        let rate = processed as f64 / self.elapsed.as_secs_f64().max(f64::EPSILON);
        Some(Duration::from_secs_f64((total - processed) as f64 / rate))
    }

    pub fn is_complete(&self) -> bool {
        self.phase == ScanPhase::Completed
    }
}

/// Thread-safe counters for one scan session.
pub struct ScanAggregator {
    discovered: AtomicU64,
    submitted: AtomicU64,
    scanned: AtomicU64,
    infected: AtomicU64,
    errors: AtomicU64,
    skipped: AtomicU64,
    bytes_scanned: AtomicU64,
    total: RwLock<Option<u64>>,
    phase: RwLock<ScanPhase>,
    start: RwLock<Instant>,
    end: RwLock<Option<Instant>>,
    cancelled: AtomicBool,
    callback: RwLock<Option<ProgressCallback>>,
    callback_interval: Duration,
    last_callback: Mutex<Instant>,
}

impl Default for ScanAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanAggregator {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            discovered: AtomicU64::new(0),
            submitted: AtomicU64::new(0),
            scanned: AtomicU64::new(0),
            infected: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            bytes_scanned: AtomicU64::new(0),
            total: RwLock::new(None),
            phase: RwLock::new(ScanPhase::Init),
            start: RwLock::new(now),
            end: RwLock::new(None),
            cancelled: AtomicBool::new(false),
            callback: RwLock::new(None),
            callback_interval: Duration::from_millis(100),
            last_callback: Mutex::new(now),
        }
    }

    /// Set a progress callback function.
    pub fn set_callback(&self, callback: ProgressCallback) {
        if let Ok(mut cb) = self.callback.write() {
            *cb = Some(callback);
        }
    }

    /// Reset all counters and restart the clock.
    pub fn reset(&self) {
        for counter in [
            &self.discovered,
            &self.submitted,
            &self.scanned,
            &self.infected,
            &self.errors,
            &self.skipped,
            &self.bytes_scanned,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.cancelled.store(false, Ordering::SeqCst);
        if let Ok(mut total) = self.total.write() {
            *total = None;
        }
        if let Ok(mut phase) = self.phase.write() {
            *phase = ScanPhase::Init;
        }
        if let Ok(mut start) = self.start.write() {
            *start = Instant::now();
        }
        if let Ok(mut end) = self.end.write() {
            *end = None;
        }
    }

    pub fn record_discovered(&self) {
        self.discovered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// A file was hashed and classified.
    pub fn record_scanned(&self, bytes: u64) {
        self.scanned.fetch_add(1, Ordering::Relaxed);
        self.bytes_scanned.fetch_add(bytes, Ordering::Relaxed);
        self.maybe_callback();
    }

    pub fn record_infected(&self) {
        self.infected.fetch_add(1, Ordering::Relaxed);
        self.force_callback();
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.maybe_callback();
    }

    /// Record the exact eligible total from a counting pass.
    pub fn set_total(&self, total: u64) {
        if let Ok(mut t) = self.total.write() {
            *t = Some(total);
        }
    }

    /// Enter a new phase; always reported to the callback.
    pub fn set_phase(&self, phase: ScanPhase) {
        if let Ok(mut p) = self.phase.write() {
            *p = phase;
        }
        self.force_callback();
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase.read().map(|p| *p).unwrap_or(ScanPhase::Init)
    }

    pub fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Freeze the elapsed time. Later calls keep the first end instant.
    pub fn finish(&self) {
        if let Ok(mut end) = self.end.write() {
            if end.is_none() {
                *end = Some(Instant::now());
            }
        }
    }

    /// Time since start, or until `finish()` once called.
    pub fn elapsed(&self) -> Duration {
        let start = self.start.read().map(|s| *s).unwrap_or_else(|_| Instant::now());
        let end = self.end.read().ok().and_then(|e| *e);
        match end {
            Some(end) => end.saturating_duration_since(start),
            None => start.elapsed(),
        }
    }

    /// Get current progress snapshot.
    pub fn snapshot(&self) -> ScanProgress {
        ScanProgress {
            phase: self.phase(),
            discovered: self.discovered.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            scanned: self.scanned.load(Ordering::Relaxed),
            infected: self.infected.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            bytes_scanned: self.bytes_scanned.load(Ordering::Relaxed),
            total: self.total.read().ok().and_then(|t| *t),
            elapsed: self.elapsed(),
            is_cancelled: self.cancelled.load(Ordering::SeqCst),
        }
    }

    /// Copy the counters into a session summary.
    pub fn fill_summary(&self, summary: &mut ScanSummary) {
        let snapshot = self.snapshot();
        summary.discovered = snapshot.discovered;
        summary.submitted = snapshot.submitted;
        summary.scanned = snapshot.scanned;
        summary.infected = snapshot.infected;
        summary.errors = snapshot.errors;
        summary.skipped = snapshot.skipped;
        summary.bytes_scanned = snapshot.bytes_scanned;
        summary.elapsed_secs = snapshot.elapsed.as_secs_f64();
    }

    /// Trigger callback if interval has passed.
    fn maybe_callback(&self) {
        let due = match self.last_callback.lock() {
            Ok(last) => last.elapsed() >= self.callback_interval,
            Err(_) => false,
        };
        if due {
            self.force_callback();
        }
    }

    fn force_callback(&self) {
        if let Ok(mut last) = self.last_callback.lock() {
            *last = Instant::now();
        }

        let callback = match self.callback.read() {
            Ok(cb) => cb.clone(),
            Err(_) => None,
        };
        if let Some(cb) = callback {
            cb(self.snapshot());
        }
    }
}

/// Console progress reporter.
pub struct ConsoleProgressReporter {
    last_line_length: AtomicUsize,
    verbose: bool,
}

impl Default for ConsoleProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleProgressReporter {
    pub fn new() -> Self {
        Self {
            last_line_length: AtomicUsize::new(0),
            verbose: false,
        }
    }

    /// Enable verbose output.
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    /// Render one progress line, overwriting the previous one.
    pub fn report(&self, progress: &ScanProgress) {
        let message = self.render(progress);

        let last_len = self.last_line_length.load(Ordering::Relaxed);
        let padding = " ".repeat(last_len.saturating_sub(message.len()));

        eprint!("\r{}{}", message, padding);
        self.last_line_length.store(message.len(), Ordering::Relaxed);

        if progress.is_complete() || progress.is_cancelled {
            eprintln!();
        }
    }

    /// Progress line text. Byte rate is shown in verbose mode, ETA once a
    /// counting pass has fixed the total.
    pub fn render(&self, progress: &ScanProgress) -> String {
        let status = if progress.is_cancelled {
            "Cancelled".to_string()
        } else {
            progress.phase.to_string()
        };

        let mut message = format!(
            "[{}] {:.1}% | Files: {}/{} | Threats: {} | Errors: {} | Rate: {:.0}/s",
            status,
            progress.percentage(),
            progress.processed(),
            progress.denominator(),
            progress.infected,
            progress.errors,
            progress.files_per_second(),
        );
        if self.verbose {
            message.push_str(&format!(
                " ({:.1} MB/s)",
                progress.bytes_per_second() / (1024.0 * 1024.0)
            ));
        }
        message.push_str(&format!(" | Time: {}s", progress.elapsed.as_secs()));
        if let Some(remaining) = progress.estimated_remaining() {
            message.push_str(&format!(" | ETA: {}s", remaining.as_secs()));
        }
        message
    }
}
