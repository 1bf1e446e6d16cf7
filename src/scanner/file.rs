//! File system scan engine.
//!
//! A single traversal task walks the tree on the blocking pool and feeds
//! eligible targets into a bounded channel. A fixed pool of workers pulls
//! from it, hashes each file and checks the digest against the shared
//! signature set. Detections travel over a second channel to one collector,
//! which is the only writer of the detection logs.

use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::types::{DetectionRecord, HostIdentity, ScanPhase, ScanResult, ScanSummary, ScanTarget};
use crate::detection::signature::{SignatureMetadata, SignatureSet};
use crate::detection::store::SignatureStore;
use crate::report::LogSink;
use crate::scanner::filter::FileFilter;
use crate::scanner::progress::{ScanAggregator, ScanProgress};
use crate::utils::hash::HashCalculator;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use walkdir::{DirEntry, WalkDir};

/// Targets buffered per worker between traversal and hashing.
const QUEUE_DEPTH_PER_WORKER: usize = 4;

/// Detections buffered between workers and the log writer.
const DETECTION_QUEUE_DEPTH: usize = 256;

/// Classify a digest against the signature set.
///
/// Membership is the only criterion; file name, size and type play no part.
pub fn classify(target: &ScanTarget, digest: &str, signatures: &SignatureSet) -> ScanResult {
    if signatures.contains(digest) {
        ScanResult::Threat {
            digest: digest.to_ascii_lowercase(),
            created_at: target.created,
            modified_at: target.modified,
        }
    } else {
        ScanResult::Clean
    }
}

/// Signature-based file scanner.
pub struct ScanEngine {
    config: Arc<Config>,
    store: Arc<SignatureStore>,
    sink: Arc<LogSink>,
    filter: Arc<FileFilter>,
    cancelled: Arc<AtomicBool>,
    progress: Arc<ScanAggregator>,
}

impl ScanEngine {
    /// Create an engine backed by the configured feed and output directory.
    pub fn new(config: Config) -> Result<Self> {
        let store = SignatureStore::new(&config)?;
        let sink = LogSink::from_config(&config);
        Ok(Self::with_parts(config, store, sink))
    }

    /// Create an engine from explicit parts.
    pub fn with_parts(config: Config, store: SignatureStore, sink: LogSink) -> Self {
        let filter = FileFilter::new(&config.scan);
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            sink: Arc::new(sink),
            filter: Arc::new(filter),
            cancelled: Arc::new(AtomicBool::new(false)),
            progress: Arc::new(ScanAggregator::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &SignatureStore {
        &self.store
    }

    pub fn sink(&self) -> &LogSink {
        &self.sink
    }

    pub fn filter(&self) -> &FileFilter {
        &self.filter
    }

    /// Get the progress aggregator.
    pub fn progress(&self) -> &Arc<ScanAggregator> {
        &self.progress
    }

    /// Set a progress callback.
    pub fn set_progress_callback<F>(&self, callback: F)
    where
        F: Fn(ScanProgress) + Send + Sync + 'static,
    {
        self.progress.set_callback(Arc::new(callback));
    }

    /// Stop traversal and dispatch; files already being hashed finish.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.progress.mark_cancelled();
    }

    /// Check if the scan has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Shared handle to the cancellation flag, for signal handlers.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Whether the signature database was refreshed today.
    pub fn is_engine_fresh(&self) -> bool {
        self.store.is_fresh()
    }

    /// Refresh the signature database if it is stale.
    pub async fn refresh_signatures(&self) -> Result<SignatureMetadata> {
        self.store.refresh().await
    }

    /// Make sure a usable database is installed before scanning.
    ///
    /// Transfer and archive failures fall back to an existing older database;
    /// anything else, or no database at all, aborts.
    async fn ensure_signatures(&self) -> Result<()> {
        if !self.config.updates.auto_update {
            if !self.store.exists() {
                return Err(Error::DatabaseMissing(self.store.database_path().to_path_buf()));
            }
            log::debug!("Automatic updates disabled; using installed database");
            return Ok(());
        }

        if self.store.is_fresh() {
            log::debug!("Signature database is current");
            return Ok(());
        }

        match self.store.refresh().await {
            Ok(metadata) => {
                log::info!("Signature database refreshed: {}", metadata);
                Ok(())
            }
            Err(e) if e.allows_stale_database() && self.store.exists() => {
                let age = self
                    .store
                    .last_modified()
                    .map(|t| t.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "unknown date".to_string());
                log::warn!(
                    "Signature refresh failed ({}); continuing with database from {}",
                    e,
                    age
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn load_signatures(&self) -> Result<Arc<SignatureSet>> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.load())
            .await
            .map_err(|e| Error::Internal(format!("signature load task failed: {}", e)))?
    }

    /// Count eligible files under `root` without hashing anything.
    pub async fn count_eligible(&self, root: &Path) -> Result<u64> {
        let root = root.to_path_buf();
        let filter = Arc::clone(&self.filter);
        let follow = self.config.scan.follow_symlinks;
        let cancelled = Arc::clone(&self.cancelled);

        tokio::task::spawn_blocking(move || {
            let mut count = 0u64;
            for entry in walk(&root, filter.clone(), follow) {
                if cancelled.load(Ordering::SeqCst) {
                    return Err(Error::ScanCancelled);
                }
                let entry = match entry {
                    Ok(entry) if entry.file_type().is_file() => entry,
                    _ => continue,
                };
                if let Ok(metadata) = entry.metadata() {
                    if filter.is_eligible(&ScanTarget::from_metadata(entry.path(), &metadata)) {
                        count += 1;
                    }
                }
            }
            Ok(count)
        })
        .await
        .map_err(|e| Error::Internal(format!("counting task failed: {}", e)))?
    }

    /// Scan a directory tree (or a single file) and return the session summary.
    ///
    /// The root is made absolute first, so detection records and the summary
    /// never carry paths relative to the working directory.
    pub async fn start_scan(&self, root: &Path) -> Result<ScanSummary> {
        let root = std::fs::canonicalize(root)
            .map_err(|_| Error::PathNotFound(root.to_path_buf()))?;
        let root = root.as_path();

        self.cancelled.store(false, Ordering::SeqCst);
        self.progress.reset();
        self.progress.set_phase(ScanPhase::Init);

        let host = tokio::task::spawn_blocking(HostIdentity::resolve)
            .await
            .map_err(|e| Error::Internal(format!("host lookup failed: {}", e)))?;
        let mut summary = ScanSummary::new(host, root);
        log::info!("Starting scan {} of {:?}", summary.scan_id, root);

        self.ensure_signatures().await?;
        let signatures = self.load_signatures().await?;
        summary.signatures = Some(signatures.metadata().clone());

        if self.config.scan.count_before_scan {
            match self.count_eligible(root).await {
                Ok(total) => {
                    log::info!("Found {} files to scan", total);
                    self.progress.set_total(total);
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => return Err(e),
            }
        }

        let outcome = self.run_pipeline(root, signatures, &summary).await;

        self.progress.finish();
        self.progress.fill_summary(&mut summary);

        if let Err(e) = outcome {
            summary.fail();
            self.progress.set_phase(ScanPhase::Completed);
            log::error!("Scan {} aborted: {}", summary.scan_id, e);
            return Err(e);
        }

        if self.is_cancelled() {
            summary.cancel();
        } else {
            summary.complete();
        }
        self.progress.set_phase(ScanPhase::Completed);

        log::info!(
            "Scan {:?}: {} files scanned, {} threats found, {} errors, {} skipped",
            summary.status,
            summary.scanned,
            summary.infected,
            summary.errors,
            summary.skipped
        );

        self.sink.write_summary(&summary)?;
        if summary.is_clean() && !self.is_cancelled() {
            self.sink.record_clean(&summary)?;
        }

        Ok(summary)
    }

    async fn run_pipeline(
        &self,
        root: &Path,
        signatures: Arc<SignatureSet>,
        summary: &ScanSummary,
    ) -> Result<()> {
        let workers = self.config.scan.workers.max(1);
        let (target_tx, target_rx) = mpsc::channel::<ScanTarget>(workers * QUEUE_DEPTH_PER_WORKER);
        let (detection_tx, mut detection_rx) = mpsc::channel::<DetectionRecord>(DETECTION_QUEUE_DEPTH);
        let halted = Arc::new(AtomicBool::new(false));

        self.progress.set_phase(ScanPhase::Discovering);
        let traversal = {
            let root = root.to_path_buf();
            let filter = Arc::clone(&self.filter);
            let follow = self.config.scan.follow_symlinks;
            let progress = Arc::clone(&self.progress);
            let cancelled = Arc::clone(&self.cancelled);
            let halted = Arc::clone(&halted);
            tokio::task::spawn_blocking(move || {
                traverse(&root, filter, follow, &progress, &cancelled, &halted, target_tx)
            })
        };

        let receiver = Arc::new(Mutex::new(target_rx));
        let host = Arc::new(summary.host.clone());
        let mut handles = Vec::with_capacity(workers);

        for _ in 0..workers {
            let receiver = Arc::clone(&receiver);
            let signatures = Arc::clone(&signatures);
            let progress = Arc::clone(&self.progress);
            let cancelled = Arc::clone(&self.cancelled);
            let halted = Arc::clone(&halted);
            let host = Arc::clone(&host);
            let scan_id = summary.scan_id.clone();
            let detection_tx = detection_tx.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let target = { receiver.lock().await.recv().await };
                    let target = match target {
                        Some(target) => target,
                        None => break,
                    };
                    if cancelled.load(Ordering::SeqCst) || halted.load(Ordering::SeqCst) {
                        break;
                    }

                    match scan_target(&target, &signatures).await {
                        Ok((ScanResult::Clean, size)) => progress.record_scanned(size),
                        Ok((ScanResult::Threat { digest, created_at, modified_at }, size)) => {
                            progress.record_scanned(size);
                            progress.record_infected();
                            let record = DetectionRecord::new(
                                &scan_id,
                                &host,
                                &target.path,
                                &digest,
                                &created_at,
                                &modified_at,
                            );
                            if detection_tx.send(record).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            progress.record_error();
                            if e.is_recoverable() {
                                log::debug!("Skipping unreadable file: {}", e);
                            } else {
                                log::error!("Unexpected error scanning {:?}: {}", target.path, e);
                            }
                        }
                    }
                }
            }));
        }
        drop(detection_tx);

        let mut sink_error = None;
        while let Some(record) = detection_rx.recv().await {
            if sink_error.is_some() {
                continue;
            }
            log::warn!(
                "Threat detected: {} (sha256 {})",
                record.infected_file,
                record.sha256
            );

            let sink = Arc::clone(&self.sink);
            let written = tokio::task::spawn_blocking(move || sink.record(&record))
                .await
                .map_err(|e| Error::Internal(format!("log writer task failed: {}", e)))
                .and_then(|r| r);

            if let Err(e) = written {
                log::error!("Cannot write detection log: {}", e);
                halted.store(true, Ordering::SeqCst);
                sink_error = Some(e);
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                log::error!("Scan worker panicked: {}", e);
            }
        }
        traversal
            .await
            .map_err(|e| Error::Internal(format!("traversal task failed: {}", e)))?;

        match sink_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Hash one target on the blocking pool and classify it.
async fn scan_target(target: &ScanTarget, signatures: &SignatureSet) -> Result<(ScanResult, u64)> {
    let path = target.path.clone();
    let digest = tokio::task::spawn_blocking(move || HashCalculator::digest_file(&path))
        .await
        .map_err(|e| Error::Internal(format!("hashing task failed: {}", e)))??;

    Ok((classify(target, &digest.sha256, signatures), digest.size))
}

/// Directory walker with excluded directories pruned before descent.
fn walk(
    root: &Path,
    filter: Arc<FileFilter>,
    follow_symlinks: bool,
) -> impl Iterator<Item = walkdir::Result<DirEntry>> {
    WalkDir::new(root)
        .follow_links(follow_symlinks)
        .into_iter()
        .filter_entry(move |entry| !is_pruned(entry, &filter))
}

fn is_pruned(entry: &DirEntry, filter: &FileFilter) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && filter.is_excluded_directory(&entry.file_name().to_string_lossy())
}

/// Walk the tree and submit eligible targets until done, cancelled or halted.
fn traverse(
    root: &Path,
    filter: Arc<FileFilter>,
    follow_symlinks: bool,
    progress: &ScanAggregator,
    cancelled: &AtomicBool,
    halted: &AtomicBool,
    targets: mpsc::Sender<ScanTarget>,
) {
    let mut dispatching = false;

    for entry in walk(root, Arc::clone(&filter), follow_symlinks) {
        if cancelled.load(Ordering::SeqCst) || halted.load(Ordering::SeqCst) {
            log::debug!("Traversal stopped early");
            break;
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::debug!("Cannot read directory entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        progress.record_discovered();

        let target = match entry.metadata() {
            Ok(metadata) => ScanTarget::from_metadata(entry.path(), &metadata),
            Err(e) => {
                log::debug!("Cannot stat {:?}: {}", entry.path(), e);
                progress.record_error();
                continue;
            }
        };

        if !filter.is_eligible(&target) {
            log::trace!("Skipping {:?}", target.path);
            progress.record_skipped();
            continue;
        }

        if !dispatching {
            dispatching = true;
            progress.set_phase(ScanPhase::Dispatching);
        }
        progress.record_submitted();
        if targets.blocking_send(target).is_err() {
            break;
        }
    }

    progress.set_phase(ScanPhase::Draining);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::feed::LocalFeed;
    use std::io::Cursor;

    fn engine_for(dir: &Path, digests: &[&str]) -> ScanEngine {
        let mut config = Config::with_data_dir(dir.join("data"));
        config.updates.auto_update = false;
        config.scan.workers = 4;
        std::fs::create_dir_all(config.data_dir()).unwrap();
        std::fs::write(config.database_path(), digests.join("\n")).unwrap();

        let store = SignatureStore::with_feed(&config, Arc::new(LocalFeed::new(dir.join("none.zip"))));
        let sink = LogSink::from_config(&config);
        ScanEngine::with_parts(config, store, sink)
    }

    #[test]
    fn test_classify_is_membership_only() {
        let set = SignatureSet::from_reader(Cursor::new("ab".repeat(32))).unwrap();
        let target = ScanTarget::stat(Path::new(env!("CARGO_MANIFEST_DIR"))).unwrap();

        assert!(classify(&target, &"ab".repeat(32), &set).is_threat());
        assert!(classify(&target, &"AB".repeat(32), &set).is_threat());
        assert_eq!(classify(&target, &"cd".repeat(32), &set), ScanResult::Clean);
    }

    #[test]
    fn test_cancellation_flag() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_for(dir.path(), &[]);

        assert!(!engine.is_cancelled());
        engine.cancel();
        assert!(engine.is_cancelled());
        assert!(engine.cancel_handle().load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_for(dir.path(), &[]);
        let err = engine.start_scan(&dir.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, Error::PathNotFound(_)));
    }

    #[tokio::test]
    async fn test_single_file_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("tool.dll");
        std::fs::write(&file, b"payload").unwrap();
        let digest = HashCalculator::sha256_bytes(b"payload");

        let engine = engine_for(dir.path(), &[&digest]);
        let summary = engine.start_scan(&file).await.unwrap();

        assert_eq!(summary.submitted, 1);
        assert_eq!(summary.scanned, 1);
        assert_eq!(summary.infected, 1);
    }

    #[tokio::test]
    async fn test_count_eligible_prunes_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("tree");
        std::fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("node_modules/pkg/index.js"), b"x").unwrap();
        std::fs::write(root.join("src/app.js"), b"x").unwrap();
        std::fs::write(root.join("src/notes.md"), b"x").unwrap();
        std::fs::write(root.join("run.bat"), b"x").unwrap();

        let engine = engine_for(dir.path(), &[]);
        assert_eq!(engine.count_eligible(&root).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_missing_database_without_auto_update() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_for(dir.path(), &[]);
        std::fs::remove_file(engine.store().database_path()).unwrap();

        let err = engine.start_scan(dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::DatabaseMissing(_)));
    }
}
