//! On-disk signature database with daily refresh.
//!
//! The database lives at `<data_dir>/engine.db`. A refresh downloads the feed
//! archive to `<data_dir>/<YYYY-MM-DD>.zip`, extracts the expected entry to a
//! staging file and renames it over the database, so readers only ever see a
//! complete file. The in-memory set is built lazily and replaced wholesale
//! after each refresh.

use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::detection::archive::extract_entry;
use crate::detection::feed::{FeedSource, HttpFeed};
use crate::detection::signature::{read_metadata, SignatureMetadata, SignatureSet};
use crate::utils::hash::HashCalculator;
use crate::utils::retry::{retry_async, RetryConfig};
use chrono::{DateTime, Local, NaiveDate};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Suffix of the staging file the archive entry is extracted to.
const STAGING_SUFFIX: &str = "partial";

/// Signature database manager.
pub struct SignatureStore {
    data_dir: PathBuf,
    database_path: PathBuf,
    expected_entry: String,
    retry: RetryConfig,
    feed: Arc<dyn FeedSource>,
    cache: RwLock<Option<Arc<SignatureSet>>>,
}

impl SignatureStore {
    /// Create a store fed from the configured HTTP export.
    pub fn new(config: &Config) -> Result<Self> {
        let feed = HttpFeed::new(&config.updates)?;
        Ok(Self::with_feed(config, Arc::new(feed)))
    }

    /// Create a store with an explicit feed source.
    pub fn with_feed(config: &Config, feed: Arc<dyn FeedSource>) -> Self {
        Self {
            data_dir: config.data_dir(),
            database_path: config.database_path(),
            expected_entry: config.updates.expected_entry.clone(),
            retry: RetryConfig::network().with_max_attempts(config.updates.max_attempts),
            feed,
            cache: RwLock::new(None),
        }
    }

    /// Override the retry policy used for refreshes.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    /// Whether a database file is present.
    pub fn exists(&self) -> bool {
        self.database_path.is_file()
    }

    /// True iff the database exists and was last modified today (local time).
    pub fn is_fresh(&self) -> bool {
        self.is_fresh_on(Local::now().date_naive())
    }

    /// Freshness relative to an explicit calendar date.
    pub fn is_fresh_on(&self, today: NaiveDate) -> bool {
        self.exists() && self.modified_date().map(|d| d == today).unwrap_or(false)
    }

    /// Local modification time of the database, if it exists as a file.
    pub fn last_modified(&self) -> Option<DateTime<Local>> {
        std::fs::metadata(&self.database_path)
            .ok()
            .filter(|m| m.is_file())
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Local>::from)
    }

    fn modified_date(&self) -> Option<NaiveDate> {
        self.last_modified().map(|t| t.date_naive())
    }

    /// Refresh the database unless it is already fresh.
    ///
    /// Calling this twice on the same day performs at most one download.
    pub async fn refresh(&self) -> Result<SignatureMetadata> {
        if self.is_fresh() {
            log::debug!("Signature database is current; skipping refresh");
            return self.metadata();
        }
        self.force_refresh().await
    }

    /// Download and install the feed regardless of freshness.
    ///
    /// Transfer failures are retried with backoff; archive and replace
    /// failures are returned immediately.
    pub async fn force_refresh(&self) -> Result<SignatureMetadata> {
        log::info!("Refreshing signature database from {}", self.feed.location());
        retry_async("signature refresh", self.retry.clone(), || self.refresh_once()).await
    }

    async fn refresh_once(&self) -> Result<SignatureMetadata> {
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| Error::replace(&self.data_dir, e))?;

        let archive_path = self
            .data_dir
            .join(format!("{}.zip", Local::now().format("%Y-%m-%d")));

        let downloaded = self.feed.download(&archive_path).await;
        let bytes = match downloaded {
            Ok(bytes) => bytes,
            Err(e) => {
                remove_quietly(&archive_path);
                return Err(e);
            }
        };
        log::debug!("Feed archive saved to {:?} ({} bytes)", archive_path, bytes);

        let staging = self.staging_path();
        let extracted = {
            let archive = archive_path.clone();
            let expected = self.expected_entry.clone();
            let staging = staging.clone();
            tokio::task::spawn_blocking(move || extract_entry(&archive, &expected, &staging))
                .await
                .map_err(|e| Error::Internal(format!("extraction task failed: {}", e)))?
        };
        remove_quietly(&archive_path);

        if let Err(e) = extracted {
            remove_quietly(&staging);
            return Err(e);
        }

        if let Err(e) = std::fs::rename(&staging, &self.database_path) {
            remove_quietly(&staging);
            return Err(Error::replace(&self.database_path, e));
        }
        self.invalidate()?;

        let size = std::fs::metadata(&self.database_path)
            .map(|m| m.len())
            .unwrap_or(0);
        match HashCalculator::sha256_file(&self.database_path) {
            Ok(digest) => log::info!(
                "Installed signature database ({:.2} MB, sha256 {})",
                size as f64 / (1024.0 * 1024.0),
                digest
            ),
            Err(e) => log::warn!("Installed signature database but could not hash it: {}", e),
        }

        let metadata = read_metadata(&self.database_path)?;
        log::info!("Signature database: {}", metadata);
        Ok(metadata)
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .database_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".");
        name.push(STAGING_SUFFIX);
        self.database_path.with_file_name(name)
    }

    /// Load (or return the cached) signature set.
    pub fn load(&self) -> Result<Arc<SignatureSet>> {
        {
            let cache = self
                .cache
                .read()
                .map_err(|_| Error::lock_poisoned("signature cache"))?;
            if let Some(set) = cache.as_ref() {
                return Ok(Arc::clone(set));
            }
        }

        let mut cache = self
            .cache
            .write()
            .map_err(|_| Error::lock_poisoned("signature cache"))?;
        if let Some(set) = cache.as_ref() {
            return Ok(Arc::clone(set));
        }

        let started = std::time::Instant::now();
        let set = Arc::new(SignatureSet::load(&self.database_path)?);
        log::info!(
            "Loaded {} signatures in {:.2}s",
            set.len(),
            started.elapsed().as_secs_f64()
        );
        *cache = Some(Arc::clone(&set));
        Ok(set)
    }

    /// Whether `digest` is a known-malicious hash.
    pub fn lookup(&self, digest: &str) -> Result<bool> {
        Ok(self.load()?.contains(digest))
    }

    /// Header date and signature count of the installed database.
    pub fn metadata(&self) -> Result<SignatureMetadata> {
        let cached = self
            .cache
            .read()
            .map_err(|_| Error::lock_poisoned("signature cache"))?
            .as_ref()
            .map(|set| set.metadata().clone());

        match cached {
            Some(metadata) => Ok(metadata),
            None => read_metadata(&self.database_path),
        }
    }

    /// Drop the cached set so the next lookup reloads from disk.
    pub fn invalidate(&self) -> Result<()> {
        let mut cache = self
            .cache
            .write()
            .map_err(|_| Error::lock_poisoned("signature cache"))?;
        *cache = None;
        Ok(())
    }
}

fn remove_quietly(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            log::warn!("Could not remove {:?}: {}", path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::io::{Cursor, Write};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const DIGEST_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const DIGEST_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    /// Serves a fixed archive and counts how often it was asked.
    struct FixedFeed {
        payload: Vec<u8>,
        calls: AtomicUsize,
    }

    impl FixedFeed {
        fn new(payload: Vec<u8>) -> Arc<Self> {
            Arc::new(Self {
                payload,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FeedSource for FixedFeed {
        async fn download(&self, dest: &Path) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::fs::write(dest, &self.payload)?;
            Ok(self.payload.len() as u64)
        }

        fn location(&self) -> String {
            "memory://feed".to_string()
        }
    }

    /// Always fails with a transfer error.
    struct DownFeed {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FeedSource for DownFeed {
        async fn download(&self, _dest: &Path) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::transfer("memory://down", "connection refused"))
        }

        fn location(&self) -> String {
            "memory://down".to_string()
        }
    }

    fn feed_archive(entry: &str, digests: &[&str]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file(entry, SimpleFileOptions::default()).unwrap();
        writeln!(writer, "# Last updated: 2024-05-01 08:15:02 UTC #").unwrap();
        for digest in digests {
            writeln!(writer, "{}", digest).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn quick_retry() -> RetryConfig {
        RetryConfig::quick()
            .with_max_attempts(2)
            .with_initial_delay(Duration::from_millis(1))
    }

    fn age_database(path: &Path, hours: u64) {
        let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(hours * 3600))
            .unwrap();
    }

    #[tokio::test]
    async fn test_force_refresh_installs_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_data_dir(dir.path());
        let feed = FixedFeed::new(feed_archive("full_sha256.txt", &[DIGEST_A, DIGEST_B]));
        let store = SignatureStore::with_feed(&config, feed.clone()).with_retry(quick_retry());

        let meta = store.force_refresh().await.unwrap();

        assert_eq!(meta.signature_count, 2);
        assert_eq!(meta.last_updated.as_deref(), Some("2024-05-01 08:15:02 UTC"));
        assert!(store.is_fresh());
        assert!(store.lookup(DIGEST_A).unwrap());
        assert!(!store.lookup(&"c".repeat(64)).unwrap());

        // the archive and staging file are gone
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.ends_with(".zip") || n.ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty(), "leftover files: {:?}", leftovers);
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent_within_a_day() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_data_dir(dir.path());
        let feed = FixedFeed::new(feed_archive("full_sha256.txt", &[DIGEST_A]));
        let store = SignatureStore::with_feed(&config, feed.clone()).with_retry(quick_retry());

        store.refresh().await.unwrap();
        store.refresh().await.unwrap();

        assert_eq!(feed.calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_database_is_refreshed() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_data_dir(dir.path());
        std::fs::write(config.database_path(), format!("{}\n", DIGEST_B)).unwrap();
        age_database(&config.database_path(), 48);

        let feed = FixedFeed::new(feed_archive("full_sha256.txt", &[DIGEST_A]));
        let store = SignatureStore::with_feed(&config, feed.clone()).with_retry(quick_retry());
        assert!(!store.is_fresh());

        store.refresh().await.unwrap();

        assert_eq!(feed.calls(), 1);
        assert!(store.lookup(DIGEST_A).unwrap());
        assert!(!store.lookup(DIGEST_B).unwrap());
    }

    #[tokio::test]
    async fn test_refresh_replaces_cached_set() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_data_dir(dir.path());
        std::fs::write(config.database_path(), format!("{}\n", DIGEST_B)).unwrap();

        let feed = FixedFeed::new(feed_archive("full_sha256.txt", &[DIGEST_A]));
        let store = SignatureStore::with_feed(&config, feed).with_retry(quick_retry());

        let before = store.load().unwrap();
        assert!(before.contains(DIGEST_B));

        store.force_refresh().await.unwrap();
        let after = store.load().unwrap();

        // the old snapshot is untouched; new lookups see the new set
        assert!(before.contains(DIGEST_B));
        assert!(after.contains(DIGEST_A));
        assert!(!after.contains(DIGEST_B));
    }

    #[tokio::test]
    async fn test_missing_entry_keeps_existing_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_data_dir(dir.path());
        std::fs::write(config.database_path(), format!("{}\n", DIGEST_B)).unwrap();

        let feed = FixedFeed::new(feed_archive("something_else.txt", &[DIGEST_A]));
        let store = SignatureStore::with_feed(&config, feed.clone()).with_retry(quick_retry());

        let err = store.force_refresh().await.unwrap_err();

        assert!(matches!(err, Error::Archive { .. }));
        // archive errors are not retried
        assert_eq!(feed.calls(), 1);
        assert!(store.lookup(DIGEST_B).unwrap());
    }

    #[tokio::test]
    async fn test_transfer_failure_is_retried_then_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_data_dir(dir.path());
        let feed = Arc::new(DownFeed {
            calls: AtomicUsize::new(0),
        });
        let store = SignatureStore::with_feed(&config, feed.clone()).with_retry(quick_retry());

        let err = store.force_refresh().await.unwrap_err();

        assert!(matches!(err, Error::TransferRetryExhausted { attempts: 2, .. }));
        assert!(err.allows_stale_database());
        assert_eq!(feed.calls.load(Ordering::SeqCst), 2);
        assert!(!store.exists());
    }

    #[test]
    fn test_freshness_by_date() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_data_dir(dir.path());
        let feed = FixedFeed::new(Vec::new());
        let store = SignatureStore::with_feed(&config, feed);

        assert!(!store.is_fresh());

        std::fs::write(config.database_path(), "").unwrap();
        let today = Local::now().date_naive();
        assert!(store.is_fresh_on(today));
        assert!(!store.is_fresh_on(today.succ_opt().unwrap()));
    }

    #[test]
    fn test_directory_at_database_path_is_not_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_data_dir(dir.path());
        std::fs::create_dir_all(config.database_path().join("nested")).unwrap();
        let store = SignatureStore::with_feed(&config, FixedFeed::new(Vec::new()));

        assert!(!store.exists());
        assert!(!store.is_fresh());
        assert!(store.last_modified().is_none());
    }

    #[tokio::test]
    async fn test_rename_failure_is_replace_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_data_dir(dir.path());
        // a non-empty directory cannot be renamed over
        std::fs::create_dir_all(config.database_path().join("nested")).unwrap();

        let feed = FixedFeed::new(feed_archive("full_sha256.txt", &[DIGEST_A]));
        let store = SignatureStore::with_feed(&config, feed.clone()).with_retry(quick_retry());

        let err = store.refresh().await.unwrap_err();

        assert!(matches!(err, Error::Replace { .. }));
        assert!(!err.allows_stale_database());
        // replace errors are not retried and leave no staging file behind
        assert_eq!(feed.calls(), 1);
        assert!(!store.staging_path().exists());
    }

    #[test]
    fn test_metadata_without_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_data_dir(dir.path());
        let store = SignatureStore::with_feed(&config, FixedFeed::new(Vec::new()));

        assert!(matches!(store.metadata(), Err(Error::DatabaseMissing(_))));
        assert!(matches!(store.lookup(DIGEST_A), Err(Error::DatabaseMissing(_))));
    }
}
