//! Signature feed sources.
//!
//! A feed delivers the full signature export as a zip archive. The HTTP
//! source streams it from the remote export URL; the local source copies an
//! archive that was fetched out of band.

use crate::core::config::UpdateConfig;
use crate::core::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Something that can produce the signature feed archive.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Write the complete feed archive to `dest` and return the bytes written.
    async fn download(&self, dest: &Path) -> Result<u64>;

    /// Where the feed comes from, for logging.
    fn location(&self) -> String;
}

/// Feed served over HTTP(S).
pub struct HttpFeed {
    url: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl HttpFeed {
    /// Build an HTTP feed with connect and request timeouts from config.
    pub fn new(config: &UpdateConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::transfer(&config.feed_url, e))?;

        Ok(Self {
            url: config.feed_url.clone(),
            timeout_secs: config.timeout_secs,
            client,
        })
    }

    fn map_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::TransferTimeout {
                url: self.url.clone(),
                timeout_secs: self.timeout_secs,
            }
        } else {
            Error::transfer(&self.url, err)
        }
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    async fn download(&self, dest: &Path) -> Result<u64> {
        let mut response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::transfer(
                &self.url,
                format!("server returned HTTP {}", status),
            ));
        }

        match response.content_length() {
            Some(len) => log::info!(
                "Downloading {} ({:.2} MB)",
                self.url,
                len as f64 / (1024.0 * 1024.0)
            ),
            None => log::info!("Downloading {} (size unknown)", self.url),
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| staging_error(dest, e))?;
        let mut written = 0u64;
        let started = std::time::Instant::now();

        while let Some(chunk) = response.chunk().await.map_err(|e| self.map_error(e))? {
            file.write_all(&chunk)
                .await
                .map_err(|e| staging_error(dest, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| staging_error(dest, e))?;

        log::debug!(
            "Downloaded {} bytes in {:.2}s",
            written,
            started.elapsed().as_secs_f64()
        );
        Ok(written)
    }

    fn location(&self) -> String {
        self.url.clone()
    }
}

/// Local disk failure while saving the archive. Reported in the archive
/// family so an older database can still be used.
fn staging_error(dest: &Path, err: std::io::Error) -> Error {
    Error::archive(dest, format!("cannot write feed archive: {}", err))
}

/// Feed archive already present on disk.
pub struct LocalFeed {
    path: PathBuf,
}

impl LocalFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FeedSource for LocalFeed {
    async fn download(&self, dest: &Path) -> Result<u64> {
        if !self.path.is_file() {
            return Err(Error::PathNotFound(self.path.clone()));
        }
        tokio::fs::copy(&self.path, dest)
            .await
            .map_err(|e| Error::transfer(self.path.display().to_string(), e))
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_feed_copies_archive() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("feed.zip");
        std::fs::write(&src, b"PK-not-really").unwrap();

        let feed = LocalFeed::new(&src);
        let dest = dir.path().join("copy.zip");
        let written = feed.download(&dest).await.unwrap();

        assert_eq!(written, 13);
        assert_eq!(std::fs::read(&dest).unwrap(), b"PK-not-really");
    }

    #[tokio::test]
    async fn test_local_feed_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let feed = LocalFeed::new(dir.path().join("absent.zip"));
        let err = feed.download(&dir.path().join("x.zip")).await.unwrap_err();
        assert!(matches!(err, Error::PathNotFound(_)));
    }

    #[test]
    fn test_http_feed_builds_from_config() {
        let config = UpdateConfig::default();
        let feed = HttpFeed::new(&config).unwrap();
        assert_eq!(feed.location(), config.feed_url);
    }

    /// One-shot HTTP server answering any request with `body`.
    async fn serve_once(body: &'static [u8]) -> String {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
        });
        format!("http://{}/full.zip", addr)
    }

    #[tokio::test]
    async fn test_http_feed_streams_to_disk() {
        let config = UpdateConfig {
            feed_url: serve_once(b"PK-archive").await,
            ..UpdateConfig::default()
        };
        let feed = HttpFeed::new(&config).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("feed.zip");

        assert_eq!(feed.download(&dest).await.unwrap(), 10);
        assert_eq!(std::fs::read(&dest).unwrap(), b"PK-archive");
    }

    #[tokio::test]
    async fn test_http_feed_disk_failure_allows_stale_database() {
        let config = UpdateConfig {
            feed_url: serve_once(b"PK-archive").await,
            ..UpdateConfig::default()
        };
        let feed = HttpFeed::new(&config).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("no-such-dir").join("feed.zip");

        let err = feed.download(&dest).await.unwrap_err();

        assert!(matches!(err, Error::Archive { .. }));
        assert!(err.allows_stale_database());
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_http_feed_unreachable_is_transfer_error() {
        let config = UpdateConfig {
            // reserved port on loopback; connection is refused immediately
            feed_url: "http://127.0.0.1:9/full.zip".to_string(),
            connect_timeout_secs: 2,
            timeout_secs: 5,
            ..UpdateConfig::default()
        };
        let feed = HttpFeed::new(&config).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let err = feed.download(&dir.path().join("feed.zip")).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
