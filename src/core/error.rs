//! Error types and result handling for hashsweep.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for hashsweep operations.
#[derive(Error, Debug)]
pub enum Error {
    // ===== Signature Feed Errors =====
    #[error("Signature download failed: {url}")]
    Transfer {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Signature download timed out after {timeout_secs}s: {url}")]
    TransferTimeout { url: String, timeout_secs: u64 },

    #[error("Signature download failed after {attempts} attempts: {operation}")]
    TransferRetryExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Signature archive is invalid: {path} - {reason}")]
    Archive { path: PathBuf, reason: String },

    #[error("Failed to replace signature database: {path}")]
    Replace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Signature database not found: {0}")]
    DatabaseMissing(PathBuf),

    #[error("Failed to read signature database: {path}")]
    DatabaseRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ===== Scanning Errors =====
    #[error("Failed to access file: {path}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Scan was cancelled")]
    ScanCancelled,

    // ===== Log Sink Errors =====
    #[error("Failed to write detection log: {path}")]
    SinkWrite {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    // ===== Configuration Errors =====
    #[error("Failed to load configuration: {0}")]
    ConfigLoad(String),

    #[error("Failed to save configuration: {0}")]
    ConfigSave(String),

    #[error("Invalid configuration value: {field} - {message}")]
    ConfigInvalid { field: String, message: String },

    // ===== Concurrency Errors =====
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    // ===== Serialization Errors =====
    #[error("JSON serialization error")]
    Json(#[from] serde_json::Error),

    // ===== Generic Errors =====
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    /// Create a transfer error from any underlying failure.
    pub fn transfer(
        url: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Transfer {
            url: url.into(),
            source: source.into(),
        }
    }

    /// Create an archive error.
    pub fn archive(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Archive {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a replace error.
    pub fn replace(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Replace {
            path: path.into(),
            source,
        }
    }

    /// Create a per-file access error.
    pub fn file_access(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileAccess {
            path: path.into(),
            source,
        }
    }

    /// Create a sink write error.
    pub fn sink_write(
        path: impl Into<PathBuf>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SinkWrite {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Create a lock poisoned error.
    pub fn lock_poisoned(context: impl Into<String>) -> Self {
        Self::LockPoisoned {
            context: context.into(),
        }
    }

    /// Check if this error is recoverable (scan can continue).
    ///
    /// Only per-file failures qualify; everything else ends the session.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::FileAccess { .. })
    }

    /// Check if this error is a transfer failure worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transfer { .. } | Error::TransferTimeout { .. }
        )
    }

    /// Check if a refresh failure still allows scanning with an older database.
    pub fn allows_stale_database(&self) -> bool {
        matches!(
            self,
            Error::Transfer { .. }
                | Error::TransferTimeout { .. }
                | Error::TransferRetryExhausted { .. }
                | Error::Archive { .. }
        )
    }

    /// Check if this error is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::ScanCancelled)
    }

    /// Get a user-friendly suggestion for how to resolve this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::Transfer { .. }
            | Error::TransferTimeout { .. }
            | Error::TransferRetryExhausted { .. } => {
                Some("Check your network connection and run `hashsweep update` again")
            }
            Error::Archive { .. } => {
                Some("The feed format may have changed; check updates.feed_url and updates.expected_entry")
            }
            Error::Replace { .. } => {
                Some("Make sure the data directory is writable and no other process holds the database")
            }
            Error::DatabaseMissing(_) => Some("Run `hashsweep update` to download signatures"),
            Error::SinkWrite { .. } => {
                Some("Check free disk space and permissions on the output directory")
            }
            Error::PathNotFound(_) => Some("Check that the path exists and is accessible"),
            Error::ConfigLoad(_) | Error::ConfigInvalid { .. } => {
                Some("Check your configuration file for syntax errors or missing fields")
            }
            Error::LockPoisoned { .. } => Some("Internal error: restart the application"),
            Error::ScanCancelled => Some("Scan was interrupted by user request"),
            _ => None,
        }
    }
}

/// Format an error with its source chain and suggestion for user display.
pub fn format_error_for_user(error: &Error) -> String {
    let mut output = format!("Error: {}\n", error);

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        output.push_str(&format!("  Caused by: {}\n", cause));
        source = cause.source();
    }

    if let Some(suggestion) = error.suggestion() {
        output.push_str(&format!("  Suggestion: {}\n", suggestion));
    }

    output
}
