//! hashsweep: hash-based malware sweep of a filesystem tree
//!
//! Walks a directory tree, computes the SHA-256 digest of every eligible file
//! and checks it against a daily-refreshed signature set (MalwareBazaar's full
//! SHA-256 export by default). Matches are written to dated JSON, CSV and text
//! logs; each session also leaves a summary.

pub mod core;
pub mod detection;
pub mod report;
pub mod scanner;
pub mod ui;
pub mod utils;

// Re-export commonly used types
pub use crate::core::config::Config;
pub use crate::core::error::{Error, Result};
pub use crate::core::types::*;
pub use crate::detection::{SignatureMetadata, SignatureStore};
pub use crate::report::LogSink;
pub use crate::scanner::ScanEngine;
