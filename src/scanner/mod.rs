//! File system scanning.
//!
//! - `filter`: which files are hashed and which directories are pruned
//! - `host`: hostname, outbound address and OS of the scanning machine
//! - `file`: the concurrent scan engine
//! - `progress`: counters, snapshots and console progress output

pub mod file;
pub mod filter;
pub mod host;
pub mod progress;

pub use file::{classify, ScanEngine};
pub use filter::FileFilter;
pub use progress::{ConsoleProgressReporter, ProgressCallback, ScanAggregator, ScanProgress};
