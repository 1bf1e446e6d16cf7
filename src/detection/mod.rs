//! Signature-based detection.
//!
//! - `signature`: the in-memory digest set and database header parsing
//! - `feed`: where the feed archive comes from (HTTP export or a local file)
//! - `archive`: pulling the database entry out of the feed archive
//! - `store`: the on-disk database, daily refresh and cached lookups

pub mod archive;
pub mod feed;
pub mod signature;
pub mod store;

pub use feed::{FeedSource, HttpFeed, LocalFeed};
pub use signature::{SignatureMetadata, SignatureSet};
pub use store::SignatureStore;
