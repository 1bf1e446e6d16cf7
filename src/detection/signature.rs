//! Signature set and database metadata parsing.
//!
//! The database is newline-delimited text. Lines starting with `#` are
//! comments (one carries a `Last updated` label); every other non-empty line
//! is a hex SHA-256 digest.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Label that marks the header line carrying the feed's update date.
const LAST_UPDATED_LABEL: &str = "Last updated";

/// Summary information about a signature database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureMetadata {
    /// Human-readable update date taken from the header, if present
    pub last_updated: Option<String>,
    /// Number of digest lines
    pub signature_count: u64,
}

impl std::fmt::Display for SignatureMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} signatures (updated {})",
            self.signature_count,
            self.last_updated.as_deref().unwrap_or("unknown")
        )
    }
}

/// Immutable set of known-malicious digests.
#[derive(Debug, Default)]
pub struct SignatureSet {
    digests: HashSet<String>,
    metadata: SignatureMetadata,
}

impl SignatureSet {
    /// Load a set from a database file.
    pub fn load(path: &Path) -> Result<Self> {
        let reader = open_database(path)?;
        Self::from_reader(reader).map_err(|e| Error::DatabaseRead {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Build a set from any line-oriented reader.
    pub fn from_reader<R: BufRead>(reader: R) -> std::io::Result<Self> {
        let mut digests = HashSet::new();
        let mut last_updated = None;
        let mut signature_count = 0u64;

        for line in reader.lines() {
            let line = line?;
            match classify_line(&line) {
                Line::Blank => {}
                Line::Comment(text) => {
                    if last_updated.is_none() {
                        last_updated = parse_last_updated(text);
                    }
                }
                Line::Digest(digest) => {
                    signature_count += 1;
                    digests.insert(digest.to_ascii_lowercase());
                }
            }
        }

        Ok(Self {
            digests,
            metadata: SignatureMetadata {
                last_updated,
                signature_count,
            },
        })
    }

    /// Membership test; the digest is compared case-insensitively.
    pub fn contains(&self, digest: &str) -> bool {
        if digest.bytes().any(|b| b.is_ascii_uppercase()) {
            self.digests.contains(&digest.to_ascii_lowercase())
        } else {
            self.digests.contains(digest)
        }
    }

    /// Number of distinct digests.
    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    pub fn metadata(&self) -> &SignatureMetadata {
        &self.metadata
    }
}

/// Read header label and line count without building the set.
pub fn read_metadata(path: &Path) -> Result<SignatureMetadata> {
    let reader = open_database(path)?;
    let mut last_updated = None;
    let mut signature_count = 0u64;

    for line in reader.lines() {
        let line = line.map_err(|e| Error::DatabaseRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        match classify_line(&line) {
            Line::Blank => {}
            Line::Comment(text) => {
                if last_updated.is_none() {
                    last_updated = parse_last_updated(text);
                }
            }
            Line::Digest(_) => signature_count += 1,
        }
    }

    Ok(SignatureMetadata {
        last_updated,
        signature_count,
    })
}

fn open_database(path: &Path) -> Result<BufReader<File>> {
    match File::open(path) {
        Ok(file) => Ok(BufReader::new(file)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::DatabaseMissing(path.to_path_buf()))
        }
        Err(e) => Err(Error::DatabaseRead {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

enum Line<'a> {
    Blank,
    Comment(&'a str),
    Digest(&'a str),
}

fn classify_line(line: &str) -> Line<'_> {
    if line.starts_with('#') {
        return Line::Comment(line);
    }
    let trimmed = line.trim();
    if trimmed.is_empty() {
        Line::Blank
    } else {
        Line::Digest(trimmed)
    }
}

/// Extract the update date from a header comment.
///
/// `# Last updated: 2024-05-01 08:15:02 UTC` yields `2024-05-01 08:15:02 UTC`:
/// the `#` is dropped, the line split on spaces, and tokens 2..5 rejoined.
pub fn parse_last_updated(line: &str) -> Option<String> {
    if !line.contains(LAST_UPDATED_LABEL) {
        return None;
    }

    let cleaned = line.replace('#', "");
    let tokens: Vec<&str> = cleaned.trim().split(' ').collect();
    if tokens.len() <= 2 {
        return None;
    }

    let end = tokens.len().min(5);
    Some(tokens[2..end].join(" "))
}
