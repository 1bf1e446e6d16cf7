//! Hash calculation utilities.

use crate::core::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Buffer size for reading files (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Digest of a file together with the number of bytes hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    /// Lowercase hex SHA-256
    pub sha256: String,
    /// Bytes read while hashing
    pub size: u64,
}

/// Hash calculator for files.
pub struct HashCalculator;

impl HashCalculator {
    /// Calculate SHA256 hash of a file.
    pub fn sha256_file(path: &Path) -> Result<String> {
        Ok(Self::digest_file(path)?.sha256)
    }

    /// Stream a file through SHA-256 and report the byte count.
    ///
    /// Open and read failures map to `Error::FileAccess` so callers can skip
    /// the file and keep going.
    pub fn digest_file(path: &Path) -> Result<FileDigest> {
        let file = File::open(path).map_err(|e| Error::file_access(path, e))?;
        let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut size = 0u64;

        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .map_err(|e| Error::file_access(path, e))?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
            size += bytes_read as u64;
        }

        Ok(FileDigest {
            sha256: hex::encode(hasher.finalize()),
            size,
        })
    }

    /// Calculate SHA256 hash of bytes.
    pub fn sha256_bytes(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }
}
