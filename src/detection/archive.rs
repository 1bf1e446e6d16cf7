//! Extraction of the signature database from the feed archive.

use crate::core::error::{Error, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use zip::ZipArchive;

/// Extract the entry whose base name matches `expected` (case-insensitive)
/// into `dest`, returning the number of bytes written.
///
/// Directory entries and every other file are left inside the archive.
pub fn extract_entry(archive_path: &Path, expected: &str, dest: &Path) -> Result<u64> {
    let file = File::open(archive_path)
        .map_err(|e| Error::archive(archive_path, format!("cannot open archive: {}", e)))?;

    let mut archive = ZipArchive::new(file)
        .map_err(|e| Error::archive(archive_path, format!("not a zip archive: {}", e)))?;

    let index = (0..archive.len())
        .find(|&i| {
            archive
                .by_index_raw(i)
                .map(|entry| !entry.is_dir() && base_name(entry.name()).eq_ignore_ascii_case(expected))
                .unwrap_or(false)
        })
        .ok_or_else(|| {
            Error::archive(archive_path, format!("entry '{}' not found in archive", expected))
        })?;

    let mut entry = archive
        .by_index(index)
        .map_err(|e| Error::archive(archive_path, format!("cannot read entry: {}", e)))?;

    let out = File::create(dest).map_err(|e| Error::replace(dest, e))?;
    let mut writer = BufWriter::new(out);
    let written = std::io::copy(&mut entry, &mut writer)
        .map_err(|e| Error::archive(archive_path, format!("cannot extract entry: {}", e)))?;
    writer.flush().map_err(|e| Error::replace(dest, e))?;

    log::debug!(
        "Extracted {} ({} bytes) from {:?}",
        entry.name(),
        written,
        archive_path
    );
    Ok(written)
}

/// Last path component of a zip entry name, which always uses `/`.
fn base_name(name: &str) -> &str {
    name.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(name)
}
