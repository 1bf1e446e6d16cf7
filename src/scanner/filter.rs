//! Eligibility rules for files and directories.

use crate::core::config::ScanConfig;
use crate::core::types::ScanTarget;
use std::collections::HashSet;
use std::path::Path;

/// Decides which files get hashed and which directories get pruned.
#[derive(Debug, Clone)]
pub struct FileFilter {
    /// Lowercase suffixes including the leading dot
    extensions: Vec<String>,
    /// Exact directory names never descended into
    exclude_dirs: HashSet<String>,
    /// Largest eligible file, in bytes
    max_size: u64,
}

impl FileFilter {
    /// Build a filter from scan settings.
    pub fn new(config: &ScanConfig) -> Self {
        let extensions = config
            .extensions
            .iter()
            .map(|ext| {
                let ext = ext.trim().to_lowercase();
                if ext.starts_with('.') {
                    ext
                } else {
                    format!(".{}", ext)
                }
            })
            .collect();

        Self {
            extensions,
            exclude_dirs: config.exclude_dirs.iter().cloned().collect(),
            max_size: config.max_file_size_mb.saturating_mul(1024 * 1024),
        }
    }

    /// Whether the file name ends with one of the scannable suffixes.
    ///
    /// Matching is a case-insensitive suffix test on the whole name, so
    /// `report.PDF.EXE` qualifies while `exe` alone does not.
    pub fn has_scannable_extension(&self, path: &Path) -> bool {
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().to_lowercase(),
            None => return false,
        };
        self.extensions
            .iter()
            .any(|ext| name.len() > ext.len() && name.ends_with(ext.as_str()))
    }

    /// Whether a file of `size` bytes is small enough to hash.
    pub fn within_size_limit(&self, size: u64) -> bool {
        size <= self.max_size
    }

    /// Whether a directory with this name is pruned from traversal.
    pub fn is_excluded_directory(&self, name: &str) -> bool {
        self.exclude_dirs.contains(name)
    }

    /// Extension and size both pass.
    pub fn is_eligible(&self, target: &ScanTarget) -> bool {
        self.has_scannable_extension(&target.path) && self.within_size_limit(target.size)
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }
}

impl Default for FileFilter {
    fn default() -> Self {
        Self::new(&ScanConfig::default())
    }
}
