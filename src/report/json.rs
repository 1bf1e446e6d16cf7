//! Daily JSON array of detection records.
//!
//! The file is rewritten on every append: the array is read back, extended
//! and written to a temporary file that is then renamed over the original.

use crate::core::types::DetectionRecord;
use chrono::Local;
use std::io;
use std::path::{Path, PathBuf};

/// Failure while appending to the JSON log.
#[derive(Debug, thiserror::Error)]
pub enum JsonLogError {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Serialize(#[from] serde_json::Error),
}

/// Append one record, preserving every record already in the file.
///
/// An existing file that does not parse as a record array is moved aside to
/// `<name>.<HHMMSS>.corrupt` and a fresh array is started.
pub fn append_record(path: &Path, record: &DetectionRecord) -> Result<(), JsonLogError> {
    let mut records = match read_records(path) {
        Ok(records) => records,
        Err(JsonLogError::Serialize(e)) => {
            let aside = corrupt_path(path);
            log::warn!(
                "Detection log {:?} is not valid JSON ({}); moving it to {:?}",
                path,
                e,
                aside
            );
            std::fs::rename(path, &aside)?;
            Vec::new()
        }
        Err(e) => return Err(e),
    };

    records.push(record.clone());
    write_atomically(path, &records)
}

/// Read all records; a missing file yields an empty list.
pub fn read_records(path: &Path) -> Result<Vec<DetectionRecord>, JsonLogError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&contents)?)
}

fn write_atomically(path: &Path, records: &[DetectionRecord]) -> Result<(), JsonLogError> {
    let tmp = sibling(path, "tmp");
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(&tmp, json)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn corrupt_path(path: &Path) -> PathBuf {
    sibling(path, &format!("{}.corrupt", Local::now().format("%H%M%S")))
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(file: &str) -> DetectionRecord {
        DetectionRecord {
            datetime: "2025-07-29 11:53:37".into(),
            scan_id: "a0dfc486-00c4-4071-a4ea-1a54b081c285".into(),
            os: "Windows".into(),
            hostname: "Windows-786".into(),
            ip: "192.168.109.208".into(),
            infected_file: file.into(),
            sha256: "b8f21f17e79ca095fce11156b02bf6611abaf18b4bdf298ffffa42b8d7cbec57".into(),
            created_at: "2025-03-29 16:42:36".into(),
            modified_at: "2025-03-29 11:06:16".into(),
        }
    }

    #[test]
    fn test_append_keeps_previous_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2025-07-29-threats.json");

        append_record(&path, &record("C:\\a.exe")).unwrap();
        append_record(&path, &record("C:\\b.exe")).unwrap();

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].infected_file, "C:\\a.exe");
        assert_eq!(records[1].infected_file, "C:\\b.exe");
        assert!(!dir.path().join("2025-07-29-threats.json.tmp").exists());
    }

    #[test]
    fn test_field_names_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("threats.json");
        append_record(&path, &record("/srv/x.jar")).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let obj = value[0].as_object().unwrap();
        for key in [
            "datetime",
            "scan_id",
            "os",
            "hostname",
            "ip",
            "infected_file",
            "sha256",
            "created_at",
            "modified_at",
        ] {
            assert!(obj.contains_key(key), "missing {}", key);
        }
        assert_eq!(obj.len(), 9);
    }

    #[test]
    fn test_corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("threats.json");
        std::fs::write(&path, "[{\"datetime\": ").unwrap();

        append_record(&path, &record("/srv/x.jar")).unwrap();

        assert_eq!(read_records(&path).unwrap().len(), 1);
        let aside: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".corrupt"))
            .collect();
        assert_eq!(aside.len(), 1);
        assert_eq!(
            std::fs::read_to_string(aside[0].path()).unwrap(),
            "[{\"datetime\": "
        );
    }

    #[test]
    fn test_missing_and_empty_files_read_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("threats.json");
        assert!(read_records(&path).unwrap().is_empty());

        std::fs::write(&path, "  \n").unwrap();
        assert!(read_records(&path).unwrap().is_empty());
    }
}
