//! Daily CSV of detection records for spreadsheet analysis.

use crate::core::types::DetectionRecord;
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// Append one record; the header row is written only when the file is new.
pub fn append_record(path: &Path, record: &DetectionRecord) -> csv::Result<()> {
    let needs_header = std::fs::metadata(path)
        .map(|m| m.len() == 0)
        .unwrap_or(true);

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = WriterBuilder::new()
        .has_headers(needs_header)
        .from_writer(file);

    writer.serialize(record)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(file: &str) -> DetectionRecord {
        DetectionRecord {
            datetime: "2025-07-29 11:53:37".into(),
            scan_id: "scan-1".into(),
            os: "Linux".into(),
            hostname: "build, box".into(),
            ip: "10.1.1.1".into(),
            infected_file: file.into(),
            sha256: "ab".repeat(32),
            created_at: "2025-03-29 16:42:36".into(),
            modified_at: "2025-03-29 11:06:16".into(),
        }
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("threats.csv");

        append_record(&path, &record("/a.exe")).unwrap();
        append_record(&path, &record("/b.exe")).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(
            "datetime,scan_id,os,hostname,ip,infected_file,sha256,created_at,modified_at\n"
        ));
        assert_eq!(text.matches("datetime,scan_id").count(), 1);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<DetectionRecord> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        // fields containing the delimiter survive quoting
        assert_eq!(rows[0].hostname, "build, box");
        assert_eq!(rows[1].infected_file, "/b.exe");
    }
}
