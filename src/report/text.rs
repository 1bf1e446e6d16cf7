//! Human-readable detection blocks, table rows, clean-scan lines and session
//! summaries.

use crate::core::types::{format_timestamp, DetectionRecord, ScanSummary};
use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

const RULE_WIDTH: usize = 80;
const BOX_WIDTH: usize = 78;
const BOX_VALUE_WIDTH: usize = 56;

const TABLE_TIME_WIDTH: usize = 16;
const TABLE_FILE_WIDTH: usize = 24;
const TABLE_HASH_WIDTH: usize = 16;
const TABLE_STATUS_WIDTH: usize = 11;

/// One block of the structured threat log.
pub fn detection_block(record: &DetectionRecord) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();
    out.push_str(&format!("{}\n", rule));
    out.push_str("THREAT DETECTION REPORT\n");
    out.push_str(&format!("{}\n", rule));
    out.push_str(&format!("Detection Time   : {}\n", record.datetime));
    out.push_str(&format!("Scan ID          : {}\n", record.scan_id));
    out.push_str(&format!(
        "System Info      : {} | {} | {}\n",
        record.os, record.hostname, record.ip
    ));
    out.push_str(&format!("Infected File    : {}\n", record.infected_file));
    out.push_str(&format!("SHA256 Hash      : {}\n", record.sha256));
    out.push_str(&format!("File Created     : {}\n", record.created_at));
    out.push_str(&format!("File Modified    : {}\n", record.modified_at));
    out.push_str(&format!("{}\n\n", rule));
    out
}

/// Frame and column titles written once at the top of a new table log.
pub fn table_header() -> String {
    let rule = "─".repeat(BOX_WIDTH);
    let title = "MALWARE DETECTION LOG";
    let left = (BOX_WIDTH - title.len()) / 2;
    let right = BOX_WIDTH - title.len() - left;

    let mut out = String::new();
    out.push_str(&format!("┌{}┐
", rule));
    out.push_str(&format!("│{}{}{}│
", " ".repeat(left), title, " ".repeat(right)));
    out.push_str(&format!("├{}┤
", rule));
    out.push_str(&table_line("Time", "File", "SHA256 Hash", "Status"));
    out.push_str(&format!("├{}┤
", rule));
    out
}

/// One row of the table log: minute-precision time, base name and hash prefix.
pub fn table_row(record: &DetectionRecord) -> String {
    let file_name = Path::new(&record.infected_file)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| record.infected_file.clone());
    table_line(
        &clip(&record.datetime, TABLE_TIME_WIDTH),
        &clip(&file_name, TABLE_FILE_WIDTH),
        &clip(&record.sha256, TABLE_HASH_WIDTH),
        "THREAT",
    )
}

fn table_line(time: &str, file: &str, hash: &str, status: &str) -> String {
    format!(
        "│ {:<tw$} │ {:<fw$} │ {:<hw$} │ {:<sw$} │\n",
        time,
        file,
        hash,
        status,
        tw = TABLE_TIME_WIDTH,
        fw = TABLE_FILE_WIDTH,
        hw = TABLE_HASH_WIDTH,
        sw = TABLE_STATUS_WIDTH
    )
}

fn clip(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

/// One line of the clean-scan log.
pub fn clean_line(summary: &ScanSummary) -> String {
    let when = summary.end_time.unwrap_or_else(Local::now);
    format!(
        "[{}] CLEAN SCAN - Scan ID: {} | System: {} ({}) | OS: {}\n",
        format_timestamp(&when),
        summary.scan_id,
        summary.host.hostname,
        summary.host.ip,
        summary.host.os
    )
}

/// Boxed session summary.
pub fn summary_box(summary: &ScanSummary) -> String {
    let top = format!("╔{}╗\n", "═".repeat(BOX_WIDTH));
    let mid = format!("╠{}╣\n", "═".repeat(BOX_WIDTH));
    let bottom = format!("╚{}╝\n", "═".repeat(BOX_WIDTH));
    let title = "MALWARE SCAN SUMMARY REPORT";
    let left = (BOX_WIDTH - title.len()) / 2;
    let right = BOX_WIDTH - title.len() - left;

    let (engine_version, signatures) = match &summary.signatures {
        Some(meta) => (
            meta.last_updated.clone().unwrap_or_else(|| "N/A".to_string()),
            group_thousands(meta.signature_count),
        ),
        None => ("N/A".to_string(), "N/A".to_string()),
    };

    let mut out = String::new();
    out.push_str(&top);
    out.push_str(&format!("║{}{}{}║\n", " ".repeat(left), title, " ".repeat(right)));
    out.push_str(&mid);
    out.push_str(&row("Scan Date/Time", &format_timestamp(&summary.start_time)));
    out.push_str(&row("Scan ID", &summary.scan_id));
    out.push_str(&row("Scanned Directory", &summary.root.display().to_string()));
    out.push_str(&row("Status", &format!("{:?}", summary.status)));
    out.push_str(&mid);
    out.push_str(&row("Total Files", &summary.discovered.to_string()));
    out.push_str(&row("Files Scanned", &summary.scanned.to_string()));
    out.push_str(&row("Files Skipped", &summary.skipped.to_string()));
    out.push_str(&row("Read Errors", &summary.errors.to_string()));
    out.push_str(&row("Threats Detected", &summary.infected.to_string()));
    out.push_str(&row("Scan Duration", &format!("{:.1} seconds", summary.elapsed_secs)));
    out.push_str(&row(
        "Scan Speed",
        &format!("{:.1} files/sec", summary.files_per_second()),
    ));
    out.push_str(&mid);
    out.push_str(&row(
        "System Info",
        &format!("{} ({})", summary.host.hostname, summary.host.ip),
    ));
    out.push_str(&row("Operating System", &summary.host.os));
    out.push_str(&row("Engine Version", &engine_version));
    out.push_str(&row("Signatures", &signatures));
    out.push_str(&bottom);
    out.push('\n');
    out
}

fn row(label: &str, value: &str) -> String {
    format!("║ {:<17} : {:<width$} ║\n", label, value, width = BOX_VALUE_WIDTH)
}

/// `956413` -> `956,413`
fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Append text to a file, creating it if needed.
pub fn append(path: &Path, text: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(text.as_bytes())?;
    file.flush()
}
