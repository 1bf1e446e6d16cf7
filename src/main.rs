//! hashsweep: hash-based malware sweep.
//!
//! This is the main entry point for the CLI application.

use chrono::Local;
use hashsweep::core::config::Config;
use hashsweep::core::error::{format_error_for_user, Result};
use hashsweep::core::types::{DetectionRecord, ScanStatus, ScanSummary};
use hashsweep::detection::{LocalFeed, SignatureStore};
use hashsweep::scanner::{ConsoleProgressReporter, ScanEngine};
use hashsweep::ui::cli::{Cli, Commands, ConfigAction, OutputFormat};
use hashsweep::utils::logging::{init_logging, LogConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprint!("{}", format_error_for_user(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse_args();

    let config_path = match &cli.data_dir {
        Some(dir) => dir.join("config.json"),
        None => Config::default_config_path(),
    };

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        Config::load(&config_path)
            .map(|c| LogConfig::from_config(&c))
            .unwrap_or_default()
    };
    init_logging(log_config)?;

    log::info!("hashsweep v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_or_default_at(&config_path);
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    log::debug!("Configuration loaded from {:?}", config_path);

    match cli.command {
        Some(Commands::Scan {
            path,
            count_first,
            workers,
            offline,
        }) => {
            if count_first {
                config.scan.count_before_scan = true;
            }
            if let Some(workers) = workers {
                config.scan.workers = workers;
            }
            if offline {
                config.updates.auto_update = false;
            }
            config.validate()?;
            run_scan(config, &path, cli.verbose, cli.format).await
        }
        Some(Commands::Update { force, import }) => run_update(config, force, import, cli.format).await,
        Some(Commands::Config { action }) => run_config(action, &config, &config_path),
        Some(Commands::Info) => run_info(&config, &config_path, cli.format),
        None => {
            println!("hashsweep - hash-based malware sweep");
            println!();
            println!("Use --help for usage information");
            println!();
            println!("Quick start:");
            println!("  hashsweep update              Download today's signature database");
            println!("  hashsweep scan --path <DIR>   Scan a directory tree");
            println!("  hashsweep info                Show database and path information");
            Ok(())
        }
    }
}

/// Run a scan session.
async fn run_scan(config: Config, root: &Path, verbose: bool, format: OutputFormat) -> Result<()> {
    let engine = Arc::new(ScanEngine::new(config)?);

    if format == OutputFormat::Text {
        let reporter = if verbose {
            ConsoleProgressReporter::new().verbose()
        } else {
            ConsoleProgressReporter::new()
        };
        engine.set_progress_callback(move |progress| reporter.report(&progress));
    }

    let interrupt = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupt received; finishing files in progress");
                engine.cancel();
            }
        })
    };

    let result = engine.start_scan(root).await;
    interrupt.abort();
    let summary = result?;

    let detections: Vec<DetectionRecord> = engine
        .sink()
        .read_records(Local::now().date_naive())
        .unwrap_or_else(|e| {
            log::warn!("Could not read back detection log: {}", e);
            Vec::new()
        })
        .into_iter()
        .filter(|r| r.scan_id == summary.scan_id)
        .collect();

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "summary": summary,
                "detections": detections,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => print_summary(&summary, &detections, engine.sink().output_dir()),
    }

    Ok(())
}

fn print_summary(summary: &ScanSummary, detections: &[DetectionRecord], output_dir: &Path) {
    println!();
    println!("=== Scan {} ===", match summary.status {
        ScanStatus::Cancelled => "Cancelled",
        ScanStatus::Failed => "Failed",
        _ => "Complete",
    });
    println!("Scan ID:         {}", summary.scan_id);
    println!("Host:            {} ({}, {})", summary.host.hostname, summary.host.ip, summary.host.os);
    println!("Root:            {}", summary.root.display());
    println!("Files Found:     {}", summary.discovered);
    println!("Files Scanned:   {}", summary.scanned);
    println!("Skipped:         {}", summary.skipped);
    println!("Read Errors:     {}", summary.errors);
    println!("Threats Found:   {}", summary.infected);
    println!(
        "Duration:        {:.1}s ({:.1} files/s)",
        summary.elapsed_secs,
        summary.files_per_second()
    );
    if let Some(signatures) = &summary.signatures {
        println!("Signatures:      {}", signatures);
    }

    if !detections.is_empty() {
        println!();
        println!("Detections:");
        for record in detections {
            println!("  [!] {}", record.infected_file);
            println!("      sha256 {}", record.sha256);
        }
    }
    println!();
    println!("Logs written to {}", output_dir.display());
}

/// Update signatures.
async fn run_update(
    config: Config,
    force: bool,
    import: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let store = match &import {
        Some(path) => {
            log::info!("Importing signatures from {:?}", path);
            SignatureStore::with_feed(&config, Arc::new(LocalFeed::new(path)))
        }
        None => SignatureStore::new(&config)?,
    };

    let was_fresh = store.is_fresh();
    let metadata = if force || import.is_some() {
        store.force_refresh().await?
    } else {
        store.refresh().await?
    };
    let updated = force || import.is_some() || !was_fresh;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "updated": updated,
                "database": store.database_path(),
                "signatures": metadata,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            if updated {
                println!("Signature database updated.");
            } else {
                println!("Signature database is already up to date.");
            }
            println!("Database:        {}", store.database_path().display());
            println!("Signatures:      {}", metadata.signature_count);
            println!(
                "Last Updated:    {}",
                metadata.last_updated.as_deref().unwrap_or("unknown")
            );
        }
    }
    Ok(())
}

/// Handle configuration commands.
fn run_config(action: ConfigAction, config: &Config, config_path: &Path) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        ConfigAction::Reset { yes } => {
            if !yes {
                println!("This will overwrite {}", config_path.display());
                println!("Re-run with --yes to confirm.");
                return Ok(());
            }
            log::info!("Resetting configuration to defaults...");
            Config::default().save(config_path)?;
            println!("Configuration reset to defaults.");
        }
        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
    }
    Ok(())
}

/// Show application information.
fn run_info(config: &Config, config_path: &Path, format: OutputFormat) -> Result<()> {
    let store_path = config.database_path();
    let installed = store_path.is_file();
    let metadata = if installed {
        match hashsweep::detection::signature::read_metadata(&store_path) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                log::warn!("Cannot read signature database: {}", e);
                None
            }
        }
    } else {
        None
    };
    let last_modified = std::fs::metadata(&store_path)
        .and_then(|m| m.modified())
        .ok()
        .map(chrono::DateTime::<Local>::from);
    let fresh = last_modified
        .map(|t| t.date_naive() == Local::now().date_naive())
        .unwrap_or(false);

    if format == OutputFormat::Json {
        let output = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "config_path": config_path,
            "data_dir": config.data_dir(),
            "database": store_path,
            "database_installed": installed,
            "database_fresh": fresh,
            "database_modified": last_modified.map(|t| t.to_rfc3339()),
            "signatures": metadata,
            "output_dir": config.output_dir(),
            "feed_url": config.updates.feed_url,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("hashsweep - hash-based malware sweep");
    println!();
    println!("Version:          {}", env!("CARGO_PKG_VERSION"));
    println!("Config Path:      {}", config_path.display());
    println!("Data Directory:   {}", config.data_dir().display());
    println!("Output Directory: {}", config.output_dir().display());
    println!();
    println!("Signature Database:");
    println!("  Path:           {}", store_path.display());
    match (&metadata, last_modified) {
        (Some(metadata), Some(modified)) => {
            println!("  Signatures:     {}", metadata.signature_count);
            println!(
                "  Feed Date:      {}",
                metadata.last_updated.as_deref().unwrap_or("unknown")
            );
            println!(
                "  Installed:      {}{}",
                modified.format("%Y-%m-%d %H:%M:%S"),
                if fresh { "" } else { " (stale)" }
            );
        }
        _ => println!("  Not installed; run `hashsweep update`"),
    }
    println!("  Feed:           {}", config.updates.feed_url);
    println!();
    println!("Scan Settings:");
    println!("  Max File Size:  {} MB", config.scan.max_file_size_mb);
    println!("  Workers:        {}", config.scan.workers);
    println!("  Extensions:     {}", config.scan.extensions.join(" "));
    println!("  Excluded Dirs:  {}", config.scan.exclude_dirs.join(" "));
    Ok(())
}
