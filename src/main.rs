//! VitalGuard command-line entry point.
//!
//! ```text
//! vitalguard store <dir>           archive every *.json record in <dir>
//! vitalguard retrieve <record_id>  fetch, decrypt and print a record
//! vitalguard classify <record_id>  NORMAL/ANOMALY without decrypting vitals
//! ```

use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vitalguard::adapters::keyfile::load_keypair;
use vitalguard::adapters::sanitize::SanitizingMakeWriter;
use vitalguard::adapters::{FsBlobStore, LocalFallback, SqliteLedger};
use vitalguard::application::{ArchiveService, BlobSource, MonitoringService, RetrievalService};
use vitalguard::config::Settings;

const USAGE: &str = "Usage: vitalguard <store <dir> | retrieve <record_id> | classify <record_id>>";

enum Command {
    Store(String),
    Retrieve(String),
    Classify(String),
}

fn parse_args() -> Option<Command> {
    let mut args = std::env::args().skip(1);
    let command = args.next()?;
    let operand = args.next().filter(|s| !s.is_empty())?;
    if args.next().is_some() {
        return None;
    }

    match command.as_str() {
        "store" => Some(Command::Store(operand)),
        "retrieve" => Some(Command::Retrieve(operand)),
        "classify" => Some(Command::Classify(operand)),
        _ => None,
    }
}

fn main() -> Result<ExitCode> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if matches!(args.first().map(String::as_str), Some("-h" | "--help")) {
        println!("{USAGE}");
        return Ok(ExitCode::SUCCESS);
    }
    let Some(command) = parse_args() else {
        eprintln!("{USAGE}");
        return Ok(ExitCode::from(2));
    };

    let _guard = init_logging()?;
    let settings = Settings::from_env_or_default();
    tracing::debug!(?settings, "Loaded settings");

    match command {
        Command::Store(dir) => store(&settings, Path::new(&dir)),
        Command::Retrieve(record_id) => retrieve(&settings, &record_id),
        Command::Classify(record_id) => classify(&settings, &record_id),
    }
}

/// Logs go to a file or stderr, never stdout, which carries command output.
///
/// `VITALGUARD_LOG_MODE`: `file`, `stderr`, or `auto` (file when attached to
/// a terminal).
fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_mode = std::env::var("VITALGUARD_LOG_MODE").unwrap_or_else(|_| "auto".to_string());
    let use_file = match log_mode.as_str() {
        "file" => true,
        "stderr" => false,
        _ => std::io::stdout().is_terminal(),
    };

    let (writer, guard) = if use_file {
        let log_file = std::env::var("VITALGUARD_LOG_FILE")
            .unwrap_or_else(|_| "data/vitalguard.log".to_string());
        if let Some(parent) = Path::new(&log_file).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .with_context(|| format!("opening log file {log_file}"))?;
        tracing_appender::non_blocking(file)
    } else {
        tracing_appender::non_blocking(std::io::stderr())
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(SanitizingMakeWriter::new(writer)))
        .init();

    Ok(guard)
}

fn retrieval_service(
    settings: &Settings,
) -> vitalguard::Result<RetrievalService<SqliteLedger, FsBlobStore, LocalFallback>> {
    Ok(RetrievalService::new(
        Arc::new(SqliteLedger::open(&settings.ledger_db)?),
        Arc::new(FsBlobStore::open(&settings.blob_dir)?),
        Arc::new(LocalFallback::open(&settings.fallback_dir)?),
        settings.fetch_timeout,
    ))
}

fn store(settings: &Settings, dir: &Path) -> Result<ExitCode> {
    let service = ArchiveService::new(
        Arc::new(SqliteLedger::open(&settings.ledger_db)?),
        Arc::new(FsBlobStore::open(&settings.blob_dir)?),
    );

    let entries = service.archive_directory(dir)?;

    let mut stored = BTreeMap::new();
    let mut failures = 0usize;
    for entry in entries {
        match entry.result {
            Ok(receipt) => {
                stored.insert(receipt.record_id, receipt.address.to_string());
            }
            Err(e) => {
                failures += 1;
                eprintln!("{}: {e}", entry.record_id);
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&stored)?);
    tracing::info!(stored = stored.len(), failures, "Store complete");

    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn retrieve(settings: &Settings, record_id: &str) -> Result<ExitCode> {
    let keys = load_keypair(&settings.key_file)
        .with_context(|| format!("loading keys from {}", settings.key_file.display()))?;
    let service = retrieval_service(settings)?;

    let retrieval = service
        .retrieve(record_id, &keys.public, &keys.private)
        .map_err(vitalguard::VitalGuardError::from)?;

    if retrieval.record.nothing_decrypted() {
        eprintln!(
            "warning: none of the {} encrypted values decrypted; check the key file matches this record",
            retrieval.record.undecodable
        );
    }
    print!("{}", retrieval.record.report(&retrieval.record_id));
    println!();
    println!("Content address: {}", retrieval.address);
    match &retrieval.source {
        BlobSource::Primary => println!("Served by     : primary blob store"),
        BlobSource::Fallback { reason } => {
            println!("Served by     : local fallback ({reason})");
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn classify(settings: &Settings, record_id: &str) -> Result<ExitCode> {
    let keys = load_keypair(&settings.key_file)
        .with_context(|| format!("loading keys from {}", settings.key_file.display()))?;
    let service = retrieval_service(settings)?;

    let fetched = service
        .fetch_record(record_id)
        .map_err(vitalguard::VitalGuardError::from)?;
    let assessment = MonitoringService::new()
        .classify_record(&fetched.record, &keys.public, &keys.private)
        .map_err(vitalguard::VitalGuardError::from)?;

    println!("{record_id}: {}", assessment.verdict);
    println!("{}", assessment.verdict.description());
    if assessment.heart_rate_high {
        println!("- heart rate above threshold");
    }
    if assessment.spo2_low {
        println!("- SpO2 below threshold");
    }
    if let BlobSource::Fallback { reason } = &fetched.source {
        println!("(served by local fallback: {reason})");
    }

    Ok(ExitCode::SUCCESS)
}
