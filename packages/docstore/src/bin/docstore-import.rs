//! docstore-import
//!
//! Loads staged JSON dumps into the remote document store.
//!
//! # Usage
//!
//! ```bash
//! # Configuration from the environment (REMOTE_DATABASE_URL, ...)
//! cargo run --bin docstore-import
//!
//! # Configuration from YAML, custom staging directory
//! cargo run --bin docstore-import -- --config docstore.yaml --staging ./dumps
//! ```

use clap::Parser;
use docstore::application::FileOutcome;
use docstore::{BulkImportGate, DocumentStore, SchemaRegistry, StorageError, StoreConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docstore-import")]
#[command(about = "Import staged JSON dumps into the remote document store", long_about = None)]
struct Cli {
    /// YAML configuration file (environment variables are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Staging directory, overriding the configured one
    #[arg(short, long)]
    staging: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "import aborted");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> docstore::Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::from_yaml(path)?,
        None => StoreConfig::from_env()?,
    };
    if let Some(staging) = cli.staging {
        config.import.staging_dir = staging;
    }
    if !config.backend.is_remote() {
        return Err(StorageError::config(
            "bulk import targets the remote backend; set REMOTE_DATABASE_URL or configure `engine: remote`",
        ));
    }

    let registry = Arc::new(SchemaRegistry::builtin());
    let store = DocumentStore::connect(&config, registry.clone()).await?;
    let gate = BulkImportGate::new(store.backend().clone(), registry, &config.import.staging_dir);
    let report = gate.import_from_sources().await?;

    for file in &report.files {
        let status = match &file.outcome {
            FileOutcome::Archived { imported } => format!("archived ({} imported)", imported),
            FileOutcome::ArchiveFailed { imported, reason } => {
                format!("imported {} but not archived: {}", imported, reason)
            }
            FileOutcome::Failed { reason } => format!("FAILED: {}", reason),
        };
        println!("{:<24} {}", file.collection, status);
        for skipped in &file.entry_failures {
            println!(
                "    skipped {}/{}: {}",
                skipped.kind,
                skipped.id.as_deref().unwrap_or("*"),
                skipped.reason
            );
        }
    }
    println!(
        "{} files, {} entries imported, {} archive failures, {} failed",
        report.files.len(),
        report.imported(),
        report.archive_failed(),
        report.failed()
    );

    if report.has_failed_files() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
