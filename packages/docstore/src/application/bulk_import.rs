//! Bulk Import Gate
//!
//! Loads legacy JSON dumps from a staging directory into the configured
//! backend. Every `*.json` file in the staging directory is one collection
//! (named after the file stem) shaped as:
//!
//! ```text
//! { "<kind>": { "<id>": { ...document... } } }
//! ```
//!
//! Entries are written with `update`, never `get`, so imported documents
//! skip migration. Sections whose kind has no template for the collection's
//! scope are skipped, since `get` could never read them back. A file whose entries were all written is moved to
//! `<staging>/backups`. Re-running after a partial failure re-upserts the
//! same ids, which is idempotent.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::{Document, DocumentBackend, EntityKind, SchemaRegistry, Scope};
use crate::error::{Result, StorageError};

/// Subdirectory of the staging area receiving processed files
pub const BACKUPS_DIR: &str = "backups";

/// Extension of dump files
pub const DUMP_EXTENSION: &str = "json";

/// Final state of one dump file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Every entry written, file moved to backups
    Archived { imported: usize },
    /// Every entry written but the move failed; the file stays for the next run
    ArchiveFailed { imported: usize, reason: String },
    /// Unreadable, not JSON, or a write failed; the file stays for the next run
    Failed { reason: String },
}

impl FileOutcome {
    pub fn imported(&self) -> usize {
        match self {
            FileOutcome::Archived { imported } | FileOutcome::ArchiveFailed { imported, .. } => {
                *imported
            }
            FileOutcome::Failed { .. } => 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FileOutcome::Failed { .. })
    }
}

/// A skipped entry (unknown kind or malformed document)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFailure {
    pub kind: String,
    pub id: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub path: PathBuf,
    pub collection: String,
    pub outcome: FileOutcome,
    pub entry_failures: Vec<EntryFailure>,
}

/// Result of one import run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    pub files: Vec<FileReport>,
}

impl ImportReport {
    /// Entries written across all files
    pub fn imported(&self) -> usize {
        self.files.iter().map(|f| f.outcome.imported()).sum()
    }

    pub fn archived(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Archived { .. }))
    }

    pub fn archive_failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::ArchiveFailed { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(FileOutcome::is_failed)
    }

    pub fn entry_failures(&self) -> usize {
        self.files.iter().map(|f| f.entry_failures.len()).sum()
    }

    pub fn has_failed_files(&self) -> bool {
        self.failed() > 0
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.outcome)).count()
    }
}

/// Imports staged dumps into a backend
pub struct BulkImportGate {
    backend: Arc<dyn DocumentBackend>,
    registry: Arc<SchemaRegistry>,
    staging_dir: PathBuf,
}

impl BulkImportGate {
    pub fn new(
        backend: Arc<dyn DocumentBackend>,
        registry: Arc<SchemaRegistry>,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            backend,
            registry,
            staging_dir: staging_dir.into(),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.staging_dir.join(BACKUPS_DIR)
    }

    /// Import every staged dump file
    ///
    /// Per-file and per-entry problems are reported, not returned. An error
    /// is returned only when the staging area itself cannot be prepared or
    /// listed.
    pub async fn import_from_sources(&self) -> Result<ImportReport> {
        let backups = self.backups_dir();
        tokio::fs::create_dir_all(&backups)
            .await
            .map_err(|e| StorageError::from(e).during("create", backups.display()))?;

        let files = self.staged_files().await?;
        info!(
            staging = %self.staging_dir.display(),
            files = files.len(),
            backend = self.backend.name(),
            "starting bulk import"
        );

        let mut report = ImportReport::default();
        for path in files {
            let file_report = self.import_file(path).await;
            match &file_report.outcome {
                FileOutcome::Archived { imported } => {
                    info!(collection = %file_report.collection, imported, "imported and archived dump");
                }
                FileOutcome::ArchiveFailed { imported, reason } => {
                    warn!(collection = %file_report.collection, imported, %reason, "imported dump but could not archive it");
                }
                FileOutcome::Failed { reason } => {
                    warn!(path = %file_report.path.display(), %reason, "dump import failed, file left in place");
                }
            }
            report.files.push(file_report);
        }

        info!(
            imported = report.imported(),
            archived = report.archived(),
            archive_failed = report.archive_failed(),
            failed = report.failed(),
            skipped_entries = report.entry_failures(),
            "bulk import finished"
        );
        Ok(report)
    }

    /// `*.json` files directly under the staging directory, sorted by name
    async fn staged_files(&self) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.staging_dir)
            .await
            .map_err(|e| StorageError::from(e).during("list", self.staging_dir.display()))?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_dump = path.extension().and_then(|e| e.to_str()) == Some(DUMP_EXTENSION);
            if is_dump && entry.file_type().await?.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    async fn import_file(&self, path: PathBuf) -> FileReport {
        let collection = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut report = FileReport {
            path,
            collection,
            outcome: FileOutcome::Failed {
                reason: String::new(),
            },
            entry_failures: Vec::new(),
        };

        let sections = match read_dump(&report.path).await {
            Ok(sections) => sections,
            Err(e) => {
                report.outcome = FileOutcome::Failed {
                    reason: e.to_string(),
                };
                return report;
            }
        };

        let scope = Scope::for_collection(&report.collection);
        let mut imported = 0;
        let mut write_error = None;
        for (kind_name, section) in sections {
            if is_empty_section(&section) {
                continue;
            }
            let known = EntityKind::from_str(&kind_name).and_then(|kind| {
                if self.registry.contains(scope, kind) {
                    Ok(kind)
                } else {
                    Err(format!("no template registered for {} in scope {}", kind, scope.as_str()))
                }
            });
            let (kind, entries) = match (known, section) {
                (Ok(kind), Value::Object(entries)) => (kind, entries),
                (Err(reason), Value::Object(entries)) => {
                    for id in entries.keys() {
                        report.skip(&kind_name, Some(id.as_str()), &reason);
                    }
                    continue;
                }
                (_, _) => {
                    report.skip(&kind_name, None, "section is not a mapping of id to document");
                    continue;
                }
            };

            for (id, doc) in entries {
                let Value::Object(doc) = doc else {
                    report.skip(&kind_name, Some(id.as_str()), "document is not a mapping");
                    continue;
                };
                match self.upsert(&report.collection, kind, &id, doc).await {
                    Ok(()) => imported += 1,
                    Err(e) => {
                        warn!(collection = %report.collection, %kind, id = %id, error = %e, "import write failed");
                        write_error.get_or_insert_with(|| e.to_string());
                    }
                }
            }
        }

        report.outcome = match write_error {
            Some(reason) => FileOutcome::Failed { reason },
            None => self.archive(&report.path, imported).await,
        };
        report
    }

    async fn upsert(&self, collection: &str, kind: EntityKind, id: &str, doc: Document) -> Result<()> {
        self.backend.update(id, doc, kind, collection).await?;
        debug!(collection, %kind, id, "imported entry");
        Ok(())
    }

    async fn archive(&self, path: &Path, imported: usize) -> FileOutcome {
        let Some(name) = path.file_name() else {
            return FileOutcome::ArchiveFailed {
                imported,
                reason: format!("{} has no file name", path.display()),
            };
        };
        match tokio::fs::rename(path, self.backups_dir().join(name)).await {
            Ok(()) => FileOutcome::Archived { imported },
            Err(e) => FileOutcome::ArchiveFailed {
                imported,
                reason: e.to_string(),
            },
        }
    }
}

impl FileReport {
    fn skip(&mut self, kind: &str, id: Option<&str>, reason: &str) {
        warn!(collection = %self.collection, kind, id = ?id, reason, "skipping import entry");
        self.entry_failures.push(EntryFailure {
            kind: kind.to_string(),
            id: id.map(str::to_string),
            reason: reason.to_string(),
        });
    }
}

async fn read_dump(path: &Path) -> Result<serde_json::Map<String, Value>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| StorageError::from(e).during("read", path.display()))?;
    match serde_json::from_str(&content) {
        Ok(Value::Object(sections)) => Ok(sections),
        Ok(_) => Err(StorageError::import(format!(
            "{} is not a mapping of kind to entries",
            path.display()
        ))),
        Err(e) => Err(StorageError::from(e).during("parse", path.display())),
    }
}

/// Empty or null kind sections carry nothing to import
fn is_empty_section(section: &Value) -> bool {
    match section {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
