//! Application layer - workflows built on the storage port

pub mod bulk_import;

pub use bulk_import::{
    BulkImportGate, EntryFailure, FileOutcome, FileReport, ImportReport, BACKUPS_DIR,
};
