//! docstore - versioned document storage for bot configuration data
//!
//! Stores schema-less configuration documents (per guild, per user, global)
//! behind one async contract, with three interchangeable backends:
//!
//! - **Embedded-File**: one JSON file per collection, zero setup
//! - **Embedded-Relational**: SQLite database on local disk
//! - **Remote-Replicated**: shared PostgreSQL server with atomic upserts
//!
//! ## Core Principles
//!
//! 1. **Template-seeded reads**: a missing document reads as the current
//!    template for its (scope, kind), stamped with `_id`
//! 2. **Version-driven migration**: a stored document whose `ver` is behind
//!    the template is merged into the template's shape and written back
//! 3. **Stringified identity**: every id is stored as a string `_id`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use docstore::{DocumentStore, EntityKind, SchemaRegistry, StoreConfig};
//!
//! # async fn run() -> docstore::Result<()> {
//! let config = StoreConfig::from_env()?;
//! let store = DocumentStore::connect(&config, Arc::new(SchemaRegistry::builtin())).await?;
//!
//! let mut guild = store.get_global(1234u64, EntityKind::Guilds).await?;
//! guild.insert("prefix".into(), "?".into());
//! store.update(1234u64, guild, EntityKind::Guilds, "global").await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::{ErrorKind, Result, StorageError};

pub use api::{DocumentStore, MessageContext, Prefix};
pub use application::{BulkImportGate, FileOutcome, ImportReport};
pub use config::{BackendConfig, ImportConfig, StoreConfig};
pub use domain::{
    merge_documents, Document, DocumentBackend, DocumentCursor, EntityId, EntityKind, Filter,
    SchemaRegistry, Scope,
};
