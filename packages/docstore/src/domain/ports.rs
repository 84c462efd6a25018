//! Storage Port (Trait Interface)
//!
//! Port/Adapter pattern for backend flexibility:
//! - Embedded-File: JSON files on local disk (zero-config)
//! - Embedded-Relational: SQLite on local disk
//! - Remote-Replicated: shared server (PostgreSQL), atomic upserts
//!
//! # Concurrency hazard
//!
//! `get` is a fetch followed by an insert or write-back, and the embedded
//! `update` is an update followed by a fallback insert. Neither pair is
//! atomic. Two callers seeding the same missing id can both see a miss; the
//! embedded adapters tolerate the resulting duplicate-key failure by
//! re-fetching, but a delete racing between the two steps can still cause a
//! second seed. No locking is added at this layer to prevent it.

use async_trait::async_trait;

use super::filter::Filter;
use super::merge::merge_documents;
use super::models::{document_version, stamp_id, stamp_version, Document, EntityKind, Scope};
use super::schema::Template;
use crate::error::Result;

/// Document Backend Port (Primary Interface)
///
/// All storage backends implement this trait. Identifiers arrive already
/// stringified.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Fetch a document, seeding it from the template on miss and migrating
    /// it when its `ver` is behind the template's
    async fn get(
        &self,
        id: &str,
        kind: EntityKind,
        collection: &str,
        scope: Scope,
    ) -> Result<Document>;

    /// Store the complete document for `id`, inserting if absent
    ///
    /// Returns the document as persisted (with `_id`).
    async fn update(
        &self,
        id: &str,
        data: Document,
        kind: EntityKind,
        collection: &str,
    ) -> Result<Document>;

    /// All documents of (collection, kind) matching `filter`
    ///
    /// `limit` is advisory: it is recorded on the cursor, never applied here.
    async fn query(
        &self,
        kind: EntityKind,
        collection: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<DocumentCursor>;

    /// Delete by id; absent ids are a no-op
    async fn delete(&self, id: &str, kind: EntityKind, collection: &str) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════
// Read resolution (shared by every adapter)
// ═══════════════════════════════════════════════════════════════════════════

/// Outcome of comparing a fetched document with its template
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Nothing stored; document freshly built from the template
    Seed(Document),
    /// Stored `ver` was behind; document merged and re-stamped
    Migrate(Document),
    /// Stored document is current
    Fresh(Document),
}

impl Resolution {
    pub fn into_document(self) -> Document {
        match self {
            Resolution::Seed(doc) | Resolution::Migrate(doc) | Resolution::Fresh(doc) => doc,
        }
    }
}

/// Decide what `get` should return for a stored document (or its absence)
pub fn resolve(id: &str, stored: Option<Document>, template: &Template) -> Resolution {
    match stored {
        None => {
            let mut doc = template.instantiate();
            stamp_id(&mut doc, id);
            Resolution::Seed(doc)
        }
        Some(doc) if document_version(&doc) < template.version() => {
            let mut merged = merge_documents(template.document(), &doc);
            stamp_version(&mut merged, template.version());
            stamp_id(&mut merged, id);
            Resolution::Migrate(merged)
        }
        Some(doc) => Resolution::Fresh(doc),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Query results
// ═══════════════════════════════════════════════════════════════════════════

/// Restartable query result
///
/// Iterating does not consume the cursor; `iter()` can be called again to
/// walk the same documents from the start.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentCursor {
    documents: Vec<Document>,
    limit: Option<usize>,
}

impl DocumentCursor {
    pub fn new(documents: Vec<Document>, limit: Option<usize>) -> Self {
        Self { documents, limit }
    }

    /// Every matching document, ignoring the advisory limit
    pub fn iter(&self) -> std::slice::Iter<'_, Document> {
        self.documents.iter()
    }

    /// Matching documents capped at the advisory limit
    pub fn limited(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter().take(self.limit.unwrap_or(usize::MAX))
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn into_vec(self) -> Vec<Document> {
        self.documents
    }
}

impl IntoIterator for DocumentCursor {
    type Item = Document;
    type IntoIter = std::vec::IntoIter<Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.into_iter()
    }
}

impl<'a> IntoIterator for &'a DocumentCursor {
    type Item = &'a Document;
    type IntoIter = std::slice::Iter<'a, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.iter()
    }
}
