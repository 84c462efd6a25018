//! Remote-Replicated Document Store
//!
//! A shared server reached through a [`RemoteClient`]. Unlike the embedded
//! adapters, a `get` miss is NOT persisted: the seeded template is returned
//! as a preview and the first `update` creates the document. Writes are a
//! single atomic upsert, so there is no fetch-then-insert race on `update`.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::InMemoryRemoteClient;
#[cfg(feature = "postgres")]
pub use postgres::{PostgresClient, CONNECT_TIMEOUT};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::domain::{
    resolve, stamp_id, Container, Document, DocumentBackend, DocumentCursor, EntityKind, Filter,
    Resolution, SchemaRegistry, Scope,
};
use crate::error::{Result, StorageError};

/// Already-connected handle to a remote document server
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn find_one(&self, container: &Container, id: &str) -> Result<Option<Document>>;

    /// Insert or replace the whole document for `id` in one round-trip
    async fn upsert(&self, container: &Container, id: &str, doc: &Document) -> Result<()>;

    async fn find(&self, container: &Container, filter: &Filter) -> Result<Vec<Document>>;

    /// Returns whether a document was removed
    async fn delete_one(&self, container: &Container, id: &str) -> Result<bool>;
}

#[async_trait]
impl<C: RemoteClient + ?Sized> RemoteClient for Arc<C> {
    async fn find_one(&self, container: &Container, id: &str) -> Result<Option<Document>> {
        (**self).find_one(container, id).await
    }

    async fn upsert(&self, container: &Container, id: &str, doc: &Document) -> Result<()> {
        (**self).upsert(container, id, doc).await
    }

    async fn find(&self, container: &Container, filter: &Filter) -> Result<Vec<Document>> {
        (**self).find(container, filter).await
    }

    async fn delete_one(&self, container: &Container, id: &str) -> Result<bool> {
        (**self).delete_one(container, id).await
    }
}

/// DocumentBackend over any [`RemoteClient`]
pub struct RemoteStore<C> {
    client: C,
    registry: Arc<SchemaRegistry>,
}

impl<C: RemoteClient> RemoteStore<C> {
    pub fn new(client: C, registry: Arc<SchemaRegistry>) -> Self {
        Self { client, registry }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

#[async_trait]
impl<C: RemoteClient> DocumentBackend for RemoteStore<C> {
    fn name(&self) -> &'static str {
        "remote-replicated"
    }

    async fn get(
        &self,
        id: &str,
        kind: EntityKind,
        collection: &str,
        scope: Scope,
    ) -> Result<Document> {
        let template = self.registry.default_for(scope, kind)?;
        let container = Container::new(collection, kind);
        let stored = self
            .client
            .find_one(&container, id)
            .await
            .map_err(|e| e.during("get", id))?;

        match resolve(id, stored, template) {
            Resolution::Seed(doc) => {
                debug!(backend = self.name(), %container, id, "miss, returning template preview");
                Ok(doc)
            }
            Resolution::Migrate(doc) => {
                self.client
                    .upsert(&container, id, &doc)
                    .await
                    .map_err(|e| e.during("get", id))?;
                debug!(backend = self.name(), %container, id, ver = template.version(), "migrated document");
                Ok(doc)
            }
            Resolution::Fresh(doc) => Ok(doc),
        }
    }

    async fn update(
        &self,
        id: &str,
        data: Document,
        kind: EntityKind,
        collection: &str,
    ) -> Result<Document> {
        let mut doc = data;
        stamp_id(&mut doc, id);
        self.client
            .upsert(&Container::new(collection, kind), id, &doc)
            .await
            .map_err(|e| e.during("update", id))?;
        Ok(doc)
    }

    async fn query(
        &self,
        kind: EntityKind,
        collection: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<DocumentCursor> {
        let documents = self
            .client
            .find(&Container::new(collection, kind), filter)
            .await
            .map_err(|e| e.during("query", collection))?;
        Ok(DocumentCursor::new(documents, limit))
    }

    async fn delete(&self, id: &str, kind: EntityKind, collection: &str) -> Result<()> {
        self.client
            .delete_one(&Container::new(collection, kind), id)
            .await
            .map_err(|e| e.during("delete", id))?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TLS compatibility shim
// ═══════════════════════════════════════════════════════════════════════════

/// Query parameters forced on by [`apply_tls_fix`]
pub const TLS_FIX_PARAMS: [(&str, &str); 2] =
    [("ssl", "true"), ("tlsAllowInvalidCertificates", "true")];

/// Rewrite a connection string for hosts with broken certificate chains.
///
/// Strips surrounding `<` / `>` and sets `ssl=true` and
/// `tlsAllowInvalidCertificates=true`, replacing any existing values for
/// those two keys and keeping every other parameter in order.
///
/// ```rust
/// use docstore::infrastructure::apply_tls_fix;
///
/// let url = apply_tls_fix("<postgres://db.example/app?ssl=false&appname=x>").unwrap();
/// assert_eq!(
///     url,
///     "postgres://db.example/app?appname=x&ssl=true&tlsAllowInvalidCertificates=true"
/// );
/// ```
pub fn apply_tls_fix(url: &str) -> Result<String> {
    let trimmed = url.trim().trim_matches(|c| c == '<' || c == '>');
    let mut parsed = Url::parse(trimmed)
        .map_err(|e| StorageError::config(format!("Invalid database URL: {}", e)).with_source(e))?;

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !TLS_FIX_PARAMS.iter().any(|(fixed, _)| key == fixed))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    parsed
        .query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .extend_pairs(TLS_FIX_PARAMS);

    Ok(parsed.into())
}
