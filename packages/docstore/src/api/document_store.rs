//! DocumentStore - application-facing entry point
//!
//! Wraps whichever [`DocumentBackend`] was selected at startup and adds the
//! identifier/scope conveniences plus command-prefix resolution.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::config::{BackendConfig, StoreConfig};
use crate::domain::{
    Document, DocumentBackend, DocumentCursor, EntityId, EntityKind, Filter, SchemaRegistry,
    Scope, GLOBAL_COLLECTION,
};
use crate::error::Result;
use crate::infrastructure::{InMemoryRemoteClient, JsonFileStore, RemoteStore};

#[cfg(feature = "postgres")]
use crate::config::tls_fix_requested;
#[cfg(feature = "postgres")]
use crate::infrastructure::PostgresClient;
#[cfg(feature = "sqlite")]
use crate::infrastructure::SqliteDocumentStore;

/// Prefix used when neither the guild nor the configuration provides one
pub const FALLBACK_PREFIX: &str = "!!";

/// Minimal view of an incoming message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageContext {
    /// Enclosing guild, `None` for direct messages
    pub scope_id: Option<u64>,
    /// The bot's own user id
    pub bot_id: u64,
}

/// Resolved command prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prefix {
    /// Invocation by mentioning the bot, e.g. `"<@123> "`
    Mention(String),
    /// Plain text prefix
    Text(String),
}

impl Prefix {
    pub fn as_str(&self) -> &str {
        match self {
            Prefix::Mention(s) | Prefix::Text(s) => s,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store Façade
///
/// Holds no mutable state besides the shared backend handle, so it can be
/// cloned freely across tasks.
#[derive(Clone)]
pub struct DocumentStore {
    /// Underlying storage backend
    backend: Arc<dyn DocumentBackend>,
    registry: Arc<SchemaRegistry>,
    default_prefix: Option<String>,
}

impl DocumentStore {
    /// Wrap an already-built backend
    pub fn new(
        backend: Arc<dyn DocumentBackend>,
        registry: Arc<SchemaRegistry>,
        default_prefix: Option<String>,
    ) -> Self {
        Self {
            backend,
            registry,
            default_prefix,
        }
    }

    /// Build the backend named by `config`
    ///
    /// The remote backend honors `ssl_fix` from the config or the
    /// `SSL_FIX` / `MONGO_SSL_FIX` / `REPL_SLUG` environment flags.
    pub async fn connect(config: &StoreConfig, registry: Arc<SchemaRegistry>) -> Result<Self> {
        let backend: Arc<dyn DocumentBackend> = match &config.backend {
            BackendConfig::EmbeddedFile { path } => {
                Arc::new(JsonFileStore::open(path, registry.clone())?)
            }
            #[cfg(feature = "sqlite")]
            BackendConfig::EmbeddedRelational { path } => {
                Arc::new(SqliteDocumentStore::open(path, registry.clone())?)
            }
            #[cfg(not(feature = "sqlite"))]
            BackendConfig::EmbeddedRelational { .. } => {
                return Err(crate::error::StorageError::config(
                    "embedded_relational backend requires the `sqlite` feature",
                ))
            }
            #[cfg(feature = "postgres")]
            BackendConfig::Remote { url, ssl_fix } => {
                let client = PostgresClient::connect(url, *ssl_fix || tls_fix_requested()).await?;
                Arc::new(RemoteStore::new(client, registry.clone()))
            }
            #[cfg(not(feature = "postgres"))]
            BackendConfig::Remote { .. } => {
                return Err(crate::error::StorageError::config(
                    "remote backend requires the `postgres` feature",
                ));
            }
        };

        info!(backend = backend.name(), "document store ready");
        Ok(Self::new(backend, registry, config.default_prefix.clone()))
    }

    /// In-process store over an [`InMemoryRemoteClient`] (remote semantics)
    pub fn in_memory(registry: Arc<SchemaRegistry>) -> Self {
        let backend = RemoteStore::new(InMemoryRemoteClient::new(), registry.clone());
        Self::new(Arc::new(backend), registry, None)
    }

    pub fn backend(&self) -> &Arc<dyn DocumentBackend> {
        &self.backend
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn default_prefix(&self) -> Option<&str> {
        self.default_prefix.as_deref()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Backend contract
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn get(
        &self,
        id: impl Into<EntityId>,
        kind: EntityKind,
        collection: &str,
        scope: Scope,
    ) -> Result<Document> {
        let id = id.into();
        self.backend.get(id.as_str(), kind, collection, scope).await
    }

    /// `get` against the shared `"global"` collection
    pub async fn get_global(&self, id: impl Into<EntityId>, kind: EntityKind) -> Result<Document> {
        self.get(id, kind, GLOBAL_COLLECTION, Scope::Global).await
    }

    pub async fn update(
        &self,
        id: impl Into<EntityId>,
        data: Document,
        kind: EntityKind,
        collection: &str,
    ) -> Result<Document> {
        let id = id.into();
        self.backend.update(id.as_str(), data, kind, collection).await
    }

    pub async fn query(
        &self,
        kind: EntityKind,
        collection: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<DocumentCursor> {
        self.backend.query(kind, collection, filter, limit).await
    }

    pub async fn delete(
        &self,
        id: impl Into<EntityId>,
        kind: EntityKind,
        collection: &str,
    ) -> Result<()> {
        let id = id.into();
        self.backend.delete(id.as_str(), kind, collection).await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Prefix resolution
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Command prefix for a message
    ///
    /// Direct messages get a mention prefix without touching storage.
    /// Otherwise: the guild's stored `prefix`, then the configured default,
    /// then [`FALLBACK_PREFIX`]. Empty strings fall through.
    pub async fn prefix_for(&self, ctx: &MessageContext) -> Result<Prefix> {
        let Some(guild_id) = ctx.scope_id else {
            return Ok(Prefix::Mention(format!("<@{}> ", ctx.bot_id)));
        };

        let data = self.get_global(guild_id, EntityKind::Guilds).await?;
        let stored = data
            .get("prefix")
            .and_then(|v| v.as_str())
            .filter(|p| !p.is_empty());

        let prefix = stored
            .or(self.default_prefix().filter(|p| !p.is_empty()))
            .unwrap_or(FALLBACK_PREFIX);
        Ok(Prefix::Text(prefix.to_string()))
    }
}

impl fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentStore")
            .field("backend", &self.backend.name())
            .field("templates", &self.registry.len())
            .field("default_prefix", &self.default_prefix)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store(default_prefix: Option<&str>) -> DocumentStore {
        let registry = Arc::new(SchemaRegistry::builtin());
        let backend = RemoteStore::new(InMemoryRemoteClient::new(), registry.clone());
        DocumentStore::new(Arc::new(backend), registry, default_prefix.map(String::from))
    }

    fn with_prefix(prefix: &str) -> Document {
        json!({"ver": 1.2, "prefix": prefix}).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_direct_message_gets_mention() {
        let store = store(Some("?"));
        let ctx = MessageContext {
            scope_id: None,
            bot_id: 99,
        };
        assert_eq!(
            store.prefix_for(&ctx).await.unwrap(),
            Prefix::Mention("<@99> ".to_string())
        );
    }

    #[tokio::test]
    async fn test_stored_prefix_wins() {
        let store = store(Some("?"));
        store
            .update(5u64, with_prefix("$"), EntityKind::Guilds, "global")
            .await
            .unwrap();
        let ctx = MessageContext {
            scope_id: Some(5),
            bot_id: 99,
        };
        assert_eq!(store.prefix_for(&ctx).await.unwrap().as_str(), "$");
    }

    #[tokio::test]
    async fn test_empty_prefix_falls_back_to_default_then_literal() {
        let ctx = MessageContext {
            scope_id: Some(5),
            bot_id: 99,
        };

        let configured = store(Some("?"));
        assert_eq!(configured.prefix_for(&ctx).await.unwrap(), Prefix::Text("?".into()));

        let bare = store(None);
        assert_eq!(bare.prefix_for(&ctx).await.unwrap(), Prefix::Text("!!".into()));

        let empty_default = store(Some(""));
        assert_eq!(empty_default.prefix_for(&ctx).await.unwrap().to_string(), "!!");
    }

    #[tokio::test]
    async fn test_identifiers_are_stringified() {
        let store = store(None);
        let by_int = store.get_global(7u64, EntityKind::Users).await.unwrap();
        let by_str = store.get_global("7", EntityKind::Users).await.unwrap();
        assert_eq!(by_int, by_str);
        assert_eq!(by_int.get("_id"), Some(&json!("7")));
    }
}
