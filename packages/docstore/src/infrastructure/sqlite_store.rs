///! SQLite Document Store
///!
///! File-based persistent storage using SQLite (Embedded-Relational).
///! One `documents` table keyed by (collection, kind, _id); bodies are JSON text.
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::{
    resolve, stamp_id, Document, DocumentBackend, DocumentCursor, EntityKind, Filter,
    Resolution, SchemaRegistry, Scope,
};
use crate::error::{Result, StorageError};

/// Database file name inside the store directory
pub const SQLITE_FILE_NAME: &str = "documents.sqlite3";

/// SQLite-based DocumentBackend implementation
#[derive(Clone)]
pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
    registry: Arc<SchemaRegistry>,
}

impl SqliteDocumentStore {
    /// Open (creating if absent) a store in the directory `dir`
    pub fn open(dir: impl AsRef<Path>, registry: Arc<SchemaRegistry>) -> Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        let conn = Connection::open(Self::database_path(dir))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            registry,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing)
    pub fn in_memory(registry: Arc<SchemaRegistry>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            registry,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn database_path(dir: impl AsRef<Path>) -> PathBuf {
        dir.as_ref().join(SQLITE_FILE_NAME)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (collection, kind, id)
            )",
            [],
        )?;
        Ok(())
    }

    /// Run one engine call on the blocking pool
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            op(&conn)
        })
        .await
        .map_err(|e| StorageError::database(format!("SQLite task failed: {}", e)))?
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Engine calls
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn find_one(&self, collection: &str, kind: EntityKind, id: &str) -> Result<Option<Document>> {
        let (collection, id) = (collection.to_string(), id.to_string());
        self.blocking(move |conn| {
            let body: Option<String> = conn
                .query_row(
                    "SELECT body FROM documents WHERE collection = ?1 AND kind = ?2 AND id = ?3",
                    params![collection, kind.as_str(), id],
                    |row| row.get(0),
                )
                .optional()?;
            match body {
                Some(body) => Ok(Some(serde_json::from_str(&body)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn insert_one(&self, collection: &str, kind: EntityKind, id: &str, doc: &Document) -> Result<()> {
        let (collection, id) = (collection.to_string(), id.to_string());
        let body = serde_json::to_string(doc)?;
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO documents (collection, kind, id, body) VALUES (?1, ?2, ?3, ?4)",
                params![collection, kind.as_str(), id, body],
            )?;
            Ok(())
        })
        .await
    }

    /// Replace by id; returns the number of matched rows
    async fn replace_one(&self, collection: &str, kind: EntityKind, id: &str, doc: &Document) -> Result<usize> {
        let (collection, id) = (collection.to_string(), id.to_string());
        let body = serde_json::to_string(doc)?;
        self.blocking(move |conn| {
            Ok(conn.execute(
                "UPDATE documents SET body = ?4 WHERE collection = ?1 AND kind = ?2 AND id = ?3",
                params![collection, kind.as_str(), id, body],
            )?)
        })
        .await
    }

    async fn find(&self, collection: &str, kind: EntityKind, filter: Filter) -> Result<Vec<Document>> {
        let collection = collection.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT body FROM documents WHERE collection = ?1 AND kind = ?2 ORDER BY rowid",
            )?;
            let bodies = stmt
                .query_map(params![collection, kind.as_str()], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut documents = Vec::with_capacity(bodies.len());
            for body in bodies {
                let doc: Document = serde_json::from_str(&body)?;
                if filter.matches(&doc) {
                    documents.push(doc);
                }
            }
            Ok(documents)
        })
        .await
    }

    async fn delete_one(&self, collection: &str, kind: EntityKind, id: &str) -> Result<usize> {
        let (collection, id) = (collection.to_string(), id.to_string());
        self.blocking(move |conn| {
            Ok(conn.execute(
                "DELETE FROM documents WHERE collection = ?1 AND kind = ?2 AND id = ?3",
                params![collection, kind.as_str(), id],
            )?)
        })
        .await
    }

    /// Total stored documents across all containers
    pub async fn count(&self) -> Result<usize> {
        self.blocking(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }
}

#[async_trait]
impl DocumentBackend for SqliteDocumentStore {
    fn name(&self) -> &'static str {
        "embedded-relational"
    }

    async fn get(
        &self,
        id: &str,
        kind: EntityKind,
        collection: &str,
        scope: Scope,
    ) -> Result<Document> {
        let template = self.registry.default_for(scope, kind)?;
        let stored = self
            .find_one(collection, kind, id)
            .await
            .map_err(|e| e.during("get", id))?;

        match resolve(id, stored, template) {
            Resolution::Seed(doc) => match self.insert_one(collection, kind, id, &doc).await {
                Ok(()) => {
                    debug!(backend = self.name(), collection, %kind, id, "seeded document");
                    Ok(doc)
                }
                Err(e) if e.is_duplicate_key() => {
                    warn!(backend = self.name(), collection, %kind, id, "seed race: document seeded concurrently, re-fetching");
                    let winner = self
                        .find_one(collection, kind, id)
                        .await
                        .map_err(|e| e.during("get", id))?;
                    Ok(match winner {
                        Some(winner) => resolve(id, Some(winner), template).into_document(),
                        None => doc,
                    })
                }
                Err(e) => Err(e.during("get", id)),
            },
            Resolution::Migrate(doc) => {
                let matched = self
                    .replace_one(collection, kind, id, &doc)
                    .await
                    .map_err(|e| e.during("get", id))?;
                if matched == 0 {
                    // Deleted between fetch and write-back.
                    self.insert_one(collection, kind, id, &doc)
                        .await
                        .map_err(|e| e.during("get", id))?;
                }
                debug!(backend = self.name(), collection, %kind, id, ver = template.version(), "migrated document");
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

        let matched = self
            .replace_one(collection, kind, id, &doc)
            .await
            .map_err(|e| e.during("update", id))?;
        if matched > 0 {
            return Ok(doc);
        }

        match self.insert_one(collection, kind, id, &doc).await {
            Ok(()) => {
                debug!(backend = self.name(), collection, %kind, id, "update matched nothing, inserted");
                Ok(doc)
            }
            Err(e) if e.is_duplicate_key() => {
                warn!(backend = self.name(), collection, %kind, id, "insert raced with another writer, retrying update");
                self.replace_one(collection, kind, id, &doc)
                    .await
                    .map_err(|e| e.during("update", id))?;
                Ok(doc)
            }
            Err(e) => Err(e.during("update", id)),
        }
    }

    async fn query(
        &self,
        kind: EntityKind,
        collection: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<DocumentCursor> {
        // No LIMIT clause: the cap stays advisory on the cursor.
        let documents = self
            .find(collection, kind, filter.clone())
            .await
            .map_err(|e| e.during("query", collection))?;
        Ok(DocumentCursor::new(documents, limit))
    }

    async fn delete(&self, id: &str, kind: EntityKind, collection: &str) -> Result<()> {
        self.delete_one(collection, kind, id)
            .await
            .map_err(|e| e.during("delete", id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn registry() -> Arc<SchemaRegistry> {
        Arc::new(SchemaRegistry::builtin())
    }

    #[tokio::test]
    async fn test_open_creates_directory_and_file() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join(".local_database_sqlite");

        let store = SqliteDocumentStore::open(&root, registry()).unwrap();
        store.get("1", EntityKind::Users, "c", Scope::Local).await.unwrap();

        assert!(SqliteDocumentStore::database_path(&root).exists());
    }

    #[tokio::test]
    async fn test_update_replaces_whole_body() {
        let store = SqliteDocumentStore::in_memory(registry()).unwrap();

        store
            .update("5", doc(json!({"a": 1, "b": 2})), EntityKind::Users, "c")
            .await
            .unwrap();
        let updated = store
            .update("5", doc(json!({"b": 3})), EntityKind::Users, "c")
            .await
            .unwrap();

        assert_eq!(Value::Object(updated.clone()), json!({"_id": "5", "b": 3}));
        let cursor = store
            .query(EntityKind::Users, "c", &Filter::all(), None)
            .await
            .unwrap();
        assert_eq!(cursor.into_vec(), vec![updated]);
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_duplicate_key() {
        let store = SqliteDocumentStore::in_memory(registry()).unwrap();
        let d = doc(json!({"_id": "1"}));

        store.insert_one("c", EntityKind::Users, "1", &d).await.unwrap();
        let err = store.insert_one("c", EntityKind::Users, "1", &d).await.unwrap_err();

        assert!(err.is_duplicate_key());
    }

    #[tokio::test]
    async fn test_containers_are_isolated() {
        let store = SqliteDocumentStore::in_memory(registry()).unwrap();

        store.update("1", doc(json!({"x": 1})), EntityKind::Users, "a").await.unwrap();
        store.update("1", doc(json!({"x": 2})), EntityKind::Guilds, "a").await.unwrap();
        store.update("1", doc(json!({"x": 3})), EntityKind::Users, "b").await.unwrap();

        assert_eq!(store.count().await.unwrap(), 3);
        store.delete("1", EntityKind::Users, "a").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        let left = store
            .query(EntityKind::Guilds, "a", &Filter::all(), None)
            .await
            .unwrap();
        assert_eq!(left.iter().next().unwrap().get("x"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_failed_migration_write_back_is_reported_as_get() {
        let store = SqliteDocumentStore::in_memory(registry()).unwrap();
        store
            .update("1", doc(json!({"ver": 0.1})), EntityKind::Users, "c")
            .await
            .unwrap();
        store
            .conn
            .lock()
            .execute_batch(
                "CREATE TRIGGER frozen BEFORE UPDATE ON documents
                 BEGIN SELECT RAISE(ABORT, 'frozen'); END;",
            )
            .unwrap();

        let err = store
            .get("1", EntityKind::Users, "c", Scope::Local)
            .await
            .unwrap_err();

        assert!(err.message.starts_with("get 1:"), "{}", err.message);
        assert!(!err.message.contains("update"));
    }

    #[tokio::test]
    async fn test_reopen_persists() {
        let dir = TempDir::new().unwrap();
        {
            let store = SqliteDocumentStore::open(dir.path(), registry()).unwrap();
            store
                .update("9", doc(json!({"ver": 1.1, "token": "t"})), EntityKind::Users, "global")
                .await
                .unwrap();
        }

        let store = SqliteDocumentStore::open(dir.path(), registry()).unwrap();
        let got = store
            .get("9", EntityKind::Users, "global", Scope::Global)
            .await
            .unwrap();
        assert_eq!(got.get("token"), Some(&json!("t")));
    }
}
