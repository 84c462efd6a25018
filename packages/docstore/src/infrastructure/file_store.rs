//! Embedded-File Document Store
//!
//! One JSON file per collection under a local directory:
//!
//! ```text
//! <root>/<collection>.json  →  { "<kind>": { "<_id>": { ...document... } } }
//! ```
//!
//! Each file is loaded lazily, guarded by its own mutex and rewritten
//! atomically (temp + rename) after every mutation. Engine calls are
//! blocking and run on the tokio blocking pool.
//!
//! Every engine call (find, insert, update, replace, delete) is atomic on
//! its own, but `get` and `update` chain several of them. See the hazard
//! notes on [`DocumentBackend`].

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::domain::{
    resolve, stamp_id, Document, DocumentBackend, DocumentCursor, EntityKind, Filter,
    Resolution, SchemaRegistry, Scope,
};
use crate::error::{Result, StorageError};

type Tables = BTreeMap<String, BTreeMap<String, Document>>;

/// JSON-file-backed `DocumentBackend`
pub struct JsonFileStore {
    root: PathBuf,
    registry: Arc<SchemaRegistry>,
    collections: DashMap<String, Arc<Mutex<CollectionFile>>>,
}

impl JsonFileStore {
    /// Open (creating if absent) a store rooted at `root`
    pub fn open(root: impl AsRef<Path>, registry: Arc<SchemaRegistry>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            registry,
            collections: DashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn handle(&self, collection: &str) -> Result<Arc<Mutex<CollectionFile>>> {
        validate_collection_name(collection)?;
        let entry = self
            .collections
            .entry(collection.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(CollectionFile::new(
                    self.root.join(format!("{}.json", collection)),
                )))
            });
        Ok(entry.value().clone())
    }

    /// Run one engine call against a collection file on the blocking pool
    async fn with_collection<T, F>(&self, collection: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut CollectionFile) -> Result<T> + Send + 'static,
    {
        let handle = self.handle(collection)?;
        tokio::task::spawn_blocking(move || {
            let mut file = handle.lock();
            op(&mut file)
        })
        .await
        .map_err(|e| StorageError::database(format!("file store task failed: {}", e)))?
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Engine calls
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn find_one(&self, collection: &str, kind: EntityKind, id: &str) -> Result<Option<Document>> {
        let id = id.to_string();
        self.with_collection(collection, move |file| {
            Ok(file
                .tables()?
                .get(kind.as_str())
                .and_then(|table| table.get(&id))
                .cloned())
        })
        .await
    }

    async fn insert_one(&self, collection: &str, kind: EntityKind, id: &str, doc: Document) -> Result<()> {
        let id = id.to_string();
        self.with_collection(collection, move |file| {
            let table = file.tables()?.entry(kind.as_str().to_string()).or_default();
            if table.contains_key(&id) {
                return Err(StorageError::duplicate_key(&id));
            }
            table.insert(id, doc);
            file.flush()
        })
        .await
    }

    /// `$set` the top-level fields of `data`; `None` when nothing matched
    async fn set_fields(
        &self,
        collection: &str,
        kind: EntityKind,
        id: &str,
        data: Document,
    ) -> Result<Option<Document>> {
        let id = id.to_string();
        self.with_collection(collection, move |file| {
            let updated = {
                let Some(existing) = file
                    .tables()?
                    .get_mut(kind.as_str())
                    .and_then(|table| table.get_mut(&id))
                else {
                    return Ok(None);
                };
                for (key, value) in data {
                    existing.insert(key, value);
                }
                stamp_id(existing, &id);
                existing.clone()
            };
            file.flush()?;
            Ok(Some(updated))
        })
        .await
    }

    /// Replace the whole document; `false` when nothing matched
    async fn replace_one(&self, collection: &str, kind: EntityKind, id: &str, doc: Document) -> Result<bool> {
        let id = id.to_string();
        self.with_collection(collection, move |file| {
            match file
                .tables()?
                .get_mut(kind.as_str())
                .and_then(|table| table.get_mut(&id))
            {
                Some(existing) => *existing = doc,
                None => return Ok(false),
            }
            file.flush()?;
            Ok(true)
        })
        .await
    }

    async fn find(&self, collection: &str, kind: EntityKind, filter: Filter) -> Result<Vec<Document>> {
        self.with_collection(collection, move |file| {
            Ok(file
                .tables()?
                .get(kind.as_str())
                .map(|table| {
                    table
                        .values()
                        .filter(|doc| filter.matches(doc))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        })
        .await
    }

    async fn delete_one(&self, collection: &str, kind: EntityKind, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.with_collection(collection, move |file| {
            let removed = file
                .tables()?
                .get_mut(kind.as_str())
                .and_then(|table| table.remove(&id))
                .is_some();
            if removed {
                file.flush()?;
            }
            Ok(removed)
        })
        .await
    }
}

#[async_trait]
impl DocumentBackend for JsonFileStore {
    fn name(&self) -> &'static str {
        "embedded-file"
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
            Resolution::Seed(doc) => {
                match self.insert_one(collection, kind, id, doc.clone()).await {
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
                }
            }
            Resolution::Migrate(doc) => {
                if !self
                    .replace_one(collection, kind, id, doc.clone())
                    .await
                    .map_err(|e| e.during("get", id))?
                {
                    // Deleted between fetch and write-back.
                    self.insert_one(collection, kind, id, doc.clone())
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
        if let Some(updated) = self
            .set_fields(collection, kind, id, data.clone())
            .await
            .map_err(|e| e.during("update", id))?
        {
            return Ok(updated);
        }

        let mut doc = data;
        stamp_id(&mut doc, id);
        match self.insert_one(collection, kind, id, doc.clone()).await {
            Ok(()) => {
                debug!(backend = self.name(), collection, %kind, id, "update matched nothing, inserted");
                Ok(doc)
            }
            Err(e) if e.is_duplicate_key() => {
                warn!(backend = self.name(), collection, %kind, id, "insert raced with another writer, retrying update");
                self.set_fields(collection, kind, id, doc.clone())
                    .await
                    .map_err(|e| e.during("update", id))
                    .map(|updated| updated.unwrap_or(doc))
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

// ═══════════════════════════════════════════════════════════════════════════
// Collection files
// ═══════════════════════════════════════════════════════════════════════════

struct CollectionFile {
    path: PathBuf,
    tables: Option<Tables>,
}

impl CollectionFile {
    fn new(path: PathBuf) -> Self {
        Self { path, tables: None }
    }

    /// Loaded tables, reading the file on first access
    fn tables(&mut self) -> Result<&mut Tables> {
        if self.tables.is_none() {
            let tables = if self.path.exists() {
                let bytes = std::fs::read(&self.path)?;
                if bytes.iter().all(u8::is_ascii_whitespace) {
                    Tables::new()
                } else {
                    serde_json::from_slice(&bytes).map_err(|e| {
                        StorageError::from(e).during("load", self.path.display())
                    })?
                }
            } else {
                Tables::new()
            };
            self.tables = Some(tables);
        }
        Ok(self.tables.get_or_insert_with(Tables::new))
    }

    /// Persist the cached tables; on failure the cache is dropped so the
    /// next access reloads what is actually on disk
    fn flush(&mut self) -> Result<()> {
        let result = self.write_atomically();
        if let Err(e) = &result {
            warn!(path = %self.path.display(), error = %e, "flush failed, discarding cached tables");
            self.tables = None;
        }
        result
    }

    /// Write the file atomically (temp + fsync + rename)
    fn write_atomically(&self) -> Result<()> {
        let Some(tables) = &self.tables else {
            return Ok(());
        };
        let payload = serde_json::to_vec_pretty(tables)?;
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&payload)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn validate_collection_name(collection: &str) -> Result<()> {
    let valid = !collection.is_empty()
        && !collection.starts_with('.')
        && collection
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::config(format!(
            "invalid collection name '{}'",
            collection
        )))
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

    fn open(dir: &TempDir) -> JsonFileStore {
        JsonFileStore::open(dir.path(), Arc::new(SchemaRegistry::builtin())).unwrap()
    }

    #[tokio::test]
    async fn test_open_creates_directory() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nested").join("local_database");
        let store = JsonFileStore::open(&root, Arc::new(SchemaRegistry::builtin())).unwrap();
        assert!(root.is_dir());
        assert_eq!(store.root(), root.as_path());
    }

    #[tokio::test]
    async fn test_file_layout() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store.get("10", EntityKind::Users, "bot-a", Scope::Local).await.unwrap();

        let raw: Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("bot-a.json")).unwrap()).unwrap();
        assert_eq!(raw["users"]["10"]["_id"], json!("10"));
        assert_eq!(raw["users"]["10"]["ver"], json!(1.0));
        assert!(!dir.path().join("bot-a.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_update_is_field_merge() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store
            .update("5", doc(json!({"a": 1, "b": 2})), EntityKind::Users, "c")
            .await
            .unwrap();
        let updated = store
            .update("5", doc(json!({"b": 3})), EntityKind::Users, "c")
            .await
            .unwrap();

        assert_eq!(Value::Object(updated), json!({"_id": "5", "a": 1, "b": 3}));
    }

    #[tokio::test]
    async fn test_reopen_reads_existing_file() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir);
            store
                .update("1", doc(json!({"ver": 1.7, "djroles": [4]})), EntityKind::Guilds, "c")
                .await
                .unwrap();
        }

        let store = open(&dir);
        let got = store.get("1", EntityKind::Guilds, "c", Scope::Local).await.unwrap();
        assert_eq!(got.get("djroles"), Some(&json!([4])));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("broken.json"), b"{not json").unwrap();
        let store = open(&dir);

        let err = store
            .get("1", EntityKind::Users, "broken", Scope::Local)
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Serialization);
        assert!(err.message.contains("get 1"));
    }

    #[tokio::test]
    async fn test_failed_flush_leaves_no_phantom_document() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("c.json.tmp");
        std::fs::create_dir(&blocker).unwrap();
        let store = open(&dir);

        assert!(store.get("1", EntityKind::Users, "c", Scope::Local).await.is_err());
        assert!(store
            .update("2", doc(json!({"a": 1})), EntityKind::Users, "c")
            .await
            .is_err());
        let cached = store
            .query(EntityKind::Users, "c", &Filter::all(), None)
            .await
            .unwrap();
        assert!(cached.is_empty());
        assert!(!dir.path().join("c.json").exists());

        std::fs::remove_dir(&blocker).unwrap();
        store.get("1", EntityKind::Users, "c", Scope::Local).await.unwrap();
        let reopened = open(&dir)
            .query(EntityKind::Users, "c", &Filter::all(), None)
            .await
            .unwrap();
        assert_eq!(reopened.len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_path_like_collection() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        for bad in ["", "../escape", ".hidden", "a/b"] {
            let err = store.delete("1", EntityKind::Users, bad).await.unwrap_err();
            assert_eq!(err.kind, crate::error::ErrorKind::Config);
        }
    }
}
