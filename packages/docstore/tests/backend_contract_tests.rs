//! Backend contract tests
//!
//! Every adapter must satisfy the same read/write contract. Each test runs
//! against the embedded-file, embedded-relational and in-memory remote
//! adapters; the remote adapter differs only in not persisting misses.

use std::sync::Arc;

use docstore::domain::{Document, DocumentBackend, EntityKind, Filter, SchemaRegistry, Scope};
use docstore::infrastructure::{InMemoryRemoteClient, JsonFileStore, RemoteStore};
use docstore::ErrorKind;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;

#[cfg(feature = "sqlite")]
use docstore::infrastructure::SqliteDocumentStore;

fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {}", other),
    }
}

fn registry() -> Arc<SchemaRegistry> {
    let registry = SchemaRegistry::builder()
        .register(
            Scope::Global,
            EntityKind::Guilds,
            json!({"ver": 1.2, "prefix": "", "custom_skins": {}}),
        )
        .unwrap()
        .register(
            Scope::Local,
            EntityKind::Users,
            json!({"ver": 2.0, "fav_links": {}, "history": [], "premium": false}),
        )
        .unwrap()
        .build();
    Arc::new(registry)
}

/// All adapters over fresh storage; the TempDir must outlive them
fn backends(registry: Arc<SchemaRegistry>) -> (TempDir, Vec<Arc<dyn DocumentBackend>>) {
    let dir = TempDir::new().unwrap();
    let mut backends: Vec<Arc<dyn DocumentBackend>> = vec![
        Arc::new(JsonFileStore::open(dir.path().join("local_database"), registry.clone()).unwrap()),
        Arc::new(RemoteStore::new(InMemoryRemoteClient::new(), registry.clone())),
    ];
    #[cfg(feature = "sqlite")]
    backends.push(Arc::new(
        SqliteDocumentStore::open(dir.path().join(".local_database_sqlite"), registry).unwrap(),
    ));
    (dir, backends)
}

fn persists_misses(backend: &dyn DocumentBackend) -> bool {
    backend.name() != "remote-replicated"
}

async fn all_documents(backend: &dyn DocumentBackend, kind: EntityKind, collection: &str) -> Vec<Document> {
    backend
        .query(kind, collection, &Filter::all(), None)
        .await
        .unwrap()
        .into_vec()
}

// ═══════════════════════════════════════════════════════════════════════════
// Seeding
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_miss_returns_template_with_id() {
    let (_dir, backends) = backends(registry());
    for backend in &backends {
        let got = backend
            .get("17", EntityKind::Users, "bot", Scope::Local)
            .await
            .unwrap();
        assert_eq!(
            Value::Object(got),
            json!({"_id": "17", "ver": 2.0, "fav_links": {}, "history": [], "premium": false}),
            "backend {}",
            backend.name()
        );
    }
}

#[tokio::test]
async fn test_miss_seeds_exactly_once() {
    let (_dir, backends) = backends(registry());
    for backend in &backends {
        let first = backend.get("1", EntityKind::Users, "bot", Scope::Local).await.unwrap();
        let second = backend.get("1", EntityKind::Users, "bot", Scope::Local).await.unwrap();
        assert_eq!(first, second);

        let stored = all_documents(backend.as_ref(), EntityKind::Users, "bot").await;
        if persists_misses(backend.as_ref()) {
            assert_eq!(stored, vec![first], "backend {}", backend.name());
        } else {
            assert!(stored.is_empty(), "remote miss must not be persisted");
        }
    }
}

#[tokio::test]
async fn test_concurrent_seeds_store_one_document() {
    let (_dir, backends) = backends(registry());
    for backend in backends {
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let backend = backend.clone();
                tokio::spawn(async move {
                    backend.get("race", EntityKind::Users, "bot", Scope::Local).await
                })
            })
            .collect();
        for task in tasks {
            let doc = task.await.unwrap().unwrap();
            assert_eq!(doc.get("_id"), Some(&json!("race")));
        }

        let stored = all_documents(backend.as_ref(), EntityKind::Users, "bot").await;
        let expected = if persists_misses(backend.as_ref()) { 1 } else { 0 };
        assert_eq!(stored.len(), expected, "backend {}", backend.name());
    }
}

#[tokio::test]
async fn test_unregistered_kind_is_rejected() {
    let (_dir, backends) = backends(registry());
    for backend in &backends {
        let err = backend
            .get("1", EntityKind::Default, "bot", Scope::Local)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownKind);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Migration
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_stale_scalar_is_overwritten_by_template() {
    let (_dir, backends) = backends(registry());
    for backend in &backends {
        backend
            .update("1", doc(json!({"ver": 1.0, "prefix": "!!"})), EntityKind::Guilds, "global")
            .await
            .unwrap();

        let got = backend
            .get("1", EntityKind::Guilds, "global", Scope::Global)
            .await
            .unwrap();

        assert_eq!(
            Value::Object(got),
            json!({"_id": "1", "ver": 1.2, "prefix": "", "custom_skins": {}}),
            "backend {}",
            backend.name()
        );
    }
}

#[tokio::test]
async fn test_migration_converges_and_is_written_back() {
    let (_dir, backends) = backends(registry());
    for backend in &backends {
        backend
            .update(
                "u",
                doc(json!({"ver": 1.0, "history": ["a"], "legacy": 1})),
                EntityKind::Users,
                "bot",
            )
            .await
            .unwrap();

        let first = backend.get("u", EntityKind::Users, "bot", Scope::Local).await.unwrap();
        let second = backend.get("u", EntityKind::Users, "bot", Scope::Local).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            Value::Object(first.clone()),
            json!({"_id": "u", "ver": 2.0, "fav_links": {}, "history": ["a"], "premium": false})
        );
        assert_eq!(
            all_documents(backend.as_ref(), EntityKind::Users, "bot").await,
            vec![first],
            "backend {}",
            backend.name()
        );
    }
}

#[tokio::test]
async fn test_document_without_version_is_migrated() {
    let (_dir, backends) = backends(registry());
    for backend in &backends {
        backend
            .update("n", doc(json!({"premium": true})), EntityKind::Users, "bot")
            .await
            .unwrap();

        let got = backend.get("n", EntityKind::Users, "bot", Scope::Local).await.unwrap();

        assert_eq!(got.get("ver"), Some(&json!(2.0)));
        assert_eq!(got.get("premium"), Some(&json!(false)));
        assert!(!got.contains_key("history"));
    }
}

#[tokio::test]
async fn test_current_document_is_returned_verbatim() {
    let (_dir, backends) = backends(registry());
    for backend in &backends {
        let stored = doc(json!({"ver": 2.0, "premium": true, "extra": {"k": [1, 2]}}));
        let written = backend
            .update("v", stored, EntityKind::Users, "bot")
            .await
            .unwrap();

        let got = backend.get("v", EntityKind::Users, "bot", Scope::Local).await.unwrap();

        assert_eq!(got, written);
        assert_eq!(got.get("extra"), Some(&json!({"k": [1, 2]})));
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Writes, queries, deletes
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_update_is_idempotent() {
    let (_dir, backends) = backends(registry());
    for backend in &backends {
        let data = doc(json!({"ver": 2.0, "premium": true}));
        let first = backend
            .update("9", data.clone(), EntityKind::Users, "bot")
            .await
            .unwrap();
        let second = backend
            .update("9", data, EntityKind::Users, "bot")
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.get("_id"), Some(&json!("9")));
        assert_eq!(
            all_documents(backend.as_ref(), EntityKind::Users, "bot").await,
            vec![first],
            "backend {}",
            backend.name()
        );
    }
}

#[tokio::test]
async fn test_update_stamps_stringified_id() {
    let (_dir, backends) = backends(registry());
    for backend in &backends {
        let written = backend
            .update("55", doc(json!({"_id": 55, "ver": 2.0})), EntityKind::Users, "bot")
            .await
            .unwrap();
        assert_eq!(written.get("_id"), Some(&json!("55")));
    }
}

#[tokio::test]
async fn test_delete_then_get_reseeds() {
    let (_dir, backends) = backends(registry());
    for backend in &backends {
        backend
            .update("d", doc(json!({"ver": 2.0, "premium": true})), EntityKind::Users, "bot")
            .await
            .unwrap();

        backend.delete("d", EntityKind::Users, "bot").await.unwrap();
        backend.delete("d", EntityKind::Users, "bot").await.unwrap();

        let got = backend.get("d", EntityKind::Users, "bot", Scope::Local).await.unwrap();
        assert_eq!(got.get("premium"), Some(&json!(false)), "backend {}", backend.name());
    }
}

#[tokio::test]
async fn test_query_filters_and_limit_is_advisory() {
    let (_dir, backends) = backends(registry());
    for backend in &backends {
        for (id, skin) in [("1", "classic"), ("2", "mini"), ("3", "classic"), ("4", "classic")] {
            backend
                .update(
                    id,
                    doc(json!({"ver": 2.0, "player": {"skin": skin}})),
                    EntityKind::Users,
                    "bot",
                )
                .await
                .unwrap();
        }

        let cursor = backend
            .query(
                EntityKind::Users,
                "bot",
                &Filter::all().eq("player.skin", "classic"),
                Some(2),
            )
            .await
            .unwrap();

        assert_eq!(cursor.len(), 3, "backend {}", backend.name());
        assert_eq!(cursor.limited().count(), 2);
        let mut ids: Vec<_> = cursor
            .iter()
            .filter_map(|d| d.get("_id").and_then(Value::as_str))
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["1", "3", "4"]);
        // restartable
        assert_eq!(cursor.iter().count(), 3);
    }
}

#[tokio::test]
async fn test_collections_and_kinds_are_isolated() {
    let (_dir, backends) = backends(registry());
    for backend in &backends {
        backend
            .update("1", doc(json!({"ver": 2.0, "tag": "a"})), EntityKind::Users, "alpha")
            .await
            .unwrap();

        assert!(all_documents(backend.as_ref(), EntityKind::Users, "beta").await.is_empty());
        assert!(all_documents(backend.as_ref(), EntityKind::Guilds, "alpha").await.is_empty());
    }
}
