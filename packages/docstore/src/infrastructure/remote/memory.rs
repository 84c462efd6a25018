//! In-memory remote client (for testing and local previews)

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::RemoteClient;
use crate::domain::{Container, Document, Filter};
use crate::error::Result;

type Containers = HashMap<Container, BTreeMap<String, Document>>;

/// Map-backed [`RemoteClient`]
///
/// Clones share the same data, like handles to one server.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRemoteClient {
    containers: Arc<RwLock<Containers>>,
}

impl InMemoryRemoteClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents across all containers
    pub fn len(&self) -> usize {
        self.containers.read().values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything
    pub fn clear(&self) {
        self.containers.write().clear();
    }
}

#[async_trait]
impl RemoteClient for InMemoryRemoteClient {
    async fn find_one(&self, container: &Container, id: &str) -> Result<Option<Document>> {
        Ok(self
            .containers
            .read()
            .get(container)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn upsert(&self, container: &Container, id: &str, doc: &Document) -> Result<()> {
        self.containers
            .write()
            .entry(container.clone())
            .or_default()
            .insert(id.to_string(), doc.clone());
        Ok(())
    }

    async fn find(&self, container: &Container, filter: &Filter) -> Result<Vec<Document>> {
        let containers = self.containers.read();
        Ok(containers
            .get(container)
            .map(|docs| docs.values().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_one(&self, container: &Container, id: &str) -> Result<bool> {
        Ok(self
            .containers
            .write()
            .get_mut(container)
            .map(|docs| docs.remove(id).is_some())
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntityKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_clones_share_state() {
        let client = InMemoryRemoteClient::new();
        let other = client.clone();
        let container = Container::new("c", EntityKind::Users);
        let doc = json!({"_id": "1"}).as_object().cloned().unwrap();

        client.upsert(&container, "1", &doc).await.unwrap();

        assert_eq!(other.find_one(&container, "1").await.unwrap(), Some(doc));
        assert!(other.delete_one(&container, "1").await.unwrap());
        assert!(!client.delete_one(&container, "1").await.unwrap());
        assert!(client.is_empty());
    }
}
