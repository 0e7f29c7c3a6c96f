//! Node persistence seam
//!
//! Durable storage lives outside this crate. The gateway and registry only
//! see the [`NodeStore`] trait; [`InMemoryNodeStore`] backs the CLI and tests.

use super::Node;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Node>>;

    async fn find_by_alias(&self, alias: &str) -> Result<Option<Node>>;

    async fn exists_by_alias(&self, alias: &str) -> Result<bool> {
        Ok(self.find_by_alias(alias).await?.is_some())
    }

    /// Insert or replace by id
    async fn save(&self, node: Node) -> Result<()>;

    /// Returns whether a node was removed
    async fn delete(&self, id: &str) -> Result<bool>;

    /// All nodes ordered by alias
    async fn list(&self) -> Result<Vec<Node>>;
}

#[derive(Default)]
pub struct InMemoryNodeStore {
    nodes: RwLock<HashMap<String, Node>>,
}

impl InMemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with nodes
    pub fn with_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let nodes = nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
        Self {
            nodes: RwLock::new(nodes),
        }
    }

    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }
}

#[async_trait]
impl NodeStore for InMemoryNodeStore {
    async fn get(&self, id: &str) -> Result<Option<Node>> {
        Ok(self.nodes.read().await.get(id).cloned())
    }

    async fn find_by_alias(&self, alias: &str) -> Result<Option<Node>> {
        Ok(self
            .nodes
            .read()
            .await
            .values()
            .find(|n| n.alias == alias)
            .cloned())
    }

    async fn save(&self, node: Node) -> Result<()> {
        self.nodes.write().await.insert(node.id.clone(), node);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.nodes.write().await.remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<Node>> {
        let mut nodes: Vec<Node> = self.nodes.read().await.values().cloned().collect();
        nodes.sort_by(|a, b| a.alias.cmp(&b.alias));
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::test_support::node;
    use crate::safety::PolicyMode;

    #[tokio::test]
    async fn test_save_and_get() {
        let store = InMemoryNodeStore::new();
        store.save(node("db-1", "ssh", PolicyMode::Strict)).await.unwrap();

        let loaded = store.get("db-1-id").await.unwrap().unwrap();
        assert_eq!(loaded.alias, "db-1");
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_alias_lookup() {
        let store = InMemoryNodeStore::with_nodes([node("db-1", "ssh", PolicyMode::Strict)]);

        assert!(store.exists_by_alias("db-1").await.unwrap());
        assert!(!store.exists_by_alias("db-2").await.unwrap());
        assert_eq!(store.find_by_alias("db-1").await.unwrap().unwrap().id, "db-1-id");
    }

    #[tokio::test]
    async fn test_list_sorted_by_alias() {
        let store = InMemoryNodeStore::with_nodes([
            node("zeta", "ssh", PolicyMode::Strict),
            node("alpha", "k8s", PolicyMode::Relaxed),
        ]);

        let aliases: Vec<String> = store.list().await.unwrap().into_iter().map(|n| n.alias).collect();
        assert_eq!(aliases, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryNodeStore::with_nodes([node("db-1", "ssh", PolicyMode::Strict)]);

        assert!(store.delete("db-1-id").await.unwrap());
        assert!(!store.delete("db-1-id").await.unwrap());
        assert!(store.is_empty().await);
    }
}
