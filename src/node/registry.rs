//! Node registration service
//!
//! Validates and encrypts on the way in, strips credentials on the way out.

use super::validator::{NodeParams, NodeValidator};
use super::{AuthType, Node, NodeStore, NodeSummary};
use crate::crypto::CredentialCipher;
use crate::error::{NodeConsoleError, Result};
use crate::safety::PolicyMode;
use crate::sanitize::LogSanitizer;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Registration request for a new node
#[derive(Clone)]
pub struct NewNode {
    pub alias: String,
    pub display_name: Option<String>,
    pub connector_type: String,
    pub host: Option<String>,
    pub port: Option<u32>,
    pub username: Option<String>,
    pub auth_type: AuthType,
    pub credential: Zeroizing<String>,
    pub tags: Vec<String>,
    /// Falls back to the registry's default policy
    pub safety_policy: Option<PolicyMode>,
}

/// Partial update; `None` leaves a field unchanged
#[derive(Clone, Default)]
pub struct NodeUpdate {
    pub alias: Option<String>,
    pub display_name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u32>,
    pub username: Option<String>,
    pub auth_type: Option<AuthType>,
    pub credential: Option<Zeroizing<String>>,
    pub tags: Option<Vec<String>>,
    pub safety_policy: Option<PolicyMode>,
}

pub struct NodeRegistry {
    store: Arc<dyn NodeStore>,
    cipher: Arc<CredentialCipher>,
    default_policy: PolicyMode,
}

impl NodeRegistry {
    pub fn new(
        store: Arc<dyn NodeStore>,
        cipher: Arc<CredentialCipher>,
        default_policy: PolicyMode,
    ) -> Self {
        Self {
            store,
            cipher,
            default_policy,
        }
    }

    pub fn store(&self) -> Arc<dyn NodeStore> {
        Arc::clone(&self.store)
    }

    pub async fn register(&self, request: NewNode) -> Result<NodeSummary> {
        let port = NodeValidator::validate(NodeParams {
            connector_type: Some(&request.connector_type),
            host: request.host.as_deref(),
            port: request.port,
            username: request.username.as_deref(),
        })
        .map(|()| request.port.and_then(|p| u16::try_from(p).ok()))?;

        if self.store.exists_by_alias(&request.alias).await? {
            return Err(NodeConsoleError::DuplicateAlias(request.alias));
        }

        let now = Utc::now();
        let node = Node {
            id: uuid::Uuid::new_v4().to_string(),
            alias: request.alias,
            display_name: request.display_name,
            connector_type: request.connector_type.trim().to_ascii_lowercase(),
            host: request.host.map(|h| h.trim().to_string()),
            port,
            username: request.username.map(|u| u.trim().to_string()),
            auth_type: request.auth_type,
            encrypted_credential: self.cipher.encrypt(&request.credential)?,
            tags: request.tags,
            safety_policy: request.safety_policy.unwrap_or(self.default_policy),
            last_tested_at: None,
            last_test_success: None,
            created_at: now,
            updated_at: now,
        };

        info!(
            node = %node.alias,
            connector = %node.connector_type,
            host = %LogSanitizer::sanitize_host(node.host.as_deref()),
            policy = %node.safety_policy,
            "Registered node"
        );

        let summary = node.summary();
        self.store.save(node).await?;
        Ok(summary)
    }

    pub async fn update(&self, id: &str, update: NodeUpdate) -> Result<NodeSummary> {
        let mut node = self.load(id).await?;

        if let Some(alias) = update.alias {
            if alias != node.alias && self.store.exists_by_alias(&alias).await? {
                return Err(NodeConsoleError::DuplicateAlias(alias));
            }
            node.alias = alias;
        }
        if let Some(display_name) = update.display_name {
            node.display_name = Some(display_name);
        }
        if let Some(host) = update.host {
            node.host = Some(host.trim().to_string());
        }
        if let Some(username) = update.username {
            node.username = Some(username.trim().to_string());
        }
        if let Some(auth_type) = update.auth_type {
            node.auth_type = auth_type;
        }
        if let Some(tags) = update.tags {
            node.tags = tags;
        }
        if let Some(policy) = update.safety_policy {
            node.safety_policy = policy;
        }

        let port = update.port.or(node.port.map(u32::from));
        NodeValidator::validate(NodeParams { port, ..node.params() })?;
        node.port = port.and_then(|p| u16::try_from(p).ok());

        if let Some(credential) = update.credential {
            node.encrypted_credential = self.cipher.encrypt(&credential)?;
            debug!(node = %node.alias, "Re-encrypted node credential");
        }

        node.updated_at = Utc::now();
        info!(node = %node.alias, "Updated node");

        let summary = node.summary();
        self.store.save(node).await?;
        Ok(summary)
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        if self.store.delete(id).await? {
            info!(node_id = %id, "Removed node");
            Ok(())
        } else {
            Err(NodeConsoleError::NodeNotFound(id.to_string()))
        }
    }

    pub async fn get(&self, id: &str) -> Result<NodeSummary> {
        Ok(self.load(id).await?.summary())
    }

    pub async fn list(&self) -> Result<Vec<NodeSummary>> {
        Ok(self.store.list().await?.iter().map(Node::summary).collect())
    }

    /// Listing handed to an agent: no credentials, sanitized hosts
    pub async fn list_for_agent(
        &self,
        connector_type: Option<&str>,
        tag: Option<&str>,
    ) -> Result<Vec<NodeSummary>> {
        Ok(self
            .store
            .list()
            .await?
            .iter()
            .filter(|n| connector_type.map_or(true, |t| n.connector_type.eq_ignore_ascii_case(t)))
            .filter(|n| tag.map_or(true, |t| n.has_tag(t)))
            .map(|n| n.summary().with_sanitized_host())
            .collect())
    }

    async fn load(&self, id: &str) -> Result<Node> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| NodeConsoleError::NodeNotFound(id.to_string()))
    }
}
