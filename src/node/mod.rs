//! Registered nodes
//!
//! A node is a remote target (an SSH host or a Kubernetes cluster) together
//! with its encrypted credential and safety policy.

pub mod registry;
pub mod store;
pub mod validator;

pub use registry::{NewNode, NodeRegistry, NodeUpdate};
pub use store::{InMemoryNodeStore, NodeStore};
pub use validator::{NodeParams, NodeValidationError, NodeValidator};

use crate::crypto::EncryptedCredential;
use crate::safety::PolicyMode;
use crate::sanitize::LogSanitizer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a node's credential is presented to the remote side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    Password,
    Key,
    Kubeconfig,
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthType::Password => write!(f, "password"),
            AuthType::Key => write!(f, "key"),
            AuthType::Kubeconfig => write!(f, "kubeconfig"),
        }
    }
}

/// A stored node
///
/// Never serialized directly; listings use [`NodeSummary`]. The `Debug`
/// output omits the credential.
#[derive(Clone)]
pub struct Node {
    pub id: String,
    pub alias: String,
    pub display_name: Option<String>,
    pub connector_type: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub auth_type: AuthType,
    pub encrypted_credential: EncryptedCredential,
    pub tags: Vec<String>,
    pub safety_policy: PolicyMode,
    pub last_tested_at: Option<DateTime<Utc>>,
    pub last_test_success: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Connection parameters in the form the validator checks
    pub fn params(&self) -> NodeParams<'_> {
        NodeParams {
            connector_type: Some(&self.connector_type),
            host: self.host.as_deref(),
            port: self.port.map(u32::from),
            username: self.username.as_deref(),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            id: self.id.clone(),
            alias: self.alias.clone(),
            display_name: self.display_name.clone(),
            connector_type: self.connector_type.clone(),
            host: self.host.clone(),
            port: self.port,
            tags: self.tags.clone(),
            safety_policy: self.safety_policy,
            last_tested_at: self.last_tested_at,
            last_test_success: self.last_test_success,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("alias", &self.alias)
            .field("connector_type", &self.connector_type)
            .field("host", &LogSanitizer::sanitize_host(self.host.as_deref()))
            .field("port", &self.port)
            .field("auth_type", &self.auth_type)
            .field("safety_policy", &self.safety_policy)
            .finish_non_exhaustive()
    }
}

/// Credential-free view of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub id: String,
    pub alias: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub connector_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub safety_policy: PolicyMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_tested_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_test_success: Option<bool>,
}

impl NodeSummary {
    /// Replace the host with its sanitized form for agent-facing listings
    pub fn with_sanitized_host(mut self) -> Self {
        if let Some(host) = self.host.take() {
            self.host = Some(LogSanitizer::sanitize_host(host.as_str()));
        }
        self
    }
}
