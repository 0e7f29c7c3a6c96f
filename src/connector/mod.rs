//! Protocol connectors
//!
//! A connector knows how to run one command against one kind of target.
//! It receives the decrypted credential for the duration of a single call
//! and must not retain or log it.

pub mod factory;
pub mod k8s;
pub mod ssh;

pub use factory::ConnectorFactory;
pub use k8s::K8sConnector;
pub use ssh::SshConnector;

use crate::exec::{ExecOptions, ExecResult};
use crate::node::Node;
use async_trait::async_trait;

#[async_trait]
pub trait Connector: Send + Sync {
    /// Identifier nodes use to select this connector (`"ssh"`, `"k8s"`)
    fn connector_type(&self) -> &str;

    /// Implementation name, used in duplicate-registration errors
    fn connector_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Run a command; every failure is reported inside the result
    async fn execute(
        &self,
        credential: &str,
        node: &Node,
        command: &str,
        options: &ExecOptions,
    ) -> ExecResult;

    /// Whether the target is reachable and accepts the credential
    async fn test_connection(&self, credential: &str, node: &Node) -> bool;
}
