//! Connector registry

use super::Connector;
use crate::error::{NodeConsoleError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Maps connector type identifiers to implementations
///
/// Built once at startup. Two connectors claiming the same type is a
/// configuration error, not something to resolve silently.
pub struct ConnectorFactory {
    connectors: HashMap<String, Arc<dyn Connector>>,
}

impl ConnectorFactory {
    pub fn new(connectors: Vec<Arc<dyn Connector>>) -> Result<Self> {
        let mut map: HashMap<String, Arc<dyn Connector>> = HashMap::new();

        for connector in connectors {
            let connector_type = connector.connector_type().to_ascii_lowercase();
            if let Some(existing) = map.get(&connector_type) {
                return Err(NodeConsoleError::DuplicateConnector {
                    connector_type,
                    existing: existing.connector_name(),
                    duplicate: connector.connector_name(),
                });
            }
            map.insert(connector_type, connector);
        }

        let factory = Self { connectors: map };
        info!(types = ?factory.types(), "Registered connectors");
        Ok(factory)
    }

    /// Look up a connector; unknown types are an error
    pub fn get(&self, connector_type: &str) -> Result<Arc<dyn Connector>> {
        self.connectors
            .get(&connector_type.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| NodeConsoleError::UnknownConnector(connector_type.to_string()))
    }

    pub fn supports(&self, connector_type: &str) -> bool {
        self.connectors
            .contains_key(&connector_type.to_ascii_lowercase())
    }

    /// Registered types, sorted
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.connectors.keys().cloned().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{ExecOptions, ExecResult};
    use crate::node::Node;
    use async_trait::async_trait;

    struct FakeConnector(&'static str);

    #[async_trait]
    impl Connector for FakeConnector {
        fn connector_type(&self) -> &str {
            self.0
        }

        async fn execute(&self, _: &str, _: &Node, _: &str, _: &ExecOptions) -> ExecResult {
            ExecResult::builder().build()
        }

        async fn test_connection(&self, _: &str, _: &Node) -> bool {
            true
        }
    }

    struct OtherFake;

    fn fake(connector_type: &'static str) -> Arc<dyn Connector> {
        Arc::new(FakeConnector(connector_type))
    }

    #[async_trait]
    impl Connector for OtherFake {
        fn connector_type(&self) -> &str {
            "ssh"
        }

        async fn execute(&self, _: &str, _: &Node, _: &str, _: &ExecOptions) -> ExecResult {
            ExecResult::builder().build()
        }

        async fn test_connection(&self, _: &str, _: &Node) -> bool {
            false
        }
    }

    #[test]
    fn test_lookup() {
        let factory = ConnectorFactory::new(vec![fake("ssh"), fake("k8s")]).unwrap();

        assert!(factory.supports("ssh"));
        assert!(factory.supports("K8S"));
        assert!(!factory.supports("winrm"));
        assert_eq!(factory.get("SSH").unwrap().connector_type(), "ssh");
        assert_eq!(factory.types(), vec!["k8s", "ssh"]);
    }

    #[test]
    fn test_unknown_type() {
        let factory = ConnectorFactory::new(vec![fake("ssh")]).unwrap();

        match factory.get("winrm") {
            Err(NodeConsoleError::UnknownConnector(t)) => assert_eq!(t, "winrm"),
            _ => panic!("expected UnknownConnector"),
        }
    }

    #[test]
    fn test_duplicate_type_is_fatal() {
        let other: Arc<dyn Connector> = Arc::new(OtherFake);
        let result = ConnectorFactory::new(vec![fake("ssh"), other]);

        let message = match result {
            Err(err @ NodeConsoleError::DuplicateConnector { .. }) => err.to_string(),
            _ => panic!("expected DuplicateConnector"),
        };
        assert!(message.contains("'ssh'"));
        assert!(message.contains("FakeConnector"));
        assert!(message.contains("OtherFake"));
    }
}
