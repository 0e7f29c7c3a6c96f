//! Gateway self-check
//!
//! Healthy means the cipher can round-trip a sample value and every expected
//! connector type is registered.

use crate::connector::ConnectorFactory;
use crate::crypto::CredentialCipher;
use crate::sanitize::LogSanitizer;
use serde::Serialize;

const SAMPLE: &str = "nodeconsole-health-check";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub cipher_ok: bool,
    pub cipher_detail: String,
    pub connectors: Vec<String>,
    pub missing_connectors: Vec<String>,
}

pub fn check(
    cipher: &CredentialCipher,
    connectors: &ConnectorFactory,
    expected_types: &[&str],
) -> HealthReport {
    let (cipher_ok, cipher_detail) = match cipher
        .encrypt(SAMPLE)
        .and_then(|encrypted| cipher.decrypt(&encrypted))
    {
        Ok(plain) if plain.as_str() == SAMPLE => (true, CredentialCipher::ALGORITHM.to_string()),
        Ok(_) => (false, "round trip returned a different value".to_string()),
        Err(e) => (false, LogSanitizer::sanitize_error(&e)),
    };

    let missing_connectors: Vec<String> = expected_types
        .iter()
        .filter(|t| !connectors.supports(t))
        .map(|t| t.to_string())
        .collect();

    let status = if cipher_ok && missing_connectors.is_empty() {
        HealthStatus::Up
    } else {
        HealthStatus::Down
    };

    HealthReport {
        status,
        cipher_ok,
        cipher_detail,
        connectors: connectors.types(),
        missing_connectors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{Connector, K8sConnector, SshConnector};
    use crate::node::test_support::cipher;
    use std::sync::Arc;

    fn factory(with_k8s: bool) -> ConnectorFactory {
        let mut connectors: Vec<Arc<dyn Connector>> = vec![Arc::new(SshConnector::default())];
        if with_k8s {
            connectors.push(Arc::new(K8sConnector::default()));
        }
        ConnectorFactory::new(connectors).unwrap()
    }

    #[test]
    fn test_healthy() {
        let report = check(&cipher(), &factory(true), &["ssh", "k8s"]);

        assert_eq!(report.status, HealthStatus::Up);
        assert!(report.cipher_ok);
        assert_eq!(report.connectors, vec!["k8s", "ssh"]);
        assert!(report.missing_connectors.is_empty());
    }

    #[test]
    fn test_missing_connector_is_down() {
        let report = check(&cipher(), &factory(false), &["ssh", "k8s"]);

        assert_eq!(report.status, HealthStatus::Down);
        assert_eq!(report.missing_connectors, vec!["k8s"]);
        assert_eq!(
            serde_json::to_value(&report).unwrap()["status"],
            serde_json::json!("DOWN")
        );
    }
}
