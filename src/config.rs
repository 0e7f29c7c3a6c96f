// Configuration File Support
//
// TOML configuration with environment variable overrides.
// Loaded from the XDG config directory: ~/.config/nodeconsole/config.toml
// A missing file means defaults; the encryption key usually comes from
// NODE_CONSOLE_ENCRYPTION_KEY rather than the file.

use crate::crypto::{CipherError, CredentialCipher, ENCRYPTION_KEY_ENV};
use crate::exec::ExecLimits;
use crate::safety::PolicyMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Gateway configuration
    pub node_console: NodeConsoleConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Gateway settings
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NodeConsoleConfig {
    /// 64 hex characters; prefer the environment variable
    pub encryption_key: Option<String>,

    /// Policy for nodes registered without one
    pub default_safety_policy: PolicyMode,

    /// Bound on reaching and authenticating to a target
    pub connect_timeout_secs: u64,

    /// Execution timeout when the caller does not give one
    pub exec_timeout_secs: u64,

    /// Upper bound on caller-supplied execution timeouts
    pub max_exec_timeout_secs: u64,

    /// Capture budget when the caller does not give one
    pub max_output_bytes: usize,

    /// Upper bound on caller-supplied capture budgets
    pub max_output_bytes_limit: usize,

    /// kubectl binary used by the k8s connector
    pub kubectl_path: String,
}

impl Default for NodeConsoleConfig {
    fn default() -> Self {
        let limits = ExecLimits::default();
        Self {
            encryption_key: None,
            default_safety_policy: PolicyMode::Strict,
            connect_timeout_secs: 30,
            exec_timeout_secs: limits.default_timeout_secs,
            max_exec_timeout_secs: limits.max_timeout_secs,
            max_output_bytes: limits.default_max_output_bytes,
            max_output_bytes_limit: limits.max_output_bytes_limit,
            kubectl_path: "kubectl".to_string(),
        }
    }
}

impl fmt::Debug for NodeConsoleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeConsoleConfig")
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "[redacted]"),
            )
            .field("default_safety_policy", &self.default_safety_policy)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("exec_timeout_secs", &self.exec_timeout_secs)
            .field("max_exec_timeout_secs", &self.max_exec_timeout_secs)
            .field("max_output_bytes", &self.max_output_bytes)
            .field("max_output_bytes_limit", &self.max_output_bytes_limit)
            .field("kubectl_path", &self.kubectl_path)
            .finish()
    }
}

impl NodeConsoleConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn exec_limits(&self) -> ExecLimits {
        ExecLimits {
            default_timeout_secs: self.exec_timeout_secs,
            max_timeout_secs: self.max_exec_timeout_secs,
            default_max_output_bytes: self.max_output_bytes,
            max_output_bytes_limit: self.max_output_bytes_limit,
        }
    }

    /// Build the credential cipher; fails fast on a missing or malformed key
    pub fn cipher(&self) -> std::result::Result<CredentialCipher, CipherError> {
        CredentialCipher::from_hex_key(self.encryption_key.as_deref())
    }
}

impl Config {
    /// Load configuration from the default XDG config directory
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the result fails validation.
    pub fn load() -> Result<Self> {
        Self::load_from_path(Self::config_path())
    }

    /// Load configuration from a specific path
    ///
    /// A missing file yields defaults. Environment overrides are applied
    /// in both cases.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/nodeconsole/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "nodeconsole", "NodeConsole") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".config")
                .join("nodeconsole")
                .join("config.toml")
        }
    }

    /// Environment variables take precedence over config file values:
    /// - NODE_CONSOLE_ENCRYPTION_KEY
    /// - NODE_CONSOLE_DEFAULT_POLICY
    /// - NODE_CONSOLE_CONNECT_TIMEOUT_SECS
    /// - NODE_CONSOLE_EXEC_TIMEOUT_SECS
    /// - NODE_CONSOLE_MAX_OUTPUT_BYTES
    /// - NODE_CONSOLE_KUBECTL_PATH
    /// - NODECONSOLE_LOG_LEVEL
    /// - NODECONSOLE_LOG_FORMAT
    fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(level) = var("NODECONSOLE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("NODECONSOLE_LOG_FORMAT") {
            self.logging.format = format;
        }

        let gateway = &mut self.node_console;
        if let Some(key) = var(ENCRYPTION_KEY_ENV) {
            gateway.encryption_key = Some(key);
        }
        if let Some(policy) = var("NODE_CONSOLE_DEFAULT_POLICY") {
            gateway.default_safety_policy = PolicyMode::parse_lenient(Some(&policy));
        }
        if let Some(secs) = var("NODE_CONSOLE_CONNECT_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            gateway.connect_timeout_secs = secs;
        }
        if let Some(secs) = var("NODE_CONSOLE_EXEC_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            gateway.exec_timeout_secs = secs;
        }
        if let Some(bytes) = var("NODE_CONSOLE_MAX_OUTPUT_BYTES").and_then(|v| v.parse().ok()) {
            gateway.max_output_bytes = bytes;
        }
        if let Some(path) = var("NODE_CONSOLE_KUBECTL_PATH") {
            gateway.kubectl_path = path;
        }

        self
    }

    /// Validate configuration values
    ///
    /// The encryption key is checked separately by [`NodeConsoleConfig::cipher`]
    /// so commands that need no key still work without one.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        let gateway = &self.node_console;
        if gateway.connect_timeout_secs == 0 {
            anyhow::bail!("Connect timeout must be > 0");
        }
        if gateway.exec_timeout_secs == 0 {
            anyhow::bail!("Execution timeout must be > 0");
        }
        if gateway.exec_timeout_secs > gateway.max_exec_timeout_secs {
            anyhow::bail!(
                "Execution timeout {}s exceeds the maximum of {}s",
                gateway.exec_timeout_secs,
                gateway.max_exec_timeout_secs
            );
        }
        if gateway.max_output_bytes == 0 {
            anyhow::bail!("Max output bytes must be > 0");
        }
        if gateway.max_output_bytes > gateway.max_output_bytes_limit {
            anyhow::bail!(
                "Max output bytes {} exceeds the limit of {}",
                gateway.max_output_bytes,
                gateway.max_output_bytes_limit
            );
        }
        if gateway.kubectl_path.trim().is_empty() {
            anyhow::bail!("kubectl path must not be empty");
        }

        Ok(())
    }

    /// Get the log level as a tracing Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::test_support::TEST_KEY;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.node_console.default_safety_policy, PolicyMode::Strict);
        assert_eq!(config.node_console.connect_timeout_secs, 30);
        assert_eq!(config.node_console.exec_timeout_secs, 60);
        assert_eq!(config.node_console.max_output_bytes, 32_000);
        assert_eq!(config.node_console.kubectl_path, "kubectl");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_timeouts() {
        let mut config = Config::default();
        config.node_console.connect_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.node_console.exec_timeout_secs = 601;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_output_budget() {
        let mut config = Config::default();
        config.node_console.max_output_bytes = 2 * 1024 * 1024;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_nonexistent_file() {
        let config = Config::load_from_path("/nonexistent/nodeconsole/config.toml");
        assert!(config.is_ok());
    }

    #[test]
    fn test_load_valid_toml_config() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(
            temp_file,
            r#"
[logging]
level = "debug"
format = "json"

[node_console]
default_safety_policy = "standard"
connect_timeout_secs = 10
exec_timeout_secs = 120
kubectl_path = "/usr/local/bin/kubectl"
"#
        )
        .unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        let config: Config = toml::from_str(&content).unwrap();

        assert_eq!(config.logging.format, "json");
        assert_eq!(config.node_console.default_safety_policy, PolicyMode::Standard);
        assert_eq!(config.node_console.connect_timeout_secs, 10);
        assert_eq!(config.node_console.exec_timeout_secs, 120);
        assert_eq!(config.node_console.max_output_bytes, 32_000);
        assert_eq!(config.node_console.kubectl_path, "/usr/local/bin/kubectl");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_invalid_toml_config() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "[node_console\nconnect_timeout_secs = ").unwrap();

        let err = Config::load_from_path(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default().apply_overrides(overrides(&[
            ("NODECONSOLE_LOG_LEVEL", "debug"),
            ("NODECONSOLE_LOG_FORMAT", "json"),
            ("NODE_CONSOLE_ENCRYPTION_KEY", TEST_KEY),
            ("NODE_CONSOLE_DEFAULT_POLICY", "Relaxed"),
            ("NODE_CONSOLE_CONNECT_TIMEOUT_SECS", "5"),
            ("NODE_CONSOLE_EXEC_TIMEOUT_SECS", "90"),
            ("NODE_CONSOLE_MAX_OUTPUT_BYTES", "4096"),
            ("NODE_CONSOLE_KUBECTL_PATH", "/opt/kubectl"),
        ]));

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.node_console.encryption_key.as_deref(), Some(TEST_KEY));
        assert_eq!(config.node_console.default_safety_policy, PolicyMode::Relaxed);
        assert_eq!(config.node_console.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.node_console.exec_limits().default_timeout_secs, 90);
        assert_eq!(config.node_console.exec_limits().default_max_output_bytes, 4096);
        assert_eq!(config.node_console.kubectl_path, "/opt/kubectl");
        assert!(config.node_console.cipher().is_ok());
    }

    #[test]
    fn test_env_overrides_invalid_values() {
        let config = Config::default().apply_overrides(overrides(&[
            ("NODE_CONSOLE_CONNECT_TIMEOUT_SECS", "soon"),
            ("NODE_CONSOLE_DEFAULT_POLICY", "yolo"),
        ]));

        assert_eq!(config.node_console.connect_timeout_secs, 30);
        assert_eq!(config.node_console.default_safety_policy, PolicyMode::Strict);
    }

    #[test]
    fn test_missing_key_fails_fast() {
        let err = Config::default().node_console.cipher().unwrap_err();
        assert!(err.to_string().contains("openssl rand -hex 32"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let mut config = Config::default();
        config.node_console.encryption_key = Some(TEST_KEY.to_string());

        let debug = format!("{:?}", config);
        assert!(debug.contains("[redacted]"));
        assert!(!debug.contains(TEST_KEY));
    }

    #[test]
    fn test_log_level() {
        let config = Config::default();
        assert_eq!(config.log_level().unwrap(), tracing::Level::INFO);
    }
}
