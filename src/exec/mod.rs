//! Execution model shared by every connector
//!
//! - [`ExecOptions`]: what the caller asks for
//! - [`ExecResult`]: what comes back, success or not
//! - [`OutputCapture`]: bounded stdout/stderr collection
//! - [`DualTimeout`]: connect and execute windows

pub mod capture;
pub mod process;
pub mod result;
pub mod timeout;

pub use capture::{LimitedBuffer, OutputCapture};
pub use result::{ErrorType, ExecResult, ExecResultBuilder};
pub use timeout::{DualTimeout, TimeoutPhase};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default execution timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default capture budget in bytes
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 32_000;

/// Gateway-side bounds applied to caller options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecLimits {
    pub default_timeout_secs: u64,
    pub max_timeout_secs: u64,
    pub default_max_output_bytes: usize,
    pub max_output_bytes_limit: usize,
}

impl Default for ExecLimits {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_timeout_secs: 600,
            default_max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            max_output_bytes_limit: 1024 * 1024,
        }
    }
}

/// Per-call execution options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecOptions {
    pub timeout_seconds: u64,
    pub max_output_bytes: usize,
    pub working_directory: Option<String>,
    pub environment: BTreeMap<String, String>,
    /// Classify and resolve policy, but never dispatch
    pub dry_run: bool,
    /// Free-form tags copied into audit records
    pub labels: BTreeMap<String, String>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            working_directory: None,
            environment: BTreeMap::new(),
            dry_run: false,
            labels: BTreeMap::new(),
        }
    }
}

impl ExecOptions {
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_seconds = timeout_secs;
        self
    }

    pub fn with_max_output(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(name.into(), value.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Replace zero values with defaults and cap at the configured maxima
    pub fn clamped(mut self, limits: &ExecLimits) -> Self {
        if self.timeout_seconds == 0 {
            self.timeout_seconds = limits.default_timeout_secs;
        }
        self.timeout_seconds = self.timeout_seconds.min(limits.max_timeout_secs);

        if self.max_output_bytes == 0 {
            self.max_output_bytes = limits.default_max_output_bytes;
        }
        self.max_output_bytes = self.max_output_bytes.min(limits.max_output_bytes_limit);
        self
    }

    /// Reject environment names and working directories that cannot be
    /// passed to a remote side safely
    pub fn validate(&self) -> Result<(), String> {
        for name in self.environment.keys() {
            if !is_env_name(name) {
                return Err(format!("Invalid environment variable name '{}'", name));
            }
        }
        for value in self.environment.values() {
            if value.contains('\0') {
                return Err("Environment values must not contain NUL bytes".to_string());
            }
        }
        if let Some(dir) = &self.working_directory {
            if dir.trim().is_empty() || dir.contains('\0') || dir.contains('\n') {
                return Err("Invalid working directory".to_string());
            }
        }
        Ok(())
    }
}

fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
