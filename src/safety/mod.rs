//! Command safety classification and policy
//!
//! Classification is a pure function of the command text. Whether a command
//! then runs, waits for a human, or is refused depends on the node's
//! [`PolicyMode`] and is decided by [`SafetyPolicyGuard`].

pub mod classifier;
pub mod policy;

pub use classifier::{ClassificationResult, RemoteCommandClassifier};
pub use policy::{Decision, SafetyPolicyGuard};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Risk tier of a command, ordered from least to most dangerous
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyLevel {
    ReadOnly = 0,
    SideEffect = 1,
    Destructive = 2,
}

impl SafetyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyLevel::ReadOnly => "READ_ONLY",
            SafetyLevel::SideEffect => "SIDE_EFFECT",
            SafetyLevel::Destructive => "DESTRUCTIVE",
        }
    }
}

impl fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-node strictness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    #[default]
    Strict,
    Standard,
    Relaxed,
}

impl PolicyMode {
    /// Parse a policy name, treating anything unrecognized as `Strict`
    pub fn parse_lenient(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.parse().ok())
            .unwrap_or(PolicyMode::Strict)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyMode::Strict => "strict",
            PolicyMode::Standard => "standard",
            PolicyMode::Relaxed => "relaxed",
        }
    }
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(PolicyMode::Strict),
            "standard" => Ok(PolicyMode::Standard),
            "relaxed" => Ok(PolicyMode::Relaxed),
            other => Err(format!(
                "Unknown safety policy '{}' (expected strict, standard or relaxed)",
                other
            )),
        }
    }
}
