//! NodeConsole Gateway Library
//!
//! Secure remote command execution for autonomous agents: command risk
//! classification, per-node safety policy, human approval, encrypted node
//! credentials, and SSH / Kubernetes connectors with bounded output and
//! dual timeouts.

pub mod approval;
pub mod audit;
pub mod config;
pub mod connector;
pub mod crypto;
pub mod error;
pub mod exec;
pub mod gateway;
pub mod health;
pub mod inventory;
pub mod metrics;
pub mod node;
pub mod safety;
pub mod sanitize;

#[cfg(test)]
mod logging_tests;

pub use error::{NodeConsoleError, Result};
pub use gateway::NodeConsole;
