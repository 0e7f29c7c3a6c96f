// Human-in-the-loop approval
//
// The gateway asks an ApprovalHandler before running any command whose
// policy decision is RequireHitl. Blocked commands never reach a handler.
//
// Handlers shipped here:
// - DenyAll: the default when nobody is watching
// - FixedApproval: always answers the same way (tests, automation)
// - ConsolePrompt: asks on the terminal (CLI)

mod prompt;

pub use prompt::ConsolePrompt;

use crate::safety::{PolicyMode, SafetyLevel};
use crate::sanitize::LogSanitizer;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// The decision made on an approval request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// Command may run
    Approved,

    /// Command must not run
    Denied,
}

impl fmt::Display for ApprovalDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalDecision::Approved => write!(f, "approved"),
            ApprovalDecision::Denied => write!(f, "denied"),
        }
    }
}

/// What a human is asked to confirm
///
/// Holds the raw command so the operator can read it. `Debug` only shows
/// the command summary.
#[derive(Clone)]
pub struct ApprovalRequest {
    pub node_alias: String,
    pub connector_type: String,
    pub command: String,
    pub level: SafetyLevel,
    pub policy: PolicyMode,
    pub reason: String,
}

impl fmt::Debug for ApprovalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalRequest")
            .field("node_alias", &self.node_alias)
            .field("connector_type", &self.connector_type)
            .field("command", &LogSanitizer::command_summary(self.command.as_str()))
            .field("level", &self.level)
            .field("policy", &self.policy)
            .field("reason", &self.reason)
            .finish()
    }
}

#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    /// Ask for a decision; must not fail, denying is the fallback
    async fn request_approval(&self, request: &ApprovalRequest) -> ApprovalDecision;
}

/// Denies every request
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

#[async_trait]
impl ApprovalHandler for DenyAll {
    async fn request_approval(&self, request: &ApprovalRequest) -> ApprovalDecision {
        tracing::debug!(node = %request.node_alias, "No approver configured, denying");
        ApprovalDecision::Denied
    }
}

/// Always returns the same decision and counts how often it was asked
#[derive(Debug)]
pub struct FixedApproval {
    decision: ApprovalDecision,
    requests: AtomicUsize,
}

impl FixedApproval {
    pub fn new(decision: ApprovalDecision) -> Self {
        Self {
            decision,
            requests: AtomicUsize::new(0),
        }
    }

    pub fn approve() -> Self {
        Self::new(ApprovalDecision::Approved)
    }

    pub fn deny() -> Self {
        Self::new(ApprovalDecision::Denied)
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApprovalHandler for FixedApproval {
    async fn request_approval(&self, _request: &ApprovalRequest) -> ApprovalDecision {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.decision
    }
}
