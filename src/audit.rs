//! Execution audit trail
//!
//! Every gateway call leaves one immutable record: which node, which
//! connector, how the command was classified, what the approver said and how
//! it ended. Commands are stored only as their [`LogSanitizer`] summary.

use crate::approval::ApprovalDecision;
use crate::node::Node;
use crate::safety::{PolicyMode, SafetyLevel};
use crate::sanitize::LogSanitizer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::RwLock;

/// Maximum characters kept from a result
pub const RESULT_SUMMARY_MAX_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditEvent {
    #[serde(rename = "command.execute")]
    CommandExecute,
    #[serde(rename = "command.reject")]
    CommandReject,
    #[serde(rename = "command.hitl_denied")]
    CommandHitlDenied,
    #[serde(rename = "node.test")]
    NodeTest,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEvent::CommandExecute => "command.execute",
            AuditEvent::CommandReject => "command.reject",
            AuditEvent::CommandHitlDenied => "command.hitl_denied",
            AuditEvent::NodeTest => "node.test",
        }
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single audit entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique identifier for this record (UUID)
    pub id: String,

    /// When the call finished (UTC)
    pub timestamp: DateTime<Utc>,

    pub event_type: AuditEvent,
    pub node_alias: String,
    pub node_id: Option<String>,
    pub connector_type: Option<String>,

    /// `[cmd: len=N, hash=H]`, never the command itself
    pub command_summary: String,

    pub safety_level: Option<SafetyLevel>,
    pub safety_policy: PolicyMode,
    pub hitl_required: bool,
    pub hitl_decision: Option<ApprovalDecision>,

    /// `success`, `timeout`, `nonzero_exit`, `error`, `rejected`, `denied`...
    pub result_status: String,
    pub result_summary: String,
    pub duration_ms: u64,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl AuditRecord {
    pub fn new(event_type: AuditEvent, node: &Node) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            node_alias: node.alias.clone(),
            node_id: Some(node.id.clone()),
            connector_type: Some(node.connector_type.clone()),
            command_summary: LogSanitizer::command_summary(None),
            safety_level: None,
            safety_policy: node.safety_policy,
            hitl_required: false,
            hitl_decision: None,
            result_status: String::new(),
            result_summary: String::new(),
            duration_ms: 0,
            labels: BTreeMap::new(),
        }
    }

    pub fn command(mut self, command: &str) -> Self {
        self.command_summary = LogSanitizer::command_summary(command);
        self
    }

    pub fn safety_level(mut self, level: SafetyLevel) -> Self {
        self.safety_level = Some(level);
        self
    }

    pub fn hitl(mut self, required: bool, decision: Option<ApprovalDecision>) -> Self {
        self.hitl_required = required;
        self.hitl_decision = decision;
        self
    }

    pub fn outcome(mut self, status: &str, summary: &str) -> Self {
        self.result_status = status.to_string();
        self.result_summary = truncate_chars(summary, RESULT_SUMMARY_MAX_CHARS);
        self
    }

    pub fn duration(mut self, elapsed: Duration) -> Self {
        self.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn labels(mut self, labels: &BTreeMap<String, String>) -> Self {
        self.labels = labels.clone();
        self
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Append-only, in-memory audit log
#[derive(Debug, Default)]
pub struct AuditLog {
    records: RwLock<Vec<AuditRecord>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, record: AuditRecord) {
        tracing::debug!(
            event = %record.event_type,
            node = %record.node_alias,
            status = %record.result_status,
            "Audit record"
        );
        self.records.write().await.push(record);
    }

    /// Most recent records first, optionally limited
    pub async fn history(&self, limit: Option<usize>) -> Vec<AuditRecord> {
        let records = self.records.read().await;
        let take = limit.unwrap_or(records.len());
        records.iter().rev().take(take).cloned().collect()
    }

    pub async fn by_alias(&self, alias: &str) -> Vec<AuditRecord> {
        self.filter(|r| r.node_alias == alias).await
    }

    pub async fn by_event(&self, event: AuditEvent) -> Vec<AuditRecord> {
        self.filter(|r| r.event_type == event).await
    }

    pub async fn by_status(&self, status: &str) -> Vec<AuditRecord> {
        self.filter(|r| r.result_status == status).await
    }

    async fn filter(&self, predicate: impl Fn(&AuditRecord) -> bool) -> Vec<AuditRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| predicate(r))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Export all records as pretty JSON
    pub async fn export_json(&self) -> anyhow::Result<String> {
        let records = self.records.read().await;
        Ok(serde_json::to_string_pretty(&*records)?)
    }
}
