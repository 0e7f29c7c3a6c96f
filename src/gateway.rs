//! Remote command gateway
//!
//! [`NodeConsole`] is what an agent calls. For one `execute` it:
//!
//! 1. loads the node and resolves its connector
//! 2. clamps and validates the options
//! 3. classifies the command and applies the node's policy
//! 4. asks the approver when the policy requires a human
//! 5. decrypts the credential and dispatches to the connector
//!
//! Expected failures come back as an [`ExecResult`]. Only configuration
//! problems (unknown connector type, undecryptable credential, store
//! failures) are returned as errors. Every call is audited.

use crate::approval::{ApprovalDecision, ApprovalHandler, ApprovalRequest, DenyAll};
use crate::audit::{AuditEvent, AuditLog, AuditRecord};
use crate::connector::k8s::K8S_CONNECTOR_TYPE;
use crate::connector::ConnectorFactory;
use crate::crypto::CredentialCipher;
use crate::error::{NodeConsoleError, Result};
use crate::exec::{ErrorType, ExecLimits, ExecOptions, ExecResult};
use crate::metrics;
use crate::node::{Node, NodeStore};
use crate::safety::{ClassificationResult, Decision, RemoteCommandClassifier};
use crate::sanitize::LogSanitizer;
use chrono::Utc;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct NodeConsole {
    store: Arc<dyn NodeStore>,
    cipher: Arc<CredentialCipher>,
    connectors: Arc<ConnectorFactory>,
    approver: Arc<dyn ApprovalHandler>,
    audit: Arc<AuditLog>,
    limits: ExecLimits,
}

impl NodeConsole {
    /// Gateway that denies every approval request
    pub fn new(
        store: Arc<dyn NodeStore>,
        cipher: Arc<CredentialCipher>,
        connectors: Arc<ConnectorFactory>,
    ) -> Self {
        Self {
            store,
            cipher,
            connectors,
            approver: Arc::new(DenyAll),
            audit: Arc::new(AuditLog::new()),
            limits: ExecLimits::default(),
        }
    }

    pub fn with_approver(mut self, approver: Arc<dyn ApprovalHandler>) -> Self {
        self.approver = approver;
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_limits(mut self, limits: ExecLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn audit(&self) -> Arc<AuditLog> {
        Arc::clone(&self.audit)
    }

    pub fn connectors(&self) -> Arc<ConnectorFactory> {
        Arc::clone(&self.connectors)
    }

    /// Classify a command against a node's policy without running it
    pub async fn plan(&self, node_id: &str, command: &str) -> Result<ClassificationResult> {
        let node = self
            .store
            .get(node_id)
            .await?
            .ok_or_else(|| NodeConsoleError::NodeNotFound(node_id.to_string()))?;
        Ok(classify_for(&node, command))
    }

    pub async fn execute(
        &self,
        node_id: &str,
        command: &str,
        options: ExecOptions,
    ) -> Result<ExecResult> {
        let started = Instant::now();

        let Some(node) = self.store.get(node_id).await? else {
            warn!(node_id = %node_id, "Execution requested for unknown node");
            return Ok(ExecResult::failure(
                ErrorType::ResourceNotFound,
                format!("Node not found: {}", node_id),
            ));
        };
        let connector = self.connectors.get(&node.connector_type)?;

        if command.trim().is_empty() {
            return Ok(self
                .reject(&node, command, None, "Empty command", &options, started)
                .await);
        }

        let options = options.clamped(&self.limits);
        if let Err(message) = options.validate() {
            return Ok(self
                .reject(&node, command, None, &message, &options, started)
                .await);
        }

        let classification = classify_for(&node, command);
        metrics::POLICY_DECISIONS_TOTAL
            .with_label_values(&[
                classification.level.as_str(),
                &classification.decision.to_string(),
            ])
            .inc();

        info!(
            node = %node.alias,
            connector = %node.connector_type,
            cmd = %LogSanitizer::command_summary(command),
            level = %classification.level,
            decision = %classification.decision,
            "Command classified"
        );

        if options.dry_run {
            return Ok(self.dry_run(&node, command, &classification, &options, started).await);
        }

        if classification.decision == Decision::Block {
            let message = format!(
                "Command blocked by {} policy: {}",
                node.safety_policy, classification.reason
            );
            return Ok(self
                .reject(&node, command, Some(&classification), &message, &options, started)
                .await);
        }

        let mut hitl_decision = None;
        if classification.decision == Decision::RequireHitl {
            let decision = self.ask_approver(&node, command, &classification).await;
            hitl_decision = Some(decision);

            if decision == ApprovalDecision::Denied {
                let result = ExecResult::validation_error("Execution denied by approver");
                self.audit
                    .record(
                        AuditRecord::new(AuditEvent::CommandHitlDenied, &node)
                            .command(command)
                            .safety_level(classification.level)
                            .hitl(true, hitl_decision)
                            .outcome("denied", result.stderr())
                            .duration(started.elapsed())
                            .labels(&options.labels),
                    )
                    .await;
                return Ok(result);
            }
        }

        let credential = self.cipher.decrypt(&node.encrypted_credential)?;
        let dispatched = Instant::now();
        let result = connector
            .execute(&credential, &node, command, &options)
            .await;
        drop(credential);

        metrics::EXECUTIONS_TOTAL
            .with_label_values(&[&node.connector_type, result.error_type().as_str()])
            .inc();
        metrics::EXECUTION_DURATION_SECONDS
            .with_label_values(&[&node.connector_type])
            .observe(dispatched.elapsed().as_secs_f64());

        info!(
            node = %node.alias,
            connector = %node.connector_type,
            status = result.status(),
            exit_code = result.exit_code(),
            error_type = %result.error_type(),
            duration_ms = dispatched.elapsed().as_millis() as u64,
            "Command finished"
        );

        self.audit
            .record(
                AuditRecord::new(AuditEvent::CommandExecute, &node)
                    .command(command)
                    .safety_level(classification.level)
                    .hitl(classification.requires_hitl, hitl_decision)
                    .outcome(result.status(), &result.format_output())
                    .duration(started.elapsed())
                    .labels(&options.labels),
            )
            .await;

        Ok(result)
    }

    /// Check reachability and credentials, recording the outcome on the node
    ///
    /// Unknown nodes report `false`.
    pub async fn test_connection(&self, node_id: &str) -> Result<bool> {
        let started = Instant::now();
        let Some(mut node) = self.store.get(node_id).await? else {
            debug!(node_id = %node_id, "Connection test for unknown node");
            return Ok(false);
        };
        let connector = self.connectors.get(&node.connector_type)?;

        let credential = self.cipher.decrypt(&node.encrypted_credential)?;
        let success = connector.test_connection(&credential, &node).await;
        drop(credential);

        metrics::CONNECTION_TESTS_TOTAL
            .with_label_values(&[&node.connector_type, if success { "success" } else { "failure" }])
            .inc();
        info!(
            node = %node.alias,
            host = %LogSanitizer::sanitize_host(node.host.as_deref()),
            success,
            "Connection test finished"
        );

        node.last_tested_at = Some(Utc::now());
        node.last_test_success = Some(success);
        let status = if success { "success" } else { "error" };
        self.audit
            .record(
                AuditRecord::new(AuditEvent::NodeTest, &node)
                    .outcome(status, "")
                    .duration(started.elapsed()),
            )
            .await;
        self.store.save(node).await?;

        Ok(success)
    }

    async fn ask_approver(
        &self,
        node: &Node,
        command: &str,
        classification: &ClassificationResult,
    ) -> ApprovalDecision {
        metrics::APPROVAL_REQUESTS_TOTAL.inc();
        let request = ApprovalRequest {
            node_alias: node.alias.clone(),
            connector_type: node.connector_type.clone(),
            command: command.to_string(),
            level: classification.level,
            policy: node.safety_policy,
            reason: classification.reason.clone(),
        };

        let decision = self.approver.request_approval(&request).await;
        match decision {
            ApprovalDecision::Approved => metrics::APPROVALS_GRANTED_TOTAL.inc(),
            ApprovalDecision::Denied => metrics::APPROVALS_DENIED_TOTAL.inc(),
        }
        info!(node = %node.alias, decision = %decision, "Approval answered");
        decision
    }

    async fn reject(
        &self,
        node: &Node,
        command: &str,
        classification: Option<&ClassificationResult>,
        message: &str,
        options: &ExecOptions,
        started: Instant,
    ) -> ExecResult {
        warn!(
            node = %node.alias,
            cmd = %LogSanitizer::command_summary(command),
            reason = %message,
            "Command rejected before dispatch"
        );

        let mut record = AuditRecord::new(AuditEvent::CommandReject, node)
            .command(command)
            .outcome("rejected", message)
            .duration(started.elapsed())
            .labels(&options.labels);
        if let Some(classification) = classification {
            record = record.safety_level(classification.level);
        }
        self.audit.record(record).await;

        ExecResult::validation_error(message)
    }

    async fn dry_run(
        &self,
        node: &Node,
        command: &str,
        classification: &ClassificationResult,
        options: &ExecOptions,
        started: Instant,
    ) -> ExecResult {
        let plan = format!(
            "[dry run] node={} connector={} level={} policy={} decision={} reason={}\n",
            node.alias,
            node.connector_type,
            classification.level,
            node.safety_policy,
            classification.decision,
            classification.reason
        );

        self.audit
            .record(
                AuditRecord::new(AuditEvent::CommandExecute, node)
                    .command(command)
                    .safety_level(classification.level)
                    .hitl(classification.requires_hitl, None)
                    .outcome("dry_run", &plan)
                    .duration(started.elapsed())
                    .labels(&options.labels),
            )
            .await;

        ExecResult::builder().stdout(plan).build()
    }
}

/// Classify a command in the form the node's connector will run it
fn classify_for(node: &Node, command: &str) -> ClassificationResult {
    RemoteCommandClassifier::classify(&classified_form(node, command), node.safety_policy)
}

/// kubectl nodes take bare verbs (`get pods`); classify them as `kubectl get pods`
fn classified_form<'a>(node: &Node, command: &'a str) -> Cow<'a, str> {
    let trimmed = command.trim_start();
    let prefixed = trimmed
        .split_whitespace()
        .next()
        .is_some_and(|t| t.eq_ignore_ascii_case("kubectl"));

    if node.connector_type.eq_ignore_ascii_case(K8S_CONNECTOR_TYPE) && !prefixed {
        Cow::Owned(format!("kubectl {}", trimmed))
    } else {
        Cow::Borrowed(command)
    }
}
