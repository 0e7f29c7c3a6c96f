//! Logging Redaction Tests
//!
//! Runs gateway calls under a capturing subscriber and checks that:
//! - command text never appears, only its summary
//! - the decrypted credential never appears
//! - node hosts appear only in sanitized form
//! - JSON output stays parseable

use crate::approval::{DenyAll, FixedApproval};
use crate::exec::ExecOptions;
use crate::gateway::tests::{gateway, RecordingConnector};
use crate::node::test_support::node;
use crate::safety::PolicyMode;
use std::io;
use std::sync::{Arc, Mutex};
use tracing::Level;
use tracing_subscriber::fmt;

const SECRET_COMMAND: &str = "grep -r hunter2-marker /etc/app";

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn assert_redacted(logs: &str) {
    assert!(!logs.is_empty(), "no log output captured");
    assert!(logs.contains("[cmd: len="));
    assert!(!logs.contains("hunter2-marker"), "command leaked: {}", logs);
    assert!(!logs.contains("test-password"), "credential leaked: {}", logs);
    assert!(!logs.contains("node.example.com"), "host leaked: {}", logs);
}

/// Auto-executed command: classification and completion lines
#[tokio::test]
async fn test_execute_logs_are_redacted() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = fmt()
        .with_max_level(Level::TRACE)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let (console, _) = gateway(
        vec![node("web-1", "ssh", PolicyMode::Relaxed)],
        Arc::new(RecordingConnector::default()),
        Arc::new(DenyAll),
    );
    console
        .execute("web-1-id", SECRET_COMMAND, ExecOptions::default())
        .await
        .unwrap();
    console.test_connection("web-1-id").await.unwrap();

    let logs = captured.text();
    assert_redacted(&logs);
    assert!(logs.contains("Command finished"));
}

/// Rejected and approval paths log the same way
#[tokio::test]
async fn test_reject_and_approval_logs_are_redacted() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = fmt()
        .with_max_level(Level::TRACE)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let (console, _) = gateway(
        vec![node("web-1", "ssh", PolicyMode::Strict)],
        Arc::new(RecordingConnector::default()),
        Arc::new(FixedApproval::approve()),
    );
    console
        .execute("web-1-id", SECRET_COMMAND, ExecOptions::default())
        .await
        .unwrap();
    console
        .execute("web-1-id", "rm -rf /srv/hunter2-marker", ExecOptions::default())
        .await
        .unwrap();

    let logs = captured.text();
    assert_redacted(&logs);
    assert!(logs.contains("Command rejected before dispatch"));
    assert!(logs.contains("Approval answered"));
}

/// JSON format emits one parseable object per line
#[tokio::test]
async fn test_json_output_format() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = fmt()
        .json()
        .with_max_level(Level::DEBUG)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let (console, _) = gateway(
        vec![node("web-1", "ssh", PolicyMode::Standard)],
        Arc::new(RecordingConnector::default()),
        Arc::new(DenyAll),
    );
    console
        .execute("web-1-id", "uptime", ExecOptions::default())
        .await
        .unwrap();

    let logs = captured.text();
    let lines: Vec<&str> = logs.lines().collect();
    assert!(!lines.is_empty());
    for line in lines {
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(value.get("fields").is_some());
    }
}
