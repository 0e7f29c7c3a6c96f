//! Kubernetes connector
//!
//! Runs read-only `kubectl` verbs against a cluster. The command text is
//! split on whitespace and passed as arguments to the `kubectl` binary; no
//! shell is involved. The node's kubeconfig credential is staged in a private
//! temp file for the duration of one call.

use super::Connector;
use crate::exec::process::run_captured;
use crate::exec::{ErrorType, ExecOptions, ExecResult};
use crate::node::Node;
use crate::sanitize::LogSanitizer;
use async_trait::async_trait;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

pub const K8S_CONNECTOR_TYPE: &str = "k8s";

/// Verbs that cannot change cluster state
pub const ALLOWED_VERBS: &[&str] = &[
    "get",
    "describe",
    "logs",
    "top",
    "explain",
    "api-resources",
    "api-versions",
    "cluster-info",
    "version",
    "events",
];

/// Flags that would override the staged credential or target
const DISALLOWED_FLAGS: &[&str] = &[
    "--kubeconfig",
    "--token",
    "--server",
    "-s",
    "--as",
    "--as-group",
    "--username",
    "--password",
    "--client-key",
    "--client-certificate",
    "--insecure-skip-tls-verify",
];

/// Shorthand letters of [`DISALLOWED_FLAGS`]
const DISALLOWED_SHORTHANDS: &[char] = &['s'];

/// Shorthands that always consume the rest of a combined token as their value
const VALUE_SHORTHANDS: &[char] = &['n', 'o', 'l'];

const SHELL_METACHARACTERS: &[char] = &[';', '&', '|', '$', '`', '<', '>', '\n', '\r'];

/// Rejections raised before kubectl is started
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandValidationError {
    #[error("Empty command")]
    Empty,

    #[error("Shell metacharacter '{}' is not allowed in kubectl commands", .0.escape_default())]
    ShellMetacharacter(char),

    #[error("Kubectl verb '{0}' is not allowed (allowed: {allowed})", allowed = ALLOWED_VERBS.join(", "))]
    VerbNotAllowed(String),

    #[error("Kubectl flag '{0}' is not allowed")]
    DisallowedFlag(String),
}

/// Parse and check a kubectl command, returning the argument vector
///
/// A leading `kubectl` token is dropped. The verb is matched
/// case-insensitively and passed on in lowercase.
pub fn parse_command(command: &str) -> Result<Vec<String>, CommandValidationError> {
    if let Some(c) = command.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
        return Err(CommandValidationError::ShellMetacharacter(c));
    }

    let mut tokens = command.split_whitespace().peekable();
    if tokens
        .peek()
        .is_some_and(|t| t.eq_ignore_ascii_case("kubectl"))
    {
        tokens.next();
    }

    let verb = tokens
        .next()
        .ok_or(CommandValidationError::Empty)?
        .to_ascii_lowercase();
    if !ALLOWED_VERBS.contains(&verb.as_str()) {
        return Err(CommandValidationError::VerbNotAllowed(verb));
    }

    let mut args = vec![verb];
    for token in tokens {
        if let Some(flag) = disallowed_flag(token) {
            return Err(CommandValidationError::DisallowedFlag(flag));
        }
        args.push(token.to_string());
    }
    Ok(args)
}

/// The denied flag a token sets, if any
///
/// Shorthands may be combined and carry their value attached (`-As<url>`,
/// `-s<url>`), so single-dash tokens are scanned letter by letter until a
/// shorthand that takes the rest of the token as its value.
fn disallowed_flag(token: &str) -> Option<String> {
    let flag = token.split('=').next().unwrap_or(token);
    if DISALLOWED_FLAGS.iter().any(|f| flag.eq_ignore_ascii_case(f)) {
        return Some(flag.to_string());
    }

    let shorthands = token.strip_prefix('-').filter(|rest| !rest.starts_with('-'))?;
    for c in shorthands.chars() {
        if DISALLOWED_SHORTHANDS.contains(&c) {
            return Some(format!("-{}", c));
        }
        if VALUE_SHORTHANDS.contains(&c) || !c.is_ascii_alphabetic() {
            break;
        }
    }
    None
}

#[derive(Debug, Clone)]
pub struct K8sConnector {
    kubectl_path: PathBuf,
    connect_timeout: Duration,
}

impl Default for K8sConnector {
    fn default() -> Self {
        Self::new("kubectl", Duration::from_secs(30))
    }
}

impl K8sConnector {
    pub fn new(kubectl_path: impl Into<PathBuf>, connect_timeout: Duration) -> Self {
        Self {
            kubectl_path: kubectl_path.into(),
            connect_timeout,
        }
    }

    async fn run(
        &self,
        kubeconfig: &str,
        args: &[String],
        timeout: Duration,
        max_output_bytes: usize,
    ) -> ExecResult {
        let staged = match stage_kubeconfig(kubeconfig) {
            Ok(file) => file,
            Err(e) => {
                return ExecResult::failure(
                    ErrorType::InternalError,
                    format!("Failed to stage kubeconfig: {}", e.kind()),
                )
            }
        };

        let mut command = Command::new(&self.kubectl_path);
        command
            .arg("--kubeconfig")
            .arg(staged.path())
            .arg(format!(
                "--request-timeout={}s",
                self.connect_timeout.as_secs().max(1)
            ))
            .args(args)
            .env_remove("KUBECONFIG");

        let outcome = match run_captured(command, timeout, max_output_bytes).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %LogSanitizer::sanitize_error(&e), "Failed to start kubectl");
                return ExecResult::failure(
                    ErrorType::InternalError,
                    format!("Failed to run kubectl: {}", e.kind()),
                );
            }
        };
        drop(staged);

        let stdout = outcome.stdout();
        let stderr = outcome.stderr();
        let builder = ExecResult::builder()
            .truncated(outcome.capture.is_truncated())
            .original_length(outcome.capture.original_length());

        if outcome.timed_out {
            return builder.stdout(stdout).stderr(stderr).timed_out(true).build();
        }

        let exit_code = outcome.exit_code();
        let (error_type, timed_out) = match exit_code {
            0 => (ErrorType::None, false),
            _ => classify_kubectl_stderr(&stderr),
        };

        builder
            .stdout(stdout)
            .stderr(stderr)
            .exit_code(exit_code)
            .timed_out(timed_out)
            .error_type(error_type)
            .build()
    }
}

#[async_trait]
impl Connector for K8sConnector {
    fn connector_type(&self) -> &str {
        K8S_CONNECTOR_TYPE
    }

    async fn execute(
        &self,
        credential: &str,
        node: &Node,
        command: &str,
        options: &ExecOptions,
    ) -> ExecResult {
        let args = match parse_command(command) {
            Ok(args) => args,
            Err(e) => {
                debug!(node = %node.alias, reason = %e, "Rejected kubectl command");
                return ExecResult::validation_error(e.to_string());
            }
        };

        if options.working_directory.is_some() || !options.environment.is_empty() {
            debug!(node = %node.alias, "Working directory and environment do not apply to kubectl");
        }

        debug!(
            node = %node.alias,
            cmd = %LogSanitizer::command_summary(command),
            "Dispatching kubectl command"
        );
        let result = self
            .run(credential, &args, options.timeout(), options.max_output_bytes)
            .await;

        if result.error_type() != ErrorType::None {
            warn!(
                node = %node.alias,
                error_type = %result.error_type(),
                "kubectl command did not complete"
            );
        }
        result
    }

    async fn test_connection(&self, credential: &str, node: &Node) -> bool {
        let args = ["get", "namespaces", "-o", "name"].map(String::from);
        let result = self
            .run(credential, &args, self.connect_timeout, 4096)
            .await;
        debug!(node = %node.alias, status = result.status(), "kubectl connection test");
        result.is_success()
    }
}

/// Write the kubeconfig to a temp file readable only by this user
fn stage_kubeconfig(kubeconfig: &str) -> std::io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("nodeconsole-kubeconfig-")
        .suffix(".yaml")
        .tempfile()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(kubeconfig.as_bytes())?;
    file.flush()?;
    Ok(file)
}

/// Map a failed kubectl run to an error type, and whether it was a timeout
fn classify_kubectl_stderr(stderr: &str) -> (ErrorType, bool) {
    let lower = stderr.to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["i/o timeout", "context deadline exceeded", "client.timeout"]) {
        (ErrorType::Timeout, true)
    } else if has(&["unauthorized", "must be logged in"]) {
        (ErrorType::AuthenticationFailed, false)
    } else if has(&["forbidden"]) {
        (ErrorType::PermissionDenied, false)
    } else if has(&["notfound", "not found"]) {
        (ErrorType::ResourceNotFound, false)
    } else if has(&["connection refused", "no such host", "unable to connect", "dial tcp"]) {
        (ErrorType::NetworkError, false)
    } else if has(&["invalid configuration", "error loading config"]) {
        (ErrorType::AuthenticationFailed, false)
    } else {
        (ErrorType::InternalError, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::test_support::node;
    use crate::node::AuthType;
    use crate::safety::PolicyMode;

    fn k8s_node() -> Node {
        let mut node = node("cluster-1", "k8s", PolicyMode::Relaxed);
        node.host = None;
        node.port = None;
        node.username = None;
        node.auth_type = AuthType::Kubeconfig;
        node
    }

    #[test]
    fn test_allowed_verbs_parse() {
        assert_eq!(parse_command("get pods -n web").unwrap(), vec!["get", "pods", "-n", "web"]);
        assert_eq!(parse_command("kubectl GET pods").unwrap(), vec!["get", "pods"]);
        assert_eq!(parse_command("  Logs  api-0 --tail=50 ").unwrap(), vec!["logs", "api-0", "--tail=50"]);
        assert_eq!(parse_command("cluster-info").unwrap(), vec!["cluster-info"]);
    }

    #[test]
    fn test_mutating_verbs_rejected() {
        for command in ["delete pod x", "apply -f x.yaml", "exec -it x -- sh", "DRAIN node-1", "edit cm x"] {
            match parse_command(command) {
                Err(CommandValidationError::VerbNotAllowed(_)) => {}
                other => panic!("{} was not rejected: {:?}", command, other),
            }
        }
    }

    #[test]
    fn test_verb_message_lists_allowed() {
        let message = parse_command("delete ns prod").unwrap_err().to_string();
        assert!(message.starts_with("Kubectl verb 'delete' is not allowed"));
        assert!(message.contains("get, describe"));
    }

    #[test]
    fn test_empty_and_metacharacters() {
        assert_eq!(parse_command(""), Err(CommandValidationError::Empty));
        assert_eq!(parse_command("kubectl"), Err(CommandValidationError::Empty));
        assert_eq!(
            parse_command("get pods; rm -rf /"),
            Err(CommandValidationError::ShellMetacharacter(';'))
        );
        assert_eq!(
            parse_command("get pods | grep x"),
            Err(CommandValidationError::ShellMetacharacter('|'))
        );
        assert_eq!(
            parse_command("get pods $(whoami)"),
            Err(CommandValidationError::ShellMetacharacter('$'))
        );
    }

    #[test]
    fn test_shorthand_values_are_not_flags() {
        assert!(parse_command("get pods -ojsonpath={.items[*].status}").is_ok());
        assert!(parse_command("get pods -nkube-system").is_ok());
        assert!(parse_command("get pods -lapp=sshd").is_ok());
        assert!(parse_command("get pods -A -w").is_ok());
    }

    #[test]
    fn test_credential_flags_rejected() {
        assert_eq!(
            parse_command("get pods --token=abc"),
            Err(CommandValidationError::DisallowedFlag("--token".to_string()))
        );
        assert_eq!(
            parse_command("get pods --kubeconfig /etc/admin.conf"),
            Err(CommandValidationError::DisallowedFlag("--kubeconfig".to_string()))
        );
        assert!(parse_command("get pods -s https://evil").is_err());
        for command in [
            "get pods -shttps://evil.example",
            "get pods -s=https://evil.example",
            "get pods -Ashttps://evil.example",
            "get pods -wAs https://evil.example",
        ] {
            assert_eq!(
                parse_command(command),
                Err(CommandValidationError::DisallowedFlag("-s".to_string())),
                "{}",
                command
            );
        }
        assert!(parse_command("get pods --as=system:admin").is_err());
    }

    #[test]
    fn test_stderr_mapping() {
        assert_eq!(
            classify_kubectl_stderr("error: You must be logged in to the server (Unauthorized)"),
            (ErrorType::AuthenticationFailed, false)
        );
        assert_eq!(
            classify_kubectl_stderr("Error from server (Forbidden): pods is forbidden"),
            (ErrorType::PermissionDenied, false)
        );
        assert_eq!(
            classify_kubectl_stderr("Error from server (NotFound): pods \"x\" not found"),
            (ErrorType::ResourceNotFound, false)
        );
        assert_eq!(
            classify_kubectl_stderr("dial tcp 10.0.0.1:6443: connect: connection refused"),
            (ErrorType::NetworkError, false)
        );
        assert_eq!(
            classify_kubectl_stderr("dial tcp 10.0.0.1:6443: i/o timeout"),
            (ErrorType::Timeout, true)
        );
        assert_eq!(classify_kubectl_stderr("boom"), (ErrorType::InternalError, false));
    }

    #[tokio::test]
    async fn test_rejected_verb_never_spawns() {
        let connector = K8sConnector::new("/nonexistent/kubectl", Duration::from_secs(5));
        let result = connector
            .execute("kubeconfig", &k8s_node(), "delete pod api-0", &ExecOptions::default())
            .await;

        assert_eq!(result.error_type(), ErrorType::ValidationError);
        assert_eq!(result.exit_code(), -1);
        assert!(result.stderr().starts_with("Kubectl verb 'delete' is not allowed"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_internal_error() {
        let connector = K8sConnector::new("/nonexistent/kubectl", Duration::from_secs(5));
        let result = connector
            .execute("kubeconfig", &k8s_node(), "get pods", &ExecOptions::default())
            .await;

        assert_eq!(result.error_type(), ErrorType::InternalError);
        assert_eq!(result.exit_code(), -1);
        assert!(!connector.test_connection("kubeconfig", &k8s_node()).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dispatch_arguments_and_cleanup() {
        let connector = K8sConnector::new("/bin/echo", Duration::from_secs(7));
        let result = connector
            .execute("kubeconfig", &k8s_node(), "kubectl get pods -n web", &ExecOptions::default())
            .await;

        assert!(result.is_success(), "{:?}", result);
        let stdout = result.stdout().trim();
        assert!(stdout.starts_with("--kubeconfig "));
        assert!(stdout.ends_with("--request-timeout=7s get pods -n web"));

        let staged = stdout.split_whitespace().nth(1).unwrap();
        assert!(staged.contains("nodeconsole-kubeconfig-"));
        assert!(!std::path::Path::new(staged).exists());
    }

    #[cfg(unix)]
    fn script(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.path().join("kubectl");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_forbidden_stderr_maps_to_permission_denied() {
        let dir = tempfile::tempdir().unwrap();
        let kubectl = script(&dir, "echo 'Error from server (Forbidden): secrets is forbidden' >&2; exit 1");

        let result = K8sConnector::new(kubectl, Duration::from_secs(5))
            .execute("kubeconfig", &k8s_node(), "get secrets", &ExecOptions::default())
            .await;

        assert_eq!(result.exit_code(), 1);
        assert_eq!(result.error_type(), ErrorType::PermissionDenied);
        assert!(result.stderr().contains("Forbidden"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execution_timeout_kills_kubectl() {
        let dir = tempfile::tempdir().unwrap();
        let kubectl = script(&dir, "exec sleep 30");

        let start = std::time::Instant::now();
        let result = K8sConnector::new(kubectl, Duration::from_secs(5))
            .execute(
                "kubeconfig",
                &k8s_node(),
                "logs api-0 -f",
                &ExecOptions::default().with_timeout(1),
            )
            .await;

        assert!(result.timed_out());
        assert_eq!(result.error_type(), ErrorType::Timeout);
        assert_eq!(result.exit_code(), -1);
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
