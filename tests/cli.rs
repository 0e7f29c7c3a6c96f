use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

const KEY: &str = "6c756d696e61677561726400000000000000000000000000000000000000abcd";

fn nodeconsole() -> Command {
    let mut cmd = Command::cargo_bin("nodeconsole").unwrap();
    cmd.arg("--config")
        .arg("/nonexistent/nodeconsole/config.toml")
        .env_remove("NODE_CONSOLE_ENCRYPTION_KEY")
        .env_remove("NODECONSOLE_LOG_LEVEL")
        .env_remove("NODECONSOLE_LOG_FORMAT")
        .env_remove("RUST_LOG");
    cmd
}

fn with_key() -> Command {
    let mut cmd = nodeconsole();
    cmd.env("NODE_CONSOLE_ENCRYPTION_KEY", KEY);
    cmd
}

fn inventory() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[[nodes]]
alias = "web-1"
connector_type = "ssh"
host = "web1.example.com"
port = 22
username = "deploy"
credential_env = "WEB1_PASSWORD"
tags = ["prod"]
safety_policy = "strict"

[[nodes]]
alias = "web-2"
connector_type = "ssh"
host = "web2.example.com"
port = 2222
username = "deploy"
credential_env = "WEB1_PASSWORD"
safety_policy = "relaxed"
"#
    )
    .unwrap();
    file
}

fn with_inventory(subcommand: &str, inventory: &NamedTempFile) -> Command {
    let mut cmd = with_key();
    cmd.env("WEB1_PASSWORD", "inventory-secret")
        .arg(subcommand)
        .arg("--inventory")
        .arg(inventory.path());
    cmd
}

#[test]
fn test_cli_version() {
    nodeconsole()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("nodeconsole 0.1.0"));
}

#[test]
fn test_cli_help() {
    nodeconsole()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Secure remote command execution over SSH and Kubernetes",
        ));
}

#[test]
fn test_classify_destructive() {
    nodeconsole()
        .args(["classify", "rm -rf /var/lib/app", "--policy", "relaxed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("level:    DESTRUCTIVE"))
        .stdout(predicate::str::contains("decision: block"));
}

#[test]
fn test_classify_read_only_under_standard() {
    nodeconsole()
        .args(["classify", "df -h", "--policy", "standard"])
        .assert()
        .success()
        .stdout(predicate::str::contains("level:    READ_ONLY"))
        .stdout(predicate::str::contains("decision: auto_execute"));
}

#[test]
fn test_classify_json() {
    let output = nodeconsole()
        .args(["classify", "systemctl restart nginx", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["level"], "SIDE_EFFECT");
    assert_eq!(value["requires_hitl"], true);
}

#[test]
fn test_keygen() {
    nodeconsole()
        .arg("keygen")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^[0-9a-f]{64}\n$").unwrap());
}

#[test]
fn test_validate_node_reports_all_violations() {
    nodeconsole()
        .args([
            "validate-node",
            "--connector-type",
            "ssh",
            "--host",
            "localhost",
            "--username",
            "root",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("port is required"))
        .stderr(predicate::str::contains("root login is not allowed"))
        .stderr(predicate::str::contains("loopback"));
}

#[test]
fn test_validate_node_ok() {
    nodeconsole()
        .args(["validate-node", "--connector-type", "k8s"])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid"));
}

#[test]
fn test_encrypt_requires_key() {
    nodeconsole()
        .arg("encrypt")
        .write_stdin("secret")
        .assert()
        .failure()
        .stderr(predicate::str::contains("openssl rand -hex 32"));
}

#[test]
fn test_encrypt_decrypt_round_trip() {
    let output = with_key().arg("encrypt").write_stdin("s3cret\n").output().unwrap();
    assert!(output.status.success());

    let encrypted = String::from_utf8(output.stdout).unwrap();
    assert!(encrypted.contains("\"iv\""));
    assert!(!encrypted.contains("s3cret"));

    with_key()
        .arg("decrypt")
        .write_stdin(encrypted)
        .assert()
        .success()
        .stdout("s3cret\n");
}

#[test]
fn test_health() {
    with_key()
        .arg("health")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"UP\""))
        .stdout(predicate::str::contains("\"k8s\""));
}

#[test]
fn test_nodes_listing_is_sanitized() {
    let inventory = inventory();
    with_inventory("nodes", &inventory)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"alias\": \"web-1\""))
        .stdout(predicate::str::contains("web1.examp..."))
        .stdout(predicate::str::contains("ciphertext").not())
        .stdout(predicate::str::contains("inventory-secret").not());
}

#[test]
fn test_plan() {
    let inventory = inventory();
    with_inventory("plan", &inventory)
        .args(["web-1", "uptime"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"decision\": \"require_hitl\""));
}

#[test]
fn test_exec_dry_run() {
    let inventory = inventory();
    with_inventory("exec", &inventory)
        .args(["--dry-run", "web-2", "journalctl -u nginx"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[dry run] node=web-2"))
        .stdout(predicate::str::contains("level=READ_ONLY"));
}

#[test]
fn test_exec_destructive_blocked() {
    let inventory = inventory();
    with_inventory("exec", &inventory)
        .args(["web-2", "shutdown -h now"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Command blocked by relaxed policy"))
        .stdout(predicate::str::contains("[Error type: VALIDATION_ERROR]"));
}

#[test]
fn test_exec_prompt_eof_denies() {
    let inventory = inventory();
    with_inventory("exec", &inventory)
        .args(["web-1", "systemctl restart nginx"])
        .write_stdin("")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Execution denied by approver"))
        .stderr(predicate::str::contains("Approval required on 'web-1'"));
}

#[test]
fn test_exec_unknown_alias() {
    let inventory = inventory();
    with_inventory("exec", &inventory)
        .args(["--no-prompt", "db-9", "uptime"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No node with alias 'db-9'"));
}
