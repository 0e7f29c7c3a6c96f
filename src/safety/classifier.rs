//! Remote command classifier
//!
//! Sorts arbitrary shell text into one of three safety tiers using a
//! table of case-insensitive regular expressions.
//!
//! # Classification Strategy
//!
//! 1. Any destructive pattern anywhere in the text makes it `DESTRUCTIVE`.
//! 2. Otherwise, if every pipeline/chain segment starts with an inspection
//!    tool and nothing writes to a file or substitutes a subcommand, it is
//!    `READ_ONLY`.
//! 3. Everything else, including empty input, is `SIDE_EFFECT`.
//!
//! Unknown commands never land in `READ_ONLY`.

use super::policy::{Decision, SafetyPolicyGuard};
use super::{PolicyMode, SafetyLevel};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

/// Outcome of classifying one command under one policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub level: SafetyLevel,
    pub decision: Decision,
    /// The command may only run after explicit confirmation
    pub requires_hitl: bool,
    /// The command may not run under any confirmation
    pub blocked: bool,
    pub reason: String,
}

struct DangerPattern {
    regex: Regex,
    reason: &'static str,
}

/// Command position: start of text, after a chain/pipe operator, or after
/// sudo, then any launcher wrappers and an optional directory prefix
const CMD_START: &str = concat!(
    r"(?:^|[;&|(\n]|\bsudo(?:\s+-\S+)*)\s*",
    r"(?:(?:nohup|exec|command|nice(?:\s+-n)?(?:\s+-?\d+)?|env(?:\s+-\S+)*(?:\s+\w+=\S*)*|timeout(?:\s+-\S+)*\s+\S+)\s+)*",
    r"(?:\S*/)?",
);

/// Leading kubectl global flags such as `-n prod` or `--context=x`
const KUBECTL_FLAGS: &str = r"(?:\s+-{1,2}[a-z-]+(?:[=\s]\S+)?)*";

/// Optional `sudo` (with flags) before a read-only tool
const RO_START: &str = r"^(?:sudo\s+(?:-\S+\s+)*)?";

fn compile(expr: &str) -> Regex {
    Regex::new(&format!("(?i){}", expr)).expect("classifier pattern must compile")
}

fn danger(expr: &str, reason: &'static str) -> DangerPattern {
    DangerPattern {
        regex: compile(expr),
        reason,
    }
}

lazy_static! {
    static ref DESTRUCTIVE_PATTERNS: Vec<DangerPattern> = vec![
        // Deletion
        danger(
            r"\brm\b[^;&|\n]*\s(?:-[a-z]*r[a-z]*\b|--recursive\b)",
            "Recursive deletion",
        ),
        danger(r"\b(?:del|erase)\b[^;&|\n]*\s/s\b", "Recursive deletion (Windows)"),
        danger(r"\b(?:rmdir|rd)\b[^;&|\n]*\s/s\b", "Recursive directory removal (Windows)"),
        danger(r"\bremove-item\b[^;&|\n]*\s-recurse\b", "Recursive deletion (PowerShell)"),
        // Power state
        danger(
            &format!(r"{}(?:shutdown|reboot|halt|poweroff)\b", CMD_START),
            "System power state change",
        ),
        danger(
            r"\bsystemctl\s+(?:poweroff|reboot|halt|kexec)\b",
            "System power state change",
        ),
        danger(&format!(r"{}init\s+[06]\b", CMD_START), "Runlevel change to halt or reboot"),
        // Disks
        danger(r"\bmkfs\b", "Filesystem creation"),
        danger(r"\bdd\b[^;&|\n]*\b(?:if|of)=", "Raw disk copy"),
        danger(r"\bformat\s+[a-z]:", "Drive format (Windows)"),
        danger(r"\bformat-volume\b", "Drive format (PowerShell)"),
        danger(r">\s*/dev/(?:sd|hd|vd|xvd|nvme|mmcblk|disk)", "Write to raw block device"),
        // Permissions
        danger(
            r"\bchmod\s+(?:-[a-z]*r[a-z]*\b|--recursive\b|[0-7]?777\b)",
            "Recursive or world-writable permission change",
        ),
        danger(r"\bchown\s+(?:-[a-z]*r[a-z]*\b|--recursive\b)", "Recursive ownership change"),
        // Kubernetes
        danger(
            &format!(r"\bkubectl{}\s+(?:delete|drain)\b", KUBECTL_FLAGS),
            "Kubernetes resource deletion or node drain",
        ),
        // SQL
        danger(r"\bdrop\s+(?:database|table|schema)\b", "SQL drop"),
        danger(r"\btruncate\s+(?:table\b|[a-z_][\w.]*\s*(?:;|$))", "SQL truncate"),
        danger(r#"\bdelete\s+from\s+[\w.`"]+\s*(?:;|$)"#, "SQL delete without WHERE clause"),
        // Remote code
        danger(
            r"\b(?:curl|wget)\b[^|;&\n]*\|\s*(?:sudo\s+)?(?:sh|bash|zsh|dash|ksh|python[0-9.]*|perl|ruby)\b",
            "Downloaded script piped to an interpreter",
        ),
        danger(r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:", "Fork bomb"),
        // Firewall
        danger(
            r"\biptables\s+(?:-t\s+\w+\s+)?(?:-F|--flush|-X|--delete-chain)\b",
            "Firewall rules flushed",
        ),
        danger(r"\bufw\s+(?:disable|reset)\b", "Firewall disabled"),
        danger(r"\bnft\s+flush\b", "Firewall rules flushed"),
        // Version control and publishing
        danger(
            r"\bgit\s+push\b[^;&|\n]*(?:\s--force(?:-with-lease)?\b|\s-f\b)",
            "Force push",
        ),
        danger(r"\bgit\s+reset\s+(?:\S+\s+)*?--hard\b", "Hard reset discards history"),
        danger(r"\bgit\s+clean\s+(?:\S+\s+)*?(?:-[a-z]*f|--force\b)", "Forced git clean"),
        danger(r"\b(?:npm|yarn|pnpm)\s+publish\b", "Package publish"),
        // Processes and containers
        danger(
            r"\bkill\s+(?:-9|-kill|-sigkill|-s\s+(?:9|kill|sigkill))\b",
            "Forced process kill",
        ),
        danger(r"\bkillall\b", "Mass process kill"),
        danger(r"\bpkill\s+-(?:9|kill)\b", "Forced process kill"),
        danger(
            r"\b(?:docker|podman)\s+(?:rm|rmi|system\s+prune|volume\s+(?:rm|prune)|image\s+prune|container\s+prune)\b",
            "Container resource removal",
        ),
        // Secrets on the command line
        danger(
            r"(?:password|passwd|pwd|secret|credential|api[_-]?key|access[_-]?token)\s*[=:]",
            "Credential in command text",
        ),
        danger(r"--password\b", "Credential in command text"),
    ];

    static ref READ_ONLY_PATTERNS: Vec<Regex> = vec![
        compile(&format!(
            r"{}(?:ls|ll|cat|less|more|head|tail|grep|egrep|fgrep|zgrep|wc|stat|file|du|df|free|top|htop|ps|pgrep|pstree|uptime|uname|whoami|id|groups|w|who|last|pwd|which|whereis|lsof|vmstat|iostat|mpstat|lsblk|lscpu|lsmem|lspci|lsusb|ifconfig|netstat|ss|journalctl|dmesg|ping|ping6|traceroute|tracepath|mtr|dig|nslookup|host|nproc|printenv|sort|cut|find|md5sum|sha256sum|diff|readlink|realpath|getent)\b",
            RO_START
        )),
        compile(&format!(
            r"{}systemctl\s+(?:status|is-active|is-enabled|is-failed|list-units|list-unit-files|list-timers|show|cat)\b",
            RO_START
        )),
        compile(&format!(r"{}service\s+\S+\s+status\b", RO_START)),
        compile(&format!(
            r"^kubectl{}\s+(?:get|describe|logs|top|cluster-info|version|explain|api-resources|api-versions|events)\b",
            KUBECTL_FLAGS
        )),
        compile(r"^(?:docker|podman)\s+(?:ps|images|logs|inspect|stats|info|version|top|port|history)\b"),
        compile(r"^(?:docker|podman)\s+(?:container|image|volume|network)\s+(?:ls|list|inspect)\b"),
        compile(r"^ip\s+(?:-\S+\s+)*(?:a|addr|address|r|route|l|link|n|neigh)(?:\s+(?:show|list|ls)\b.*)?$"),
        compile(r"^hostname(?:\s+-[a-z]+)*$"),
        compile(r"^curl\s+(?:(?-i:-s|-sS|-L)\s+)*(?:(?-i:-I|-sI|-Is)|--head)\b"),
        compile(r"^git\s+(?:status|log|diff|show|blame)\b"),
        compile(r"^(?:select|show|describe|desc|explain)\b"),
    ];

    /// Separators between independently executed commands
    static ref SEGMENT_SPLIT: Regex = compile(r"\|\||&&|[;|&\n]");

    /// Redirections that never write a file
    static ref HARMLESS_REDIRECT: Regex = compile(r"\d*>&\d+|\d*>\s*/dev/null\b");

    /// Constructs that disqualify an otherwise read-only command
    static ref READ_ONLY_DISQUALIFIERS: Vec<Regex> = vec![
        compile(r"`|\$\("),
        compile(r"\bfind\b.*\s-(?:delete|exec|execdir|ok|okdir|fprint|fprintf|fls)\b"),
        compile(r"\bsort\b[^|;&]*\s(?:-o|--output)\b"),
        compile(
            r"\bjournalctl\b[^|;&]*\s--(?:vacuum-|rotate\b|flush\b|relinquish-var\b|sync\b|setup-keys\b|update-catalog\b)",
        ),
        compile(r"\bdmesg\b[^|;&]*\s(?:(?-i:-[a-zA-Z]*[cCDEn])|--(?:clear|read-clear|console-))"),
        compile(
            r"\bcurl\b[^|;&]*\s(?:(?-i:-[a-zA-Z]*[oOXdFT])|--(?:output|remote-name|request|data|form|upload-file|json|post))",
        ),
    ];
}

pub struct RemoteCommandClassifier;

impl RemoteCommandClassifier {
    /// Classify a command and resolve it against a policy
    ///
    /// # Examples
    ///
    /// ```
    /// use nodeconsole_gateway::safety::{PolicyMode, RemoteCommandClassifier, SafetyLevel};
    ///
    /// let result = RemoteCommandClassifier::classify("df -h", PolicyMode::Standard);
    /// assert_eq!(result.level, SafetyLevel::ReadOnly);
    /// assert!(!result.requires_hitl);
    ///
    /// let result = RemoteCommandClassifier::classify("rm -rf /var/lib", PolicyMode::Relaxed);
    /// assert_eq!(result.level, SafetyLevel::Destructive);
    /// assert!(result.blocked);
    /// ```
    pub fn classify(command: &str, policy: PolicyMode) -> ClassificationResult {
        let (level, reason) = Self::assess(command);
        let decision = SafetyPolicyGuard::decide(level, policy);

        ClassificationResult {
            level,
            decision,
            requires_hitl: decision == Decision::RequireHitl,
            blocked: decision == Decision::Block,
            reason,
        }
    }

    /// Safety tier alone, independent of any policy
    pub fn level(command: &str) -> SafetyLevel {
        Self::assess(command).0
    }

    fn assess(command: &str) -> (SafetyLevel, String) {
        let command = command.trim();
        if command.is_empty() {
            return (SafetyLevel::SideEffect, "Empty command".to_string());
        }

        if let Some(pattern) = DESTRUCTIVE_PATTERNS.iter().find(|p| p.regex.is_match(command)) {
            return (SafetyLevel::Destructive, pattern.reason.to_string());
        }

        if Self::is_read_only(command) {
            return (SafetyLevel::ReadOnly, "Read-only inspection command".to_string());
        }

        (
            SafetyLevel::SideEffect,
            "Command may modify state".to_string(),
        )
    }

    fn is_read_only(command: &str) -> bool {
        if READ_ONLY_DISQUALIFIERS.iter().any(|r| r.is_match(command)) {
            return false;
        }
        let command = HARMLESS_REDIRECT.replace_all(command, "");
        if command.contains('>') {
            return false;
        }

        let mut segments = SEGMENT_SPLIT
            .split(&command)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .peekable();

        segments.peek().is_some()
            && segments.all(|segment| READ_ONLY_PATTERNS.iter().any(|r| r.is_match(segment)))
    }
}
