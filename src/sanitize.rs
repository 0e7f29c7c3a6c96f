//! Log redaction helpers
//!
//! Every log line on the execution path takes its command, host and error
//! fields from here. Raw command text, credentials and internal addresses
//! never reach a subscriber.

use sha2::{Digest, Sha256};
use std::net::Ipv4Addr;

/// Public hosts longer than this are cut to this many characters.
const HOST_VISIBLE_CHARS: usize = 10;

/// Stateless redaction helpers
pub struct LogSanitizer;

impl LogSanitizer {
    /// Summarize a command as its length and a short SHA-256 prefix
    ///
    /// Two identical commands produce the same summary, so log lines can be
    /// correlated without revealing the text.
    ///
    /// # Example
    ///
    /// ```
    /// use nodeconsole_gateway::sanitize::LogSanitizer;
    ///
    /// let summary = LogSanitizer::command_summary("uptime");
    /// assert!(summary.starts_with("[cmd: len=6, hash="));
    /// assert_eq!(LogSanitizer::command_summary(None), "[empty]");
    /// ```
    pub fn command_summary<'a>(command: impl Into<Option<&'a str>>) -> String {
        match command.into() {
            Some(command) if !command.is_empty() => {
                let digest = hex::encode(Sha256::digest(command.as_bytes()));
                format!(
                    "[cmd: len={}, hash={}]",
                    command.chars().count(),
                    &digest[..8]
                )
            }
            _ => "[empty]".to_string(),
        }
    }

    /// Reduce an error to its type name
    ///
    /// Error messages from transports routinely embed hostnames, usernames
    /// and key paths, so only the type is kept.
    pub fn sanitize_error<E: ?Sized>(_err: &E) -> String {
        short_type_name(std::any::type_name::<E>())
    }

    /// Mask internal addresses and shorten public ones
    pub fn sanitize_host<'a>(host: impl Into<Option<&'a str>>) -> String {
        let host = match host.into().map(str::trim) {
            Some(host) if !host.is_empty() => host,
            _ => return "[unknown]".to_string(),
        };

        if is_internal(host) {
            return "[internal]".to_string();
        }

        if host.chars().count() > HOST_VISIBLE_CHARS {
            let visible: String = host.chars().take(HOST_VISIBLE_CHARS).collect();
            format!("{}...", visible)
        } else {
            host.to_string()
        }
    }
}

fn is_internal(host: &str) -> bool {
    let lower = host.to_ascii_lowercase();
    if lower == "localhost" || lower.ends_with(".localhost") || lower == "::1" {
        return true;
    }

    match lower.parse::<Ipv4Addr>() {
        Ok(ip) => ip.is_private() || ip.is_loopback(),
        // Partial or unparsable dotted forms still get the prefix check
        Err(_) => {
            lower.starts_with("10.")
                || lower.starts_with("192.168.")
                || lower.starts_with("127.")
                || is_172_private_prefix(&lower)
        }
    }
}

fn is_172_private_prefix(host: &str) -> bool {
    let Some(rest) = host.strip_prefix("172.") else {
        return false;
    };
    rest.split('.')
        .next()
        .and_then(|octet| octet.parse::<u8>().ok())
        .is_some_and(|octet| (16..=31).contains(&octet))
}

/// `std::io::error::Error` -> `io::Error`, `my_crate::FooError` -> `FooError`
fn short_type_name(full: &str) -> String {
    let base = full.split('<').next().unwrap_or(full);
    let segments: Vec<&str> = base
        .split("::")
        .filter(|segment| !segment.is_empty() && *segment != "error")
        .collect();

    match segments.as_slice() {
        [] => "Error".to_string(),
        [.., parent, "Error"] => format!("{}::Error", parent),
        [.., last] => (*last).to_string(),
    }
}
