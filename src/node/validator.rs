//! Node registration validation
//!
//! All violations are collected so an operator sees every problem with a
//! registration at once.

use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

pub const SSH: &str = "ssh";
pub const K8S: &str = "k8s";

/// One or more problems with a node's connection parameters
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid node configuration: {}", .violations.join("; "))]
pub struct NodeValidationError {
    pub violations: Vec<String>,
}

/// Connection parameters checked before a node is stored or used
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeParams<'a> {
    pub connector_type: Option<&'a str>,
    pub host: Option<&'a str>,
    pub port: Option<u32>,
    pub username: Option<&'a str>,
}

pub struct NodeValidator;

impl NodeValidator {
    /// Validate connection parameters
    ///
    /// Rules:
    /// - connector type is required
    /// - SSH needs host, a port in 1..=65535 and a non-root username
    /// - K8s accepts an optional host and port
    /// - no connector may target a loopback or local address
    pub fn validate(params: NodeParams<'_>) -> Result<(), NodeValidationError> {
        let mut violations = Vec::new();

        let connector_type = params
            .connector_type
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_ascii_lowercase);
        let host = params.host.map(str::trim).filter(|h| !h.is_empty());
        let username = params.username.map(str::trim).filter(|u| !u.is_empty());

        match connector_type.as_deref() {
            None => violations.push("connector type is required".to_string()),
            Some(SSH) => {
                if host.is_none() {
                    violations.push("host is required for ssh nodes".to_string());
                }
                match params.port {
                    None => violations.push("port is required for ssh nodes".to_string()),
                    Some(port) => check_port(port, &mut violations),
                }
                match username {
                    None => violations.push("username is required for ssh nodes".to_string()),
                    Some(user) if user.eq_ignore_ascii_case("root") => violations
                        .push("root login is not allowed; use a dedicated least-privilege account".to_string()),
                    Some(_) => {}
                }
            }
            Some(K8S) => {
                if let Some(port) = params.port {
                    check_port(port, &mut violations);
                }
            }
            Some(_) => {}
        }

        if let Some(host) = host {
            if is_local_address(host) {
                violations.push("host must not be a loopback or local address".to_string());
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(NodeValidationError { violations })
        }
    }
}

fn check_port(port: u32, violations: &mut Vec<String>) {
    if !(1..=65535).contains(&port) {
        violations.push(format!("port must be between 1 and 65535, got {}", port));
    }
}

/// Loopback, unspecified and `*.localhost` targets
///
/// IPv4-mapped IPv6 addresses and the shorthand IPv4 forms the system
/// resolver accepts (`127.1`, `0x7f000001`, `2130706433`) count too.
pub fn is_local_address(host: &str) -> bool {
    let lower = host
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_ascii_lowercase();

    if lower == "localhost" || lower.ends_with(".localhost") {
        return true;
    }

    let ip = match lower.parse::<IpAddr>() {
        Ok(ip) => ip.to_canonical(),
        Err(_) => match parse_inet_aton(&lower) {
            Some(v4) => IpAddr::V4(v4),
            None => return false,
        },
    };
    ip.is_loopback() || ip.is_unspecified()
}

/// `inet_aton` rules: one to four parts in decimal, octal (`0` prefix) or
/// hex (`0x` prefix), the last part filling the remaining bytes
fn parse_inet_aton(host: &str) -> Option<Ipv4Addr> {
    let parts = host
        .split('.')
        .map(parse_inet_part)
        .collect::<Option<Vec<u32>>>()?;
    let (last, leading) = parts.split_last()?;
    if leading.len() > 3 || leading.iter().any(|part| *part > 0xff) {
        return None;
    }

    let last_bits = 32 - 8 * leading.len() as u32;
    if u64::from(*last) >= 1u64 << last_bits {
        return None;
    }

    let mut value = *last;
    for (i, part) in leading.iter().enumerate() {
        value |= part << (24 - 8 * i as u32);
    }
    Some(Ipv4Addr::from(value))
}

fn parse_inet_part(part: &str) -> Option<u32> {
    let (digits, radix) = if let Some(hex) = part.strip_prefix("0x") {
        (hex, 16)
    } else if part.len() > 1 && part.starts_with('0') {
        (&part[1..], 8)
    } else {
        (part, 10)
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    u32::from_str_radix(digits, radix).ok()
}
