//! Terminal approval prompt
//!
//! Shows the pending command and waits for the operator on stdin. Reading
//! stdin blocks, so the prompt runs on a blocking worker. EOF, read errors
//! and an explicit quit all deny.

use super::{ApprovalDecision, ApprovalHandler, ApprovalRequest};
use async_trait::async_trait;
use std::io::{self, BufRead, Write};
use tracing::warn;

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePrompt;

impl ConsolePrompt {
    pub fn new() -> Self {
        Self
    }

    fn render(request: &ApprovalRequest) -> String {
        format!(
            "\nApproval required on '{}' ({})\n  command: {}\n  safety:  {} under {} policy\n  reason:  {}\n",
            request.node_alias,
            request.connector_type,
            request.command,
            request.level,
            request.policy,
            request.reason
        )
    }

    fn print_options(out: &mut impl Write) {
        let _ = write!(out, "Run it? (a)pprove / (d)eny: ");
        let _ = out.flush();
    }

    /// Read answers until one is recognised
    fn read_decision(input: &mut impl BufRead, out: &mut impl Write) -> ApprovalDecision {
        let mut line = String::new();
        loop {
            line.clear();
            match input.read_line(&mut line) {
                Ok(0) => {
                    warn!("No input provided (EOF), denying by default");
                    return ApprovalDecision::Denied;
                }
                Ok(_) => match line.trim().to_lowercase().as_str() {
                    "a" | "approve" | "y" | "yes" => return ApprovalDecision::Approved,
                    "d" | "deny" | "n" | "no" | "q" | "quit" => return ApprovalDecision::Denied,
                    _ => {
                        let _ = writeln!(out, "Please enter 'a' to approve or 'd' to deny.");
                        Self::print_options(out);
                    }
                },
                Err(e) => {
                    warn!("Failed to read approval input: {}", e.kind());
                    return ApprovalDecision::Denied;
                }
            }
        }
    }
}

#[async_trait]
impl ApprovalHandler for ConsolePrompt {
    async fn request_approval(&self, request: &ApprovalRequest) -> ApprovalDecision {
        let card = Self::render(request);

        let answer = tokio::task::spawn_blocking(move || {
            let mut out = io::stderr();
            let _ = write!(out, "{}", card);
            Self::print_options(&mut out);
            Self::read_decision(&mut io::stdin().lock(), &mut out)
        })
        .await;

        answer.unwrap_or(ApprovalDecision::Denied)
    }
}
