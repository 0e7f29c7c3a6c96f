//! Execution results
//!
//! [`ExecResult`] is the single shape every connector returns, including for
//! rejected, timed out and failed commands.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure category of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    #[default]
    None,
    Timeout,
    PermissionDenied,
    AuthenticationFailed,
    ValidationError,
    ResourceNotFound,
    NetworkError,
    InternalError,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::None => "NONE",
            ErrorType::Timeout => "TIMEOUT",
            ErrorType::PermissionDenied => "PERMISSION_DENIED",
            ErrorType::AuthenticationFailed => "AUTHENTICATION_FAILED",
            ErrorType::ValidationError => "VALIDATION_ERROR",
            ErrorType::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorType::NetworkError => "NETWORK_ERROR",
            ErrorType::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one command execution
///
/// Built once through [`ExecResult::builder`] or one of the shorthand
/// constructors, then read-only. A timed out result always carries
/// exit code -1 and [`ErrorType::Timeout`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    stdout: String,
    stderr: String,
    exit_code: i32,
    truncated: bool,
    original_length: u64,
    timed_out: bool,
    error_type: ErrorType,
}

impl ExecResult {
    pub fn builder() -> ExecResultBuilder {
        ExecResultBuilder::default()
    }

    /// A command refused before any network activity
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::failure(ErrorType::ValidationError, message)
    }

    /// A failure with only a message on stderr and exit code -1
    pub fn failure(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self::builder()
            .stderr(message)
            .exit_code(-1)
            .error_type(error_type)
            .build()
    }

    /// A timeout carrying whatever output arrived first
    pub fn timeout(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::builder()
            .stdout(stdout)
            .stderr(stderr)
            .timed_out(true)
            .build()
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Total bytes the command produced, including any that were dropped
    pub fn original_length(&self) -> u64 {
        self.original_length
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out && self.error_type == ErrorType::None
    }

    /// Short status label for audit records and metrics
    pub fn status(&self) -> &'static str {
        if self.is_success() {
            "success"
        } else if self.timed_out {
            "timeout"
        } else if self.error_type == ErrorType::None {
            "nonzero_exit"
        } else {
            "error"
        }
    }

    /// Render the result as text for an agent
    ///
    /// Sections appear in a fixed order: stdout, `[stderr]`, the exit code
    /// when non-zero, a truncation note, the timeout marker and the error
    /// type when set.
    pub fn format_output(&self) -> String {
        let mut out = String::new();

        if !self.stdout.is_empty() {
            out.push_str(&self.stdout);
        }

        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("[stderr]\n");
            out.push_str(&self.stderr);
        }

        if self.exit_code != 0 {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&format!("[exit code: {}]", self.exit_code));
        }

        if self.truncated {
            out.push_str(&format!(
                "\n[Output truncated at {} chars, original was {} bytes]",
                self.stdout.chars().count() + self.stderr.chars().count(),
                self.original_length
            ));
        }

        if self.timed_out {
            out.push_str("\n[Execution timed out]");
        }

        if self.error_type != ErrorType::None {
            out.push_str(&format!("\n[Error type: {}]", self.error_type));
        }

        out
    }
}

#[derive(Debug, Default)]
pub struct ExecResultBuilder {
    stdout: String,
    stderr: String,
    exit_code: i32,
    truncated: bool,
    original_length: Option<u64>,
    timed_out: bool,
    error_type: Option<ErrorType>,
}

impl ExecResultBuilder {
    pub fn stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    pub fn exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }

    pub fn truncated(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }

    pub fn original_length(mut self, original_length: u64) -> Self {
        self.original_length = Some(original_length);
        self
    }

    pub fn timed_out(mut self, timed_out: bool) -> Self {
        self.timed_out = timed_out;
        self
    }

    pub fn error_type(mut self, error_type: ErrorType) -> Self {
        self.error_type = Some(error_type);
        self
    }

    pub fn build(self) -> ExecResult {
        let captured = (self.stdout.len() + self.stderr.len()) as u64;
        let mut original_length = self.original_length.unwrap_or(captured).max(captured);
        if self.truncated && original_length == captured {
            original_length += 1;
        }

        let (exit_code, error_type) = if self.timed_out {
            (-1, ErrorType::Timeout)
        } else {
            (self.exit_code, self.error_type.unwrap_or_default())
        };

        ExecResult {
            stdout: self.stdout,
            stderr: self.stderr,
            exit_code,
            truncated: self.truncated,
            original_length,
            timed_out: self.timed_out,
            error_type,
        }
    }
}
