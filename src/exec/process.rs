//! Child process execution with bounded capture
//!
//! Runs a prepared [`tokio::process::Command`] without a shell, streams
//! stdout and stderr into one [`OutputCapture`], and kills the child when
//! the execution window closes.

use super::capture::OutputCapture;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

const READ_CHUNK: usize = 8192;

/// What a finished (or killed) child left behind
#[derive(Debug)]
pub struct ProcessOutcome {
    pub capture: OutputCapture,
    pub status: Option<ExitStatus>,
    pub timed_out: bool,
}

impl ProcessOutcome {
    /// Exit code, or -1 when the child was killed or terminated by a signal
    pub fn exit_code(&self) -> i32 {
        self.status.and_then(|s| s.code()).unwrap_or(-1)
    }

    pub fn stdout(&self) -> String {
        self.capture.stdout().to_string_lossy()
    }

    pub fn stderr(&self) -> String {
        self.capture.stderr().to_string_lossy()
    }
}

/// Spawn `command` and collect its output within `timeout`
///
/// # Errors
///
/// Returns an error if the process cannot be spawned or its pipes fail.
/// Expiry of `timeout` is not an error; it is reported through
/// [`ProcessOutcome::timed_out`].
pub async fn run_captured(
    mut command: Command,
    timeout: Duration,
    max_output_bytes: usize,
) -> io::Result<ProcessOutcome> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;
    let mut capture = OutputCapture::new(max_output_bytes);

    match tokio::time::timeout(timeout, drain(&mut child, &mut capture)).await {
        Ok(Ok(status)) => Ok(ProcessOutcome {
            capture,
            status: Some(status),
            timed_out: false,
        }),
        Ok(Err(e)) => {
            let _ = child.kill().await;
            Err(e)
        }
        Err(_) => {
            warn!("Child process exceeded {:?}, killing it", timeout);
            if let Err(e) = child.kill().await {
                debug!("Kill after timeout failed: {}", e.kind());
            }
            Ok(ProcessOutcome {
                capture,
                status: None,
                timed_out: true,
            })
        }
    }
}

async fn drain(child: &mut Child, capture: &mut OutputCapture) -> io::Result<ExitStatus> {
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stdout not piped"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stderr not piped"))?;

    let mut out_buf = [0u8; READ_CHUNK];
    let mut err_buf = [0u8; READ_CHUNK];
    let (mut out_done, mut err_done) = (false, false);

    while !(out_done && err_done) {
        tokio::select! {
            read = stdout.read(&mut out_buf), if !out_done => match read? {
                0 => out_done = true,
                n => capture.write_stdout(&out_buf[..n]),
            },
            read = stderr.read(&mut err_buf), if !err_done => match read? {
                0 => err_done = true,
                n => capture.write_stderr(&err_buf[..n]),
            },
        }
    }

    child.wait().await
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }

    #[tokio::test]
    async fn test_captures_stdout_and_exit_code() {
        let outcome = run_captured(sh("echo hello"), Duration::from_secs(5), 1024)
            .await
            .unwrap();

        assert_eq!(outcome.stdout(), "hello\n");
        assert_eq!(outcome.exit_code(), 0);
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn test_captures_stderr_and_failure() {
        let outcome = run_captured(sh("echo oops >&2; exit 3"), Duration::from_secs(5), 1024)
            .await
            .unwrap();

        assert_eq!(outcome.stderr(), "oops\n");
        assert_eq!(outcome.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_large_output_is_truncated() {
        let outcome = run_captured(sh("seq 1 100000"), Duration::from_secs(10), 1000)
            .await
            .unwrap();

        assert_eq!(outcome.capture.captured_len(), 1000);
        assert!(outcome.capture.is_truncated());
        assert!(outcome.capture.original_length() > 500_000);
        assert_eq!(outcome.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let start = std::time::Instant::now();
        let outcome = run_captured(sh("echo started; exec sleep 30"), Duration::from_millis(500), 1024)
            .await
            .unwrap();

        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code(), -1);
        assert_eq!(outcome.stdout(), "started\n");
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let result = run_captured(
            Command::new("/nonexistent/definitely-not-here"),
            Duration::from_secs(1),
            1024,
        )
        .await;

        assert!(result.is_err());
    }
}
