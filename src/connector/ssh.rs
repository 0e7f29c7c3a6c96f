//! SSH connector
//!
//! Runs one command per session over `ssh2`. The session lives on a blocking
//! worker thread; the async side only waits for the finished result.
//!
//! The connect window covers TCP connect, handshake and authentication.
//! The execute window covers opening the channel and reading output. The
//! channel is read in non-blocking mode so the deadline is checked between
//! reads, and the session is disconnected on every exit path.

use super::Connector;
use crate::exec::timeout::remaining;
use crate::exec::{DualTimeout, ErrorType, ExecOptions, ExecResult, OutputCapture};
use crate::node::{AuthType, Node};
use crate::sanitize::LogSanitizer;
use async_trait::async_trait;
use ssh2::{ErrorCode, Session};
use std::collections::BTreeMap;
use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use zeroize::Zeroizing;

pub const SSH_CONNECTOR_TYPE: &str = "ssh";

const DEFAULT_PORT: u16 = 22;
const READ_CHUNK: usize = 8192;
const IDLE_POLL: Duration = Duration::from_millis(20);
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// libssh2 `LIBSSH2_ERROR_TIMEOUT`
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;

#[derive(Debug, Clone)]
pub struct SshConnector {
    connect_timeout: Duration,
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl SshConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for SshConnector {
    fn connector_type(&self) -> &str {
        SSH_CONNECTOR_TYPE
    }

    async fn execute(
        &self,
        credential: &str,
        node: &Node,
        command: &str,
        options: &ExecOptions,
    ) -> ExecResult {
        if command.trim().is_empty() {
            return ExecResult::validation_error("Empty command");
        }
        let target = match SshTarget::from_node(node) {
            Ok(target) => target,
            Err(message) => return ExecResult::validation_error(message),
        };

        let request = SshRequest {
            target,
            credential: Zeroizing::new(credential.to_string()),
            command: remote_command(command, options.working_directory.as_deref()),
            environment: options.environment.clone(),
            timeouts: DualTimeout::new(self.connect_timeout, options.timeout()),
            max_output_bytes: options.max_output_bytes,
        };

        debug!(
            node = %node.alias,
            host = %LogSanitizer::sanitize_host(node.host.as_deref()),
            cmd = %LogSanitizer::command_summary(command),
            "Dispatching SSH command"
        );

        let result = match tokio::task::spawn_blocking(move || request.run()).await {
            Ok(result) => result,
            Err(e) => {
                error!(
                    node = %node.alias,
                    error = %LogSanitizer::sanitize_error(&e),
                    "SSH worker failed"
                );
                ExecResult::failure(ErrorType::InternalError, "SSH execution failed: internal error")
            }
        };

        if result.error_type() != ErrorType::None {
            warn!(
                node = %node.alias,
                host = %LogSanitizer::sanitize_host(node.host.as_deref()),
                error_type = %result.error_type(),
                "SSH command did not complete"
            );
        }
        result
    }

    async fn test_connection(&self, credential: &str, node: &Node) -> bool {
        let target = match SshTarget::from_node(node) {
            Ok(target) => target,
            Err(_) => return false,
        };
        let credential = Zeroizing::new(credential.to_string());
        let connect_timeout = self.connect_timeout;

        let outcome = tokio::task::spawn_blocking(move || {
            connect_session(&target, &credential, connect_timeout).map(|session| {
                disconnect(&session);
            })
        })
        .await;

        match outcome {
            Ok(Ok(())) => true,
            Ok(Err(failure)) => {
                debug!(node = %node.alias, failure = failure.label(), "SSH connection test failed");
                false
            }
            Err(_) => false,
        }
    }
}

struct SshTarget {
    host: String,
    port: u16,
    username: String,
    auth_type: AuthType,
}

impl SshTarget {
    fn from_node(node: &Node) -> Result<Self, String> {
        let host = node
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or("SSH node has no host")?;
        let username = node
            .username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or("SSH node has no username")?;
        if node.auth_type == AuthType::Kubeconfig {
            return Err("SSH node must use password or key authentication".to_string());
        }

        Ok(Self {
            host: host.to_string(),
            port: node.port.unwrap_or(DEFAULT_PORT),
            username: username.to_string(),
            auth_type: node.auth_type,
        })
    }
}

struct SshRequest {
    target: SshTarget,
    credential: Zeroizing<String>,
    command: String,
    environment: BTreeMap<String, String>,
    timeouts: DualTimeout,
    max_output_bytes: usize,
}

impl SshRequest {
    fn run(self) -> ExecResult {
        let session = match connect_session(&self.target, &self.credential, self.timeouts.connect()) {
            Ok(session) => session,
            Err(failure) => return failure.into_result(),
        };

        let result = self.run_command(&session);
        disconnect(&session);
        result.unwrap_or_else(SshFailure::into_result)
    }

    fn run_command(&self, session: &Session) -> Result<ExecResult, SshFailure> {
        session.set_timeout(millis(self.timeouts.execute()));
        let mut channel = session.channel_session().map_err(SshFailure::from_ssh)?;

        for (name, value) in &self.environment {
            if channel.setenv(name, value).is_err() {
                debug!(variable = %name, "Remote side refused environment variable");
            }
        }

        channel.exec(&self.command).map_err(SshFailure::from_ssh)?;
        session.set_blocking(false);

        let deadline = Instant::now() + self.timeouts.execute();
        let mut capture = OutputCapture::new(self.max_output_bytes);
        let mut stderr = channel.stderr();
        let mut buf = [0u8; READ_CHUNK];
        let mut timed_out = false;

        loop {
            let mut progressed = false;

            let n = read_available(&mut channel, &mut buf).map_err(SshFailure::Io)?;
            if n > 0 {
                capture.write_stdout(&buf[..n]);
                progressed = true;
            }

            let n = read_available(&mut stderr, &mut buf).map_err(SshFailure::Io)?;
            if n > 0 {
                capture.write_stderr(&buf[..n]);
                progressed = true;
            }

            if !progressed && channel.eof() {
                break;
            }
            if Instant::now() >= deadline {
                timed_out = true;
                break;
            }
            if !progressed {
                std::thread::sleep(IDLE_POLL);
            }
        }

        session.set_blocking(true);
        session.set_timeout(millis(CLOSE_GRACE));
        let _ = channel.close();

        let stdout = capture.stdout().to_string_lossy();
        let stderr_text = capture.stderr().to_string_lossy();
        let builder = ExecResult::builder()
            .truncated(capture.is_truncated())
            .original_length(capture.original_length());

        if timed_out {
            return Ok(builder.stdout(stdout).stderr(stderr_text).timed_out(true).build());
        }

        let _ = channel.wait_close();
        let exit_code = channel.exit_status().unwrap_or(-1);
        let error_type = exit_error_type(exit_code, &stderr_text);

        Ok(builder
            .stdout(stdout)
            .stderr(stderr_text)
            .exit_code(exit_code)
            .error_type(error_type)
            .build())
    }
}

#[derive(Debug)]
enum SshFailure {
    ConnectTimeout,
    Unreachable(io::ErrorKind),
    AuthRejected,
    Protocol(ssh2::Error),
    Io(io::Error),
}

impl SshFailure {
    fn from_ssh(err: ssh2::Error) -> Self {
        if is_timeout(&err) {
            SshFailure::ConnectTimeout
        } else {
            SshFailure::Protocol(err)
        }
    }

    fn label(&self) -> &'static str {
        match self {
            SshFailure::ConnectTimeout => "timeout",
            SshFailure::Unreachable(_) => "unreachable",
            SshFailure::AuthRejected => "auth_rejected",
            SshFailure::Protocol(_) => "protocol",
            SshFailure::Io(_) => "io",
        }
    }

    fn into_result(self) -> ExecResult {
        match self {
            SshFailure::ConnectTimeout => ExecResult::timeout("", "SSH connection timed out"),
            SshFailure::Unreachable(kind) => ExecResult::failure(
                ErrorType::NetworkError,
                format!("SSH connection failed: {}", kind),
            ),
            SshFailure::AuthRejected => {
                ExecResult::failure(ErrorType::AuthenticationFailed, "SSH authentication failed")
            }
            SshFailure::Protocol(err) => ExecResult::failure(
                ErrorType::InternalError,
                format!("SSH execution failed: {}", LogSanitizer::sanitize_error(&err)),
            ),
            SshFailure::Io(err) => ExecResult::failure(
                ErrorType::NetworkError,
                format!("SSH stream failed: {}", err.kind()),
            ),
        }
    }
}

fn is_timeout(err: &ssh2::Error) -> bool {
    matches!(err.code(), ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT))
}

fn connect_session(
    target: &SshTarget,
    credential: &str,
    connect_timeout: Duration,
) -> Result<Session, SshFailure> {
    let deadline = Instant::now() + connect_timeout;

    let addrs: Vec<SocketAddr> = (target.host.as_str(), target.port)
        .to_socket_addrs()
        .map_err(|e| SshFailure::Unreachable(e.kind()))?
        .collect();

    let mut last_kind = io::ErrorKind::NotFound;
    let mut tcp = None;
    for addr in addrs {
        let Some(left) = remaining(deadline) else {
            return Err(SshFailure::ConnectTimeout);
        };
        match TcpStream::connect_timeout(&addr, left) {
            Ok(stream) => {
                tcp = Some(stream);
                break;
            }
            Err(e) => last_kind = e.kind(),
        }
    }
    let tcp = match tcp {
        Some(tcp) => tcp,
        None if last_kind == io::ErrorKind::TimedOut => return Err(SshFailure::ConnectTimeout),
        None => return Err(SshFailure::Unreachable(last_kind)),
    };

    let left = remaining(deadline).ok_or(SshFailure::ConnectTimeout)?;
    tcp.set_read_timeout(Some(left)).ok();
    tcp.set_write_timeout(Some(left)).ok();

    let mut session = Session::new().map_err(SshFailure::Protocol)?;
    session.set_tcp_stream(tcp);
    session.set_timeout(millis(left));
    session.handshake().map_err(SshFailure::from_ssh)?;

    let auth = match target.auth_type {
        AuthType::Key => session.userauth_pubkey_memory(&target.username, None, credential, None),
        _ => session.userauth_password(&target.username, credential),
    };
    match auth {
        Err(e) if is_timeout(&e) => return Err(SshFailure::ConnectTimeout),
        Err(_) => return Err(SshFailure::AuthRejected),
        Ok(()) => {}
    }
    if !session.authenticated() {
        return Err(SshFailure::AuthRejected);
    }

    Ok(session)
}

fn disconnect(session: &Session) {
    session.set_blocking(true);
    session.set_timeout(millis(CLOSE_GRACE));
    let _ = session.disconnect(None, "nodeconsole: done", None);
}

/// Non-blocking read; `WouldBlock` counts as no data
fn read_available<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    match reader.read(buf) {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
        Err(e) => Err(e),
    }
}

fn millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

/// Prefix the command with a `cd` into the quoted working directory
fn remote_command(command: &str, working_directory: Option<&str>) -> String {
    match working_directory {
        Some(dir) => format!("cd {} && {}", shell_quote(dir), command),
        None => command.to_string(),
    }
}

/// POSIX single-quote escaping
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn exit_error_type(exit_code: i32, stderr: &str) -> ErrorType {
    match exit_code {
        0 => ErrorType::None,
        126 => ErrorType::PermissionDenied,
        127 => ErrorType::ResourceNotFound,
        _ if stderr.to_ascii_lowercase().contains("permission denied") => ErrorType::PermissionDenied,
        _ => ErrorType::None,
    }
}
