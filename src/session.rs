//! SSH session client.
//!
//! Runs probe commands on remote hosts via the OpenSSH client binary. A
//! session opens one control master per host per collection pass, so the
//! authenticated connection is reused by every probe of that pass and torn
//! down before the snapshot is returned. Key authentication only
//! (`BatchMode=yes`); there is no interactive or password fallback.

use crate::state::ServerSpec;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("command failed: {0}")]
    CommandFailed(String),
}

/// An established remote session that can run commands until closed.
pub trait Session: Send {
    fn execute(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<String, SessionError>> + Send;

    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Opens sessions against configured servers. The seam that lets tests
/// substitute a fake transport for the real SSH client.
pub trait SessionFactory: Send + Sync {
    type Session: Session + 'static;

    fn open(
        &self,
        server: &ServerSpec,
        timeout: Duration,
    ) -> impl Future<Output = Result<Self::Session, SessionError>> + Send;
}

#[derive(Debug, Clone)]
pub struct SshSessionFactory {
    key_path: PathBuf,
}

impl SshSessionFactory {
    pub fn new(key_path: PathBuf) -> Self {
        Self { key_path }
    }
}

impl SessionFactory for SshSessionFactory {
    type Session = SshSession;

    async fn open(
        &self,
        server: &ServerSpec,
        timeout: Duration,
    ) -> Result<SshSession, SessionError> {
        let destination = format!("{}@{}", server.user, server.host);
        let control_path = control_socket_path(server);

        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", timeout.as_secs().max(1)))
            .arg("-o")
            .arg("ControlMaster=yes")
            .arg("-o")
            .arg(format!("ControlPath={}", control_path.display()))
            // Master self-terminates after idling if close() never runs.
            .arg("-o")
            .arg("ControlPersist=60")
            .arg("-i")
            .arg(&self.key_path)
            .arg("-N")
            .arg("-f")
            .arg(&destination);
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| SessionError::Timeout(timeout))?
            .map_err(|e| SessionError::ConnectionFailed(format!("failed to spawn ssh: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SessionError::ConnectionFailed(format!(
                "ssh exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(SshSession {
            destination,
            control_path,
        })
    }
}

#[derive(Debug)]
pub struct SshSession {
    destination: String,
    control_path: PathBuf,
}

impl Session for SshSession {
    async fn execute(&mut self, command: &str, timeout: Duration) -> Result<String, SessionError> {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ControlPath={}", self.control_path.display()))
            .arg(&self.destination)
            .arg(command);
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| SessionError::Timeout(timeout))?
            .map_err(|e| SessionError::ConnectionFailed(format!("failed to spawn ssh: {e}")))?;

        if output.status.success() {
            String::from_utf8(output.stdout)
                .map_err(|e| SessionError::CommandFailed(format!("invalid utf-8 in output: {e}")))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(SessionError::CommandFailed(format!(
                "exit {}: {}",
                output.status,
                stderr.trim()
            )))
        }
    }

    async fn close(self) {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg(format!("ControlPath={}", self.control_path.display()))
            .arg("-O")
            .arg("exit")
            .arg(&self.destination);
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
        let _ = tokio::time::timeout(Duration::from_secs(5), cmd.status()).await;
    }
}

// Sockets are keyed by daemon pid and server name so concurrent daemons
// never collide; each pass closes its master before the next begins.
fn control_socket_path(server: &ServerSpec) -> PathBuf {
    let name: String = server
        .name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    std::env::temp_dir().join(format!("fleetmond-{}-{}.sock", std::process::id(), name))
}
