//! Remote execution channel over SSH.
//!
//! Commands run through a spawned `ssh` client process in batch mode. The
//! channel owns the connection lifecycle across intentional disconnects: a
//! rebooted host is waited for with a bounded retry before the reboot is
//! reported successful, and a deliberately powered-off host is marked
//! offline so command attempts fail fast instead of hanging.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::process::Command as SshProcess;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use shakedown_common::command::Command;
use shakedown_common::{Attempt, HarnessError, Result, Retryer};

/// ssh reserves exit code 255 for transport-level failures; anything else is
/// the remote command's own exit status.
const SSH_TRANSPORT_EXIT: i32 = 255;

/// Execution channel to one host.
#[derive(Debug)]
pub struct SshChannel {
    addr: String,
    user: String,
    key_path: Option<PathBuf>,
    connect_timeout: Duration,
    ready_attempts: u32,
    ready_delay: Duration,
    offline: AtomicBool,
}

impl SshChannel {
    pub fn new(addr: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            user: user.into(),
            key_path: None,
            connect_timeout: Duration::from_secs(10),
            ready_attempts: 30,
            ready_delay: Duration::from_secs(5),
            offline: AtomicBool::new(false),
        }
    }

    /// Uses the given private key instead of the ssh-agent default.
    pub fn with_key(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// True once the host was deliberately powered off.
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Marks the host as deliberately powered off. Subsequent commands fail
    /// with [`HarnessError::Offline`] without touching the network.
    pub fn mark_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn mark_online(&self) {
        self.offline.store(false, Ordering::SeqCst);
    }

    /// Runs a command on the host and returns its stdout.
    ///
    /// Transport-level failures (unreachable host, dropped connection) map to
    /// [`HarnessError::Transport`]; a command that ran and exited nonzero
    /// maps to [`HarnessError::CommandFailed`] with its exit code and stderr.
    pub async fn run(&self, command: &Command) -> Result<String> {
        if self.is_offline() {
            return Err(HarnessError::Offline {
                node: self.addr.clone(),
            });
        }
        debug!(node = %self.addr, command = command.program(), "running remote command");

        let mut ssh = SshProcess::new("ssh");
        ssh.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs()));
        if let Some(key) = &self.key_path {
            ssh.arg("-i").arg(key);
        }
        ssh.arg(format!("{}@{}", self.user, self.addr));
        ssh.arg(remote_command_line(command));

        let output = ssh
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| HarnessError::Transport {
                node: self.addr.clone(),
                reason: err.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if output.status.code() == Some(SSH_TRANSPORT_EXIT) {
                return Err(HarnessError::Transport {
                    node: self.addr.clone(),
                    reason: stderr,
                });
            }
            return Err(HarnessError::CommandFailed {
                node: self.addr.clone(),
                command: command.program().to_string(),
                code: output.status.code(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Waits for the host to accept connections again, with a bounded retry.
    ///
    /// Used after a reboot: the channel probes with a no-op command until the
    /// remote side answers or the budget runs out. Also clears the offline
    /// flag, since a successful probe means the host is back.
    pub async fn wait_ready(&self, cancel: &CancellationToken) -> Result<()> {
        self.mark_online();
        let probe = Command::new("true");
        let retry = Retryer::new(self.ready_attempts, self.ready_delay);
        retry
            .run(cancel, || {
                let probe = probe.clone();
                async move {
                    match self.run(&probe).await {
                        Ok(_) => {
                            debug!(node = %self.addr, "host is accepting connections");
                            Attempt::Done(())
                        }
                        Err(err) => Attempt::retry(format!("waiting for {}: {err}", self.addr)),
                    }
                }
            })
            .await
    }
}

/// Builds the single command-line string passed to the remote shell,
/// prefixing any environment overrides.
fn remote_command_line(command: &Command) -> String {
    let mut line = String::new();
    for (key, value) in command.env_vars() {
        line.push_str(key);
        line.push('=');
        line.push_str(value);
        line.push(' ');
    }
    line.push_str(command.program());
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_channel_fails_fast() {
        let channel = SshChannel::new("203.0.113.7", "admin");
        channel.mark_offline();

        let err = channel.run(&Command::new("true")).await.unwrap_err();
        match err {
            HarnessError::Offline { node } => assert_eq!(node, "203.0.113.7"),
            other => panic!("expected Offline, got {other}"),
        }
    }

    #[test]
    fn env_overrides_prefix_the_command_line() {
        let cmd = Command::new("sudo ctl upgrade").env("CTL_BLOCKING_OPERATION", "false");
        assert_eq!(
            remote_command_line(&cmd),
            "CTL_BLOCKING_OPERATION=false sudo ctl upgrade"
        );
    }

    #[test]
    fn plain_command_line_is_unchanged() {
        assert_eq!(remote_command_line(&Command::new("uptime")), "uptime");
    }
}
