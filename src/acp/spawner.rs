//! Agent process spawner and the child-process transport.
//!
//! The agent is launched with piped stdin/stdout and an inherited stderr, so
//! its own diagnostics land next to the harness's log without ever being
//! parsed. `kill_on_drop(true)` guarantees the child never outlives the
//! transport, even when shutdown is skipped.

use std::process::Stdio;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use crate::acp::codec::{AcpCodec, DecodedLine, MAX_LINE_BYTES};
use crate::acp::transport::{AgentTransport, Inbound, ShutdownOutcome, TransportFuture};
use crate::config::HarnessConfig;
use crate::{AppError, Result};

/// Configuration for launching the agent process.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Agent executable (e.g., `grok`).
    pub agent_command: String,
    /// Fixed arguments selecting stdio protocol mode (e.g., `acp stdio`).
    pub agent_args: Vec<String>,
    /// Pause after spawning so the agent can finish its own startup.
    pub startup_delay: Duration,
}

impl From<&HarnessConfig> for SpawnConfig {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            agent_command: config.agent_command.clone(),
            agent_args: config.agent_args.clone(),
            startup_delay: config.startup_delay(),
        }
    }
}

/// Transport over a spawned agent's stdio.
#[derive(Debug)]
pub struct ChildTransport {
    child: Child,
    /// `None` once stdin has been closed by [`AgentTransport::shutdown`].
    stdin: Option<FramedWrite<ChildStdin, AcpCodec>>,
    stdout: FramedRead<ChildStdout, AcpCodec>,
}

impl ChildTransport {
    /// OS process id of the agent, if it is still running.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

/// Spawn the agent and wait out the startup delay.
///
/// # Errors
///
/// - `AppError::Io("failed to spawn agent …")`: OS spawn failure (for
///   example the executable is not on `PATH`).
/// - `AppError::Io("agent exited during startup …")`: the process ended
///   before the first request could be sent.
pub async fn spawn_agent(config: &SpawnConfig) -> Result<ChildTransport> {
    let mut cmd = Command::new(&config.agent_command);
    cmd.args(&config.agent_args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|err| {
        AppError::Io(format!(
            "failed to spawn agent `{}`: {err}",
            config.agent_command
        ))
    })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Io("failed to capture agent stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Io("failed to capture agent stdout".into()))?;

    info!(
        command = config.agent_command.as_str(),
        args = ?config.agent_args,
        pid = child.id(),
        "agent process spawned"
    );

    if !config.startup_delay.is_zero() {
        tokio::time::sleep(config.startup_delay).await;
    }

    if let Some(status) = child.try_wait()? {
        return Err(AppError::Io(format!(
            "agent exited during startup with {status}"
        )));
    }

    Ok(ChildTransport {
        child,
        stdin: Some(FramedWrite::new(stdin, AcpCodec::new())),
        stdout: FramedRead::new(stdout, AcpCodec::new()),
    })
}

impl AgentTransport for ChildTransport {
    fn send(&mut self, frame: Value) -> TransportFuture<'_, Result<()>> {
        Box::pin(async move {
            let stdin = self
                .stdin
                .as_mut()
                .ok_or_else(|| AppError::Io("agent stdin already closed".into()))?;

            // `SinkExt::send` flushes, so the line is on the pipe before we read.
            stdin.send(frame).await.map_err(|e| {
                warn!(error = %e, "write to agent stdin failed");
                match e {
                    AppError::Io(msg) => AppError::Io(format!("write failed: {msg}")),
                    other => other,
                }
            })
        })
    }

    fn receive(&mut self, timeout: Duration) -> TransportFuture<'_, Inbound> {
        Box::pin(async move {
            match tokio::time::timeout(timeout, self.stdout.next()).await {
                Err(_elapsed) => Inbound::TimedOut,
                Ok(None) => Inbound::Closed,
                Ok(Some(Ok(DecodedLine::Line(line)))) => Inbound::Line(line),
                Ok(Some(Ok(DecodedLine::TooLong))) => Inbound::Malformed(format!(
                    "line too long: exceeded {MAX_LINE_BYTES} bytes"
                )),
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "agent stdout read failed, treating stream as closed");
                    Inbound::Closed
                }
            }
        })
    }

    fn shutdown(&mut self, grace: Duration) -> TransportFuture<'_, Result<ShutdownOutcome>> {
        Box::pin(async move {
            // Dropping the writer closes the pipe; the agent sees EOF on stdin.
            if let Some(mut stdin) = self.stdin.take() {
                if let Err(e) = stdin.close().await {
                    debug!(error = %e, "closing agent stdin reported an error");
                }
            }

            match tokio::time::timeout(grace, self.child.wait()).await {
                Ok(Ok(status)) => {
                    info!(%status, "agent exited");
                    Ok(ShutdownOutcome::Exited {
                        code: status.code(),
                    })
                }
                Ok(Err(err)) => Err(AppError::Io(format!("failed to wait for agent: {err}"))),
                Err(_elapsed) => {
                    warn!(?grace, "agent did not exit within grace period, killing");
                    self.child
                        .kill()
                        .await
                        .map_err(|err| AppError::Io(format!("failed to kill agent: {err}")))?;
                    Ok(ShutdownOutcome::Killed)
                }
            }
        })
    }
}
