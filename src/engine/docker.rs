//! Docker CLI engine
//!
//! Drives the `docker` binary (or a compatible one such as `podman`) as a
//! child process.

use super::{CommandOutput, Engine, EngineCommand, EngineFuture, OutputSink, RunHandle};
use crate::error::{NbeError, Result};
use std::io;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::oneshot;

/// Engine backed by the docker CLI
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    /// Create an engine calling the given binary
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Engine binary
    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn command(&self, cmd: &EngineCommand) -> Command {
        let mut command = Command::new(&self.binary);
        command.args(&cmd.args);
        if let Some(dir) = &cmd.dir {
            command.current_dir(dir);
        }
        command
    }

    fn spawn_error(&self, cmd: &EngineCommand, e: io::Error) -> NbeError {
        NbeError::Engine(format!("failed to start {} {}: {}", self.binary, cmd.display(), e))
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl Engine for DockerCli {
    fn output(&self, cmd: EngineCommand) -> EngineFuture<'_, CommandOutput> {
        Box::pin(async move {
            tracing::debug!("Running {} {}", self.binary, cmd.display());

            let output = self
                .command(&cmd)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| self.spawn_error(&cmd, e))?;

            Ok(CommandOutput {
                code: output.status.code(),
                stdout: output.stdout,
                stderr: output.stderr,
            })
        })
    }

    fn spawn(
        &self,
        cmd: EngineCommand,
        stdout: OutputSink,
        stderr: OutputSink,
    ) -> Result<RunHandle> {
        tracing::debug!("Starting {} {}", self.binary, cmd.display());

        let mut command = self.command(&cmd);
        if cmd.inherit_stdio {
            command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        } else {
            command
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        }

        let mut child = command.spawn().map_err(|e| self.spawn_error(&cmd, e))?;
        let pid = child.id();
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let (done_tx, done_rx) = oneshot::channel();
        let (int_tx, mut int_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let wait = async {
                tokio::select! {
                    status = child.wait() => status,
                    Ok(()) = &mut int_rx => {
                        if let Some(pid) = pid {
                            if let Err(e) = kill(pid as i32, libc::SIGINT) {
                                tracing::warn!("Failed to interrupt process {}: {}", pid, e);
                            }
                        }
                        child.wait().await
                    }
                }
            };

            let (status, out, err) = tokio::join!(
                wait,
                forward(stdout_pipe, stdout),
                forward(stderr_pipe, stderr)
            );

            if let Err(e) = out.and(err) {
                tracing::debug!("Output forwarding ended early: {}", e);
            }

            let result = status.map(|s| s.code()).map_err(NbeError::from);
            let _ = done_tx.send(result);
        });

        Ok(RunHandle::new(done_rx, int_tx))
    }
}

/// Copy a child pipe into a sink until EOF
async fn forward<R>(pipe: Option<R>, mut sink: OutputSink) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let Some(mut pipe) = pipe else {
        return Ok(0);
    };
    let copied = tokio::io::copy(&mut pipe, &mut sink).await?;
    sink.flush().await?;
    Ok(copied)
}

/// Send a signal to a process
fn kill(pid: i32, signal: i32) -> io::Result<()> {
    let result = unsafe { libc::kill(pid, signal) };
    if result < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}
