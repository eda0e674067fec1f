//! Container engine surface
//!
//! Everything nbe asks of the container engine goes through [`Engine`]:
//! short commands that run to completion, and long-running commands whose
//! output is streamed into caller-provided sinks and which can be
//! interrupted.

pub mod cancel;
pub mod docker;
#[cfg(test)]
pub mod mock;

pub use cancel::{Cancel, CancelTrigger};
pub use docker::DockerCli;

use crate::error::{NbeError, Result};
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::oneshot;

/// Boxed future returned by engine operations
pub type EngineFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Destination for a spawned command's output stream
pub type OutputSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Engine CLI invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    /// Arguments after the engine binary
    pub args: Vec<String>,
    /// Working directory
    pub dir: Option<PathBuf>,
    /// Attach the command to the terminal instead of the sinks
    pub inherit_stdio: bool,
}

impl EngineCommand {
    /// Create a command from its arguments
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            dir: None,
            inherit_stdio: false,
        }
    }

    /// Attach to the terminal
    pub fn inherit_stdio(mut self) -> Self {
        self.inherit_stdio = true;
        self
    }

    /// Whether the arguments start with the given words
    pub fn starts_with(&self, words: &[&str]) -> bool {
        self.args.len() >= words.len() && self.args.iter().zip(words).all(|(a, w)| a == w)
    }

    /// Arguments joined for logging
    pub fn display(&self) -> String {
        self.args.join(" ")
    }
}

/// Result of a command run to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when terminated by a signal
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Captured stderr, lossily decoded
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// A spawned engine command
pub struct RunHandle {
    completion: oneshot::Receiver<Result<Option<i32>>>,
    interrupt: Option<oneshot::Sender<()>>,
}

impl RunHandle {
    /// Create a handle from its completion and interrupt channels
    pub fn new(
        completion: oneshot::Receiver<Result<Option<i32>>>,
        interrupt: oneshot::Sender<()>,
    ) -> Self {
        Self {
            completion,
            interrupt: Some(interrupt),
        }
    }

    /// Ask the process to stop; returns false if already asked or finished
    pub fn interrupt(&mut self) -> bool {
        match self.interrupt.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Wait for the process to exit and return its exit code
    pub async fn wait(&mut self) -> Result<Option<i32>> {
        match (&mut self.completion).await {
            Ok(result) => result,
            Err(_) => Err(NbeError::Engine(
                "process monitor exited without reporting a status".to_string(),
            )),
        }
    }

    /// Interrupt the process and wait up to `grace` for it to exit
    ///
    /// Returns the exit code, or `None` when the process did not report in
    /// time or its monitor failed. Either case is logged.
    pub async fn stop(&mut self, grace: Duration) -> Option<Option<i32>> {
        self.interrupt();
        match tokio::time::timeout(grace, self.wait()).await {
            Ok(Ok(code)) => Some(code),
            Ok(Err(e)) => {
                tracing::warn!("Stopped process did not report its exit: {}", e);
                None
            }
            Err(_) => {
                tracing::warn!("Process still running {}s after interrupt", grace.as_secs());
                None
            }
        }
    }
}

/// Container engine operations
pub trait Engine: Send + Sync {
    /// Run a command to completion, capturing stdout and stderr
    fn output(&self, command: EngineCommand) -> EngineFuture<'_, CommandOutput>;

    /// Start a command, streaming its output into the sinks
    fn spawn(
        &self,
        command: EngineCommand,
        stdout: OutputSink,
        stderr: OutputSink,
    ) -> Result<RunHandle>;
}

/// In-memory sink that can be read after the writer is gone
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Boxed writer into this buffer
    pub fn sink(&self) -> OutputSink {
        Box::new(self.clone())
    }

    /// Copy of the bytes written so far
    pub fn contents(&self) -> Vec<u8> {
        self.inner.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// Contents lossily decoded
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl AsyncWrite for SharedBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "buffer lock poisoned"))?;
        inner.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_command_prefix() {
        let cmd = EngineCommand::new(["compose", "--project-name", "abc", "down"]);
        assert!(cmd.starts_with(&["compose"]));
        assert!(!cmd.starts_with(&["build"]));
        assert_eq!(cmd.display(), "compose --project-name abc down");
    }

    #[tokio::test]
    async fn test_shared_buffer() {
        let buffer = SharedBuffer::new();
        let mut sink = buffer.sink();
        sink.write_all(b"hello ").await.unwrap();
        sink.write_all(b"world").await.unwrap();
        drop(sink);

        assert_eq!(buffer.to_string_lossy(), "hello world");
    }

    #[tokio::test]
    async fn test_run_handle_interrupt_once() {
        let (done_tx, done_rx) = oneshot::channel();
        let (int_tx, int_rx) = oneshot::channel();
        let mut handle = RunHandle::new(done_rx, int_tx);

        assert!(handle.interrupt());
        assert!(!handle.interrupt());
        assert!(int_rx.await.is_ok());

        done_tx.send(Ok(Some(130))).unwrap();
        assert_eq!(handle.wait().await.unwrap(), Some(130));
    }

    #[tokio::test]
    async fn test_run_handle_dropped_monitor() {
        let (done_tx, done_rx) = oneshot::channel::<Result<Option<i32>>>();
        let (int_tx, _int_rx) = oneshot::channel();
        let mut handle = RunHandle::new(done_rx, int_tx);
        drop(done_tx);

        assert!(matches!(handle.wait().await, Err(NbeError::Engine(_))));
    }

    #[tokio::test]
    async fn test_run_handle_stop_is_bounded() {
        let (done_tx, done_rx) = oneshot::channel::<Result<Option<i32>>>();
        let (int_tx, int_rx) = oneshot::channel();
        let mut handle = RunHandle::new(done_rx, int_tx);

        assert_eq!(handle.stop(Duration::from_millis(20)).await, None);
        assert!(int_rx.await.is_ok());
        drop(done_tx);

        let (done_tx, done_rx) = oneshot::channel();
        let (int_tx, _int_rx) = oneshot::channel();
        let mut handle = RunHandle::new(done_rx, int_tx);
        done_tx.send(Ok(Some(130))).unwrap();
        assert_eq!(handle.stop(Duration::from_millis(20)).await, Some(Some(130)));
    }
}
