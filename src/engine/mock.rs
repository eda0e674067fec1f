//! Recording engine for tests

use super::{CommandOutput, Engine, EngineCommand, EngineFuture, OutputSink, RunHandle};
use crate::error::{NbeError, Result};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;

/// How the mock answers a spawned command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunBehavior {
    /// Write the output and exit with the code
    Exit { code: i32, stdout: String, stderr: String },
    /// Run until interrupted, then exit with 130
    Hang,
    /// Never exit, even when interrupted
    IgnoreInterrupt,
    /// Fail to start
    SpawnError,
}

impl Default for RunBehavior {
    fn default() -> Self {
        RunBehavior::Exit {
            code: 0,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    commands: Vec<EngineCommand>,
    interrupts: usize,
    build: Option<RunBehavior>,
    pull_code: i32,
    down_code: i32,
    run: RunBehavior,
}

/// Engine that records every command and never touches docker
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<State>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_run(self, run: RunBehavior) -> Self {
        self.state.lock().unwrap().run = run;
        self
    }

    pub fn with_build_code(self, code: i32) -> Self {
        self.with_build(RunBehavior::Exit {
            code,
            stdout: "built\n".to_string(),
            stderr: if code == 0 {
                String::new()
            } else {
                "build failed\n".to_string()
            },
        })
    }

    /// How `build` behaves; exits 0 by default
    pub fn with_build(self, build: RunBehavior) -> Self {
        self.state.lock().unwrap().build = Some(build);
        self
    }

    pub fn with_pull_code(self, code: i32) -> Self {
        self.state.lock().unwrap().pull_code = code;
        self
    }

    pub fn with_down_code(self, code: i32) -> Self {
        self.state.lock().unwrap().down_code = code;
        self
    }

    /// All commands issued so far
    pub fn commands(&self) -> Vec<EngineCommand> {
        self.state.lock().unwrap().commands.clone()
    }

    /// Commands whose arguments contain `word`
    pub fn count(&self, word: &str) -> usize {
        self.commands()
            .iter()
            .filter(|c| c.args.iter().any(|a| a == word))
            .count()
    }

    /// Number of interrupts delivered to running commands
    pub fn interrupts(&self) -> usize {
        self.state.lock().unwrap().interrupts
    }
}

impl Engine for MockEngine {
    fn output(&self, command: EngineCommand) -> EngineFuture<'_, CommandOutput> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            let code = if command.args.iter().any(|a| a == "pull") {
                state.pull_code
            } else if command.args.iter().any(|a| a == "down") {
                state.down_code
            } else {
                0
            };
            let stderr = if code == 0 {
                Vec::new()
            } else {
                format!("{} failed", command.display()).into_bytes()
            };
            state.commands.push(command);

            Ok(CommandOutput {
                code: Some(code),
                stdout: Vec::new(),
                stderr,
            })
        })
    }

    fn spawn(
        &self,
        command: EngineCommand,
        mut stdout: OutputSink,
        mut stderr: OutputSink,
    ) -> Result<RunHandle> {
        let behavior = {
            let mut state = self.state.lock().unwrap();
            let behavior = if command.starts_with(&["build"]) {
                state.build.clone().unwrap_or(RunBehavior::Exit {
                    code: 0,
                    stdout: "built\n".to_string(),
                    stderr: String::new(),
                })
            } else {
                state.run.clone()
            };
            state.commands.push(command);
            behavior
        };

        let (done_tx, done_rx) = oneshot::channel();
        let (int_tx, int_rx) = oneshot::channel::<()>();
        let state = self.state.clone();

        match behavior {
            RunBehavior::SpawnError => {
                return Err(NbeError::Engine("mock spawn failure".to_string()));
            }
            RunBehavior::Exit {
                code,
                stdout: out,
                stderr: err,
            } => {
                tokio::spawn(async move {
                    let _ = stdout.write_all(out.as_bytes()).await;
                    let _ = stderr.write_all(err.as_bytes()).await;
                    let _ = done_tx.send(Ok(Some(code)));
                    drop(int_rx);
                });
            }
            RunBehavior::Hang => {
                tokio::spawn(async move {
                    let _ = stdout.write_all(b"started\n").await;
                    if int_rx.await.is_ok() {
                        state.lock().unwrap().interrupts += 1;
                    }
                    let _ = done_tx.send(Ok(Some(130)));
                });
            }
            RunBehavior::IgnoreInterrupt => {
                tokio::spawn(async move {
                    let _done_tx = done_tx;
                    let _ = stdout.write_all(b"started\n").await;
                    if int_rx.await.is_ok() {
                        state.lock().unwrap().interrupts += 1;
                    }
                    std::future::pending::<()>().await;
                });
            }
        }

        Ok(RunHandle::new(done_rx, int_tx))
    }
}
