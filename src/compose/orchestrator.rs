//! Run orchestrator
//!
//! Runs a built example image inside its own compose project:
//!
//! ```text
//! Preparing -> Pulling -> Running -> TearingDown -> Completed | Failed | Cancelled
//! ```
//!
//! Teardown (`compose down`) is issued exactly once per run, whatever
//! happened before it: preparation errors, a failing app container, an
//! interrupt or an expired deadline. Teardown failures are logged and never
//! replace the run's own result. The project directory is removed after
//! teardown.
//!
//! The cancel handle is watched while pulling and while running. An
//! interrupted app gets the configured teardown timeout to exit before
//! teardown proceeds without it.

use super::project::ComposeProject;
use super::resolver;
use crate::config::{Config, ExampleRef};
use crate::engine::{Cancel, Engine, OutputSink};
use crate::error::{NbeError, Result};
use crate::image::{BuildContextComposer, Versions};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Preparing,
    Pulling,
    Running,
    TearingDown,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Preparing => write!(f, "preparing"),
            RunPhase::Pulling => write!(f, "pulling"),
            RunPhase::Running => write!(f, "running"),
            RunPhase::TearingDown => write!(f, "tearing down"),
            RunPhase::Completed => write!(f, "completed"),
            RunPhase::Failed => write!(f, "failed"),
            RunPhase::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// How the example is started
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// `compose run` of the app service, output to the caller's sinks
    #[default]
    Headless,
    /// `compose up` attached to the terminal
    Foreground { no_ansi: bool },
}

/// Why a run stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Interrupt,
    Deadline,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Interrupt => write!(f, "interrupted"),
            CancelReason::Deadline => write!(f, "deadline exceeded"),
        }
    }
}

/// Result of a run that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The app exited with status 0
    Completed,
    /// The app was stopped before it finished
    Cancelled(CancelReason),
}

/// Parameters of one run
#[derive(Debug, Clone)]
pub struct RunRequest<'r> {
    pub example: &'r ExampleRef,
    /// Run id, used as compose project name
    pub run_id: &'r str,
    /// Image the app service runs
    pub image: &'r str,
    /// Use the cluster compose file when nothing more specific exists
    pub cluster: bool,
    pub mode: RunMode,
    pub versions: Option<&'r Versions>,
    /// Wall-clock limit for the Running phase
    pub deadline: Option<Duration>,
}

/// Drives compose projects through their lifecycle
pub struct RunOrchestrator<'a, E: Engine> {
    engine: &'a E,
    config: &'a Config,
    repo: &'a Path,
}

impl<'a, E: Engine> RunOrchestrator<'a, E> {
    /// Create an orchestrator
    pub fn new(engine: &'a E, config: &'a Config, repo: &'a Path) -> Self {
        Self {
            engine,
            config,
            repo,
        }
    }

    /// Run an example image until it exits, is interrupted or times out
    pub async fn run(
        &self,
        request: &RunRequest<'_>,
        stdout: OutputSink,
        stderr: OutputSink,
        cancel: &Cancel,
    ) -> Result<RunOutcome> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("nbe-run-{}-", request.run_id))
            .tempdir()?;
        let project = ComposeProject::new(
            request.run_id,
            dir.path(),
            &dir.path().join(&self.config.compose_file),
        );

        let result = self
            .execute(request, &project, stdout, stderr, cancel)
            .await;

        self.teardown(&project).await;
        drop(dir);

        let phase = match &result {
            Ok(RunOutcome::Completed) => RunPhase::Completed,
            Ok(RunOutcome::Cancelled(_)) => RunPhase::Cancelled,
            Err(_) => RunPhase::Failed,
        };
        log_phase(request.run_id, phase);

        result
    }

    async fn execute(
        &self,
        request: &RunRequest<'_>,
        project: &ComposeProject,
        stdout: OutputSink,
        stderr: OutputSink,
        cancel: &Cancel,
    ) -> Result<RunOutcome> {
        log_phase(request.run_id, RunPhase::Preparing);
        self.prepare(request, project)?;

        log_phase(request.run_id, RunPhase::Pulling);
        let pulled = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Stopping run {}: {}", request.run_id, CancelReason::Interrupt);
                return Ok(RunOutcome::Cancelled(CancelReason::Interrupt));
            }
            pulled = self.engine.output(project.pull()) => pulled,
        };
        match pulled {
            Ok(output) if output.success() => {}
            Ok(output) => tracing::warn!(
                "Pull failed for {}: {}",
                request.run_id,
                output.stderr_lossy().trim()
            ),
            Err(e) => tracing::warn!("Pull failed for {}: {}", request.run_id, e),
        }

        log_phase(request.run_id, RunPhase::Running);
        let command = match request.mode {
            RunMode::Headless => project.run(&self.config.app_service, false),
            RunMode::Foreground { no_ansi } => project.up(no_ansi),
        };
        let mut handle = self.engine.spawn(command, stdout, stderr)?;

        let reason = tokio::select! {
            code = handle.wait() => {
                let code = code?;
                return match code {
                    Some(0) => Ok(RunOutcome::Completed),
                    code => Err(NbeError::Run {
                        code,
                        stderr: String::new(),
                    }),
                };
            }
            _ = cancel.cancelled() => CancelReason::Interrupt,
            _ = deadline_elapsed(request.deadline) => CancelReason::Deadline,
        };

        tracing::info!("Stopping run {}: {}", request.run_id, reason);
        if let Some(code) = handle.stop(self.config.teardown_timeout()).await {
            tracing::debug!("Run {} exited with {:?}", request.run_id, code);
        }

        Ok(RunOutcome::Cancelled(reason))
    }

    /// Fill the project directory
    fn prepare(&self, request: &RunRequest<'_>, project: &ComposeProject) -> Result<()> {
        let composer = BuildContextComposer::new(self.config, self.repo);
        composer.overlay(request.example, &project.dir)?;

        let compose_file = resolver::resolve(self.config, self.repo, request.example, request.cluster)?;
        std::fs::copy(&compose_file, &project.file).map_err(|e| {
            NbeError::Compose(format!("copy {}: {}", compose_file.display(), e))
        })?;

        std::fs::write(
            project.dir.join(&self.config.env_file),
            format!("IMAGE_TAG={}\n", request.image),
        )?;

        if let Some(versions) = request.versions {
            versions.apply(&project.dir)?;
        }
        Ok(())
    }

    async fn teardown(&self, project: &ComposeProject) {
        log_phase(&project.name, RunPhase::TearingDown);

        let command = project.down(self.config.teardown_timeout());
        match self.engine.output(command).await {
            Ok(output) if output.success() => {}
            Ok(output) => tracing::warn!(
                "Teardown of {} failed: {}",
                project.name,
                output.stderr_lossy().trim()
            ),
            Err(e) => tracing::warn!("Teardown of {} failed: {}", project.name, e),
        }
    }
}

fn log_phase(run_id: &str, phase: RunPhase) {
    tracing::info!("Run {}: {}", run_id, phase);
}

async fn deadline_elapsed(deadline: Option<Duration>) {
    match deadline {
        Some(deadline) => tokio::time::sleep(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{MockEngine, RunBehavior};
    use crate::engine::SharedBuffer;
    use tempfile::{tempdir, TempDir};

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn repo() -> TempDir {
        let repo = tempdir().unwrap();
        let root = repo.path();
        write(&root.join("docker/go/Dockerfile"), "FROM golang\n");
        write(
            &root.join("docker/docker-compose.yaml"),
            "services:\n  nats:\n    image: nats:2.9.0\n  app:\n    image: ${IMAGE_TAG}\n",
        );
        write(&root.join("examples/messaging/pub-sub/go/main.go"), "package main\n");
        repo
    }

    fn request<'r>(example: &'r ExampleRef, run_id: &'r str) -> RunRequest<'r> {
        RunRequest {
            example,
            run_id,
            image: "nbe/messaging/pub-sub/go:abc",
            cluster: false,
            mode: RunMode::Headless,
            versions: None,
            deadline: None,
        }
    }

    fn run_dirs(run_id: &str) -> usize {
        std::fs::read_dir(std::env::temp_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with(&format!("nbe-run-{}-", run_id))
            })
            .count()
    }

    #[tokio::test]
    async fn test_completed_run() {
        let repo = repo();
        let config = Config::default();
        let example = config.example_ref(repo.path(), "messaging/pub-sub/go").unwrap();
        let engine = MockEngine::new().with_run(RunBehavior::Exit {
            code: 0,
            stdout: "hello\n".to_string(),
            stderr: String::new(),
        });
        let stdout = SharedBuffer::new();

        let outcome = RunOrchestrator::new(&engine, &config, repo.path())
            .run(
                &request(&example, "okrun001"),
                stdout.sink(),
                Box::new(tokio::io::sink()),
                &Cancel::never(),
            )
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(stdout.to_string_lossy(), "hello\n");

        let commands = engine.commands();
        let order: Vec<&str> = commands.iter().map(|c| c.args[7].as_str()).collect();
        assert_eq!(order, vec!["pull", "run", "down"]);
        assert!(commands.iter().all(|c| c.args[2] == "okrun001"));
        assert_eq!(run_dirs("okrun001"), 0);
    }

    #[tokio::test]
    async fn test_failed_run_tears_down_once() {
        let repo = repo();
        let config = Config::default();
        let example = config.example_ref(repo.path(), "messaging/pub-sub/go").unwrap();
        let engine = MockEngine::new().with_run(RunBehavior::Exit {
            code: 2,
            stdout: String::new(),
            stderr: "boom\n".to_string(),
        });

        let result = RunOrchestrator::new(&engine, &config, repo.path())
            .run(
                &request(&example, "failrun1"),
                Box::new(tokio::io::sink()),
                Box::new(tokio::io::sink()),
                &Cancel::never(),
            )
            .await;

        assert!(matches!(result, Err(NbeError::Run { code: Some(2), .. })));
        assert_eq!(engine.count("down"), 1);
        assert_eq!(run_dirs("failrun1"), 0);
    }

    #[tokio::test]
    async fn test_spawn_error_tears_down_once() {
        let repo = repo();
        let config = Config::default();
        let example = config.example_ref(repo.path(), "messaging/pub-sub/go").unwrap();
        let engine = MockEngine::new().with_run(RunBehavior::SpawnError);

        let result = RunOrchestrator::new(&engine, &config, repo.path())
            .run(
                &request(&example, "spawnerr"),
                Box::new(tokio::io::sink()),
                Box::new(tokio::io::sink()),
                &Cancel::never(),
            )
            .await;

        assert!(matches!(result, Err(NbeError::Engine(_))));
        assert_eq!(engine.count("down"), 1);
    }

    #[tokio::test]
    async fn test_preparation_error_tears_down_once() {
        let repo = repo();
        let config = Config::default();
        let example = config.example_ref(repo.path(), "messaging/missing/go").unwrap();
        let engine = MockEngine::new();

        let result = RunOrchestrator::new(&engine, &config, repo.path())
            .run(
                &request(&example, "preperr1"),
                Box::new(tokio::io::sink()),
                Box::new(tokio::io::sink()),
                &Cancel::never(),
            )
            .await;

        assert!(matches!(result, Err(NbeError::Compose(_))));
        assert_eq!(engine.count("run"), 0);
        assert_eq!(engine.count("down"), 1);
        assert_eq!(run_dirs("preperr1"), 0);
    }

    #[tokio::test]
    async fn test_deadline_cancels_and_tears_down() {
        let repo = repo();
        let config = Config::default();
        let example = config.example_ref(repo.path(), "messaging/pub-sub/go").unwrap();
        let engine = MockEngine::new().with_run(RunBehavior::Hang);

        let mut req = request(&example, "deadline");
        req.deadline = Some(Duration::from_millis(50));

        let outcome = RunOrchestrator::new(&engine, &config, repo.path())
            .run(
                &req,
                Box::new(tokio::io::sink()),
                Box::new(tokio::io::sink()),
                &Cancel::never(),
            )
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Cancelled(CancelReason::Deadline));
        assert_eq!(engine.interrupts(), 1);
        assert_eq!(engine.count("down"), 1);
    }

    #[tokio::test]
    async fn test_interrupt_cancels_and_tears_down() {
        let repo = repo();
        let config = Config::default();
        let example = config.example_ref(repo.path(), "messaging/pub-sub/go").unwrap();
        let engine = MockEngine::new().with_run(RunBehavior::Hang);

        let (trigger, cancel) = Cancel::new();
        let orchestrator = RunOrchestrator::new(&engine, &config, repo.path());
        let req = request(&example, "ctrlc001");

        let (outcome, _) = tokio::join!(
            orchestrator.run(
                &req,
                Box::new(tokio::io::sink()),
                Box::new(tokio::io::sink()),
                &cancel,
            ),
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                trigger.cancel();
            }
        );
        let outcome = outcome.unwrap();

        assert_eq!(outcome, RunOutcome::Cancelled(CancelReason::Interrupt));
        assert_eq!(engine.interrupts(), 1);
        assert_eq!(engine.count("down"), 1);
        assert_eq!(run_dirs("ctrlc001"), 0);
    }

    #[tokio::test]
    async fn test_cancel_before_run_skips_app() {
        let repo = repo();
        let config = Config::default();
        let example = config.example_ref(repo.path(), "messaging/pub-sub/go").unwrap();
        let engine = MockEngine::new().with_run(RunBehavior::Hang);
        let (trigger, cancel) = Cancel::new();
        trigger.cancel();

        let outcome = RunOrchestrator::new(&engine, &config, repo.path())
            .run(
                &request(&example, "precancl"),
                Box::new(tokio::io::sink()),
                Box::new(tokio::io::sink()),
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Cancelled(CancelReason::Interrupt));
        assert_eq!(engine.count("run"), 0);
        assert_eq!(engine.count("down"), 1);
        assert_eq!(run_dirs("precancl"), 0);
    }

    #[tokio::test]
    async fn test_unresponsive_app_still_torn_down() {
        let repo = repo();
        let config = Config {
            teardown_timeout_secs: 1,
            ..Default::default()
        };
        let example = config.example_ref(repo.path(), "messaging/pub-sub/go").unwrap();
        let engine = MockEngine::new().with_run(RunBehavior::IgnoreInterrupt);

        let mut req = request(&example, "stuckrun");
        req.deadline = Some(Duration::from_millis(50));

        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            RunOrchestrator::new(&engine, &config, repo.path()).run(
                &req,
                Box::new(tokio::io::sink()),
                Box::new(tokio::io::sink()),
                &Cancel::never(),
            ),
        )
        .await
        .expect("run returned after the teardown timeout")
        .unwrap();

        assert_eq!(outcome, RunOutcome::Cancelled(CancelReason::Deadline));
        assert_eq!(engine.interrupts(), 1);
        assert_eq!(engine.count("down"), 1);
        assert_eq!(run_dirs("stuckrun"), 0);
    }

    #[tokio::test]
    async fn test_teardown_failure_does_not_mask_result() {
        let repo = repo();
        let config = Config::default();
        let example = config.example_ref(repo.path(), "messaging/pub-sub/go").unwrap();
        let engine = MockEngine::new().with_pull_code(1).with_down_code(1);

        let outcome = RunOrchestrator::new(&engine, &config, repo.path())
            .run(
                &request(&example, "downfail"),
                Box::new(tokio::io::sink()),
                Box::new(tokio::io::sink()),
                &Cancel::never(),
            )
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Completed);
    }

    #[tokio::test]
    async fn test_project_dir_contents() {
        let repo = repo();
        let config = Config::default();
        let example = config.example_ref(repo.path(), "messaging/pub-sub/go").unwrap();
        let engine = MockEngine::new();
        let orchestrator = RunOrchestrator::new(&engine, &config, repo.path());

        let versions = Versions {
            server: Some("2.10.4".to_string()),
            ..Default::default()
        };
        let mut req = request(&example, "prepdir1");
        req.versions = Some(&versions);

        let dir = tempdir().unwrap();
        let project = ComposeProject::new("prepdir1", dir.path(), &dir.path().join("docker-compose.yaml"));
        orchestrator.prepare(&req, &project).unwrap();

        let env = std::fs::read_to_string(dir.path().join(".env")).unwrap();
        assert_eq!(env, "IMAGE_TAG=nbe/messaging/pub-sub/go:abc\n");
        let compose = std::fs::read_to_string(&project.file).unwrap();
        assert!(compose.contains("image: docker.io/nats:2.10.4"));
        assert!(dir.path().join("main.go").is_file());
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_isolated() {
        let repo = repo();
        let config = Config::default();
        let example = config.example_ref(repo.path(), "messaging/pub-sub/go").unwrap();
        let engine = MockEngine::new();
        let orchestrator = RunOrchestrator::new(&engine, &config, repo.path());

        let cancel = Cancel::never();
        let req_a = request(&example, "concur-a");
        let req_b = request(&example, "concur-b");

        let (a, b) = tokio::join!(
            orchestrator.run(
                &req_a,
                Box::new(tokio::io::sink()),
                Box::new(tokio::io::sink()),
                &cancel,
            ),
            orchestrator.run(
                &req_b,
                Box::new(tokio::io::sink()),
                Box::new(tokio::io::sink()),
                &cancel,
            )
        );
        assert!(a.is_ok() && b.is_ok());

        let dirs: std::collections::HashSet<String> = engine
            .commands()
            .iter()
            .map(|c| c.args[4].clone())
            .collect();
        assert_eq!(dirs.len(), 2);
        assert_eq!(engine.count("concur-a"), 3);
        assert_eq!(engine.count("concur-b"), 3);
    }
}
