//! Example runner
//!
//! Glue between the build and run halves: a [`BuildRun`] describes one
//! invocation, [`ExampleRunner`] composes the build context, builds the
//! image, runs it and removes the image afterwards. Output generation and
//! the version matrix are built on top of it.

pub mod matrix;

pub use matrix::{Matrix, MatrixReport, MatrixRunner};

use crate::compose::{CancelReason, RunMode, RunOrchestrator, RunOutcome, RunRequest};
use crate::config::{Config, ExampleRef};
use crate::engine::{Cancel, Engine, OutputSink, SharedBuffer};
use crate::error::{NbeError, Result};
use crate::image::{image_tag, BuildContext, BuildContextComposer, ImageBuilder, Versions};
use crate::index::Root;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Generate a short run id
pub fn new_run_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// One build and run of an example client
#[derive(Debug, Clone)]
pub struct BuildRun {
    /// Repository root
    pub repo: PathBuf,
    /// Example path; the leading examples directory may be omitted
    pub example: String,
    /// Run id scoping temp dirs, the image tag and the compose project
    pub name: String,
    /// Stream build output
    pub verbose: bool,
    pub versions: Option<Versions>,
    pub cluster: bool,
    /// Keep the built image after the run
    pub keep_image: bool,
    pub mode: RunMode,
    pub deadline: Option<Duration>,
    /// Run this image instead of building one
    pub image: Option<String>,
}

impl BuildRun {
    /// Create a run with a fresh run id
    pub fn new(repo: &Path, example: &str) -> Self {
        Self {
            repo: repo.to_path_buf(),
            example: example.to_string(),
            name: new_run_id(),
            verbose: false,
            versions: None,
            cluster: false,
            keep_image: false,
            mode: RunMode::Headless,
            deadline: None,
            image: None,
        }
    }

    /// Use an explicit run id; empty names keep the generated one
    pub fn name(mut self, name: &str) -> Self {
        if !name.is_empty() {
            self.name = name.to_string();
        }
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn versions(mut self, versions: Versions) -> Self {
        self.versions = Some(versions);
        self
    }

    pub fn cluster(mut self, cluster: bool) -> Self {
        self.cluster = cluster;
        self
    }

    pub fn keep_image(mut self, keep: bool) -> Self {
        self.keep_image = keep;
        self
    }

    pub fn mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn image(mut self, image: &str) -> Self {
        self.image = Some(image.to_string());
        self
    }
}

/// What [`ExampleRunner::generate_output`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStatus {
    Written,
    /// The output file already existed
    Skipped,
    /// The run was interrupted; nothing was written
    Interrupted,
}

/// Options for generating outputs of many examples
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Regenerate existing output files
    pub recreate: bool,
    /// Stop at the first failing example
    pub exit_on_error: bool,
    /// Glob over client paths, e.g. `examples/messaging/*/go`
    pub filter: Option<String>,
    pub deadline: Option<Duration>,
}

/// Counts from a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerateSummary {
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Builds and runs examples
pub struct ExampleRunner<'a, E: Engine> {
    engine: &'a E,
    config: &'a Config,
}

impl<'a, E: Engine> ExampleRunner<'a, E> {
    pub fn new(engine: &'a E, config: &'a Config) -> Self {
        Self { engine, config }
    }

    /// Build the example image and return its tag
    pub async fn build(&self, run: &BuildRun, cancel: &Cancel) -> Result<String> {
        let example = self.config.example_ref(&run.repo, &run.example)?;
        self.build_image(run, &example, cancel).await
    }

    async fn build_image(
        &self,
        run: &BuildRun,
        example: &ExampleRef,
        cancel: &Cancel,
    ) -> Result<String> {
        let context_dir = BuildContextComposer::new(self.config, &run.repo).compose(
            example,
            &run.name,
            run.versions.as_ref(),
        )?;

        let tag = image_tag(&self.config.namespace, &example.name, &run.name);
        ImageBuilder::new(self.engine)
            .stop_grace(self.config.teardown_timeout())
            .build(&BuildContext::new(context_dir.path(), &tag), run.verbose, cancel)
            .await
    }

    /// Build (unless an image is given), run, then remove the image
    ///
    /// Cancelling during the build stops it and skips the run.
    pub async fn execute(
        &self,
        run: &BuildRun,
        stdout: OutputSink,
        stderr: OutputSink,
        cancel: &Cancel,
    ) -> Result<RunOutcome> {
        let example = self.config.example_ref(&run.repo, &run.example)?;

        let (image, built) = match &run.image {
            Some(image) => (image.clone(), false),
            None => match self.build_image(run, &example, cancel).await {
                Ok(tag) => (tag, true),
                Err(NbeError::Interrupted) => {
                    tracing::info!("{}: build interrupted", run.example);
                    return Ok(RunOutcome::Cancelled(CancelReason::Interrupt));
                }
                Err(e) => return Err(e),
            },
        };

        let request = RunRequest {
            example: &example,
            run_id: &run.name,
            image: &image,
            cluster: run.cluster,
            mode: run.mode,
            versions: run.versions.as_ref(),
            deadline: run.deadline,
        };
        let result = RunOrchestrator::new(self.engine, self.config, &run.repo)
            .run(&request, stdout, stderr, cancel)
            .await;

        if built && !run.keep_image {
            ImageBuilder::new(self.engine).remove_image(&image).await;
        }

        result
    }

    /// Run the example and store its stdout next to its sources
    ///
    /// An existing output file is left alone unless `recreate` is set. On
    /// failure the error carries the captured stderr.
    pub async fn generate_output(
        &self,
        run: &BuildRun,
        recreate: bool,
        cancel: &Cancel,
    ) -> Result<OutputStatus> {
        let example = self.config.example_ref(&run.repo, &run.example)?;
        let path = example.client_dir.join(&self.config.output_file);

        match std::fs::metadata(&path) {
            Ok(_) if !recreate => {
                tracing::debug!("{} exists, skipping", path.display());
                return Ok(OutputStatus::Skipped);
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let stdout = SharedBuffer::new();
        let stderr = SharedBuffer::new();

        match self
            .execute(run, stdout.sink(), stderr.sink(), cancel)
            .await
        {
            Ok(RunOutcome::Completed) => {}
            Ok(RunOutcome::Cancelled(CancelReason::Interrupt)) => {
                return Ok(OutputStatus::Interrupted);
            }
            Ok(RunOutcome::Cancelled(CancelReason::Deadline)) => {
                return Err(NbeError::Run {
                    code: None,
                    stderr: format!("{}\n{}", CancelReason::Deadline, stderr.to_string_lossy()),
                });
            }
            Err(NbeError::Run { code, .. }) => {
                return Err(NbeError::Run {
                    code,
                    stderr: stderr.to_string_lossy(),
                });
            }
            Err(e) => return Err(e),
        }

        std::fs::write(&path, stdout.contents())?;
        tracing::info!("Wrote {}", path.display());
        Ok(OutputStatus::Written)
    }

    /// Generate outputs for every client in the index
    ///
    /// Failures are logged and the batch continues unless `exit_on_error`.
    /// Cancelling stops the running example and skips the rest.
    pub async fn generate_all(
        &self,
        repo: &Path,
        root: &Root,
        options: &GenerateOptions,
        cancel: &Cancel,
    ) -> Result<GenerateSummary> {
        let filter = options.filter.as_deref().map(glob_to_regex).transpose()?;

        let clients: Vec<String> = root
            .clients()
            .map(|(_, _, client)| {
                let path = client.path.strip_prefix(repo).unwrap_or(&client.path);
                path.to_string_lossy().replace('\\', "/")
            })
            .filter(|path| filter.as_ref().map_or(true, |re| re.is_match(path)))
            .collect();

        if filter.is_some() && clients.is_empty() {
            return Err(NbeError::InvalidConfig(format!(
                "filter has no matches: {}",
                options.filter.as_deref().unwrap_or_default()
            )));
        }

        let mut summary = GenerateSummary::default();
        for path in clients {
            if cancel.is_cancelled() {
                tracing::warn!("Interrupted, skipping {} and the rest", path);
                break;
            }
            tracing::info!("{}: generating output", path);
            let run = BuildRun::new(repo, &path).deadline(options.deadline);

            match self.generate_output(&run, options.recreate, cancel).await {
                Ok(OutputStatus::Written) => summary.written += 1,
                Ok(OutputStatus::Skipped) => summary.skipped += 1,
                Ok(OutputStatus::Interrupted) => {
                    tracing::warn!("{}: interrupted, stopping", path);
                    break;
                }
                Err(e) if options.exit_on_error => return Err(e.in_example(path)),
                Err(e) => {
                    tracing::error!("{}: {}", path, e);
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }
}

/// Translate a path glob into an anchored regex
///
/// `*` and `?` stay within one path segment, `**` crosses segments.
pub fn glob_to_regex(glob: &str) -> Result<Regex> {
    let glob = glob.trim_end_matches('/');
    let mut pattern = String::from("^");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                pattern.push_str(".*");
            }
            '*' => pattern.push_str("[^/]*"),
            '?' => pattern.push_str("[^/]"),
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push('$');

    Regex::new(&pattern).map_err(|e| NbeError::InvalidConfig(format!("invalid filter {}: {}", glob, e)))
}
