//! Image builder
//!
//! Builds a composed build context with `docker build` and removes the
//! resulting image once the run is over.

use super::context::DOCKERFILE_NAME;
use crate::engine::{Cancel, Engine, EngineCommand, OutputSink, SharedBuffer};
use crate::error::{NbeError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Image tag for one run: `<namespace>/<example>:<run id>`
pub fn image_tag(namespace: &str, example: &str, run_id: &str) -> String {
    format!("{}/{}:{}", namespace, example, run_id)
}

/// Build context for image building
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Context directory
    pub context_dir: PathBuf,
    /// Build file path
    pub build_file: PathBuf,
    /// Tag for the built image
    pub tag: String,
}

impl BuildContext {
    /// Create a build context using the Dockerfile at the root of `context_dir`
    pub fn new(context_dir: &Path, tag: &str) -> Self {
        Self {
            context_dir: context_dir.to_path_buf(),
            build_file: context_dir.join(DOCKERFILE_NAME),
            tag: tag.to_string(),
        }
    }

    /// Set build file path
    pub fn build_file(mut self, path: PathBuf) -> Self {
        self.build_file = path;
        self
    }

    fn command(&self) -> EngineCommand {
        let mut args = vec!["build".to_string(), "--tag".to_string(), self.tag.clone()];
        if self.build_file != self.context_dir.join(DOCKERFILE_NAME) {
            args.push("--file".to_string());
            args.push(self.build_file.display().to_string());
        }
        args.push(self.context_dir.display().to_string());
        EngineCommand::new(args)
    }
}

/// Image builder
pub struct ImageBuilder<'a, E: Engine> {
    engine: &'a E,
    stop_grace: Duration,
}

impl<'a, E: Engine> ImageBuilder<'a, E> {
    /// Create a new image builder
    pub fn new(engine: &'a E) -> Self {
        Self {
            engine,
            stop_grace: Duration::from_secs(3),
        }
    }

    /// How long an interrupted build may take to exit
    pub fn stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Build the image and return its tag
    ///
    /// Build output is streamed to stdout only when `verbose`; stderr is
    /// always captured and attached to the error on failure. A fired
    /// `cancel` interrupts the build and yields [`NbeError::Interrupted`].
    pub async fn build(
        &self,
        context: &BuildContext,
        verbose: bool,
        cancel: &Cancel,
    ) -> Result<String> {
        tracing::info!("Building image: {}", context.tag);

        let stderr = SharedBuffer::new();
        let stdout: OutputSink = if verbose {
            Box::new(tokio::io::stdout())
        } else {
            Box::new(tokio::io::sink())
        };

        let mut handle = self
            .engine
            .spawn(context.command(), stdout, stderr.sink())?;
        let code = tokio::select! {
            code = handle.wait() => code?,
            _ = cancel.cancelled() => {
                tracing::info!("Stopping build of {}", context.tag);
                handle.stop(self.stop_grace).await;
                return Err(NbeError::Interrupted);
            }
        };

        if code != Some(0) {
            return Err(NbeError::Build {
                message: format!("build of {} exited with {:?}", context.tag, code),
                stderr: stderr.to_string_lossy(),
            });
        }

        tracing::info!("Built image: {}", context.tag);
        Ok(context.tag.clone())
    }

    /// Remove an image; failures are only logged
    pub async fn remove_image(&self, tag: &str) {
        match self.engine.output(EngineCommand::new(["rmi", tag])).await {
            Ok(output) if output.success() => tracing::debug!("Removed image: {}", tag),
            Ok(output) => tracing::warn!(
                "Failed to remove image {}: {}",
                tag,
                output.stderr_lossy().trim()
            ),
            Err(e) => tracing::warn!("Failed to remove image {}: {}", tag, e),
        }
    }
}
