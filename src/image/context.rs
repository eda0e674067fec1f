//! Build context composition
//!
//! A build context is the language's default directory (`docker/<language>`)
//! with the example client's own files copied over it. The merged directory
//! is temporary and is removed when the returned [`TempDir`] is dropped.

use super::versions::Versions;
use crate::compose::resolver;
use crate::config::{Config, ExampleRef};
use crate::error::{NbeError, Result};
use std::path::Path;
use tempfile::TempDir;
use walkdir::WalkDir;

/// Build file expected at the root of every build context
pub const DOCKERFILE_NAME: &str = "Dockerfile";

/// Recursively copy the contents of `src` into `dst`, overwriting files
pub fn copy_dir_contents(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| NbeError::Internal(e.to_string()))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Merges language defaults and example files into build directories
pub struct BuildContextComposer<'a> {
    config: &'a Config,
    repo: &'a Path,
}

impl<'a> BuildContextComposer<'a> {
    /// Create a composer for a repository
    pub fn new(config: &'a Config, repo: &'a Path) -> Self {
        Self { config, repo }
    }

    /// Compose a fresh temporary build context for one run
    pub fn compose(
        &self,
        example: &ExampleRef,
        run_id: &str,
        versions: Option<&Versions>,
    ) -> Result<TempDir> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("nbe-build-{}-", run_id))
            .tempdir()?;

        self.overlay(example, dir.path())?;

        if let Some(versions) = versions {
            versions.apply(dir.path())?;
        }

        if !dir.path().join(DOCKERFILE_NAME).is_file() {
            return Err(NbeError::NoDefault {
                what: DOCKERFILE_NAME.to_string(),
                language: example.language.clone(),
            });
        }

        tracing::debug!(
            "Composed build context for {} in {}",
            example.name,
            dir.path().display()
        );
        Ok(dir)
    }

    /// Copy the language defaults, then the example files, into `dir`
    pub fn overlay(&self, example: &ExampleRef, dir: &Path) -> Result<()> {
        let defaults = self.config.language_dir(self.repo, &example.language);
        if !defaults.is_dir() {
            return Err(NbeError::NoDefault {
                what: "build context".to_string(),
                language: example.language.clone(),
            });
        }
        if !example.client_dir.is_dir() {
            return Err(NbeError::Compose(format!(
                "example directory not found: {}",
                example.client_dir.display()
            )));
        }

        copy_dir_contents(&defaults, dir)
            .map_err(|e| NbeError::Compose(format!("copy {}: {}", defaults.display(), e)))?;
        copy_dir_contents(&example.client_dir, dir).map_err(|e| {
            NbeError::Compose(format!("copy {}: {}", example.client_dir.display(), e))
        })?;
        Ok(())
    }

    /// Write the example's sources, defaults and compose file to `dir`
    pub fn eject(&self, example: &ExampleRef, dir: &Path) -> Result<()> {
        if dir.exists() {
            if !dir.is_dir() {
                return Err(NbeError::Compose(format!("not a directory: {}", dir.display())));
            }
            if std::fs::read_dir(dir)?.next().is_some() {
                return Err(NbeError::Compose(format!(
                    "output directory must be empty: {}",
                    dir.display()
                )));
            }
        } else {
            std::fs::create_dir_all(dir)?;
        }

        let compose_file = resolver::resolve(self.config, self.repo, example, false)?;
        std::fs::copy(&compose_file, dir.join(&self.config.compose_file))?;
        self.overlay(example, dir)?;

        tracing::info!("Ejected {} to {}", example.name, dir.display());
        Ok(())
    }
}
