//! Compose file resolution
//!
//! The compose file for a run is the first one found, from most to least
//! specific:
//!
//! 1. the example client directory
//! 2. the example directory
//! 3. the language defaults, `docker/<language>/`
//! 4. the global `docker/docker-compose.yaml`, or its cluster variant

use crate::config::{Config, ExampleRef};
use crate::error::{NbeError, Result};
use std::path::{Path, PathBuf};

/// Candidate compose files in precedence order
pub fn candidates(
    config: &Config,
    repo: &Path,
    example: &ExampleRef,
    cluster: bool,
) -> Vec<PathBuf> {
    let global = if cluster {
        &config.cluster_compose_file
    } else {
        &config.compose_file
    };

    vec![
        example.client_dir.join(&config.compose_file),
        example.example_dir.join(&config.compose_file),
        config
            .language_dir(repo, &example.language)
            .join(&config.compose_file),
        config.docker_root(repo).join(global),
    ]
}

/// Find the compose file for an example
pub fn resolve(config: &Config, repo: &Path, example: &ExampleRef, cluster: bool) -> Result<PathBuf> {
    for candidate in candidates(config, repo, example, cluster) {
        match std::fs::metadata(&candidate) {
            Ok(metadata) if metadata.is_file() => {
                tracing::debug!("Using compose file: {}", candidate.display());
                return Ok(candidate);
            }
            Ok(_) => continue,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                return Err(NbeError::Compose(format!("{}: {}", candidate.display(), e)));
            }
        }
    }

    Err(NbeError::NoDefault {
        what: "compose file".to_string(),
        language: example.language.clone(),
    })
}
