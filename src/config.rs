//! Repository layout and run configuration
//!
//! Configuration is read from `nbe.yaml` at the repository root, falling
//! back to `<config dir>/nbe/config.yaml` and then to built-in defaults.
//! Every field is optional in the file.

use crate::error::{NbeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file name looked up at the repository root
pub const CONFIG_FILE: &str = "nbe.yaml";

/// nbe configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory (relative to the repo) holding per-language defaults
    pub docker_dir: String,
    /// Directory (relative to the repo) holding the examples tree
    pub examples_dir: String,
    /// Image namespace used for built tags
    pub namespace: String,
    /// Compose file name searched at every precedence level
    pub compose_file: String,
    /// Global cluster variant of the compose file
    pub cluster_compose_file: String,
    /// Environment file written into the compose project directory
    pub env_file: String,
    /// Compose service that runs the example
    pub app_service: String,
    /// Container engine binary
    pub engine: String,
    /// Timeout handed to `compose down`
    pub teardown_timeout_secs: u64,
    /// Wall-clock deadline for a single run
    pub run_timeout_secs: Option<u64>,
    /// Captured output file name inside each client directory
    pub output_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docker_dir: "docker".to_string(),
            examples_dir: "examples".to_string(),
            namespace: "nbe".to_string(),
            compose_file: "docker-compose.yaml".to_string(),
            cluster_compose_file: "docker-compose.cluster.yaml".to_string(),
            env_file: ".env".to_string(),
            app_service: "app".to_string(),
            engine: "docker".to_string(),
            teardown_timeout_secs: 3,
            run_timeout_secs: None,
            output_file: "output.txt".to_string(),
        }
    }
}

impl Config {
    /// Load configuration for a repository
    pub fn load(repo: &Path) -> Result<Self> {
        let local = repo.join(CONFIG_FILE);
        if local.is_file() {
            return Self::from_file(&local);
        }

        if let Some(global) = dirs::config_dir().map(|d| d.join("nbe").join("config.yaml")) {
            if global.is_file() {
                return Self::from_file(&global);
            }
        }

        Ok(Self::default())
    }

    /// Parse configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| NbeError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Reject values that would produce broken commands or paths
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(NbeError::InvalidConfig("namespace must not be empty".to_string()));
        }
        if self.app_service.is_empty() {
            return Err(NbeError::InvalidConfig("app_service must not be empty".to_string()));
        }
        if self.engine.is_empty() {
            return Err(NbeError::InvalidConfig("engine must not be empty".to_string()));
        }
        Ok(())
    }

    /// Timeout passed to `compose down`
    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_secs(self.teardown_timeout_secs)
    }

    /// Optional run deadline
    pub fn run_deadline(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    /// `<repo>/<docker_dir>`
    pub fn docker_root(&self, repo: &Path) -> PathBuf {
        repo.join(&self.docker_dir)
    }

    /// `<repo>/<docker_dir>/<language>`
    pub fn language_dir(&self, repo: &Path, language: &str) -> PathBuf {
        self.docker_root(repo).join(language)
    }

    /// Prefix an example path with the examples directory unless it already is
    pub fn example_path(&self, example: &str) -> PathBuf {
        let example = example.trim_end_matches('/');
        let prefix = format!("{}/", self.examples_dir);
        if example.starts_with(&prefix) {
            PathBuf::from(example)
        } else {
            Path::new(&self.examples_dir).join(example)
        }
    }

    /// Locate an example client inside a repository
    pub fn example_ref(&self, repo: &Path, example: &str) -> Result<ExampleRef> {
        let relative = self.example_path(example);
        let language = relative
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| NbeError::Compose(format!("invalid example path: {}", example)))?
            .to_string();

        let name = relative
            .strip_prefix(&self.examples_dir)
            .unwrap_or(&relative)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
            .collect::<Vec<_>>()
            .join("/");
        if !name.contains('/') {
            return Err(NbeError::Compose(format!(
                "example path must name a client directory: {}",
                example
            )));
        }

        let client_dir = repo.join(&relative);
        let example_dir = client_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| repo.to_path_buf());

        Ok(ExampleRef {
            name,
            client_dir,
            example_dir,
            language,
        })
    }
}

/// One example client located in a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExampleRef {
    /// Path below the examples directory, e.g. `messaging/pub-sub/go`
    pub name: String,
    /// `<repo>/examples/<category>/<example>/<client>`
    pub client_dir: PathBuf,
    /// Parent of the client directory
    pub example_dir: PathBuf,
    /// Client directory name, which selects the language defaults
    pub language: String,
}
