//! Version matrix
//!
//! Runs examples against every combination of server and client library
//! versions and reports which combinations work. Jobs are independent runs
//! with their own run id, so they execute concurrently on a bounded pool.

use super::{BuildRun, ExampleRunner};
use crate::compose::RunOutcome;
use crate::config::Config;
use crate::engine::{Cancel, Engine, SharedBuffer};
use crate::error::{NbeError, Result};
use crate::image::versions::NO_WEBSOCKET_RULE;
use crate::image::Versions;
use crate::language::LanguageTable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Versions to test, per ecosystem
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Matrix {
    pub server: Vec<String>,
    pub cli: Vec<String>,
    pub go: Vec<String>,
    pub python: Vec<String>,
    pub deno: Vec<String>,
    pub node: Vec<String>,
    pub rust: Vec<String>,
    pub java: Vec<String>,
    pub dotnet: Vec<String>,
}

/// One server version x client version run of an example
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub example: String,
    pub client: String,
    pub server_version: String,
    pub client_version: String,
}

/// Result of one job
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    #[serde(flatten)]
    pub job: Job,
    pub error: Option<String>,
}

impl JobResult {
    pub fn ok(&self) -> bool {
        self.error.is_none()
    }
}

impl Matrix {
    /// Load a matrix from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| NbeError::Yaml(format!("{}: {}", path.display(), e)))
    }

    /// Versions listed for a client
    pub fn client_versions(&self, client: &str) -> Result<&[String]> {
        let versions = match client {
            "cli" => &self.cli,
            "go" => &self.go,
            "python" => &self.python,
            "deno" => &self.deno,
            "node" => &self.node,
            "websocket" => {
                return Err(NbeError::UnsupportedLanguage(NO_WEBSOCKET_RULE.to_string()))
            }
            "rust" => &self.rust,
            "java" => &self.java,
            "dotnet" => &self.dotnet,
            other => {
                return Err(NbeError::UnsupportedLanguage(format!("unknown client: {}", other)))
            }
        };
        Ok(versions)
    }

    /// Expand examples into jobs; fails before producing any job on an unknown client
    pub fn jobs(&self, examples: &[String]) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        for example in examples {
            let example = example.trim_end_matches('/');
            let client = example.rsplit('/').next().unwrap_or(example);
            let versions = self.client_versions(client)?;

            for server in &self.server {
                for version in versions {
                    jobs.push(Job {
                        example: example.to_string(),
                        client: client.to_string(),
                        server_version: server.clone(),
                        client_version: version.clone(),
                    });
                }
            }
        }
        Ok(jobs)
    }
}

/// Results of a matrix run
#[derive(Debug, Clone, Serialize)]
pub struct MatrixReport {
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub servers: Vec<String>,
    /// Client versions tested, per client
    pub client_versions: BTreeMap<String, Vec<String>>,
    pub results: Vec<JobResult>,
}

impl MatrixReport {
    /// Whether every job succeeded
    pub fn all_ok(&self) -> bool {
        self.results.iter().all(JobResult::ok)
    }

    /// Render one OK/ERR table per client and example
    ///
    /// Rows are server versions, columns are client versions.
    pub fn render(&self, languages: &LanguageTable) -> String {
        let mut grouped: BTreeMap<&str, BTreeMap<&str, Vec<&JobResult>>> = BTreeMap::new();
        for result in &self.results {
            grouped
                .entry(result.job.client.as_str())
                .or_default()
                .entry(result.job.example.as_str())
                .or_default()
                .push(result);
        }

        let mut out = String::new();
        for (client, examples) in grouped {
            let label = languages
                .get(client)
                .map(|l| l.label.clone())
                .unwrap_or_else(|_| client.to_string());
            let versions = self
                .client_versions
                .get(client)
                .map(Vec::as_slice)
                .unwrap_or_default();

            let _ = writeln!(out, "# {}", label);
            for (example, results) in examples {
                let _ = writeln!(out, "## {}", example);
                let _ = writeln!(out, "| | {} |", versions.join(" | "));
                let _ = writeln!(out, "|---|{}", "---|".repeat(versions.len()));

                for server in &self.servers {
                    let cells: Vec<&str> = versions
                        .iter()
                        .map(|version| {
                            let result = results.iter().find(|r| {
                                &r.job.server_version == server && &r.job.client_version == version
                            });
                            match result {
                                Some(r) if r.ok() => "OK",
                                Some(_) => "ERR",
                                None => "-",
                            }
                        })
                        .collect();
                    let _ = writeln!(out, "| {} | {} |", server, cells.join(" | "));
                }
                out.push('\n');
            }
        }
        out
    }
}

/// Runs matrix jobs on a bounded worker pool
pub struct MatrixRunner<E: Engine + 'static> {
    engine: Arc<E>,
    config: Arc<Config>,
    repo: PathBuf,
    workers: usize,
}

impl<E: Engine + 'static> MatrixRunner<E> {
    /// Create a runner with one worker per CPU
    pub fn new(engine: Arc<E>, config: Arc<Config>, repo: &Path) -> Self {
        Self {
            engine,
            config,
            repo: repo.to_path_buf(),
            workers: num_cpus::get(),
        }
    }

    /// Set the number of concurrent jobs
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Run every job of the matrix
    ///
    /// Cancelling interrupts running jobs and skips queued ones.
    pub async fn run(
        &self,
        matrix: &Matrix,
        examples: &[String],
        cancel: &Cancel,
    ) -> Result<MatrixReport> {
        let jobs = matrix.jobs(examples)?;
        let mut client_versions = BTreeMap::new();
        for job in &jobs {
            if !client_versions.contains_key(&job.client) {
                let versions = matrix.client_versions(&job.client)?.to_vec();
                client_versions.insert(job.client.clone(), versions);
            }
        }

        tracing::info!("Running {} matrix jobs on {} workers", jobs.len(), self.workers);

        let started_at = Utc::now();
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut set = JoinSet::new();

        for job in jobs {
            let semaphore = semaphore.clone();
            let engine = self.engine.clone();
            let config = self.config.clone();
            let repo = self.repo.clone();
            let cancel = cancel.clone();

            set.spawn(async move {
                let error = match semaphore.acquire_owned().await {
                    Ok(_permit) if !cancel.is_cancelled() => {
                        run_job(&*engine, &config, &repo, &job, &cancel).await.err()
                    }
                    Ok(_) => Some("cancelled".to_string()),
                    Err(e) => Some(e.to_string()),
                };

                tracing::info!(
                    "{}: server {} x {} {} done",
                    job.example, job.server_version, job.client, job.client_version
                );
                JobResult { job, error }
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            let result = joined.map_err(|e| NbeError::Internal(format!("matrix job failed: {}", e)))?;
            if let Some(error) = &result.error {
                tracing::warn!(
                    "{} server {} x {} {}: {}",
                    result.job.example,
                    result.job.server_version,
                    result.job.client,
                    result.job.client_version,
                    error
                );
            }
            results.push(result);
        }
        results.sort_by(|a, b| {
            (&a.job.client, &a.job.example, &a.job.server_version, &a.job.client_version).cmp(&(
                &b.job.client,
                &b.job.example,
                &b.job.server_version,
                &b.job.client_version,
            ))
        });

        let elapsed = start.elapsed();
        tracing::info!("Matrix finished in {:.1}s", elapsed.as_secs_f64());

        Ok(MatrixReport {
            started_at,
            elapsed_secs: elapsed.as_secs_f64(),
            servers: matrix.server.clone(),
            client_versions,
            results,
        })
    }
}

async fn run_job<E: Engine>(
    engine: &E,
    config: &Config,
    repo: &Path,
    job: &Job,
    cancel: &Cancel,
) -> std::result::Result<(), String> {
    let mut versions = Versions {
        server: Some(job.server_version.clone()),
        ..Default::default()
    };
    versions
        .set_client(&job.client, &job.client_version)
        .map_err(|e| e.to_string())?;

    let run = BuildRun::new(repo, &job.example).versions(versions);
    let output = SharedBuffer::new();

    match ExampleRunner::new(engine, config)
        .execute(&run, output.sink(), output.sink(), cancel)
        .await
    {
        Ok(RunOutcome::Completed) => Ok(()),
        Ok(RunOutcome::Cancelled(reason)) => Err(reason.to_string()),
        Err(e) => Err(format!("{}\n{}", e, output.to_string_lossy())),
    }
}
