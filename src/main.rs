//! nbe - NATS by Example tooling
//!
//! This is the main CLI entry point for nbe.

use clap::{Parser, Subcommand};
use nbe::compose::{RunMode, RunOutcome};
use nbe::config::Config;
use nbe::engine::{Cancel, DockerCli, OutputSink};
use nbe::error::{NbeError, Result};
use nbe::image::{BuildContextComposer, Versions};
use nbe::index::ExampleIndex;
use nbe::language::LanguageTable;
use nbe::parser;
use nbe::runner::{BuildRun, ExampleRunner, GenerateOptions, Matrix, MatrixRunner};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// nbe - build, run and document NATS by Example
#[derive(Parser)]
#[command(name = "nbe")]
#[command(version)]
#[command(about = "Build, run and document NATS by Example", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Repository root
    #[arg(long, global = true, default_value = ".")]
    repo: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and run an example client
    Run {
        /// Example path, e.g. messaging/pub-sub/go
        example: String,
        /// Use the cluster compose file
        #[arg(long)]
        cluster: bool,
        /// Keep the image after the run
        #[arg(long)]
        keep: bool,
        /// Attach to `compose up` instead of running the app headless
        #[arg(long)]
        up: bool,
        /// Disable ANSI output of `compose up`
        #[arg(long)]
        no_ansi: bool,
        /// Hide build output
        #[arg(short, long)]
        quiet: bool,
        /// Run id
        #[arg(long)]
        name: Option<String>,
        /// Run an existing image instead of building one
        #[arg(long)]
        image: Option<String>,
        /// YAML file with version overrides
        #[arg(long)]
        versions: Option<PathBuf>,
        /// Stop the run after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Build the image of an example client
    #[command(alias = "build")]
    Image {
        /// Example path
        example: String,
        /// Run id used in the tag
        #[arg(long)]
        name: Option<String>,
        /// YAML file with version overrides
        #[arg(long)]
        versions: Option<PathBuf>,
        /// Stream build output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Write an example with its defaults and compose file to a directory
    Eject {
        /// Example path
        example: String,
        /// Target directory, must be empty
        dir: PathBuf,
    },

    /// Parse sources and print the result as JSON
    Parse {
        /// Source file or examples directory; defaults to the repository's examples
        path: Option<PathBuf>,
        /// Language of a source file; defaults to its client directory name
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Generate artifacts
    Generate {
        #[command(subcommand)]
        command: GenerateCommands,
    },

    /// Run examples against a matrix of server and client versions
    Matrix {
        /// Matrix YAML file
        matrix: PathBuf,
        /// Example paths
        #[arg(required = true)]
        examples: Vec<String>,
        /// Concurrent jobs
        #[arg(short, long)]
        workers: Option<usize>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum GenerateCommands {
    /// Run examples and store their output next to their sources
    Output {
        /// Regenerate existing output files
        #[arg(long)]
        recreate: bool,
        /// Stop at the first failing example
        #[arg(long)]
        exit_on_error: bool,
        /// Glob over client paths, e.g. 'examples/messaging/*/go'
        #[arg(long)]
        filter: Option<String>,
    },
}

fn load_versions(path: Option<&Path>) -> Result<Option<Versions>> {
    path.map(Versions::from_file).transpose()
}

fn stdout_sink() -> OutputSink {
    Box::new(tokio::io::stdout())
}

fn stderr_sink() -> OutputSink {
    Box::new(tokio::io::stderr())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let repo = cli.repo;
    let config = Config::load(&repo)?;
    config.validate()?;
    let engine = DockerCli::new(config.engine.clone());
    let languages = LanguageTable::builtin();
    let cancel = Cancel::on_interrupt()?;

    match cli.command {
        Commands::Run {
            example,
            cluster,
            keep,
            up,
            no_ansi,
            quiet,
            name,
            image,
            versions,
            timeout,
        } => {
            let mode = if up {
                RunMode::Foreground { no_ansi }
            } else {
                RunMode::Headless
            };

            let mut run = BuildRun::new(&repo, &example)
                .name(name.as_deref().unwrap_or_default())
                .verbose(!quiet)
                .cluster(cluster)
                .keep_image(keep)
                .mode(mode)
                .deadline(timeout.map(Duration::from_secs).or(config.run_deadline()));
            if let Some(versions) = load_versions(versions.as_deref())? {
                run = run.versions(versions);
            }
            if let Some(image) = image {
                run = run.image(&image);
            }

            let outcome = ExampleRunner::new(&engine, &config)
                .execute(&run, stdout_sink(), stderr_sink(), &cancel)
                .await?;
            if let RunOutcome::Cancelled(reason) = outcome {
                tracing::warn!("{}: {}", example, reason);
            }
        }

        Commands::Image {
            example,
            name,
            versions,
            verbose,
        } => {
            let mut run = BuildRun::new(&repo, &example)
                .name(name.as_deref().unwrap_or_default())
                .verbose(verbose);
            if let Some(versions) = load_versions(versions.as_deref())? {
                run = run.versions(versions);
            }

            let tag = ExampleRunner::new(&engine, &config).build(&run, &cancel).await?;
            println!("{}", tag);
        }

        Commands::Eject { example, dir } => {
            let example = config.example_ref(&repo, &example)?;
            BuildContextComposer::new(&config, &repo).eject(&example, &dir)?;
            println!("Ejected {} to {}", example.name, dir.display());
        }

        Commands::Parse { path, language } => {
            let path = path.unwrap_or_else(|| repo.join(&config.examples_dir));

            if path.is_dir() {
                let root = ExampleIndex::new(&languages).load(&path)?;
                println!("{}", serde_json::to_string_pretty(&root)?);
                if !root.failures.is_empty() {
                    return Err(NbeError::InvalidConfig(format!(
                        "{} main files failed to parse",
                        root.failures.len()
                    )));
                }
            } else {
                let language = match language {
                    Some(language) => language,
                    None => {
                        let client = path
                            .parent()
                            .and_then(|p| p.file_name())
                            .map(|n| n.to_string_lossy().to_string())
                            .unwrap_or_default();
                        languages.for_client_dir(&client)?.id.clone()
                    }
                };
                let parsed = parser::parse_file(&languages, &language, &path)
                    .map_err(|e| e.in_example(path.display().to_string()))?;
                println!("{}", serde_json::to_string_pretty(&parsed)?);
            }
        }

        Commands::Generate {
            command:
                GenerateCommands::Output {
                    recreate,
                    exit_on_error,
                    filter,
                },
        } => {
            let root = ExampleIndex::new(&languages).load(&repo.join(&config.examples_dir))?;
            let options = GenerateOptions {
                recreate,
                exit_on_error,
                filter,
                deadline: config.run_deadline(),
            };

            let summary = ExampleRunner::new(&engine, &config)
                .generate_all(&repo, &root, &options, &cancel)
                .await?;
            println!(
                "{} written, {} skipped, {} failed",
                summary.written, summary.skipped, summary.failed
            );
            if summary.failed > 0 {
                return Err(NbeError::Run {
                    code: None,
                    stderr: format!("{} examples failed", summary.failed),
                });
            }
        }

        Commands::Matrix {
            matrix,
            examples,
            workers,
            json,
        } => {
            let matrix = Matrix::from_file(&matrix)?;
            let mut runner = MatrixRunner::new(Arc::new(engine), Arc::new(config), &repo);
            if let Some(workers) = workers {
                runner = runner.workers(workers);
            }

            let report = runner.run(&matrix, &examples, &cancel).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.render(&languages));
            }
        }
    }

    Ok(())
}
