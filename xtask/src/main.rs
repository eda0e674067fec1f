//! nbe xtask - Build automation tasks
//!
//! ## Usage
//!
//! ```bash
//! # Build the nbe binary
//! cargo xtask build
//!
//! # Run all tests
//! cargo xtask test
//!
//! # Run lints
//! cargo xtask lint
//!
//! # Parse every example of a NATS by Example checkout
//! cargo xtask check-examples ../nats-by-example
//!
//! # Run CI checks
//! cargo xtask ci
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use xshell::{cmd, Shell};

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation for nbe")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the nbe binary
    Build {
        /// Build in release mode
        #[arg(long)]
        release: bool,
    },
    /// Run all tests
    Test {
        /// Run tests in release mode
        #[arg(long)]
        release: bool,
    },
    /// Run lints (clippy and rustfmt check)
    Lint,
    /// Format code
    Fmt {
        /// Check formatting without making changes
        #[arg(long)]
        check: bool,
    },
    /// Parse every example of a repository and fail on syntax errors
    CheckExamples {
        /// Repository root
        repo: PathBuf,
    },
    /// Clean build artifacts
    Clean,
    /// Install the binary locally
    Install,
    /// Generate documentation
    Doc {
        /// Open documentation in browser
        #[arg(long)]
        open: bool,
    },
    /// Run CI checks (fmt, lint, test, build)
    Ci,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    // Change to project root
    let project_root = project_root()?;
    sh.change_dir(&project_root);

    match cli.command {
        Commands::Build { release } => build(&sh, release)?,
        Commands::Test { release } => test(&sh, release)?,
        Commands::Lint => lint(&sh)?,
        Commands::Fmt { check } => fmt(&sh, check)?,
        Commands::CheckExamples { repo } => check_examples(&sh, repo)?,
        Commands::Clean => clean(&sh)?,
        Commands::Install => install(&sh)?,
        Commands::Doc { open } => doc(&sh, open)?,
        Commands::Ci => ci(&sh)?,
    }

    Ok(())
}

fn project_root() -> Result<PathBuf> {
    let output = std::process::Command::new("cargo")
        .args(["locate-project", "--workspace", "--message-format=plain"])
        .output()
        .context("Failed to run cargo locate-project")?;

    let path = String::from_utf8(output.stdout)?;
    let manifest = PathBuf::from(path.trim());

    manifest
        .parent()
        .map(|p| p.to_path_buf())
        .context("Failed to find project root")
}

fn build(sh: &Shell, release: bool) -> Result<()> {
    println!("🔨 Building nbe...");

    if release {
        cmd!(sh, "cargo build --release --bin nbe").run()?;
    } else {
        cmd!(sh, "cargo build --bin nbe").run()?;
    }

    println!("✅ Build complete!");
    Ok(())
}

fn test(sh: &Shell, release: bool) -> Result<()> {
    println!("🧪 Running tests...");

    if release {
        cmd!(sh, "cargo test --release").run()?;
    } else {
        cmd!(sh, "cargo test").run()?;
    }

    println!("✅ All tests passed!");
    Ok(())
}

fn lint(sh: &Shell) -> Result<()> {
    println!("🔍 Running lints...");

    println!("  Checking formatting...");
    cmd!(sh, "cargo fmt --all -- --check").run()?;

    println!("  Running clippy...");
    cmd!(sh, "cargo clippy --all-targets --all-features -- -D warnings").run()?;

    println!("✅ All lints passed!");
    Ok(())
}

fn fmt(sh: &Shell, check: bool) -> Result<()> {
    println!("🎨 Formatting code...");

    if check {
        cmd!(sh, "cargo fmt --all -- --check").run()?;
    } else {
        cmd!(sh, "cargo fmt --all").run()?;
    }

    println!("✅ Formatting complete!");
    Ok(())
}

fn check_examples(sh: &Shell, repo: PathBuf) -> Result<()> {
    println!("📖 Parsing examples in {}...", repo.display());

    let repo = repo
        .canonicalize()
        .with_context(|| format!("Repository not found: {}", repo.display()))?;
    cmd!(sh, "cargo run --quiet --bin nbe -- --repo {repo} parse")
        .ignore_stdout()
        .run()?;

    println!("✅ All examples parsed!");
    Ok(())
}

fn clean(sh: &Shell) -> Result<()> {
    println!("🧹 Cleaning build artifacts...");

    cmd!(sh, "cargo clean").run()?;

    println!("✅ Clean complete!");
    Ok(())
}

fn install(sh: &Shell) -> Result<()> {
    println!("📥 Installing nbe locally...");

    cmd!(sh, "cargo install --path .").run()?;

    println!("✅ Installation complete!");
    Ok(())
}

fn doc(sh: &Shell, open: bool) -> Result<()> {
    println!("📚 Generating documentation...");

    if open {
        cmd!(sh, "cargo doc --no-deps --open").run()?;
    } else {
        cmd!(sh, "cargo doc --no-deps").run()?;
    }

    println!("✅ Documentation generated!");
    Ok(())
}

fn ci(sh: &Shell) -> Result<()> {
    println!("🔄 Running CI checks...");

    println!("\n📋 Step 1/4: Format check");
    fmt(sh, true)?;

    println!("\n📋 Step 2/4: Lint");
    lint(sh)?;

    println!("\n📋 Step 3/4: Tests");
    test(sh, false)?;

    println!("\n📋 Step 4/4: Release build");
    build(sh, true)?;

    println!("\n✅ All CI checks passed!");
    Ok(())
}
