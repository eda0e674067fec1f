//! Compose project
//!
//! A project is scoped by its name, which is the run id: containers,
//! networks and volumes of concurrent runs never collide.

use crate::engine::EngineCommand;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Compose project of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeProject {
    /// Project name
    pub name: String,
    /// Project directory holding the env file
    pub dir: PathBuf,
    /// Compose file
    pub file: PathBuf,
}

impl ComposeProject {
    /// Create a project
    pub fn new(name: &str, dir: &Path, file: &Path) -> Self {
        Self {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            file: file.to_path_buf(),
        }
    }

    fn command<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> EngineCommand {
        let mut argv = vec![
            "compose".to_string(),
            "--project-name".to_string(),
            self.name.clone(),
            "--project-directory".to_string(),
            self.dir.display().to_string(),
            "--file".to_string(),
            self.file.display().to_string(),
        ];
        argv.extend(args.into_iter().map(str::to_string));
        EngineCommand::new(argv)
    }

    /// `compose pull`, tolerant of unavailable images
    pub fn pull(&self) -> EngineCommand {
        self.command(["pull", "--include-deps", "--quiet", "--ignore-pull-failures"])
    }

    /// `compose run` of a single service, removed on exit
    pub fn run(&self, service: &str, tty: bool) -> EngineCommand {
        let mut args = vec!["run", "--rm"];
        if !tty {
            args.push("--no-TTY");
        }
        args.push(service);
        self.command(args)
    }

    /// `compose up` attached to the terminal
    pub fn up(&self, no_ansi: bool) -> EngineCommand {
        let mut args = Vec::new();
        if no_ansi {
            args.extend(["--ansi", "never"]);
        }
        args.extend(["up", "--abort-on-container-exit"]);
        self.command(args).inherit_stdio()
    }

    /// `compose down`, removing orphans
    pub fn down(&self, timeout: Duration) -> EngineCommand {
        let timeout = timeout.as_secs().to_string();
        self.command(["down", "--remove-orphans", "--timeout", timeout.as_str()])
    }
}
