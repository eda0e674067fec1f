//! Example index
//!
//! Walks `examples/<category>/<example>/<client>/` and parses the main file
//! of every client. The resulting tree is built once and never mutated.
//! A client whose main file fails to parse is left out of the tree and
//! recorded in [`Root::failures`]; the rest of the tree still loads.

pub mod meta;

pub use meta::{default_title, read_meta, CategoryMeta, ExampleMeta, RootMeta, META_FILE};

use crate::error::Result;
use crate::language::LanguageTable;
use crate::parser::{self, Block};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// The examples tree
#[derive(Debug, Clone, Serialize)]
pub struct Root {
    pub path: PathBuf,
    pub categories: Vec<Category>,
    /// Clients left out because their main file did not parse
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ParseFailure>,
}

/// A main file that failed to parse
#[derive(Debug, Clone, Serialize)]
pub struct ParseFailure {
    pub path: PathBuf,
    pub error: String,
}

/// A group of related examples
#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub name: String,
    pub path: PathBuf,
    pub title: String,
    pub description: Option<String>,
    pub examples: Vec<Example>,
}

/// One example, implemented by one or more clients
#[derive(Debug, Clone, Serialize)]
pub struct Example {
    pub name: String,
    pub path: PathBuf,
    pub title: String,
    pub description: Option<String>,
    /// Clients keyed by directory name
    pub clients: BTreeMap<String, Client>,
}

/// One language implementation of an example
#[derive(Debug, Clone, Serialize)]
pub struct Client {
    pub name: String,
    pub path: PathBuf,
    pub language: String,
    pub main_file: String,
    pub blocks: Vec<Block>,
    /// Verbatim main file source
    pub source: String,
}

impl Root {
    /// Iterate over every client with its category and example
    pub fn clients(&self) -> impl Iterator<Item = (&Category, &Example, &Client)> {
        self.categories.iter().flat_map(|category| {
            category.examples.iter().flat_map(move |example| {
                example
                    .clients
                    .values()
                    .map(move |client| (category, example, client))
            })
        })
    }
}

/// Loads the examples tree
pub struct ExampleIndex<'a> {
    languages: &'a LanguageTable,
}

impl<'a> ExampleIndex<'a> {
    /// Create an index loader using the given language table
    pub fn new(languages: &'a LanguageTable) -> Self {
        Self { languages }
    }

    /// Load the tree rooted at `path`
    pub fn load(&self, path: &Path) -> Result<Root> {
        let root_meta: RootMeta = read_meta(path)?;

        let mut failures = Vec::new();
        let mut categories = BTreeMap::new();
        for (name, dir) in subdirs(path)? {
            let category = self.read_category(&dir, &name, &mut failures)?;
            if !category.examples.is_empty() {
                categories.insert(name, category);
            }
        }

        tracing::debug!("Indexed {} categories under {}", categories.len(), path.display());
        if !failures.is_empty() {
            tracing::warn!("{} main files under {} failed to parse", failures.len(), path.display());
        }

        Ok(Root {
            path: path.to_path_buf(),
            categories: ordered(categories, &root_meta.categories),
            failures,
        })
    }

    fn read_category(
        &self,
        path: &Path,
        name: &str,
        failures: &mut Vec<ParseFailure>,
    ) -> Result<Category> {
        let meta: CategoryMeta = read_meta(path)?;

        let mut examples = BTreeMap::new();
        for (example_name, dir) in subdirs(path)? {
            let example = self.read_example(&dir, &example_name, failures)?;
            if !example.clients.is_empty() {
                examples.insert(example_name, example);
            }
        }

        Ok(Category {
            name: name.to_string(),
            path: path.to_path_buf(),
            title: meta.title.unwrap_or_else(|| default_title(name)),
            description: meta.description,
            examples: ordered(examples, &meta.examples),
        })
    }

    fn read_example(
        &self,
        path: &Path,
        name: &str,
        failures: &mut Vec<ParseFailure>,
    ) -> Result<Example> {
        let meta: ExampleMeta = read_meta(path)?;

        let mut clients = BTreeMap::new();
        for (client_name, dir) in subdirs(path)? {
            match self.read_client(&dir, &client_name) {
                Ok(Some(client)) => {
                    clients.insert(client_name, client);
                }
                Ok(None) => {}
                Err(e) if e.is_parse_error() => {
                    tracing::error!("{}", e);
                    failures.push(ParseFailure {
                        path: dir,
                        error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Example {
            name: name.to_string(),
            path: path.to_path_buf(),
            title: meta.title.unwrap_or_else(|| default_title(name)),
            description: meta.description,
            clients,
        })
    }

    /// Parse a client directory; `None` when it has no main file
    fn read_client(&self, path: &Path, name: &str) -> Result<Option<Client>> {
        let spec = self.languages.for_client_dir(name)?;
        let Some(main_file) = spec.main_file.as_deref() else {
            tracing::warn!("{}: no main file for language {}, skipping", path.display(), spec.id);
            return Ok(None);
        };

        let main_path = path.join(main_file);
        if !main_path.is_file() {
            tracing::warn!("{}: no main file, skipping", path.display());
            return Ok(None);
        }

        let parsed = parser::parse_file(self.languages, &spec.id, &main_path)
            .map_err(|e| e.in_example(main_path.display().to_string()))?;

        Ok(Some(Client {
            name: name.to_string(),
            path: path.to_path_buf(),
            language: spec.id.clone(),
            main_file: main_file.to_string(),
            blocks: parsed.blocks,
            source: parsed.source,
        }))
    }
}

/// Immediate subdirectories of `path` as (name, path), sorted by name
fn subdirs(path: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(path).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            dirs.push((name.to_string(), entry.path().to_path_buf()));
        }
    }
    Ok(dirs)
}

/// Entries named in `order` first, the remainder by name
fn ordered<T>(mut items: BTreeMap<String, T>, order: &[String]) -> Vec<T> {
    let mut result = Vec::with_capacity(items.len());
    for name in order {
        if let Some(item) = items.remove(name) {
            result.push(item);
        }
    }
    result.extend(items.into_values());
    result
}
