//! Per-language comment syntax and main file names

use crate::error::{NbeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Language used when a client directory name is not a known language
pub const FALLBACK_LANGUAGE: &str = "shell";

/// Comment syntax family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentStyle {
    /// `#` line comments, no block comments
    Hash,
    /// `//` line comments and `/* */` block comments
    CStyle,
}

/// Comment metadata for one language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSpec {
    /// Language id, which is also the client directory name
    pub id: String,
    /// Display label
    pub label: String,
    /// Comment syntax family used by the line classifier
    pub style: CommentStyle,
    /// Single-line comment delimiter
    pub line_comment: Option<String>,
    /// Multi-line comment delimiters
    pub block_comment: Option<(String, String)>,
    /// Main source file of a client
    pub main_file: Option<String>,
}

impl LanguageSpec {
    /// Create a hash-comment language
    pub fn hash(id: &str, label: &str, main_file: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            style: CommentStyle::Hash,
            line_comment: Some("#".to_string()),
            block_comment: None,
            main_file: main_file.map(str::to_string),
        }
    }

    /// Create a C-style language with the usual delimiters
    pub fn c_style(id: &str, label: &str, main_file: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            style: CommentStyle::CStyle,
            line_comment: Some("//".to_string()),
            block_comment: Some(("/*".to_string(), "*/".to_string())),
            main_file: main_file.map(str::to_string),
        }
    }

    /// Override the comment delimiters
    pub fn delimiters(mut self, line: Option<&str>, block: Option<(&str, &str)>) -> Self {
        self.line_comment = line.map(str::to_string);
        self.block_comment = block.map(|(open, close)| (open.to_string(), close.to_string()));
        self
    }
}

/// Immutable lookup table of supported languages
#[derive(Debug, Clone, Default)]
pub struct LanguageTable {
    specs: BTreeMap<String, LanguageSpec>,
}

impl LanguageTable {
    /// Build a table from explicit entries
    pub fn new(specs: impl IntoIterator<Item = LanguageSpec>) -> Self {
        Self {
            specs: specs.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }

    /// The languages shipped with nbe
    pub fn builtin() -> Self {
        Self::new([
            LanguageSpec::hash("shell", "Shell", Some("main.sh")),
            LanguageSpec::hash("cli", "CLI", Some("main.sh")),
            LanguageSpec::hash("python", "Python", Some("main.py")),
            LanguageSpec::hash("ruby", "Ruby", Some("main.rb")),
            LanguageSpec::hash("elixir", "Elixir", Some("main.exs")),
            LanguageSpec::c_style("go", "Go", Some("main.go")),
            LanguageSpec::c_style("rust", "Rust", Some("main.rs")),
            LanguageSpec::c_style("java", "Java", Some("Main.java")),
            LanguageSpec::c_style("csharp", "C#", Some("Main.cs"))
                .delimiters(Some("///"), Some(("/**", "**/"))),
            LanguageSpec::c_style("deno", "Deno", Some("main.ts")),
            LanguageSpec::c_style("node", "Node", Some("main.js")),
            LanguageSpec::c_style("bun", "Bun", Some("main.ts")),
            LanguageSpec::c_style("websocket", "WebSocket", Some("main.js")),
            LanguageSpec::c_style("c", "C", Some("main.c")),
        ])
    }

    /// Look up a language
    pub fn get(&self, id: &str) -> Result<&LanguageSpec> {
        self.specs
            .get(id)
            .ok_or_else(|| NbeError::UnsupportedLanguage(id.to_string()))
    }

    /// Whether a language id is known
    pub fn contains(&self, id: &str) -> bool {
        self.specs.contains_key(id)
    }

    /// Resolve a client directory name to a language, falling back to shell
    pub fn for_client_dir(&self, name: &str) -> Result<&LanguageSpec> {
        let id = name.to_lowercase();
        if self.contains(&id) {
            self.get(&id)
        } else {
            self.get(FALLBACK_LANGUAGE)
        }
    }

    /// Iterate over all languages in id order
    pub fn iter(&self) -> impl Iterator<Item = &LanguageSpec> {
        self.specs.values()
    }
}
