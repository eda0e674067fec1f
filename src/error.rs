//! Error types for nbe

use thiserror::Error;

/// Result type for nbe operations
pub type Result<T> = std::result::Result<T, NbeError>;

/// nbe error types
#[derive(Error, Debug)]
pub enum NbeError {
    #[error("Language not supported: {0}")]
    UnsupportedLanguage(String),

    #[error("Syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("Compose error: {0}")]
    Compose(String),

    #[error("Version rewrite error: {0}")]
    VersionRewrite(String),

    #[error("Build error: {message}\n{stderr}")]
    Build { message: String, stderr: String },

    #[error("No default {what} available for language {language}")]
    NoDefault { what: String, language: String },

    #[error("Run failed with exit code {code:?}\n{stderr}")]
    Run { code: Option<i32>, stderr: String },

    #[error("Interrupted")]
    Interrupted,

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Example error: {path}: {source}")]
    Example {
        path: String,
        #[source]
        source: Box<NbeError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl NbeError {
    /// Attach the example path to an error
    pub fn in_example(self, path: impl Into<String>) -> Self {
        NbeError::Example {
            path: path.into(),
            source: Box::new(self),
        }
    }

    /// Whether the error comes from parsing a single source file
    pub fn is_parse_error(&self) -> bool {
        match self {
            NbeError::UnsupportedLanguage(_) | NbeError::Syntax { .. } => true,
            NbeError::Example { source, .. } => source.is_parse_error(),
            _ => false,
        }
    }
}

impl From<serde_yaml::Error> for NbeError {
    fn from(e: serde_yaml::Error) -> Self {
        NbeError::Yaml(e.to_string())
    }
}
