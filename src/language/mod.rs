//! Supported languages
//!
//! The language table is static configuration: it is constructed once at
//! startup and handed to the parser and the example index.

pub mod table;

pub use table::{CommentStyle, LanguageSpec, LanguageTable, FALLBACK_LANGUAGE};
