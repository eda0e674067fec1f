//! Line classification
//!
//! Each line is classified on its own, without any knowledge of the lines
//! around it. Multi-line comments that open or close in the middle of a
//! statement, e.g.
//!
//! ```text
//! func() int {/*
//!     a := 1
//! */  b := 2
//! ```
//!
//! are not recognized. Example sources are curated, so this does not come up
//! in practice.

use crate::error::Result;
use crate::language::{CommentStyle, LanguageSpec, LanguageTable};
use serde::{Deserialize, Serialize};

/// Category of a single source line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineType {
    Empty,
    Normal,
    SingleLineComment,
    OpenMultiLineComment,
    CloseMultiLineComment,
}

/// Classify a line of a language looked up in the table
pub fn classify(languages: &LanguageTable, language: &str, line: &str) -> Result<LineType> {
    let spec = languages.get(language)?;
    Ok(classify_line(spec, line))
}

/// Classify a line for a known language
///
/// Delimiters come from the language's comment metadata. A shebang on the
/// first column is code in hash-comment languages.
pub fn classify_line(spec: &LanguageSpec, line: &str) -> LineType {
    let trimmed = line.trim_start();
    if trimmed.is_empty() {
        return LineType::Empty;
    }
    if spec.style == CommentStyle::Hash && line.starts_with("#!") {
        return LineType::Normal;
    }

    if let Some(delim) = spec.line_comment.as_deref() {
        if trimmed.starts_with(delim) {
            return LineType::SingleLineComment;
        }
    }

    if let Some((open, close)) = &spec.block_comment {
        if let Some(rest) = trimmed.strip_prefix(open.as_str()) {
            // e.g. func foo(a int/*, b int*/)
            return if rest.contains(close.as_str()) {
                LineType::Normal
            } else {
                LineType::OpenMultiLineComment
            };
        }
        if let Some(pos) = trimmed.find(close.as_str()) {
            return if trimmed[..pos].contains(open.as_str()) {
                LineType::Normal
            } else {
                LineType::CloseMultiLineComment
            };
        }
    }

    LineType::Normal
}
