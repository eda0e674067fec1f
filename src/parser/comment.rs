//! Comment text extraction
//!
//! Turns a comment block back into the prose it carries: comment delimiters
//! and the shared indentation are removed, leading and trailing blank lines
//! are dropped and interior blank lines are kept.

use super::block::{Block, BlockType};
use crate::language::LanguageSpec;

/// Prose extracted from a comment block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentText {
    /// Comment content without delimiters
    pub text: String,
    /// Indentation in front of the delimiter on the first comment line
    pub prefix: String,
}

/// Extract the prose of a comment block; code and empty blocks have none
pub fn comment_text(block: &Block, spec: &LanguageSpec) -> Option<CommentText> {
    match block.block_type {
        BlockType::SingleLineComment => {
            let delim = spec.line_comment.as_deref().unwrap_or("//");
            Some(clean_single_line(&block.lines, delim))
        }
        BlockType::MultiLineComment => {
            let (open, close) = spec
                .block_comment
                .as_ref()
                .map(|(o, c)| (o.as_str(), c.as_str()))
                .unwrap_or(("/*", "*/"));
            Some(clean_multi_line(&block.lines, open, close))
        }
        BlockType::Code | BlockType::Empty => None,
    }
}

/// Indentation before the delimiter of the first non-blank line, and its index
fn common_prefix<'l>(lines: &'l [String], delim: &str) -> Option<(&'l str, usize)> {
    let (index, line) = lines
        .iter()
        .enumerate()
        .find(|(_, l)| !l.trim().is_empty())?;

    let end = line
        .find(delim)
        .unwrap_or_else(|| line.len() - line.trim_start().len());
    Some((&line[..end], index))
}

fn clean_single_line(lines: &[String], delim: &str) -> CommentText {
    let Some((prefix, first)) = common_prefix(lines, delim) else {
        return CommentText {
            text: String::new(),
            prefix: String::new(),
        };
    };

    let cleaned: Vec<&str> = lines[first..]
        .iter()
        .map(|l| {
            let l = l.as_str();
            let l = l.strip_prefix(prefix).unwrap_or(l);
            let l = l.strip_prefix(delim).unwrap_or(l);
            l.strip_prefix(' ').unwrap_or(l)
        })
        .collect();

    CommentText {
        text: cleaned.join("\n").trim().to_string(),
        prefix: prefix.to_string(),
    }
}

fn clean_multi_line(lines: &[String], open: &str, close: &str) -> CommentText {
    let Some((prefix, first)) = common_prefix(lines, open) else {
        return CommentText {
            text: String::new(),
            prefix: String::new(),
        };
    };

    let mut cleaned: Vec<&str> = Vec::new();
    let mut last = 0;
    for (i, l) in lines[first..].iter().enumerate() {
        let l = l.as_str();
        let mut l = l.strip_prefix(prefix).unwrap_or(l);
        if i == 0 {
            l = l.strip_prefix(open).unwrap_or(l);
        }
        if !l.trim().is_empty() {
            last = i;
        }
        cleaned.push(l);
    }

    if let Some(line) = cleaned.get_mut(last) {
        let current: &str = *line;
        let trimmed = current.trim_end();
        *line = trimmed.strip_suffix(close).unwrap_or(trimmed);
    }

    CommentText {
        text: cleaned.join("\n").trim().to_string(),
        prefix: prefix.to_string(),
    }
}
