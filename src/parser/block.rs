//! Block segmentation
//!
//! Classified lines are folded into blocks by a small state machine. The
//! state is the type of the block currently being filled plus a flag set
//! by a closing multi-line delimiter, which forces the following line into
//! a fresh block. Every line lands in exactly one block, so concatenating
//! the blocks' lines reproduces the input.

use super::comment::comment_text;
use super::line::{classify_line, LineType};
use crate::error::{NbeError, Result};
use crate::language::LanguageSpec;
use serde::{Deserialize, Serialize};

/// Kind of block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockType {
    /// Only blank lines so far; retyped by the first non-blank line
    Empty,
    Code,
    SingleLineComment,
    MultiLineComment,
}

impl BlockType {
    /// Whether the block holds prose
    pub fn is_comment(self) -> bool {
        matches!(self, BlockType::SingleLineComment | BlockType::MultiLineComment)
    }
}

/// A run of consecutive lines sharing one classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "type")]
    pub block_type: BlockType,
    /// Raw lines, without line terminators
    pub lines: Vec<String>,
    /// First line number, 1-based
    pub start_line: usize,
    /// Last line number, inclusive
    pub end_line: usize,
    /// Comment text without delimiters; comment blocks only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prose: Option<String>,
}

impl Block {
    fn new(block_type: BlockType, line: usize) -> Self {
        Self {
            block_type,
            lines: Vec::new(),
            start_line: line,
            end_line: line,
            prose: None,
        }
    }

    /// Block lines joined with newlines
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// What the segmenter does with an incoming line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Append to the current block
    Append,
    /// Assign a type to the current (still empty) block, then append
    Retype(BlockType),
    /// Start a new block of the given type with this line
    Split(BlockType),
    /// Append, then start a fresh block at the next line
    Close,
    /// Stray closing delimiter
    Reject,
}

/// Transition table keyed by the current block type and the incoming line type
pub const fn transition(current: BlockType, line: LineType) -> Action {
    use Action::*;
    use BlockType as B;
    use LineType as L;

    match (current, line) {
        (B::Empty, L::Empty) => Append,
        (B::Empty, L::Normal) => Retype(B::Code),
        (B::Empty, L::SingleLineComment) => Retype(B::SingleLineComment),
        (B::Empty, L::OpenMultiLineComment) => Retype(B::MultiLineComment),
        (B::Empty, L::CloseMultiLineComment) => Reject,

        (B::Code, L::Empty) => Append,
        (B::Code, L::Normal) => Append,
        (B::Code, L::SingleLineComment) => Split(B::SingleLineComment),
        (B::Code, L::OpenMultiLineComment) => Split(B::MultiLineComment),
        (B::Code, L::CloseMultiLineComment) => Reject,

        (B::SingleLineComment, L::Empty) => Append,
        (B::SingleLineComment, L::Normal) => Split(B::Code),
        (B::SingleLineComment, L::SingleLineComment) => Append,
        (B::SingleLineComment, L::OpenMultiLineComment) => Append,
        (B::SingleLineComment, L::CloseMultiLineComment) => Reject,

        // Everything up to the closing delimiter belongs to the comment.
        (B::MultiLineComment, L::Empty) => Append,
        (B::MultiLineComment, L::Normal) => Append,
        (B::MultiLineComment, L::SingleLineComment) => Append,
        (B::MultiLineComment, L::OpenMultiLineComment) => Append,
        (B::MultiLineComment, L::CloseMultiLineComment) => Close,
    }
}

/// Blocks of one source file plus the verbatim source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSource {
    pub blocks: Vec<Block>,
    /// Source lines joined with `\n`
    pub source: String,
}

impl ParsedSource {
    /// All lines in block order
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.blocks
            .iter()
            .flat_map(|b| b.lines.iter().map(String::as_str))
    }
}

/// Incremental block segmenter for one file
pub struct Segmenter<'a> {
    spec: &'a LanguageSpec,
    blocks: Vec<Block>,
    line_num: usize,
    close_pending: bool,
}

impl<'a> Segmenter<'a> {
    /// Create a segmenter whose first block is empty and starts at line 1
    pub fn new(spec: &'a LanguageSpec) -> Self {
        Self {
            spec,
            blocks: vec![Block::new(BlockType::Empty, 1)],
            line_num: 0,
            close_pending: false,
        }
    }

    /// Feed the next line
    pub fn push(&mut self, line: &str) -> Result<()> {
        self.line_num += 1;
        let line_num = self.line_num;

        if self.close_pending {
            self.blocks.push(Block::new(BlockType::Empty, line_num));
            self.close_pending = false;
        }

        let line_type = classify_line(self.spec, line);
        let current = self.current_type();

        match transition(current, line_type) {
            Action::Append => {}
            Action::Retype(block_type) => self.current_mut().block_type = block_type,
            Action::Split(block_type) => self.blocks.push(Block::new(block_type, line_num)),
            Action::Close => self.close_pending = true,
            Action::Reject => {
                return Err(NbeError::Syntax {
                    line: line_num,
                    message: format!(
                        "closing comment delimiter outside of a multi-line comment ({:?} block)",
                        current
                    ),
                });
            }
        }

        let block = self.current_mut();
        block.lines.push(line.to_string());
        block.end_line = line_num;
        Ok(())
    }

    /// Finish the file, attaching the prose of comment blocks
    pub fn finish(mut self) -> ParsedSource {
        for block in &mut self.blocks {
            block.prose = comment_text(block, self.spec).map(|c| c.text);
        }

        let source = self
            .blocks
            .iter()
            .flat_map(|b| b.lines.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("\n");

        ParsedSource {
            blocks: self.blocks,
            source,
        }
    }

    fn current_type(&self) -> BlockType {
        self.blocks
            .last()
            .map(|b| b.block_type)
            .unwrap_or(BlockType::Empty)
    }

    fn current_mut(&mut self) -> &mut Block {
        if self.blocks.is_empty() {
            self.blocks.push(Block::new(BlockType::Empty, self.line_num.max(1)));
        }
        let last = self.blocks.len() - 1;
        &mut self.blocks[last]
    }
}
