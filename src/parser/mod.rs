//! Source parser
//!
//! Splits an annotated example source into alternating prose and code
//! blocks. Lines are classified per language ([`line`]) and folded into
//! blocks by a transition table ([`block`]).

pub mod block;
pub mod comment;
pub mod line;

pub use block::{transition, Action, Block, BlockType, ParsedSource, Segmenter};
pub use comment::{comment_text, CommentText};
pub use line::{classify, classify_line, LineType};

use crate::error::Result;
use crate::language::LanguageTable;
use std::io::BufRead;
use std::path::Path;

/// Parse source text
pub fn parse_str(languages: &LanguageTable, language: &str, content: &str) -> Result<ParsedSource> {
    let mut segmenter = Segmenter::new(languages.get(language)?);
    for line in content.lines() {
        segmenter.push(line)?;
    }
    Ok(segmenter.finish())
}

/// Parse source from a reader, line by line
pub fn parse_reader<R: BufRead>(
    languages: &LanguageTable,
    language: &str,
    reader: R,
) -> Result<ParsedSource> {
    let mut segmenter = Segmenter::new(languages.get(language)?);
    for line in reader.lines() {
        segmenter.push(&line?)?;
    }
    Ok(segmenter.finish())
}

/// Parse a source file
pub fn parse_file(languages: &LanguageTable, language: &str, path: &Path) -> Result<ParsedSource> {
    let file = std::fs::File::open(path)?;
    parse_reader(languages, language, std::io::BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NbeError;

    const GO_SOURCE: &str = r#"/*
Package foo provides utilies for interacting with JetStream.

*/
package foo

// Read stream..
func ReadStream(js nats.JetStreamContext, name string) ([]*nats.Msg, error) {
  ...
}

"#;

    const PYTHON_SOURCE: &str = "# Package foo
import csv

with open('somefile.txt') as f:
\t# Initialize a new CSV reader

\tcr := csv.reader(f)

\t# Read
\t# all
\t# the

\t# lines
\tlines := tuple(cr)

";

    #[test]
    fn test_parse_go_source() {
        let table = LanguageTable::builtin();
        let parsed = parse_str(&table, "go", GO_SOURCE).unwrap();

        assert_eq!(parsed.source, GO_SOURCE.trim_end_matches('\n').to_string() + "\n");
        assert_eq!(parsed.blocks.len(), 4);
        assert_eq!(parsed.blocks[0].block_type, BlockType::MultiLineComment);
        assert_eq!(parsed.blocks[3].block_type, BlockType::Code);
    }

    #[test]
    fn test_parse_python_source() {
        let table = LanguageTable::builtin();
        let parsed = parse_reader(&table, "python", PYTHON_SOURCE.as_bytes()).unwrap();

        assert_eq!(parsed.source, PYTHON_SOURCE.strip_suffix('\n').unwrap());
        assert_eq!(parsed.blocks.len(), 6);
    }

    #[test]
    fn test_round_trip() {
        let table = LanguageTable::builtin();
        let sources = [
            ("go", GO_SOURCE),
            ("python", PYTHON_SOURCE),
            ("shell", "#!/bin/sh\n\n# Publish\nnats pub foo bar\n\n# Done\n"),
            ("csharp", "/**\n Doc\n**/\nusing NATS;\n/// note\nvar x = 1;\n"),
            ("deno", "// only a comment"),
        ];

        for (language, source) in sources {
            let parsed = parse_str(&table, language, source).unwrap();
            let expected: Vec<&str> = source.lines().collect();
            assert_eq!(parsed.lines().collect::<Vec<_>>(), expected, "{}", language);
        }
    }

    #[test]
    fn test_parse_unknown_language() {
        let table = LanguageTable::builtin();
        let result = parse_str(&table, "zig", "const x = 1;");
        assert!(matches!(result, Err(NbeError::UnsupportedLanguage(_))));
    }

    #[test]
    fn test_parse_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("main.go");
        std::fs::write(&path, "package main\r\n\r\n// hi\r\nfunc main() {}\r\n").unwrap();

        let table = LanguageTable::builtin();
        let parsed = parse_file(&table, "go", &path).unwrap();
        assert_eq!(parsed.blocks.len(), 3);
        assert_eq!(parsed.source, "package main\n\n// hi\nfunc main() {}");
    }
}
