//! The front end turns source text into a concrete syntax tree. Nothing past
//! this module looks at tokens; later stages only walk the tree through the
//! [`cst::TreeCursor`] contract.

use std::path::PathBuf;

use self::lexer::Span;
use crate::error::{CompileError, Result};

pub mod cst;
pub mod intern;
pub mod lexer;
pub mod parser;

#[derive(Debug)]
pub struct SourceFile {
    pub contents: String,
    pub origin: SourceFileOrigin,
}

impl SourceFile {
    pub fn in_memory(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
            origin: SourceFileOrigin::Memory,
        }
    }

    /// Text covered by a span. Spans from externally built trees may point
    /// past the end of the text or into a multi-byte char.
    pub fn value_of_span(&self, span: Span) -> Result<&str> {
        self.contents
            .get(span.start..span.end)
            .ok_or_else(|| CompileError::parse(span, "span outside the source text"))
    }

    /// Nearest char boundary at or before `position`
    fn char_boundary(&self, position: usize) -> usize {
        let mut position = position.min(self.contents.len());

        while !self.contents.is_char_boundary(position) {
            position -= 1;
        }

        position
    }

    /// 1-based line number of a byte position
    pub fn row_for_position(&self, position: usize) -> usize {
        let position = self.char_boundary(position);

        self.contents[..position].matches('\n').count() + 1
    }

    /// 1-based column, in chars, of a byte position
    pub fn column_for_position(&self, position: usize) -> usize {
        let position = self.char_boundary(position);
        let line_start = self.contents[..position]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);

        self.contents[line_start..position].chars().count() + 1
    }

    pub fn line_containing(&self, position: usize) -> &str {
        let position = self.char_boundary(position);
        let start = self.contents[..position]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let end = self.contents[position..]
            .find('\n')
            .map(|i| position + i)
            .unwrap_or(self.contents.len());

        &self.contents[start..end]
    }
}

#[derive(Debug)]
pub enum SourceFileOrigin {
    Memory,
    File(PathBuf),
}

impl core::fmt::Display for SourceFileOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFileOrigin::Memory => f.write_str("<memory>"),
            SourceFileOrigin::File(path) => f.write_fmt(format_args!("{}", path.display())),
        }
    }
}
