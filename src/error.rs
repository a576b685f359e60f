//! Errors produced while compiling a unit. Every failure is fatal: there is no
//! recovery and no partial output.

use colored::Colorize;
use thiserror::Error;

use crate::frontend::{SourceFile, lexer::Span};

pub type Result<T> = std::result::Result<T, CompileError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A syntax tree node was unrecognized or had an unexpected shape
    #[error("could not parse {construct} at {span}")]
    Parse { span: Span, construct: String },

    /// An identifier has no storage slot in the environment
    #[error("could not find name `{name}` (known names: [{}])", .known.join(", "))]
    UndefinedSymbol { name: String, known: Vec<String> },

    /// Operator spelling accepted by the grammar but without a lowering rule
    #[error("operator `{operator}` is not supported (at {span})")]
    UnsupportedOperator { operator: String, span: Span },

    /// Function code generation invoked on a statement that is not a function
    /// definition
    #[error("cannot generate function code for a {found} statement")]
    MalformedFunction { found: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum CompileErrorKind {
    Parse,
    UndefinedSymbol,
    UnsupportedOperator,
    MalformedFunction,
}

impl CompileError {
    pub fn parse(span: Span, construct: impl Into<String>) -> Self {
        Self::Parse {
            span,
            construct: construct.into(),
        }
    }

    pub fn kind(&self) -> CompileErrorKind {
        match self {
            Self::Parse { .. } => CompileErrorKind::Parse,
            Self::UndefinedSymbol { .. } => CompileErrorKind::UndefinedSymbol,
            Self::UnsupportedOperator { .. } => CompileErrorKind::UnsupportedOperator,
            Self::MalformedFunction { .. } => CompileErrorKind::MalformedFunction,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Parse { span, .. } | Self::UnsupportedOperator { span, .. } => Some(*span),
            Self::UndefinedSymbol { .. } | Self::MalformedFunction { .. } => None,
        }
    }

    /// Formats the error for a terminal, pointing at the offending source
    /// line when the error carries a span.
    pub fn render(&self, source: &SourceFile) -> String {
        let header = format!("{}: {}", "error".red().bold(), self);

        let Some(span) = self.span() else {
            return format!("{header} ({})", source.origin);
        };

        let row = source.row_for_position(span.start);
        let column = source.column_for_position(span.start);
        let line = source.line_containing(span.start);
        let width = span.end.saturating_sub(span.start).max(1);

        format!(
            "{header} ({}:{row}:{column})\n{:>4} {} {line}\n     {} {}{}",
            source.origin,
            row.to_string().blue(),
            "|".blue(),
            "|".blue(),
            " ".repeat(column - 1),
            "^".repeat(width).red().bold(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_points_at_the_offending_span() {
        let source = SourceFile::in_memory("x: int = 1\ny = $\n");
        let error = CompileError::parse(Span::new(15, 16), "unexpected character `$`");

        let rendered = strip_ansi_escapes::strip_str(error.render(&source));

        assert!(rendered.starts_with("error: could not parse unexpected character `$`"));
        assert!(rendered.contains("(<memory>:2:5)"));
        assert!(rendered.contains("y = $"));
        assert!(rendered.ends_with("    ^"));
    }

    #[test]
    fn undefined_symbol_lists_known_names() {
        let error = CompileError::UndefinedSymbol {
            name: "z".into(),
            known: vec!["x".into(), "y".into()],
        };

        assert_eq!(error.kind(), CompileErrorKind::UndefinedSymbol);
        assert_eq!(
            error.to_string(),
            "could not find name `z` (known names: [x, y])"
        );
        assert_eq!(error.span(), None);
    }
}
