use std::{
    collections::{BTreeMap, VecDeque},
    str::Chars,
};

use itertools::{PeekNth, peek_nth};
use once_cell::sync::Lazy;
use strum::EnumString;

use crate::{
    error::{CompileError, Result},
    frontend::SourceFile,
};

/// Indentation aware tokenizer. Block structure is reported through synthetic
/// `Newline`, `Indent` and `Dedent` tokens so the parser never has to look at
/// whitespace.
#[derive(Debug)]
pub struct Lexer<'source> {
    source: &'source SourceFile,
    position: usize,
    chars: PeekNth<Chars<'source>>,
    pending: VecDeque<Token>,
    indent_stack: Vec<usize>,
    paren_depth: usize,
    at_line_start: bool,
    line_has_tokens: bool,
    finished: bool,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /* Words */
    Keyword(Keyword), // def
    Identifier,       // main

    /* Literals */
    IntegerLiteral, // 1

    /* Delimiters */
    OpenParen,  // (
    CloseParen, // )
    Comma,      // ,
    Colon,      // :
    Arrow,      // ->

    /* Arithmetic */
    Plus,        // +
    Minus,       // -
    Asterisk,    // *
    DoubleSlash, // //
    Percent,     // %

    /* Comparison */
    DoubleEquals,         // ==
    NotEquals,            // !=
    LessThan,             // <
    LessThanOrEqualTo,    // <=
    GreaterThan,          // >
    GreaterThanOrEqualTo, // >=

    /* Assignment */
    Equals, // =

    /* Layout */
    Newline,
    Indent,
    Dedent,
}

impl TokenKind {
    pub fn is_comparison_operator(&self) -> bool {
        matches!(
            self,
            Self::NotEquals
                | Self::DoubleEquals
                | Self::LessThan
                | Self::LessThanOrEqualTo
                | Self::GreaterThan
                | Self::GreaterThanOrEqualTo
                | Self::Keyword(Keyword::Is)
        )
    }

    pub fn is_term_operator(&self) -> bool {
        matches!(self, Self::Plus | Self::Minus)
    }

    pub fn is_factor_operator(&self) -> bool {
        matches!(self, Self::Asterisk | Self::DoubleSlash | Self::Percent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Keyword {
    Def,
    If,
    Elif,
    Else,
    While,
    Pass,
    Return,
    Not,
    Is,
    Abs,
    #[strum(serialize = "True")]
    True,
    #[strum(serialize = "False")]
    False,
    #[strum(serialize = "None")]
    None,
}

/// Table of single char tokens (matched after longer sequences are checked for)
static SINGLE_TOKENS: Lazy<BTreeMap<char, TokenKind>> = Lazy::new(|| {
    BTreeMap::from([
        ('(', TokenKind::OpenParen),
        (')', TokenKind::CloseParen),
        (',', TokenKind::Comma),
        (':', TokenKind::Colon),
        ('+', TokenKind::Plus),
        ('-', TokenKind::Minus),
        ('*', TokenKind::Asterisk),
        ('%', TokenKind::Percent),
        ('<', TokenKind::LessThan),
        ('>', TokenKind::GreaterThan),
        ('=', TokenKind::Equals),
    ])
});

/// Half-open byte range into the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn to(self, other: Span) -> Self {
        Self::new(self.start, other.end)
    }
}

impl core::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source SourceFile) -> Self {
        Self {
            source,
            chars: peek_nth(source.contents.chars()),
            position: 0,
            pending: VecDeque::new(),
            indent_stack: vec![0],
            paren_depth: 0,
            at_line_start: true,
            line_has_tokens: false,
            finished: false,
        }
    }

    pub fn tokenize(source: &'source SourceFile) -> Result<Vec<Token>> {
        let mut lexer = Self::new(source);
        let mut tokens = Vec::new();

        while let Some(token) = lexer.next_token()? {
            tokens.push(token);
        }

        Ok(tokens)
    }

    /// Error covering the char at the current position
    fn error(&self, c: char, message: String) -> CompileError {
        CompileError::parse(
            Span::new(self.position, self.position + c.len_utf8()),
            message,
        )
    }

    /// Consumes `count` chars. `position` stays a byte offset so spans can
    /// slice the source directly.
    fn advance(&mut self, count: usize) {
        for _ in 0..count {
            if let Some(c) = self.chars.next() {
                self.position += c.len_utf8();
            }
        }
    }

    fn ignore_line(&mut self) {
        while let Some(c) = self.chars.peek().copied() {
            if c == '\n' {
                break;
            }

            self.advance(1);
        }
    }

    /// Measures the leading whitespace of a logical line and queues the
    /// indent or dedent tokens it implies.
    fn read_indentation(&mut self) -> Result<()> {
        let start_position = self.position;
        let mut width = 0;

        while let Some(c) = self.chars.peek().copied() {
            if c != ' ' && c != '\t' {
                break;
            }

            width += 1;
            self.advance(1);
        }

        // Blank and comment-only lines never change indentation
        if matches!(self.chars.peek().copied(), None | Some('\n' | '\r' | '#')) {
            return Ok(());
        }

        let span = Span::new(start_position, self.position);
        let current = self.indent_stack.last().copied().unwrap_or(0);

        if width > current {
            self.indent_stack.push(width);
            self.pending.push_back(Token {
                kind: TokenKind::Indent,
                span,
            });
            return Ok(());
        }

        while width < self.indent_stack.last().copied().unwrap_or(0) {
            self.indent_stack.pop();
            self.pending.push_back(Token {
                kind: TokenKind::Dedent,
                span,
            });
        }

        if self.indent_stack.last().copied().unwrap_or(0) != width {
            return Err(CompileError::parse(
                span,
                "dedent that does not match any outer indentation level",
            ));
        }

        Ok(())
    }

    /// Closes the final logical line and any blocks still open at end of input
    fn finish(&mut self) {
        let span = Span::new(self.position, self.position);

        if self.line_has_tokens {
            self.line_has_tokens = false;
            self.pending.push_back(Token {
                kind: TokenKind::Newline,
                span,
            });
        }

        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.pending.push_back(Token {
                kind: TokenKind::Dedent,
                span,
            });
        }

        self.finished = true;
    }

    // Keyword, identifier, or boolean literal
    fn read_word(&mut self) -> Result<Token> {
        let start_position = self.position;

        while let Some(c) = self.chars.peek().copied() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }

            self.advance(1);
        }

        let span = self.new_span(start_position);
        let value = self.source.value_of_span(span)?;

        let kind = match value.parse() {
            Ok(keyword) => TokenKind::Keyword(keyword),
            Err(_) => TokenKind::Identifier,
        };

        Ok(Token { kind, span })
    }

    fn read_number(&mut self) -> Token {
        let start_position = self.position;

        while self.chars.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance(1);
        }

        Token {
            kind: TokenKind::IntegerLiteral,
            span: self.new_span(start_position),
        }
    }

    fn read_sized(&mut self, kind: TokenKind, length: usize) -> Token {
        let start_position = self.position;

        self.advance(length);

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn new_span(&self, start: usize) -> Span {
        Span {
            start,
            end: self.position,
        }
    }

    fn next_is(&mut self, offset: usize, expected: char) -> bool {
        self.chars.peek_nth(offset).is_some_and(|c| *c == expected)
    }

    pub fn next_token(&mut self) -> Result<Option<Token>> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Ok(Some(token));
            }

            if self.finished {
                return Ok(None);
            }

            if self.at_line_start {
                self.at_line_start = false;
                self.read_indentation()?;
                continue;
            }

            let Some(c) = self.chars.peek().copied() else {
                self.finish();
                continue;
            };

            if !c.is_ascii() {
                return Err(self.error(c, format!("unexpected non-ascii character `{c}`")));
            }

            let token = match c {
                '\n' => {
                    self.advance(1);

                    // Newlines inside parentheses join lines
                    if self.paren_depth > 0 {
                        continue;
                    }

                    self.at_line_start = true;

                    if !self.line_has_tokens {
                        continue;
                    }

                    self.line_has_tokens = false;
                    return Ok(Some(Token {
                        kind: TokenKind::Newline,
                        span: Span::new(self.position - 1, self.position),
                    }));
                }
                // Ignore whitespace
                c if c.is_ascii_whitespace() => {
                    self.advance(1);
                    continue;
                }
                // Ignore comments
                '#' => {
                    self.ignore_line();
                    continue;
                }

                // Integer literals
                n if n.is_ascii_digit() => self.read_number(),

                // Identifiers, keywords, and literal words
                a if a.is_ascii_alphabetic() || a == '_' => self.read_word()?,

                // Arrow (->)
                '-' if self.next_is(1, '>') => self.read_sized(TokenKind::Arrow, 2),
                // Floor division (//)
                '/' if self.next_is(1, '/') => self.read_sized(TokenKind::DoubleSlash, 2),
                // Double Equals (==)
                '=' if self.next_is(1, '=') => self.read_sized(TokenKind::DoubleEquals, 2),
                // Not Equals (!=)
                '!' if self.next_is(1, '=') => self.read_sized(TokenKind::NotEquals, 2),
                // Less than or equal (<=)
                '<' if self.next_is(1, '=') => {
                    self.read_sized(TokenKind::LessThanOrEqualTo, 2)
                }
                // Greater than or equal (>=)
                '>' if self.next_is(1, '=') => {
                    self.read_sized(TokenKind::GreaterThanOrEqualTo, 2)
                }

                s => match SINGLE_TOKENS.get(&s) {
                    Some(kind) => self.read_sized(*kind, 1),
                    None => {
                        return Err(self.error(s, format!("unexpected character `{s}`")));
                    }
                },
            };

            match token.kind {
                TokenKind::OpenParen => self.paren_depth += 1,
                TokenKind::CloseParen => self.paren_depth = self.paren_depth.saturating_sub(1),
                _ => {}
            }

            self.line_has_tokens = true;
            return Ok(Some(token));
        }
    }
}
