//! Logos-based lexer for the S-expression surface
//!
//! Fast tokenization using the logos crate.

use logos::Logos;

/// A token with its kind, text, and byte offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub offset: usize,
}

impl Token<'_> {
    /// Whitespace and comments carry no term content.
    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::LineComment)
    }
}

/// Lexer wrapping the logos-generated tokenizer
pub struct Lexer<'a> {
    inner: logos::Lexer<'a, LogosToken>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            inner: LogosToken::lexer(input),
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let logos_token = self.inner.next()?;
        let text = self.inner.slice();
        let offset = self.inner.span().start;

        let kind = match logos_token {
            Ok(t) => t.into(),
            Err(()) => TokenKind::Error,
        };

        Some(Token { kind, text, offset })
    }
}

/// Tokenize an entire string into a Vec
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    Lexer::new(input).collect()
}

/// Token kind exposed to the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Whitespace,
    LineComment,
    LParen,
    RParen,
    Atom,
    Variable,
    String,
    Error,
}

/// Logos token enum - maps to TokenKind
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
pub enum LogosToken {
    // =========================================================================
    // TRIVIA
    // =========================================================================
    #[regex(r"[ \t\r\n]+")]
    Whitespace,

    #[regex(r";[^\n]*")]
    LineComment,

    // =========================================================================
    // STRUCTURE
    // =========================================================================
    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    // =========================================================================
    // LEAVES
    // =========================================================================
    // Atoms exclude whitespace, parens, `;`, `"`, and `?`.
    #[regex(r#"[^ \t\r\n()";?]+"#)]
    Atom,

    // Variables are `?` followed by a non-empty atom-shaped name.
    #[regex(r#"\?[^ \t\r\n()";?]+"#)]
    Variable,

    #[regex(r#""([^"\\]|\\.)*""#)]
    String,
}

impl From<LogosToken> for TokenKind {
    fn from(token: LogosToken) -> Self {
        match token {
            LogosToken::Whitespace => TokenKind::Whitespace,
            LogosToken::LineComment => TokenKind::LineComment,
            LogosToken::LParen => TokenKind::LParen,
            LogosToken::RParen => TokenKind::RParen,
            LogosToken::Atom => TokenKind::Atom,
            LogosToken::Variable => TokenKind::Variable,
            LogosToken::String => TokenKind::String,
        }
    }
}
