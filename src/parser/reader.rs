//! Recursive-descent reader: tokens to terms.
//!
//! Reads the ordered sequence of top-level terms until EOF. Errors carry the
//! 1-indexed line/column of the offending token.

use thiserror::Error;
use tracing::warn;

use crate::base::Position;
use crate::term::Term;

use super::lexer::{Token, TokenKind, tokenize};

/// A parse error with source location.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A `)` with no matching `(`.
    #[error("unexpected ')' at {position}")]
    UnexpectedCloseParen { position: Position },

    /// A `(` never closed before EOF.
    #[error("unclosed '(' opened at {position}")]
    UnclosedList { position: Position },

    /// A `"` never closed before end of line/input.
    #[error("unterminated string literal at {position}")]
    UnterminatedString { position: Position },

    /// A lone `?` with no variable name.
    #[error("empty variable name at {position}")]
    EmptyVariable { position: Position },

    /// Any other unlexable input.
    #[error("unexpected character {text:?} at {position}")]
    UnexpectedCharacter { text: String, position: Position },
}

/// Parse source text into the ordered sequence of terms read until EOF.
///
/// Empty input yields the empty sequence.
pub fn parse(source: &str) -> Result<Vec<Term>, ParseError> {
    let tokens: Vec<_> = tokenize(source)
        .into_iter()
        .filter(|t| !t.is_trivia())
        .collect();
    let mut reader = Reader {
        source,
        tokens: &tokens,
        pos: 0,
    };
    let mut terms = Vec::new();
    while reader.peek_kind().is_some() {
        terms.push(reader.read_term()?);
    }
    Ok(terms)
}

struct Reader<'a> {
    source: &'a str,
    tokens: &'a [Token<'a>],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn peek_kind(&self) -> Option<TokenKind> {
        self.tokens.get(self.pos).map(|t| t.kind)
    }

    fn bump(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn position_of(&self, token: &Token<'a>) -> Position {
        Position::of_offset(self.source, token.offset)
    }

    fn read_term(&mut self) -> Result<Term, ParseError> {
        let Some(token) = self.bump() else {
            unreachable!("read_term called at EOF");
        };
        match token.kind {
            TokenKind::Atom => Ok(Term::atom(token.text)),
            TokenKind::Variable => Ok(Term::var(&token.text[1..])),
            TokenKind::String => Ok(Term::atom(unescape(
                &token.text[1..token.text.len() - 1],
                self.position_of(&token),
            ))),
            TokenKind::LParen => {
                let open_position = self.position_of(&token);
                let mut items = Vec::new();
                loop {
                    match self.peek_kind() {
                        None => {
                            return Err(ParseError::UnclosedList {
                                position: open_position,
                            });
                        }
                        Some(TokenKind::RParen) => {
                            self.pos += 1;
                            return Ok(Term::list(items));
                        }
                        Some(_) => items.push(self.read_term()?),
                    }
                }
            }
            TokenKind::RParen => Err(ParseError::UnexpectedCloseParen {
                position: self.position_of(&token),
            }),
            TokenKind::Error => {
                let position = self.position_of(&token);
                if token.text.starts_with('"') {
                    Err(ParseError::UnterminatedString { position })
                } else if token.text.starts_with('?') {
                    Err(ParseError::EmptyVariable { position })
                } else {
                    Err(ParseError::UnexpectedCharacter {
                        text: token.text.to_string(),
                        position,
                    })
                }
            }
            TokenKind::Whitespace | TokenKind::LineComment => {
                unreachable!("trivia filtered before reading")
            }
        }
    }
}

/// Process backslash escapes inside a string literal body.
///
/// `\n`, `\t`, `\r`, `\\`, `\"` translate; an unknown escape yields the
/// escaped character literally, with a warning.
fn unescape(raw: &str, position: Position) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some(other) => {
                warn!("unknown escape '\\{other}' in string at {position}");
                out.push(other);
            }
            // Trailing backslash cannot occur in a lexed string literal.
            None => out.push('\\'),
        }
    }
    out
}
