use std::fmt::Display;

use serde::Serialize;

/// Category a token belongs to. The lexer assigns exactly one kind per
/// token; `Whitespace` and `Comment` survive lexing so that the token
/// stream still spells out the complete input, and the parser drops them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TokenKind {
    Reserved,
    Identifier,
    Number,
    Operator,
    Punctuation,
    Whitespace,
    Comment,
    Mistake,
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TokenKind::Reserved => "reserved",
            TokenKind::Identifier => "identifier",
            TokenKind::Number => "number",
            TokenKind::Operator => "operator",
            TokenKind::Punctuation => "punctuation",
            TokenKind::Whitespace => "whitespace",
            TokenKind::Comment => "comment",
            TokenKind::Mistake => "mistake",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub col: usize,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl ToString, line: usize, col: usize) -> Self {
        Self {
            kind,
            lexeme: lexeme.to_string(),
            line,
            col,
        }
    }

    /// Whether this token carries syntactic content for the parser.
    pub fn is_significant(&self) -> bool {
        !matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment)
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}, '{}'>", self.kind, self.lexeme)
    }
}
