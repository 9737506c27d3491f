//! Lexer for the mj source language.
//!
//! The whole vocabulary is matched by a single alternation of category
//! patterns, tried in priority order: reserved words win over identifiers,
//! identifiers over stray characters. Every byte of the input ends up in
//! exactly one token, so concatenating the lexemes reproduces the source.

mod token;

pub use token::*;

use std::{error::Error, fmt::Display};

use once_cell::sync::Lazy;
use regex::Regex;

/// Category patterns in priority order. The final `mistake` pattern
/// swallows any single character nothing else matched and aborts lexing.
const TOKEN_SPECS: [(&str, &str); 8] = [
    (
        "reserved",
        r"\b(?:boolean|class|extends|public|static|void|main|String|return|int|if|else|while|System\.out\.println|length|true|false|this|new|null)\b",
    ),
    ("identifier", r"[a-zA-Z_][a-zA-Z0-9_]*"),
    ("number", r"[0-9]+"),
    ("operator", r"==|!=|<=|>=|<|>|\+|-|\*|&&|!|="),
    ("punctuation", r"[(){}\[\];.,]"),
    ("whitespace", r"[ \t\r\x0c\n]+"),
    ("comment", r"//.*?$|/\*.*?\*/"),
    ("mistake", r"."),
];

static TOKEN_REGEX: Lazy<Regex> = Lazy::new(|| {
    let alternation = TOKEN_SPECS
        .iter()
        .map(|(name, pattern)| format!("(?P<{name}>{pattern})"))
        .collect::<Vec<_>>()
        .join("|");

    // (?m) so `$` ends line comments at the newline, (?s) so block
    // comments may span lines.
    Regex::new(&format!("(?ms){alternation}")).expect("token alternation must compile")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

impl Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}:{})", self.message, self.line, self.col)
    }
}

impl Error for LexError {}

pub type LexResult<T> = Result<T, LexError>;

pub struct Lexer<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            tokens: vec![],
            line: 1,
            col: 1,
        }
    }

    /// Tokenize the whole input, whitespace and comments included.
    pub fn lex(mut self) -> LexResult<Vec<Token>> {
        for capture in TOKEN_REGEX.captures_iter(self.input) {
            let (kind, lexeme) = TOKEN_SPECS
                .iter()
                .find_map(|&(name, _)| {
                    capture
                        .name(name)
                        .map(|m| (Self::kind_for(name), m.as_str()))
                })
                .expect("every match belongs to a named category");

            if kind == TokenKind::Mistake {
                return Err(LexError {
                    message: format!("unknown token '{lexeme}'"),
                    line: self.line,
                    col: self.col,
                });
            }

            self.tokens
                .push(Token::new(kind, lexeme, self.line, self.col));
            self.advance_position(lexeme);
        }

        Ok(self.tokens)
    }

    fn kind_for(name: &str) -> TokenKind {
        match name {
            "reserved" => TokenKind::Reserved,
            "identifier" => TokenKind::Identifier,
            "number" => TokenKind::Number,
            "operator" => TokenKind::Operator,
            "punctuation" => TokenKind::Punctuation,
            "whitespace" => TokenKind::Whitespace,
            "comment" => TokenKind::Comment,
            _ => TokenKind::Mistake,
        }
    }

    fn advance_position(&mut self, lexeme: &str) {
        for c in lexeme.chars() {
            if c == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .lex()
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn test_lex_reserved_word() {
        let tokens = Lexer::new("class").lex().unwrap();

        assert_eq!(tokens, vec![Token::new(TokenKind::Reserved, "class", 1, 1)]);
    }

    #[test]
    fn test_lex_identifier_with_reserved_prefix() {
        let tokens = Lexer::new("classes").lex().unwrap();

        assert_eq!(
            tokens,
            vec![Token::new(TokenKind::Identifier, "classes", 1, 1)]
        );
    }

    #[test]
    fn test_lex_print_statement() {
        assert_eq!(
            kinds("System.out.println(42);"),
            vec![
                TokenKind::Reserved,
                TokenKind::Punctuation,
                TokenKind::Number,
                TokenKind::Punctuation,
                TokenKind::Punctuation,
            ]
        );
    }

    #[test]
    fn test_lex_two_char_operators() {
        let tokens = Lexer::new("<= == != && !").lex().unwrap();
        let operators = tokens
            .iter()
            .filter(|token| token.kind == TokenKind::Operator)
            .map(|token| token.lexeme.as_str())
            .collect::<Vec<_>>();

        assert_eq!(operators, vec!["<=", "==", "!=", "&&", "!"]);
    }

    #[test]
    fn test_lex_line_comment_stops_at_newline() {
        assert_eq!(
            kinds("// note\nx"),
            vec![
                TokenKind::Comment,
                TokenKind::Whitespace,
                TokenKind::Identifier,
            ]
        );
    }

    #[test]
    fn test_lex_block_comment_spans_lines() {
        let tokens = Lexer::new("/* a\nb */x").lex().unwrap();

        assert_eq!(tokens[0].kind, TokenKind::Comment);
        assert_eq!(tokens[0].lexeme, "/* a\nb */");
        assert_eq!(tokens[1].lexeme, "x");
    }

    #[test]
    fn test_lexeme_concatenation_roundtrips() {
        let input = "class P { // main\n  public static void main(String[] a) { }\n}";
        let tokens = Lexer::new(input).lex().unwrap();
        let rebuilt = tokens
            .iter()
            .map(|token| token.lexeme.as_str())
            .collect::<String>();

        assert_eq!(rebuilt, input);
    }

    #[test]
    fn test_lex_mistake_aborts_with_position() {
        let error = Lexer::new("x = @;").lex().unwrap_err();

        assert_eq!(error.col, 5);
        assert!(error.message.contains('@'));
    }

    #[test]
    fn test_lex_tracks_lines() {
        let tokens = Lexer::new("a\n  b").lex().unwrap();
        let b = tokens.last().unwrap();

        assert_eq!((b.line, b.col), (2, 3));
    }
}
