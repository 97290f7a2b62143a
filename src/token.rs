//! The token definition for the quick-filter and command language.

/// A token is a single unit of the language, with a specific kind and location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Span,
}

/// The kind of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    // Keywords
    And,     // "AND"
    Or,      // "OR"
    Between, // "BETWEEN"
    In,      // "IN"
    True,    // "true"
    False,   // "false"

    // Literals
    Identifier(&'a str),
    String(&'a str), // The string content, without quotes
    Number(&'a str), // Raw digits, optional sign and fraction
    Date(&'a str),   // Raw `YYYY-MM-DD`

    // Punctuation
    LParen, // (
    RParen, // )
    Comma,  // ,
    Dot,    // .
    DotDot, // ..

    // Operators
    Eq,     // =
    Tilde,  // ~  contains
    Caret,  // ^  startsWith
    Dollar, // $  endsWith
    Gt,     // >
    Lt,     // <

    // Special
    Illegal, // An illegal/unknown character, or an unterminated string
}

/// Represents a span in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// The starting byte offset.
    pub start: usize,
    /// The ending byte offset.
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}
