//! The token definition for the query languages (informal DSL and SQL-like clauses).

/// One lexed unit of a query text and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Span,
}

/// Keywords, literals and symbols shared by both query languages.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    // Keywords
    Show,     // "show"
    Where,    // "where"
    And,      // "AND"
    Or,       // "OR"
    Not,      // "NOT"
    Is,       // "is"
    Of,       // "of"
    Contains, // "contains"
    Starts,   // "starts"
    Ends,     // "ends"
    With,     // "with"

    // Literals
    Identifier(&'a str),
    /// The string content between the quotes, escapes left untouched
    String(&'a str),
    Number(&'a str),

    // Punctuation
    LParen,    // (
    RParen,    // )
    Comma,     // ,
    Star,      // *
    Semicolon, // ;

    // Operators
    Eq,    // =
    NotEq, // != or <>
    Gt,    // >
    Lt,    // <
    Gte,   // >=
    Lte,   // <=

    // Special
    Illegal, // An illegal/unknown character or an unterminated string
}

impl TokenKind<'_> {
    /// Relational operator symbols usable in every grammar.
    pub fn is_relational(&self) -> bool {
        matches!(
            self,
            TokenKind::Eq
                | TokenKind::NotEq
                | TokenKind::Gt
                | TokenKind::Lt
                | TokenKind::Gte
                | TokenKind::Lte
        )
    }
}

/// Byte range `[start, end)` into the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    /// Converts byte offsets into character offsets of `source`, which is
    /// what editors use to highlight a range.
    pub fn char_range(&self, source: &str) -> (usize, usize) {
        let start = source[..self.start].chars().count();
        let end = start + source[self.start..self.end].chars().count();
        (start, end)
    }
}
