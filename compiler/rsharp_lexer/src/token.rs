//! Token definitions for the R-Sharp language

use rsharp_common::{Span, Spanned};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Token types in the R-Sharp language
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenType {
    // Literals
    Number(i64),
    CharacterLiteral(i64),
    StringLiteral(Vec<u8>),

    // Identifiers and type names
    Identifier(String),
    Typename(String), // i8 | i16 | i32 | i64 | c_void

    // Keywords
    KeywordReturn,
    KeywordIf,
    KeywordElif,
    KeywordElse,
    KeywordWhile,
    KeywordFor,
    KeywordDo,
    KeywordBreak,
    KeywordSkip,

    // Operators
    Plus,             // +
    Minus,            // -
    Star,             // *
    Slash,            // /
    Percent,          // %
    Assign,           // =
    Equal,            // ==
    NotEqual,         // !=
    Less,             // <
    LessEqual,        // <=
    Greater,          // >
    GreaterEqual,     // >=
    LogicalAnd,       // &&
    LogicalOr,        // ||
    Bang,             // !
    Tilde,            // ~
    Question,         // ?
    DollarSign,       // $
    At,               // @
    DoubleColon,      // ::

    // Delimiters
    LeftParen,        // (
    RightParen,       // )
    LeftBrace,        // {
    RightBrace,       // }
    LeftBracket,      // [
    RightBracket,     // ]
    Semicolon,        // ;
    Comma,            // ,
    Colon,            // :

    // Special
    EndOfFile,

    // Error token for error recovery
    Error(String),
}

impl TokenType {
    /// True for the token kinds that may start a type.
    pub fn starts_type(&self) -> bool {
        matches!(self, TokenType::Typename(_) | TokenType::Star | TokenType::LeftBracket)
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Number(n) => write!(f, "{}", n),
            TokenType::CharacterLiteral(c) => write!(f, "'{}'", c),
            TokenType::StringLiteral(bytes) => {
                write!(f, "\"{}\"", String::from_utf8_lossy(bytes))
            }
            TokenType::Identifier(name) => write!(f, "{}", name),
            TokenType::Typename(name) => write!(f, "{}", name),
            TokenType::Error(msg) => write!(f, "ERROR: {}", msg),
            _ => {
                let token_str = match self {
                    TokenType::KeywordReturn => "return",
                    TokenType::KeywordIf => "if",
                    TokenType::KeywordElif => "elif",
                    TokenType::KeywordElse => "else",
                    TokenType::KeywordWhile => "while",
                    TokenType::KeywordFor => "for",
                    TokenType::KeywordDo => "do",
                    TokenType::KeywordBreak => "break",
                    TokenType::KeywordSkip => "skip",
                    TokenType::Plus => "+",
                    TokenType::Minus => "-",
                    TokenType::Star => "*",
                    TokenType::Slash => "/",
                    TokenType::Percent => "%",
                    TokenType::Assign => "=",
                    TokenType::Equal => "==",
                    TokenType::NotEqual => "!=",
                    TokenType::Less => "<",
                    TokenType::LessEqual => "<=",
                    TokenType::Greater => ">",
                    TokenType::GreaterEqual => ">=",
                    TokenType::LogicalAnd => "&&",
                    TokenType::LogicalOr => "||",
                    TokenType::Bang => "!",
                    TokenType::Tilde => "~",
                    TokenType::Question => "?",
                    TokenType::DollarSign => "$",
                    TokenType::At => "@",
                    TokenType::DoubleColon => "::",
                    TokenType::LeftParen => "(",
                    TokenType::RightParen => ")",
                    TokenType::LeftBrace => "{",
                    TokenType::RightBrace => "}",
                    TokenType::LeftBracket => "[",
                    TokenType::RightBracket => "]",
                    TokenType::Semicolon => ";",
                    TokenType::Comma => ",",
                    TokenType::Colon => ":",
                    TokenType::EndOfFile => "<eof>",
                    _ => unreachable!(),
                };
                write!(f, "{}", token_str)
            }
        }
    }
}

/// A token with its source span
pub type Token = Spanned<TokenType>;

/// Create a token from a type and span
pub fn new_token(token_type: TokenType, span: Span) -> Token {
    Spanned::new(token_type, span)
}
