//! Lexical analysis for the R-Sharp language
//!
//! Turns R-Sharp source text into a flat token stream. Comments are
//! dropped; every stream ends with an `EndOfFile` token.

pub mod lexer;
pub mod token;

pub use lexer::*;
pub use token::*;
