//! Error handling utilities for the R-Sharp compiler

use thiserror::Error;

/// The main error type for the R-Sharp compiler
#[derive(Error, Debug, Clone)]
pub enum RsError {
    #[error("Lexical error: {message}")]
    LexError { message: String },

    #[error("Parse error: {message}")]
    ParseError { message: String },

    #[error("Type error: {message}")]
    TypeError { message: String },

    #[error("Code generation error: {message}")]
    CodegenError { message: String },

    #[error("I/O error: {message}")]
    IoError { message: String },

    #[error("Toolchain error: {message}")]
    ToolchainError { message: String },
}

/// Result type alias for R-Sharp compiler operations
pub type RsResult<T> = Result<T, RsError>;

impl RsError {
    pub fn lex_error(message: impl Into<String>) -> Self {
        Self::LexError { message: message.into() }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::ParseError { message: message.into() }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::TypeError { message: message.into() }
    }

    pub fn codegen_error(message: impl Into<String>) -> Self {
        Self::CodegenError { message: message.into() }
    }

    pub fn io_error(message: impl Into<String>) -> Self {
        Self::IoError { message: message.into() }
    }

    pub fn toolchain_error(message: impl Into<String>) -> Self {
        Self::ToolchainError { message: message.into() }
    }

    /// Process exit code associated with this error class.
    ///
    /// 2 = syntax error, 3 = semantic error, 4 = assembling/linking error,
    /// 1 = anything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            RsError::LexError { .. } | RsError::ParseError { .. } => 2,
            RsError::TypeError { .. } => 3,
            RsError::ToolchainError { .. } => 4,
            _ => 1,
        }
    }
}
