//! Lexer implementation for the R-Sharp language

use crate::{new_token, Token, TokenType};
use rsharp_common::{Diagnostics, Position, Span};

/// Hand-written scanner over R-Sharp source text
pub struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    position: usize,
    current_pos: Position,
    file_id: u32,
    diagnostics: Diagnostics,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str, file_id: u32) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            position: 0,
            current_pos: Position::start(),
            file_id,
            diagnostics: Diagnostics::new(),
        }
    }

    /// Get the collected diagnostics
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Tokenize the entire input into a vector of tokens.
    ///
    /// Comments are dropped; an `EndOfFile` token is always appended.
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();

        while !self.is_at_end() {
            if let Some(token) = self.next_token() {
                tokens.push(token);
            }
        }

        tokens.push(new_token(TokenType::EndOfFile, Span::single(self.current_pos, self.file_id)));
        tokens
    }

    fn next_token(&mut self) -> Option<Token> {
        self.skip_whitespace_and_comments();

        if self.is_at_end() {
            return None;
        }

        let start_pos = self.current_pos;

        let token_type = match self.current_char() {
            '(' => { self.advance(); TokenType::LeftParen }
            ')' => { self.advance(); TokenType::RightParen }
            '{' => { self.advance(); TokenType::LeftBrace }
            '}' => { self.advance(); TokenType::RightBrace }
            '[' => { self.advance(); TokenType::LeftBracket }
            ']' => { self.advance(); TokenType::RightBracket }
            ';' => { self.advance(); TokenType::Semicolon }
            ',' => { self.advance(); TokenType::Comma }
            '?' => { self.advance(); TokenType::Question }
            '~' => { self.advance(); TokenType::Tilde }
            '$' => { self.advance(); TokenType::DollarSign }
            '@' => { self.advance(); TokenType::At }
            '+' => { self.advance(); TokenType::Plus }
            '-' => { self.advance(); TokenType::Minus }
            '*' => { self.advance(); TokenType::Star }
            '/' => { self.advance(); TokenType::Slash }
            '%' => { self.advance(); TokenType::Percent }

            ':' => {
                self.advance();
                if self.current_char() == ':' {
                    self.advance();
                    TokenType::DoubleColon
                } else {
                    TokenType::Colon
                }
            }
            '=' => {
                self.advance();
                if self.current_char() == '=' {
                    self.advance();
                    TokenType::Equal
                } else {
                    TokenType::Assign
                }
            }
            '!' => {
                self.advance();
                if self.current_char() == '=' {
                    self.advance();
                    TokenType::NotEqual
                } else {
                    TokenType::Bang
                }
            }
            '<' => {
                self.advance();
                if self.current_char() == '=' {
                    self.advance();
                    TokenType::LessEqual
                } else {
                    TokenType::Less
                }
            }
            '>' => {
                self.advance();
                if self.current_char() == '=' {
                    self.advance();
                    TokenType::GreaterEqual
                } else {
                    TokenType::Greater
                }
            }
            '&' => {
                self.advance();
                if self.current_char() == '&' {
                    self.advance();
                    TokenType::LogicalAnd
                } else {
                    let msg = "Unexpected character: '&'".to_string();
                    self.diagnostics.error(&msg, Span::single(start_pos, self.file_id));
                    TokenType::Error(msg)
                }
            }
            '|' => {
                self.advance();
                if self.current_char() == '|' {
                    self.advance();
                    TokenType::LogicalOr
                } else {
                    let msg = "Unexpected character: '|'".to_string();
                    self.diagnostics.error(&msg, Span::single(start_pos, self.file_id));
                    TokenType::Error(msg)
                }
            }

            '"' => self.scan_string_literal(),
            '\'' => self.scan_char_literal(),

            c if c.is_ascii_digit() => self.scan_number(),
            c if c.is_ascii_alphabetic() || c == '_' => self.scan_identifier_or_keyword(),

            c => {
                self.advance();
                let msg = format!("Unexpected character: '{}'", c);
                self.diagnostics.error(&msg, Span::single(start_pos, self.file_id));
                TokenType::Error(msg)
            }
        };

        let span = Span::new(start_pos, self.current_pos, self.file_id);
        Some(new_token(token_type, span))
    }

    fn scan_number(&mut self) -> TokenType {
        let start_pos = self.current_pos;
        let start = self.position;
        while !self.is_at_end() && self.current_char().is_ascii_digit() {
            self.advance();
        }
        let text = &self.input[start..self.position];
        match text.parse::<i64>() {
            Ok(value) => TokenType::Number(value),
            Err(_) => {
                let msg = "Number doesn't fit into 64 bits".to_string();
                self.diagnostics.error(&msg, Span::new(start_pos, self.current_pos, self.file_id));
                TokenType::Error(msg)
            }
        }
    }

    fn scan_identifier_or_keyword(&mut self) -> TokenType {
        let start = self.position;
        while !self.is_at_end()
            && (self.current_char().is_ascii_alphanumeric() || self.current_char() == '_')
        {
            self.advance();
        }
        let text = &self.input[start..self.position];
        match text {
            "return" => TokenType::KeywordReturn,
            "if" => TokenType::KeywordIf,
            "elif" => TokenType::KeywordElif,
            "else" => TokenType::KeywordElse,
            "while" => TokenType::KeywordWhile,
            "for" => TokenType::KeywordFor,
            "do" => TokenType::KeywordDo,
            "break" => TokenType::KeywordBreak,
            "skip" => TokenType::KeywordSkip,
            "i8" | "i16" | "i32" | "i64" | "c_void" => TokenType::Typename(text.to_string()),
            _ => TokenType::Identifier(text.to_string()),
        }
    }

    fn scan_string_literal(&mut self) -> TokenType {
        let start_pos = self.current_pos;
        self.advance(); // opening quote
        let mut bytes = Vec::new();
        loop {
            if self.is_at_end() {
                let msg = "Unexpected end of file in string literal".to_string();
                self.diagnostics.error(&msg, Span::new(start_pos, self.current_pos, self.file_id));
                return TokenType::Error(msg);
            }
            match self.current_char() {
                '"' => {
                    self.advance();
                    break;
                }
                '\\' => {
                    self.advance();
                    match self.scan_escape() {
                        Some(b) => bytes.push(b),
                        None => {
                            let msg = "String contains invalid escape code".to_string();
                            self.diagnostics.error(&msg, Span::new(start_pos, self.current_pos, self.file_id));
                            return TokenType::Error(msg);
                        }
                    }
                }
                c => {
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                    self.advance();
                }
            }
        }
        TokenType::StringLiteral(bytes)
    }

    fn scan_char_literal(&mut self) -> TokenType {
        let start_pos = self.current_pos;
        self.advance(); // opening quote
        let value = if self.is_at_end() {
            None
        } else if self.current_char() == '\\' {
            self.advance();
            self.scan_escape().map(|b| b as i64)
        } else if self.current_char() == '\'' {
            None // empty literal
        } else {
            let c = self.current_char();
            self.advance();
            Some(c as i64)
        };

        match value {
            Some(v) if !self.is_at_end() && self.current_char() == '\'' => {
                self.advance();
                TokenType::CharacterLiteral(v)
            }
            _ => {
                // skip until the closing quote so the rest of the stream survives
                while !self.is_at_end() && self.current_char() != '\'' {
                    self.advance();
                }
                if !self.is_at_end() {
                    self.advance();
                }
                let msg = "Invalid character literal".to_string();
                self.diagnostics.error(&msg, Span::new(start_pos, self.current_pos, self.file_id));
                TokenType::Error(msg)
            }
        }
    }

    fn scan_escape(&mut self) -> Option<u8> {
        if self.is_at_end() {
            return None;
        }
        let escaped = match self.current_char() {
            'n' => b'\n',
            'r' => b'\r',
            't' => b'\t',
            'e' => 0x1b,
            'b' => 0x08,
            '0' => 0,
            '\\' => b'\\',
            '\'' => b'\'',
            '"' => b'"',
            _ => return None,
        };
        self.advance();
        Some(escaped)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            if self.is_at_end() {
                return;
            }
            let c = self.current_char();
            if c.is_whitespace() {
                self.advance();
            } else if c == '/' && self.peek_char(1) == Some('/') {
                while !self.is_at_end() && self.current_char() != '\n' {
                    self.advance();
                }
            } else if c == '/' && self.peek_char(1) == Some('*') {
                self.advance();
                self.advance();
                while !self.is_at_end()
                    && !(self.current_char() == '*' && self.peek_char(1) == Some('/'))
                {
                    self.advance();
                }
                if !self.is_at_end() {
                    self.advance();
                    self.advance();
                }
            } else {
                return;
            }
        }
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.bytes.len()
    }

    fn current_char(&self) -> char {
        self.input[self.position..].chars().next().unwrap_or('\0')
    }

    fn peek_char(&self, lookahead: usize) -> Option<char> {
        self.input[self.position..].chars().nth(lookahead)
    }

    fn advance(&mut self) {
        if let Some(c) = self.input[self.position..].chars().next() {
            self.position += c.len_utf8();
            if c == '\n' {
                self.current_pos.line += 1;
                self.current_pos.column = 1;
            } else {
                self.current_pos.column += 1;
            }
            self.current_pos.offset = self.position as u32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lex(source: &str) -> Vec<TokenType> {
        let mut lexer = Lexer::new(source, 0);
        let tokens = lexer.tokenize();
        assert!(!lexer.diagnostics().has_errors(), "unexpected lex errors");
        tokens.into_iter().map(|t| t.value).collect()
    }

    #[test]
    fn lexes_function_header() {
        let tokens = lex("main() : i32 {}");
        assert_eq!(
            tokens,
            vec![
                TokenType::Identifier("main".to_string()),
                TokenType::LeftParen,
                TokenType::RightParen,
                TokenType::Colon,
                TokenType::Typename("i32".to_string()),
                TokenType::LeftBrace,
                TokenType::RightBrace,
                TokenType::EndOfFile,
            ]
        );
    }

    #[test]
    fn distinguishes_keywords_from_identifiers() {
        let tokens = lex("iffy if do doit skip");
        assert_eq!(
            tokens,
            vec![
                TokenType::Identifier("iffy".to_string()),
                TokenType::KeywordIf,
                TokenType::KeywordDo,
                TokenType::Identifier("doit".to_string()),
                TokenType::KeywordSkip,
                TokenType::EndOfFile,
            ]
        );
    }

    #[test]
    fn lexes_two_character_operators() {
        let tokens = lex("== != <= >= && || :: = < >");
        assert_eq!(
            tokens,
            vec![
                TokenType::Equal,
                TokenType::NotEqual,
                TokenType::LessEqual,
                TokenType::GreaterEqual,
                TokenType::LogicalAnd,
                TokenType::LogicalOr,
                TokenType::DoubleColon,
                TokenType::Assign,
                TokenType::Less,
                TokenType::Greater,
                TokenType::EndOfFile,
            ]
        );
    }

    #[test]
    fn drops_comments() {
        let tokens = lex("1 // line\n/* block\nstill block */ 2");
        assert_eq!(
            tokens,
            vec![TokenType::Number(1), TokenType::Number(2), TokenType::EndOfFile]
        );
    }

    #[test]
    fn lexes_string_and_char_literals_with_escapes() {
        let tokens = lex(r#""hi\n" '\0' 'a'"#);
        assert_eq!(
            tokens,
            vec![
                TokenType::StringLiteral(vec![b'h', b'i', b'\n']),
                TokenType::CharacterLiteral(0),
                TokenType::CharacterLiteral('a' as i64),
                TokenType::EndOfFile,
            ]
        );
    }

    #[test]
    fn reports_unexpected_character() {
        let mut lexer = Lexer::new("a # b", 0);
        let _ = lexer.tokenize();
        assert!(lexer.diagnostics().has_errors());
    }

    #[test]
    fn tracks_line_and_column() {
        let mut lexer = Lexer::new("a\n  b", 0);
        let tokens = lexer.tokenize();
        assert_eq!(tokens[1].span.start.line, 2);
        assert_eq!(tokens[1].span.start.column, 3);
    }
}
