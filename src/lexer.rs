//! Handwritten lexer for Basalt

use crate::ast::Span;
use std::iter::Peekable;
use std::str::Chars;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Int(i64),
    String(String),
    True,
    False,

    // Identifiers
    Ident(String),      // lowercase start
    UpperIdent(String), // uppercase start (constructors, type names)

    // Keywords
    Data,
    Let,
    In,
    Case,
    Of,
    If,
    Then,
    Else,

    // Delimiters
    LParen,    // (
    RParen,    // )
    LBrace,    // {
    RBrace,    // }
    Comma,     // ,
    Semicolon, // ;

    // Operators
    Arrow,       // ->
    Backslash,   // \
    Pipe,        // |
    Eq,          // =
    EqEq,        // ==
    Neq,         // /=
    Lt,          // <
    Gt,          // >
    Lte,         // <=
    Gte,         // >=
    Plus,        // +
    Minus,       // -
    Star,        // *
    Slash,       // /
    Concat,      // ++
    DoubleColon, // ::
    Underscore,  // _

    // Special
    Eof,
}

#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

#[derive(Error, Debug)]
pub enum LexError {
    #[error("unexpected character: {0}")]
    UnexpectedChar(char, Span),
    #[error("unterminated string")]
    UnterminatedString(Span),
    #[error("invalid escape sequence: \\{0}")]
    InvalidEscape(char, Span),
    #[error("invalid number: {0}")]
    InvalidNumber(String, Span),
}

impl LexError {
    /// Get the source span where this error occurred
    pub fn span(&self) -> &Span {
        match self {
            LexError::UnexpectedChar(_, span) => span,
            LexError::UnterminatedString(span) => span,
            LexError::InvalidEscape(_, span) => span,
            LexError::InvalidNumber(_, span) => span,
        }
    }
}

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            pos: 0,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<SpannedToken>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok.token == Token::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.advance() {
            if c == '\n' {
                break;
            }
        }
    }

    fn next_token(&mut self) -> Result<SpannedToken, LexError> {
        loop {
            self.skip_whitespace();

            let start = self.pos;

            // `--` begins a line comment; a lone `-` is minus or arrow
            if self.peek() == Some('-') {
                self.advance();
                if self.peek() == Some('-') {
                    self.advance();
                    self.skip_line_comment();
                    continue;
                }
                if self.peek() == Some('>') {
                    self.advance();
                    return Ok(SpannedToken {
                        token: Token::Arrow,
                        span: Span::new(start, self.pos),
                    });
                }
                return Ok(SpannedToken {
                    token: Token::Minus,
                    span: Span::new(start, self.pos),
                });
            }

            break;
        }

        let start = self.pos;

        let Some(c) = self.advance() else {
            return Ok(SpannedToken {
                token: Token::Eof,
                span: Span::new(start, start),
            });
        };

        let token = match c {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            ',' => Token::Comma,
            ';' => Token::Semicolon,
            '\\' => Token::Backslash,
            '+' => {
                if self.peek() == Some('+') {
                    self.advance();
                    Token::Concat
                } else {
                    Token::Plus
                }
            }
            '*' => Token::Star,
            '/' => {
                if self.peek() == Some('=') {
                    self.advance();
                    Token::Neq
                } else {
                    Token::Slash
                }
            }
            '=' => {
                if self.peek() == Some('=') {
                    self.advance();
                    Token::EqEq
                } else {
                    Token::Eq
                }
            }
            '<' => {
                if self.peek() == Some('=') {
                    self.advance();
                    Token::Lte
                } else {
                    Token::Lt
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.advance();
                    Token::Gte
                } else {
                    Token::Gt
                }
            }
            '|' => Token::Pipe,
            ':' => {
                if self.peek() == Some(':') {
                    self.advance();
                    Token::DoubleColon
                } else {
                    return Err(LexError::UnexpectedChar(c, Span::new(start, self.pos)));
                }
            }
            '"' => return self.lex_string(start),
            '_' => {
                if self.peek().is_some_and(|c| c.is_alphanumeric()) {
                    return Ok(self.lex_word(start, c));
                }
                Token::Underscore
            }
            c if c.is_ascii_digit() => return self.lex_number(start, c),
            c if c.is_alphabetic() => return Ok(self.lex_word(start, c)),
            c => return Err(LexError::UnexpectedChar(c, Span::new(start, self.pos))),
        };

        Ok(SpannedToken {
            token,
            span: Span::new(start, self.pos),
        })
    }

    fn lex_string(&mut self, start: usize) -> Result<SpannedToken, LexError> {
        let mut s = String::new();
        loop {
            match self.advance() {
                Some('"') => break,
                Some('\\') => {
                    let esc = self
                        .advance()
                        .ok_or(LexError::UnterminatedString(Span::new(start, self.pos)))?;
                    match esc {
                        'n' => s.push('\n'),
                        't' => s.push('\t'),
                        '\\' => s.push('\\'),
                        '"' => s.push('"'),
                        c => return Err(LexError::InvalidEscape(c, Span::new(start, self.pos))),
                    }
                }
                Some(c) => s.push(c),
                None => return Err(LexError::UnterminatedString(Span::new(start, self.pos))),
            }
        }
        Ok(SpannedToken {
            token: Token::String(s),
            span: Span::new(start, self.pos),
        })
    }

    fn lex_number(&mut self, start: usize, first: char) -> Result<SpannedToken, LexError> {
        let mut digits = String::from(first);
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let n = digits
            .parse::<i64>()
            .map_err(|_| LexError::InvalidNumber(digits.clone(), Span::new(start, self.pos)))?;
        Ok(SpannedToken {
            token: Token::Int(n),
            span: Span::new(start, self.pos),
        })
    }

    fn lex_word(&mut self, start: usize, first: char) -> SpannedToken {
        let mut word = String::from(first);
        while let Some(c) = self.peek() {
            // `$` never lexes; it is reserved for compiler-generated names
            if c.is_alphanumeric() || c == '_' || c == '\'' {
                word.push(c);
                self.advance();
            } else {
                break;
            }
        }

        let token = match word.as_str() {
            "data" => Token::Data,
            "let" => Token::Let,
            "in" => Token::In,
            "case" => Token::Case,
            "of" => Token::Of,
            "if" => Token::If,
            "then" => Token::Then,
            "else" => Token::Else,
            "True" => Token::True,
            "False" => Token::False,
            _ => {
                if word.starts_with(|c: char| c.is_uppercase()) {
                    Token::UpperIdent(word)
                } else {
                    Token::Ident(word)
                }
            }
        };

        SpannedToken {
            token,
            span: Span::new(start, self.pos),
        }
    }
}
