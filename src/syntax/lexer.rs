//! Lexer for the !~ATH language.
//!
//! Turns UTF-8 source into a token stream terminated by EOF, tracking
//! 1-based line/column positions. Comments (`//`) and whitespace are
//! skipped. The `~ATH` marker lexes as a single token.

use crate::error::{AthError, Result, Span};

use super::token::{DurationUnit, Token, TokenKind};

/// Hand-written scanner over the source characters.
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    tokens: Vec<Token>,
}

impl Lexer {
    /// Create a lexer over the given source text.
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    /// Lex the whole input, producing a token stream ending in `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        while self.pos < self.chars.len() {
            self.skip_whitespace_and_comments();
            if self.pos >= self.chars.len() {
                break;
            }

            let span = self.span();
            let ch = self.peek(0).unwrap();

            // ~ATH marker
            if ch == '~' && self.matches_marker() {
                for _ in 0..4 {
                    self.advance();
                }
                self.push(TokenKind::TildeAth, span);
                continue;
            }

            if ch == '"' {
                let text = self.read_string()?;
                self.push(TokenKind::Str(text), span);
                continue;
            }

            if ch.is_ascii_digit() || self.is_negative_number_start(ch) {
                let token = self.read_number(span)?;
                self.tokens.push(token);
                continue;
            }

            if ch.is_ascii_alphabetic() || ch == '_' {
                let token = self.read_identifier(span);
                self.tokens.push(token);
                continue;
            }

            if let Some(kind) = self.read_two_char_operator() {
                self.push(kind, span);
                continue;
            }

            if let Some(kind) = single_char_token(ch) {
                self.advance();
                self.push(kind, span);
                continue;
            }

            return Err(AthError::lex(format!("Unexpected character: {:?}", ch), span));
        }

        let end = self.span();
        self.push(TokenKind::Eof, end);
        Ok(self.tokens)
    }

    fn span(&self) -> Span {
        Span::new(self.line, self.column)
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn push(&mut self, kind: TokenKind, span: Span) {
        self.tokens.push(Token::new(kind, span));
    }

    fn matches_marker(&self) -> bool {
        self.peek(1) == Some('A') && self.peek(2) == Some('T') && self.peek(3) == Some('H')
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(ch) = self.peek(0) {
            if ch == ' ' || ch == '\t' || ch == '\r' || ch == '\n' {
                self.advance();
            } else if ch == '/' && self.peek(1) == Some('/') {
                while let Some(c) = self.peek(0) {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    /// `-` immediately followed by a digit starts a signed number only when
    /// the previous token cannot terminate an expression; otherwise it is
    /// the subtraction operator (`a-1` must lex as `a`, `-`, `1`).
    fn is_negative_number_start(&self, ch: char) -> bool {
        if ch != '-' || !self.peek(1).is_some_and(|c| c.is_ascii_digit()) {
            return false;
        }
        match self.tokens.last() {
            Some(token) => !token.kind.terminates_expression(),
            None => true,
        }
    }

    fn read_string(&mut self) -> Result<String> {
        self.advance(); // opening quote
        let mut text = String::new();

        loop {
            let span = self.span();
            match self.peek(0) {
                None => return Err(AthError::lex("Unterminated string", span)),
                Some('"') => {
                    self.advance();
                    return Ok(text);
                }
                Some('\\') => {
                    self.advance();
                    match self.peek(0) {
                        None => return Err(AthError::lex("Unterminated string", self.span())),
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some('\\') => text.push('\\'),
                        Some('"') => text.push('"'),
                        Some(other) => {
                            return Err(AthError::lex(
                                format!("Unknown escape sequence: \\{}", other),
                                self.span(),
                            ));
                        }
                    }
                    self.advance();
                }
                Some(ch) => {
                    text.push(ch);
                    self.advance();
                }
            }
        }
    }

    fn read_number(&mut self, span: Span) -> Result<Token> {
        let mut text = String::new();

        if self.peek(0) == Some('-') {
            text.push('-');
            self.advance();
        }
        while self.peek(0).is_some_and(|c| c.is_ascii_digit()) {
            text.push(self.advance().unwrap());
        }

        // Fractional part only when a digit follows the dot, so `1.DIE` and
        // member access keep lexing as expected.
        if self.peek(0) == Some('.') && self.peek(1).is_some_and(|c| c.is_ascii_digit()) {
            text.push(self.advance().unwrap());
            while self.peek(0).is_some_and(|c| c.is_ascii_digit()) {
                text.push(self.advance().unwrap());
            }
            let value: f64 = text
                .parse()
                .map_err(|_| AthError::lex(format!("Invalid float literal: {}", text), span))?;
            return Ok(Token::new(TokenKind::Float(value), span));
        }

        let value: i64 = text
            .parse()
            .map_err(|_| AthError::lex(format!("Invalid integer literal: {}", text), span))?;

        // Duration suffix: ms, s, m, h.
        if let Some(unit) = self.read_duration_suffix() {
            return Ok(Token::new(TokenKind::Duration { unit, value }, span));
        }

        Ok(Token::new(TokenKind::Integer(value), span))
    }

    fn read_duration_suffix(&mut self) -> Option<DurationUnit> {
        match self.peek(0) {
            Some('m') if self.peek(1) == Some('s') => {
                self.advance();
                self.advance();
                Some(DurationUnit::Millis)
            }
            Some('m') => {
                self.advance();
                Some(DurationUnit::Minutes)
            }
            Some('s') => {
                self.advance();
                Some(DurationUnit::Seconds)
            }
            Some('h') => {
                self.advance();
                Some(DurationUnit::Hours)
            }
            _ => None,
        }
    }

    fn read_identifier(&mut self, span: Span) -> Token {
        let mut word = String::new();
        while self.peek(0).is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
            word.push(self.advance().unwrap());
        }

        let kind = TokenKind::keyword(&word).unwrap_or(TokenKind::Identifier(word));
        Token::new(kind, span)
    }

    fn read_two_char_operator(&mut self) -> Option<TokenKind> {
        let pair = (self.peek(0)?, self.peek(1));
        let kind = match pair {
            ('&', Some('&')) => TokenKind::AmpAmp,
            ('|', Some('|')) => TokenKind::PipePipe,
            ('=', Some('=')) => TokenKind::EqEq,
            ('!', Some('=')) => TokenKind::NotEq,
            ('<', Some('=')) => TokenKind::Le,
            ('>', Some('=')) => TokenKind::Ge,
            _ => return None,
        };
        self.advance();
        self.advance();
        Some(kind)
    }
}

fn single_char_token(ch: char) -> Option<TokenKind> {
    Some(match ch {
        '+' => TokenKind::Plus,
        '-' => TokenKind::Minus,
        '*' => TokenKind::Star,
        '/' => TokenKind::Slash,
        '%' => TokenKind::Percent,
        '<' => TokenKind::Lt,
        '>' => TokenKind::Gt,
        '=' => TokenKind::Assign,
        '!' => TokenKind::Bang,
        '(' => TokenKind::LParen,
        ')' => TokenKind::RParen,
        '{' => TokenKind::LBrace,
        '}' => TokenKind::RBrace,
        '[' => TokenKind::LBracket,
        ']' => TokenKind::RBracket,
        ';' => TokenKind::Semicolon,
        ',' => TokenKind::Comma,
        '.' => TokenKind::Dot,
        ':' => TokenKind::Colon,
        _ => return None,
    })
}
