//! A hand-written lexer over already-preprocessed source text.
//!
//! The lexer is the one subsystem spec.md treats as a pure external
//! collaborator: the core only relies on its *contract* (a stream of
//! positioned tokens, adjacent string literals pre-concatenated). It is
//! still implemented here so the binary runs end to end.

use crate::diag::{Diagnostics, Span};
use crate::token::{IntSuffix, Keyword, Punct, Token, TokenKind};
use std::rc::Rc;

pub struct Lexer<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    col: u32,
    file: Rc<str>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, file: Rc<str>) -> Self {
        Lexer {
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
            file,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn span(&self) -> Span {
        Span::new(self.file.clone(), self.line, self.col)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n')) {
            self.bump();
        }
    }

    /// Tokenize the entire input, concatenating adjacent string
    /// literals as the lexer contract promises the parser.
    pub fn tokenize(mut self, diags: &mut Diagnostics) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token(diags);
            let is_eof = tok.kind == TokenKind::Eof;
            if let TokenKind::StringLiteral(bytes) = &tok.kind {
                if let Some(last) = tokens.last_mut() {
                    if let Token {
                        kind: TokenKind::StringLiteral(prev),
                        ..
                    } = last
                    {
                        prev.extend_from_slice(bytes);
                        continue;
                    }
                }
            }
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        tokens
    }

    fn next_token(&mut self, diags: &mut Diagnostics) -> Token {
        self.skip_whitespace();
        let span = self.span();
        let Some(c) = self.peek() else {
            return Token {
                kind: TokenKind::Eof,
                span,
            };
        };

        if c.is_ascii_alphabetic() || c == b'_' {
            return self.lex_ident_or_keyword(span);
        }
        if c.is_ascii_digit() {
            return self.lex_number(span, diags);
        }
        if c == b'"' {
            return self.lex_string(span, diags);
        }
        if c == b'\'' {
            return self.lex_char(span, diags);
        }
        self.lex_punct(span, diags)
    }

    fn lex_ident_or_keyword(&mut self, span: Span) -> Token {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.bump();
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos])
            .unwrap()
            .to_string();
        let kind = match Keyword::from_str(&text) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Ident(text),
        };
        Token { kind, span }
    }

    fn lex_number(&mut self, span: Span, diags: &mut Diagnostics) -> Token {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
        let value: u64 = match text.parse() {
            Ok(v) => v,
            Err(_) => {
                diags.error(span.clone(), format!("integer literal '{}' out of range", text));
                0
            }
        };
        let mut suffix = IntSuffix::default();
        loop {
            match self.peek() {
                Some(b'u') | Some(b'U') => {
                    suffix.unsigned = true;
                    self.bump();
                }
                Some(b'l') | Some(b'L') => {
                    suffix.long = true;
                    self.bump();
                }
                _ => break,
            }
        }
        Token {
            kind: TokenKind::IntLiteral { value, suffix },
            span,
        }
    }

    fn read_escape(&mut self, span: &Span, diags: &mut Diagnostics) -> u8 {
        match self.bump() {
            Some(b'n') => b'\n',
            Some(b't') => b'\t',
            Some(b'r') => b'\r',
            Some(b'0') => 0,
            Some(b'\\') => b'\\',
            Some(b'\'') => b'\'',
            Some(b'"') => b'"',
            Some(other) => {
                diags.error(span.clone(), format!("unknown escape sequence '\\{}'", other as char));
                other
            }
            None => {
                diags.error(span.clone(), "unterminated escape sequence".to_string());
                0
            }
        }
    }

    fn lex_string(&mut self, span: Span, diags: &mut Diagnostics) -> Token {
        self.bump(); // opening quote
        let mut bytes = Vec::new();
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    diags.error(span.clone(), "unterminated string literal".to_string());
                    break;
                }
                Some(b'"') => {
                    self.bump();
                    break;
                }
                Some(b'\\') => {
                    self.bump();
                    bytes.push(self.read_escape(&span, diags));
                }
                Some(c) => {
                    self.bump();
                    bytes.push(c);
                }
            }
        }
        bytes.push(0); // NUL terminator, matching C string-literal semantics
        Token {
            kind: TokenKind::StringLiteral(bytes),
            span,
        }
    }

    fn lex_char(&mut self, span: Span, diags: &mut Diagnostics) -> Token {
        self.bump(); // opening quote
        let value = match self.peek() {
            Some(b'\\') => {
                self.bump();
                self.read_escape(&span, diags)
            }
            Some(c) => {
                self.bump();
                c
            }
            None => {
                diags.error(span.clone(), "unterminated character literal".to_string());
                0
            }
        };
        if self.peek() == Some(b'\'') {
            self.bump();
        } else {
            diags.error(span.clone(), "unterminated character literal".to_string());
        }
        Token {
            kind: TokenKind::CharLiteral(value),
            span,
        }
    }

    fn lex_punct(&mut self, span: Span, diags: &mut Diagnostics) -> Token {
        let c = self.bump().unwrap();
        let p = match c {
            b'(' => Punct::LParen,
            b')' => Punct::RParen,
            b'{' => Punct::LBrace,
            b'}' => Punct::RBrace,
            b'[' => Punct::LBracket,
            b']' => Punct::RBracket,
            b';' => Punct::Semi,
            b',' => Punct::Comma,
            b'~' => Punct::Tilde,
            b'?' => Punct::Question,
            b':' => Punct::Colon,
            b'.' => Punct::Dot,
            b'-' => {
                if self.peek() == Some(b'>') {
                    self.bump();
                    Punct::Arrow
                } else if self.peek() == Some(b'-') {
                    self.bump();
                    Punct::MinusMinus
                } else if self.peek() == Some(b'=') {
                    self.bump();
                    Punct::MinusEq
                } else {
                    Punct::Minus
                }
            }
            b'+' => {
                if self.peek() == Some(b'+') {
                    self.bump();
                    Punct::PlusPlus
                } else if self.peek() == Some(b'=') {
                    self.bump();
                    Punct::PlusEq
                } else {
                    Punct::Plus
                }
            }
            b'*' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    Punct::StarEq
                } else {
                    Punct::Star
                }
            }
            b'/' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    Punct::SlashEq
                } else {
                    Punct::Slash
                }
            }
            b'%' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    Punct::PercentEq
                } else {
                    Punct::Percent
                }
            }
            b'&' => {
                if self.peek() == Some(b'&') {
                    self.bump();
                    Punct::AmpAmp
                } else if self.peek() == Some(b'=') {
                    self.bump();
                    Punct::AmpEq
                } else {
                    Punct::Amp
                }
            }
            b'|' => {
                if self.peek() == Some(b'|') {
                    self.bump();
                    Punct::PipePipe
                } else if self.peek() == Some(b'=') {
                    self.bump();
                    Punct::PipeEq
                } else {
                    Punct::Pipe
                }
            }
            b'^' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    Punct::CaretEq
                } else {
                    Punct::Caret
                }
            }
            b'!' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    Punct::NotEq
                } else {
                    Punct::Bang
                }
            }
            b'=' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    Punct::EqEq
                } else {
                    Punct::Assign
                }
            }
            b'<' => {
                if self.peek() == Some(b'<') {
                    let is_eq = self.peek_at(1) == Some(b'=');
                    self.bump();
                    if is_eq {
                        self.bump();
                        Punct::ShlEq
                    } else {
                        Punct::Shl
                    }
                } else if self.peek() == Some(b'=') {
                    self.bump();
                    Punct::Le
                } else {
                    Punct::Lt
                }
            }
            b'>' => {
                if self.peek() == Some(b'>') {
                    let is_eq = self.peek_at(1) == Some(b'=');
                    self.bump();
                    if is_eq {
                        self.bump();
                        Punct::ShrEq
                    } else {
                        Punct::Shr
                    }
                } else if self.peek() == Some(b'=') {
                    self.bump();
                    Punct::Ge
                } else {
                    Punct::Gt
                }
            }
            other => {
                diags.error(span.clone(), format!("unexpected character '{}'", other as char));
                Punct::Semi // recover as if a statement terminator was seen
            }
        };
        Token {
            kind: TokenKind::Punct(p),
            span,
        }
    }
}
