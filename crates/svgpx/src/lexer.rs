//! Lexer (spec §4.1).
//!
//! Turns source text into a token stream. Path-command letters are not a
//! distinct lexical category: they lex as plain identifiers, and the
//! *parser* decides — based on statement vs. expression position — whether
//! an identifier like `M` starts a path command or refers to a variable.

use crate::{
    ast::{AngleUnit, Loc},
    error::{CompileError, ErrorKind, Result},
};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64, AngleUnit),
    Str(String),
    /// Raw text between backticks, not yet split into literal/interpolation
    /// parts — the parser does that (it needs to recursively lex/parse each
    /// `${…}` hole).
    TemplateStr(String),
    Ident(String),

    Let,
    Fn,
    For,
    In,
    If,
    Else,
    Return,
    Calc,
    Define,
    Default,
    Layer,
    Apply,
    PathLayerKw,
    TextLayerKw,
    TextKw,
    TspanKw,
    PointKw,
    LogKw,
    Null,
    True,
    False,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semi,
    Colon,
    Dot,
    DotDot,
    Merge,
    At,
    AtBrace,
    StyleBlockOpen,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Eq,

    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub loc: Loc,
    pub start: u32,
    pub end: u32,
}

fn keyword(ident: &str) -> Option<TokenKind> {
    Some(match ident {
        "let" => TokenKind::Let,
        "fn" => TokenKind::Fn,
        "for" => TokenKind::For,
        "in" => TokenKind::In,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "return" => TokenKind::Return,
        "calc" => TokenKind::Calc,
        "define" => TokenKind::Define,
        "default" => TokenKind::Default,
        "layer" => TokenKind::Layer,
        "apply" => TokenKind::Apply,
        "PathLayer" => TokenKind::PathLayerKw,
        "TextLayer" => TokenKind::TextLayerKw,
        "text" => TokenKind::TextKw,
        "tspan" => TokenKind::TspanKw,
        "Point" => TokenKind::PointKw,
        "log" => TokenKind::LogKw,
        "null" => TokenKind::Null,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        _ => return None,
    })
}

/// Reserved words that cannot be used as a user-declared variable name
/// (spec §4.2 "Errors").
pub fn is_reserved(ident: &str) -> bool {
    keyword(ident).is_some()
}

pub struct Lexer<'a> {
    src: &'a [u8],
    text: &'a str,
    pos: u32,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            src: text.as_bytes(),
            text,
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos as usize).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos as usize + offset).copied()
    }

    fn loc(&self) -> Loc {
        Loc {
            line: self.line,
            column: self.col,
        }
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

    fn err(&self, msg: impl Into<String>) -> CompileError {
        CompileError::new(ErrorKind::ParseError, msg, self.loc())
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => {
                    self.bump();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_number(&mut self) -> Result<TokenKind> {
        let start = self.pos as usize;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.bump();
        }
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
            self.bump();
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.bump();
            }
        }
        let digits = &self.text[start..self.pos as usize];
        let value: f64 = digits
            .parse()
            .map_err(|_| self.err(format!("invalid number literal `{digits}`")))?;

        for (suffix, is_deg) in [("deg", true), ("rad", false), ("pi", false)] {
            if self.rest().starts_with(suffix) {
                let after = self.pos as usize + suffix.len();
                let boundary = self
                    .text
                    .as_bytes()
                    .get(after)
                    .map(|c| !(c.is_ascii_alphanumeric() || *c == b'_'))
                    .unwrap_or(true);
                if boundary {
                    for _ in 0..suffix.len() {
                        self.bump();
                    }
                    let radians = if is_deg {
                        value.to_radians()
                    } else if suffix == "pi" {
                        value * std::f64::consts::PI
                    } else {
                        value
                    };
                    return Ok(TokenKind::Number(radians, AngleUnit::Rad));
                }
            }
        }
        Ok(TokenKind::Number(value, AngleUnit::None))
    }

    fn rest(&self) -> &str {
        &self.text[self.pos as usize..]
    }

    fn lex_string(&mut self, quote: u8) -> Result<TokenKind> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => break,
                Some(b'\\') => {
                    if let Some(escaped) = self.bump() {
                        out.push(match escaped {
                            b'n' => '\n',
                            b't' => '\t',
                            other => other as char,
                        });
                    }
                }
                Some(c) => out.push(c as char),
                None => return Err(self.err("unterminated string literal")),
            }
        }
        Ok(TokenKind::Str(out))
    }

    fn lex_template(&mut self) -> Result<TokenKind> {
        self.bump();
        let start = self.pos as usize;
        let mut depth = 0i32;
        loop {
            match self.peek() {
                None => return Err(self.err("unterminated template literal")),
                Some(b'`') if depth == 0 => break,
                Some(b'$') if self.peek_at(1) == Some(b'{') => {
                    depth += 1;
                    self.bump();
                    self.bump();
                }
                Some(b'}') if depth > 0 => {
                    depth -= 1;
                    self.bump();
                }
                _ => {
                    self.bump();
                }
            }
        }
        let raw = self.text[start..self.pos as usize].to_string();
        self.bump();
        Ok(TokenKind::TemplateStr(raw))
    }

    fn lex_ident(&mut self) -> TokenKind {
        let start = self.pos as usize;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.bump();
        }
        let text = &self.text[start..self.pos as usize];
        keyword(text).unwrap_or_else(|| TokenKind::Ident(text.to_string()))
    }

    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_trivia();
        let loc = self.loc();
        let start = self.pos;
        let Some(c) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                loc,
                start,
                end: start,
            });
        };

        let kind = match c {
            b'0'..=b'9' => self.lex_number()?,
            b'\'' | b'"' => self.lex_string(c)?,
            b'`' => self.lex_template()?,
            c if c.is_ascii_alphabetic() || c == b'_' => self.lex_ident(),
            b'(' => {
                self.bump();
                TokenKind::LParen
            }
            b')' => {
                self.bump();
                TokenKind::RParen
            }
            b'{' => {
                self.bump();
                TokenKind::LBrace
            }
            b'}' => {
                self.bump();
                TokenKind::RBrace
            }
            b'[' => {
                self.bump();
                TokenKind::LBracket
            }
            b']' => {
                self.bump();
                TokenKind::RBracket
            }
            b',' => {
                self.bump();
                TokenKind::Comma
            }
            b';' => {
                self.bump();
                TokenKind::Semi
            }
            b':' => {
                self.bump();
                TokenKind::Colon
            }
            b'.' => {
                self.bump();
                if self.peek() == Some(b'.') {
                    self.bump();
                    TokenKind::DotDot
                } else {
                    TokenKind::Dot
                }
            }
            b'@' => {
                self.bump();
                if self.peek() == Some(b'{') {
                    self.bump();
                    TokenKind::AtBrace
                } else {
                    return Err(self.err("`@` must be followed by `{` to start a path block"));
                }
            }
            b'$' => {
                self.bump();
                if self.peek() == Some(b'{') {
                    self.bump();
                    TokenKind::StyleBlockOpen
                } else {
                    return Err(self.err("`$` must be followed by `{` to start a style block"));
                }
            }
            b'+' => {
                self.bump();
                TokenKind::Plus
            }
            b'-' => {
                self.bump();
                TokenKind::Minus
            }
            b'*' => {
                self.bump();
                TokenKind::Star
            }
            b'/' => {
                self.bump();
                TokenKind::Slash
            }
            b'%' => {
                self.bump();
                TokenKind::Percent
            }
            b'=' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    TokenKind::EqEq
                } else {
                    TokenKind::Eq
                }
            }
            b'!' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }
            b'<' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    TokenKind::Le
                } else if self.peek() == Some(b'<') {
                    self.bump();
                    TokenKind::Merge
                } else {
                    TokenKind::Lt
                }
            }
            b'>' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            b'&' if self.peek_at(1) == Some(b'&') => {
                self.bump();
                self.bump();
                TokenKind::AndAnd
            }
            b'|' if self.peek_at(1) == Some(b'|') => {
                self.bump();
                self.bump();
                TokenKind::OrOr
            }
            other => return Err(self.err(format!("unexpected character `{}`", other as char))),
        };
        Ok(Token {
            kind,
            loc,
            start,
            end: self.pos,
        })
    }

    /// Lexes the whole input eagerly, terminated by a single trailing `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_path_command_as_ident() {
        let k = kinds("M 10 20");
        assert_eq!(
            k,
            vec![
                TokenKind::Ident("M".into()),
                TokenKind::Number(10.0, AngleUnit::None),
                TokenKind::Number(20.0, AngleUnit::None),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_deg_suffix_to_radians() {
        let k = kinds("90deg");
        match &k[0] {
            TokenKind::Number(v, AngleUnit::Rad) => assert!((v - std::f64::consts::FRAC_PI_2).abs() < 1e-9),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn lexes_pi_suffix() {
        let k = kinds("2pi");
        match &k[0] {
            TokenKind::Number(v, AngleUnit::Rad) => assert!((v - 2.0 * std::f64::consts::PI).abs() < 1e-9),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn lexes_template_literal_raw() {
        let k = kinds("`hello ${x + 1} world`");
        assert_eq!(k, vec![TokenKind::TemplateStr("hello ${x + 1} world".into()), TokenKind::Eof]);
    }

    #[test]
    fn skips_line_comments() {
        let k = kinds("M 1 2 // trailing comment\nL 3 4");
        assert!(k.iter().any(|t| matches!(t, TokenKind::Ident(s) if s == "L")));
    }

    #[test]
    fn rejects_reserved_word_check() {
        assert!(is_reserved("let"));
        assert!(!is_reserved("x"));
    }
}
