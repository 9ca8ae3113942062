//! Recursive-descent parser (spec §4.2).

use crate::{
    ast::*,
    error::{CompileError, ErrorKind, Result},
    lexer::{Lexer, Token, TokenKind, is_reserved},
    source_map::loc_at,
};

const PATH_LETTERS: &str = "MmLlHhVvCcSsQqTtAaZz";

fn is_path_letter(name: &str) -> bool {
    name.len() == 1 && PATH_LETTERS.contains(name)
}

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0, source }
    }

    pub fn parse_program(source: &'a str) -> Result<Program> {
        let tokens = Lexer::new(source).tokenize()?;
        let mut parser = Self::new(source, tokens);
        let mut stmts = Vec::new();
        while !parser.check(&TokenKind::Eof) {
            stmts.push(parser.parse_statement()?);
        }
        Ok(stmts)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn err(&self, kind: ErrorKind, msg: impl Into<String>) -> CompileError {
        CompileError::new(kind, msg, self.peek().loc)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.err(
                ErrorKind::ParseError,
                format!("expected {what}, found {:?}", self.peek().kind),
            ))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.peek().kind.clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.err(ErrorKind::ParseError, format!("expected identifier, found {other:?}"))),
        }
    }

    /// An identifier used to *declare* a new binding (let/fn/param/for-var):
    /// reserved words are rejected here (spec §4.2 "Errors").
    fn expect_new_name(&mut self) -> Result<String> {
        if let TokenKind::Ident(name) = self.peek().kind.clone() {
            self.advance();
            return Ok(name);
        }
        // Give a clearer message when the offending token is a reserved word.
        if let Some(text) = self.reserved_word_text() {
            return Err(self.err(
                ErrorKind::ParseError,
                format!("reserved word `{text}` cannot be used as a variable name"),
            ));
        }
        Err(self.err(ErrorKind::ParseError, format!("expected identifier, found {:?}", self.peek().kind)))
    }

    fn reserved_word_text(&self) -> Option<String> {
        let text = match &self.peek().kind {
            TokenKind::Let => "let",
            TokenKind::Fn => "fn",
            TokenKind::For => "for",
            TokenKind::In => "in",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::Return => "return",
            TokenKind::Calc => "calc",
            TokenKind::Define => "define",
            TokenKind::Default => "default",
            TokenKind::Layer => "layer",
            TokenKind::Apply => "apply",
            TokenKind::PathLayerKw => "PathLayer",
            TokenKind::TextLayerKw => "TextLayer",
            TokenKind::TextKw => "text",
            TokenKind::TspanKw => "tspan",
            TokenKind::PointKw => "Point",
            TokenKind::LogKw => "log",
            TokenKind::Null => "null",
            TokenKind::True => "true",
            TokenKind::False => "false",
            _ => return None,
        };
        debug_assert!(is_reserved(text) || text == "true" || text == "false");
        Some(text.to_string())
    }

    fn span_from(&self, start: Loc, start_off: u32) -> Span {
        let end_off = self.tokens[self.pos.saturating_sub(1)].end;
        Span::new(start_off, end_off, start)
    }

    // ---- statements -----------------------------------------------------

    fn parse_statement(&mut self) -> Result<Stmt> {
        match self.peek().kind.clone() {
            TokenKind::Let => self.parse_let(),
            TokenKind::For => self.parse_for(),
            TokenKind::If => self.parse_if(),
            TokenKind::Fn => self.parse_fn_decl(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Define => self.parse_layer_define(),
            TokenKind::Layer => self.parse_layer_apply(),
            TokenKind::TextKw => self.parse_text_stmt(),
            TokenKind::Ident(ref name) if is_path_letter(name) => self.parse_path_command(),
            TokenKind::Ident(_) if self.peek_at(1) == Some(&TokenKind::Eq) => self.parse_assignment(),
            _ => {
                let start = self.peek().loc;
                let start_off = self.peek().start;
                let expr = self.parse_expression()?;
                self.expect(TokenKind::Semi, "`;` after expression statement")?;
                Ok(Stmt::new(StmtKind::ExprStmt(expr), self.span_from(start, start_off)))
            }
        }
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        self.expect(TokenKind::LBrace, "`{`")?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            stmts.push(self.parse_statement()?);
        }
        self.expect(TokenKind::RBrace, "`}` to close block")?;
        Ok(stmts)
    }

    fn parse_let(&mut self) -> Result<Stmt> {
        let start_tok = self.advance();
        let name = self.expect_new_name()?;
        self.expect(TokenKind::Eq, "`=` in let declaration")?;
        let value = self.parse_expression()?;
        self.expect(TokenKind::Semi, "`;` after let declaration")?;
        Ok(Stmt::new(StmtKind::Let { name, value }, self.span_from(start_tok.loc, start_tok.start)))
    }

    fn parse_assignment(&mut self) -> Result<Stmt> {
        let name_tok = self.advance();
        let name = match name_tok.kind {
            TokenKind::Ident(ref s) => s.clone(),
            _ => unreachable!(),
        };
        self.expect(TokenKind::Eq, "`=` in assignment")?;
        let value = self.parse_expression()?;
        self.expect(TokenKind::Semi, "`;` after assignment")?;
        Ok(Stmt::new(StmtKind::Assign { name, value }, self.span_from(name_tok.loc, name_tok.start)))
    }

    fn starts_path_arg(&self) -> bool {
        match &self.peek().kind {
            TokenKind::Number(..) => true,
            TokenKind::Minus => matches!(self.peek_at(1), Some(TokenKind::Number(..))),
            TokenKind::Ident(name) => !is_path_letter(name),
            TokenKind::Calc | TokenKind::LParen | TokenKind::PointKw => true,
            _ => false,
        }
    }

    fn parse_path_arg(&mut self) -> Result<Expr> {
        if matches!(self.peek().kind, TokenKind::Minus) {
            let minus_tok = self.advance();
            if let TokenKind::Number(v, unit) = self.peek().kind {
                let num_tok = self.advance();
                return Ok(Expr::new(
                    ExprKind::Number(-v, unit),
                    Span::new(minus_tok.start, num_tok.end, minus_tok.loc),
                ));
            }
            return Err(self.err(ErrorKind::ParseError, "expected number after unary `-` in path argument"));
        }
        self.parse_postfix()
    }

    fn parse_path_command(&mut self) -> Result<Stmt> {
        let tok = self.advance();
        let letter = match tok.kind {
            TokenKind::Ident(ref s) => s.chars().next().unwrap(),
            _ => unreachable!(),
        };
        let mut args = Vec::new();
        while self.starts_path_arg() {
            args.push(self.parse_path_arg()?);
        }
        Ok(Stmt::new(StmtKind::PathCommand { letter, args }, self.span_from(tok.loc, tok.start)))
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        let start_tok = self.advance();
        self.expect(TokenKind::LParen, "`(` after `for`")?;
        if self.check(&TokenKind::LBracket) {
            self.advance();
            let item = self.expect_new_name()?;
            self.expect(TokenKind::Comma, "`,` in for-each destructuring")?;
            let index = self.expect_new_name()?;
            self.expect(TokenKind::RBracket, "`]` in for-each destructuring")?;
            self.expect(TokenKind::In, "`in`")?;
            let iterable = self.parse_expression()?;
            self.expect(TokenKind::RParen, "`)` after for-each iterable")?;
            let body = self.parse_block()?;
            return Ok(Stmt::new(
                StmtKind::ForEach {
                    binding: ForBinding::ItemIndex(item, index),
                    iterable,
                    body,
                },
                self.span_from(start_tok.loc, start_tok.start),
            ));
        }
        let name = self.expect_new_name()?;
        self.expect(TokenKind::In, "`in`")?;
        let first = self.parse_expression()?;
        if self.check(&TokenKind::DotDot) {
            self.advance();
            let end = self.parse_expression()?;
            self.expect(TokenKind::RParen, "`)` after for-range end")?;
            let body = self.parse_block()?;
            Ok(Stmt::new(
                StmtKind::ForRange { var: name, start: first, end, body },
                self.span_from(start_tok.loc, start_tok.start),
            ))
        } else {
            self.expect(TokenKind::RParen, "`)` after for-each iterable")?;
            let body = self.parse_block()?;
            Ok(Stmt::new(
                StmtKind::ForEach { binding: ForBinding::Single(name), iterable: first, body },
                self.span_from(start_tok.loc, start_tok.start),
            ))
        }
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        let start_tok = self.advance();
        self.expect(TokenKind::LParen, "`(` after `if`")?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::RParen, "`)` after if condition")?;
        let then_body = self.parse_block()?;
        let mut else_ifs = Vec::new();
        let mut else_body = None;
        while self.check(&TokenKind::Else) {
            self.advance();
            if self.check(&TokenKind::If) {
                self.advance();
                self.expect(TokenKind::LParen, "`(` after `else if`")?;
                let c = self.parse_expression()?;
                self.expect(TokenKind::RParen, "`)` after else-if condition")?;
                let b = self.parse_block()?;
                else_ifs.push((c, b));
            } else {
                else_body = Some(self.parse_block()?);
                break;
            }
        }
        Ok(Stmt::new(
            StmtKind::If { cond, then_body, else_ifs, else_body },
            self.span_from(start_tok.loc, start_tok.start),
        ))
    }

    fn parse_fn_decl(&mut self) -> Result<Stmt> {
        let start_tok = self.advance();
        let name = self.expect_new_name()?;
        self.expect(TokenKind::LParen, "`(` after function name")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                params.push(self.expect_new_name()?);
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "`)` after parameter list")?;
        let body = self.parse_block()?;
        Ok(Stmt::new(
            StmtKind::FnDecl { name, params, body },
            self.span_from(start_tok.loc, start_tok.start),
        ))
    }

    fn parse_return(&mut self) -> Result<Stmt> {
        let start_tok = self.advance();
        if self.check(&TokenKind::Semi) {
            self.advance();
            return Ok(Stmt::new(StmtKind::Return(None), self.span_from(start_tok.loc, start_tok.start)));
        }
        let value = self.parse_expression()?;
        self.expect(TokenKind::Semi, "`;` after return value")?;
        Ok(Stmt::new(StmtKind::Return(Some(value)), self.span_from(start_tok.loc, start_tok.start)))
    }

    fn parse_layer_define(&mut self) -> Result<Stmt> {
        let start_tok = self.advance();
        let is_default = if self.check(&TokenKind::Default) {
            self.advance();
            true
        } else {
            false
        };
        let kind = match self.peek().kind {
            TokenKind::PathLayerKw => {
                self.advance();
                LayerKind::Path
            }
            TokenKind::TextLayerKw => {
                self.advance();
                LayerKind::Text
            }
            _ => return Err(self.err(ErrorKind::ParseError, "expected `PathLayer` or `TextLayer`")),
        };
        self.expect(TokenKind::LParen, "`(` after layer kind")?;
        let name = self.parse_expression()?;
        self.expect(TokenKind::RParen, "`)` after layer name")?;
        let style = self.parse_expression()?;
        Ok(Stmt::new(
            StmtKind::LayerDefine { kind, name, style, is_default },
            self.span_from(start_tok.loc, start_tok.start),
        ))
    }

    fn parse_layer_apply(&mut self) -> Result<Stmt> {
        let start_tok = self.advance();
        self.expect(TokenKind::LParen, "`(` after `layer`")?;
        let name = self.parse_expression()?;
        self.expect(TokenKind::RParen, "`)` after layer name")?;
        self.expect(TokenKind::Dot, "`.` before `apply`")?;
        self.expect(TokenKind::Apply, "`apply`")?;
        let body = self.parse_block()?;
        Ok(Stmt::new(StmtKind::LayerApply { name, body }, self.span_from(start_tok.loc, start_tok.start)))
    }

    fn parse_text_stmt(&mut self) -> Result<Stmt> {
        let start_tok = self.advance();
        self.expect(TokenKind::LParen, "`(` after `text`")?;
        let x = self.parse_expression()?;
        self.expect(TokenKind::Comma, "`,` after x")?;
        let y = self.parse_expression()?;
        let mut extra = Vec::new();
        while self.check(&TokenKind::Comma) {
            self.advance();
            extra.push(self.parse_expression()?);
        }
        self.expect(TokenKind::RParen, "`)` after text arguments")?;
        let children = self.parse_text_body()?;
        Ok(Stmt::new(
            StmtKind::Text { x, y, extra, children },
            self.span_from(start_tok.loc, start_tok.start),
        ))
    }

    fn parse_text_body(&mut self) -> Result<Vec<TextChild>> {
        if self.check(&TokenKind::LBrace) {
            self.advance();
            let mut children = Vec::new();
            while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
                children.push(self.parse_text_child()?);
            }
            self.expect(TokenKind::RBrace, "`}` to close text body")?;
            Ok(children)
        } else {
            let template = self.parse_template_literal()?;
            Ok(vec![TextChild::Run(template)])
        }
    }

    fn parse_template_literal(&mut self) -> Result<Expr> {
        match self.peek().kind.clone() {
            TokenKind::TemplateStr(raw) => {
                let tok = self.advance();
                self.parse_template(&raw, tok.start, tok.loc)
            }
            other => Err(self.err(ErrorKind::ParseError, format!("expected template literal, found {other:?}"))),
        }
    }

    fn parse_text_child(&mut self) -> Result<TextChild> {
        match self.peek().kind.clone() {
            TokenKind::TemplateStr(_) => Ok(TextChild::Run(self.parse_template_literal()?)),
            TokenKind::TspanKw => self.parse_tspan(),
            TokenKind::Let => {
                self.advance();
                let name = self.expect_new_name()?;
                self.expect(TokenKind::Eq, "`=` in let declaration")?;
                let value = self.parse_expression()?;
                self.expect(TokenKind::Semi, "`;` after let declaration")?;
                Ok(TextChild::Let { name, value })
            }
            TokenKind::If => {
                self.advance();
                self.expect(TokenKind::LParen, "`(` after `if`")?;
                let cond = self.parse_expression()?;
                self.expect(TokenKind::RParen, "`)` after if condition")?;
                let then_body = self.parse_text_block()?;
                let mut else_ifs = Vec::new();
                let mut else_body = None;
                while self.check(&TokenKind::Else) {
                    self.advance();
                    if self.check(&TokenKind::If) {
                        self.advance();
                        self.expect(TokenKind::LParen, "`(` after `else if`")?;
                        let c = self.parse_expression()?;
                        self.expect(TokenKind::RParen, "`)` after else-if condition")?;
                        else_ifs.push((c, self.parse_text_block()?));
                    } else {
                        else_body = Some(self.parse_text_block()?);
                        break;
                    }
                }
                Ok(TextChild::If { cond, then_body, else_ifs, else_body })
            }
            TokenKind::For => {
                self.advance();
                self.expect(TokenKind::LParen, "`(` after `for`")?;
                if self.check(&TokenKind::LBracket) {
                    self.advance();
                    let item = self.expect_new_name()?;
                    self.expect(TokenKind::Comma, "`,` in for-each destructuring")?;
                    let index = self.expect_new_name()?;
                    self.expect(TokenKind::RBracket, "`]` in for-each destructuring")?;
                    self.expect(TokenKind::In, "`in`")?;
                    let iterable = self.parse_expression()?;
                    self.expect(TokenKind::RParen, "`)` after for-each iterable")?;
                    let body = self.parse_text_block()?;
                    return Ok(TextChild::ForEach { binding: ForBinding::ItemIndex(item, index), iterable, body });
                }
                let name = self.expect_new_name()?;
                self.expect(TokenKind::In, "`in`")?;
                let first = self.parse_expression()?;
                if self.check(&TokenKind::DotDot) {
                    self.advance();
                    let end = self.parse_expression()?;
                    self.expect(TokenKind::RParen, "`)` after for-range end")?;
                    let body = self.parse_text_block()?;
                    Ok(TextChild::ForRange { var: name, start: first, end, body })
                } else {
                    self.expect(TokenKind::RParen, "`)` after for-each iterable")?;
                    let body = self.parse_text_block()?;
                    Ok(TextChild::ForEach { binding: ForBinding::Single(name), iterable: first, body })
                }
            }
            other => Err(self.err(ErrorKind::ParseError, format!("unexpected token in text body: {other:?}"))),
        }
    }

    fn parse_text_block(&mut self) -> Result<Vec<TextChild>> {
        self.expect(TokenKind::LBrace, "`{`")?;
        let mut children = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            children.push(self.parse_text_child()?);
        }
        self.expect(TokenKind::RBrace, "`}` to close block")?;
        Ok(children)
    }

    fn parse_tspan(&mut self) -> Result<TextChild> {
        self.advance();
        self.expect(TokenKind::LParen, "`(` after `tspan`")?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "`)` after tspan arguments")?;
        let text = self.parse_template_literal()?;
        let mut it = args.into_iter();
        Ok(TextChild::Tspan {
            dx: it.next(),
            dy: it.next(),
            rotation: it.next(),
            text,
        })
    }

    // ---- expressions ------------------------------------------------------

    fn parse_arg_list(&mut self) -> Result<Vec<Expr>> {
        self.expect(TokenKind::LParen, "`(`")?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "`)` to close argument list")?;
        Ok(args)
    }

    pub fn parse_expression(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.check(&TokenKind::OrOr) {
            self.advance();
            let right = self.parse_and()?;
            let span = Span::new(left.span.start, right.span.end, left.span.loc);
            left = Expr::new(ExprKind::Binary { op: BinaryOp::Or, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_eq()?;
        while self.check(&TokenKind::AndAnd) {
            self.advance();
            let right = self.parse_eq()?;
            let span = Span::new(left.span.start, right.span.end, left.span.loc);
            left = Expr::new(ExprKind::Binary { op: BinaryOp::And, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_eq(&mut self) -> Result<Expr> {
        let mut left = self.parse_rel()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Ne,
                _ => break,
            };
            self.advance();
            let right = self.parse_rel()?;
            let span = Span::new(left.span.start, right.span.end, left.span.loc);
            left = Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_rel(&mut self) -> Result<Expr> {
        let mut left = self.parse_add()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_add()?;
            let span = Span::new(left.span.start, right.span.end, left.span.loc);
            left = Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_add(&mut self) -> Result<Expr> {
        let mut left = self.parse_mul()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_mul()?;
            let span = Span::new(left.span.start, right.span.end, left.span.loc);
            left = Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_mul(&mut self) -> Result<Expr> {
        let mut left = self.parse_merge()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            let right = self.parse_merge()?;
            let span = Span::new(left.span.start, right.span.end, left.span.loc);
            left = Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_merge(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while self.check(&TokenKind::Merge) {
            self.advance();
            let right = self.parse_unary()?;
            let span = Span::new(left.span.start, right.span.end, left.span.loc);
            left = Expr::new(ExprKind::Binary { op: BinaryOp::Merge, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.peek().kind {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        let tok = self.advance();
        let operand = self.parse_unary()?;
        let span = Span::new(tok.start, operand.span.end, tok.loc);
        Ok(Expr::new(ExprKind::Unary { op, expr: Box::new(operand) }, span))
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek().kind {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_ident()?;
                    if self.check(&TokenKind::LParen) {
                        let args = self.parse_arg_list()?;
                        let end = self.tokens[self.pos - 1].end;
                        let span = Span::new(expr.span.start, end, expr.span.loc);
                        expr = Expr::new(ExprKind::MethodCall { receiver: Box::new(expr), name, args }, span);
                    } else {
                        let end = self.tokens[self.pos - 1].end;
                        let span = Span::new(expr.span.start, end, expr.span.loc);
                        expr = Expr::new(ExprKind::Property { receiver: Box::new(expr), name }, span);
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(TokenKind::RBracket, "`]` to close index expression")?;
                    let end = self.tokens[self.pos - 1].end;
                    let span = Span::new(expr.span.start, end, expr.span.loc);
                    expr = Expr::new(ExprKind::Index { receiver: Box::new(expr), index: Box::new(index) }, span);
                }
                TokenKind::LParen if matches!(expr.kind, ExprKind::Ident(_)) => {
                    let callee = match &expr.kind {
                        ExprKind::Ident(name) => name.clone(),
                        _ => unreachable!(),
                    };
                    let args = self.parse_arg_list()?;
                    let end = self.tokens[self.pos - 1].end;
                    let span = Span::new(expr.span.start, end, expr.span.loc);
                    expr = Expr::new(ExprKind::Call { callee, args }, span);
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_array_lit(&mut self) -> Result<Expr> {
        let start_tok = self.advance();
        let mut elements = Vec::new();
        if !self.check(&TokenKind::RBracket) {
            loop {
                elements.push(self.parse_expression()?);
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        let end_tok = self.expect(TokenKind::RBracket, "`]` to close array literal")?;
        Ok(Expr::new(ExprKind::Array(elements), Span::new(start_tok.start, end_tok.end, start_tok.loc)))
    }

    fn parse_calc_expr(&mut self) -> Result<Expr> {
        let start_tok = self.advance();
        self.expect(TokenKind::LParen, "`(` after `calc`")?;
        let inner = self.parse_expression()?;
        let end_tok = self.expect(TokenKind::RParen, "`)` to close `calc(...)`")?;
        Ok(Expr::new(ExprKind::Calc(Box::new(inner)), Span::new(start_tok.start, end_tok.end, start_tok.loc)))
    }

    fn parse_path_block_expr(&mut self) -> Result<Expr> {
        let start_tok = self.advance();
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            stmts.push(self.parse_statement()?);
        }
        let end_tok = self.expect(TokenKind::RBrace, "`}` to close path block")?;
        Ok(Expr::new(ExprKind::PathBlock(stmts), Span::new(start_tok.start, end_tok.end, start_tok.loc)))
    }

    fn parse_style_block_expr(&mut self) -> Result<Expr> {
        let start_tok = self.advance();
        let mut entries = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            let name = self.parse_style_prop_name()?;
            self.expect(TokenKind::Colon, "`:` after style property name")?;
            let mut value_parts = Vec::new();
            while !self.check(&TokenKind::Semi) && !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
                value_parts.push(self.token_text());
                self.advance();
            }
            self.expect(TokenKind::Semi, "`;` after style property value")?;
            entries.push((name, value_parts.join(" ")));
        }
        let end_tok = self.expect(TokenKind::RBrace, "`}` to close style block")?;
        Ok(Expr::new(ExprKind::StyleBlock(entries), Span::new(start_tok.start, end_tok.end, start_tok.loc)))
    }

    /// CSS-style property names (e.g. `stroke-width`) lex as an identifier
    /// followed by `-`-separated identifiers; stitch them back together.
    fn parse_style_prop_name(&mut self) -> Result<String> {
        let mut name = self.expect_ident()?;
        while self.check(&TokenKind::Minus) && matches!(self.peek_at(1), Some(TokenKind::Ident(_))) {
            self.advance();
            let TokenKind::Ident(part) = self.advance().kind else { unreachable!() };
            name.push('-');
            name.push_str(&part);
        }
        Ok(name)
    }

    /// Renders the current token back to the raw text it covers, used only
    /// for reconstructing a style block's free-text property value.
    fn token_text(&self) -> String {
        let tok = self.peek();
        self.source[tok.start as usize..tok.end as usize].to_string()
    }

    fn parse_template(&mut self, raw: &str, raw_start_offset: u32, _loc: Loc) -> Result<Expr> {
        let bytes = raw.as_bytes();
        let mut parts = Vec::new();
        let mut i = 0usize;
        let mut literal_start = 0usize;
        while i < bytes.len() {
            if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
                if i > literal_start {
                    parts.push(TemplatePart::Str(raw[literal_start..i].to_string()));
                }
                let expr_start = i + 2;
                let mut depth = 1i32;
                let mut j = expr_start;
                while j < bytes.len() && depth > 0 {
                    match bytes[j] {
                        b'{' => depth += 1,
                        b'}' => depth -= 1,
                        _ => {}
                    }
                    if depth > 0 {
                        j += 1;
                    }
                }
                let inner = &raw[expr_start..j];
                let abs_offset = raw_start_offset + expr_start as u32;
                let inner_expr = parse_expression_fragment(self.source, inner, abs_offset)?;
                parts.push(TemplatePart::Interp(inner_expr));
                i = j + 1;
                literal_start = i;
            } else {
                i += 1;
            }
        }
        if literal_start < bytes.len() {
            parts.push(TemplatePart::Str(raw[literal_start..].to_string()));
        }
        let end = raw_start_offset + raw.len() as u32;
        let loc = loc_at(self.source, raw_start_offset);
        Ok(Expr::new(ExprKind::Template(parts), Span::new(raw_start_offset, end, loc)))
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Number(v, unit) => {
                self.advance();
                Ok(Expr::new(ExprKind::Number(v, unit), Span::new(tok.start, tok.end, tok.loc)))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::new(ExprKind::Str(s), Span::new(tok.start, tok.end, tok.loc)))
            }
            TokenKind::TemplateStr(raw) => {
                self.advance();
                self.parse_template(&raw, tok.start, tok.loc)
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::new(ExprKind::Null, Span::new(tok.start, tok.end, tok.loc)))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::new(ExprKind::Number(1.0, AngleUnit::None), Span::new(tok.start, tok.end, tok.loc)))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::new(ExprKind::Number(0.0, AngleUnit::None), Span::new(tok.start, tok.end, tok.loc)))
            }
            TokenKind::LBracket => self.parse_array_lit(),
            TokenKind::AtBrace => self.parse_path_block_expr(),
            TokenKind::StyleBlockOpen => self.parse_style_block_expr(),
            TokenKind::Calc => self.parse_calc_expr(),
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                let end_tok = self.expect(TokenKind::RParen, "`)` to close parenthesised expression")?;
                Ok(Expr::new(inner.kind, Span::new(tok.start, end_tok.end, tok.loc)))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::new(ExprKind::Ident(name), Span::new(tok.start, tok.end, tok.loc)))
            }
            TokenKind::PointKw => {
                self.advance();
                let args = self.parse_arg_list()?;
                let end = self.tokens[self.pos - 1].end;
                Ok(Expr::new(ExprKind::Call { callee: "Point".to_string(), args }, Span::new(tok.start, end, tok.loc)))
            }
            TokenKind::LogKw => {
                self.advance();
                let args = self.parse_arg_list()?;
                let end = self.tokens[self.pos - 1].end;
                Ok(Expr::new(ExprKind::Call { callee: "log".to_string(), args }, Span::new(tok.start, end, tok.loc)))
            }
            other => Err(self.err(ErrorKind::ParseError, format!("unexpected token in expression: {other:?}"))),
        }
    }
}

/// Parses a self-contained expression fragment (used for `${…}` interpolation
/// holes) whose text lives at `abs_offset` within the *original* source, so
/// error locations and `log()` labels stay correct.
fn parse_expression_fragment(full_source: &str, fragment: &str, abs_offset: u32) -> Result<Expr> {
    let tokens = Lexer::new(fragment).tokenize()?;
    let mut parser = Parser::new(full_source, tokens);
    let mut expr = parser.parse_expression()?;
    offset_span(&mut expr, abs_offset, full_source);
    Ok(expr)
}

fn offset_span(expr: &mut Expr, offset: u32, source: &str) {
    expr.span.start += offset;
    expr.span.end += offset;
    expr.span.loc = loc_at(source, expr.span.start);
    match &mut expr.kind {
        ExprKind::Unary { expr: e, .. } | ExprKind::Calc(e) => offset_span(e, offset, source),
        ExprKind::Binary { left, right, .. } => {
            offset_span(left, offset, source);
            offset_span(right, offset, source);
        }
        ExprKind::Call { args, .. } => args.iter_mut().for_each(|a| offset_span(a, offset, source)),
        ExprKind::MethodCall { receiver, args, .. } => {
            offset_span(receiver, offset, source);
            args.iter_mut().for_each(|a| offset_span(a, offset, source));
        }
        ExprKind::Index { receiver, index } => {
            offset_span(receiver, offset, source);
            offset_span(index, offset, source);
        }
        ExprKind::Property { receiver, .. } => offset_span(receiver, offset, source),
        ExprKind::Array(items) => items.iter_mut().for_each(|a| offset_span(a, offset, source)),
        ExprKind::Template(parts) => {
            for p in parts {
                if let TemplatePart::Interp(e) = p {
                    offset_span(e, offset, source);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Program {
        Parser::parse_program(src).unwrap()
    }

    #[test]
    fn parses_simple_path_program() {
        let prog = parse("M 0 0 L 10 20 Z");
        assert_eq!(prog.len(), 3);
        assert!(matches!(prog[0].kind, StmtKind::PathCommand { letter: 'M', .. }));
        assert!(matches!(prog[2].kind, StmtKind::PathCommand { letter: 'Z', .. }));
    }

    #[test]
    fn parses_let_and_path_command_with_vars() {
        let prog = parse("let x = 10; let y = 20; M x y");
        assert_eq!(prog.len(), 3);
        assert!(matches!(prog[2].kind, StmtKind::PathCommand { letter: 'M', .. }));
    }

    #[test]
    fn rejects_reserved_word_as_let_name() {
        let err = Parser::parse_program("let if = 5;").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::ParseError);
        assert!(err.message.contains("reserved word"));
    }

    #[test]
    fn parses_for_range_inclusive() {
        let prog = parse("for (i in 0..3) { M i 0 }");
        assert!(matches!(prog[0].kind, StmtKind::ForRange { .. }));
    }

    #[test]
    fn parses_layer_define_and_apply() {
        let prog = parse("define PathLayer('a') ${ stroke: red; }\nlayer('a').apply { M 1 1 }");
        assert!(matches!(prog[0].kind, StmtKind::LayerDefine { .. }));
        assert!(matches!(prog[1].kind, StmtKind::LayerApply { .. }));
    }

    #[test]
    fn parses_template_literal_interpolation() {
        let prog = parse("log(`value ${1 + 2}`);");
        match &prog[0].kind {
            StmtKind::ExprStmt(e) => match &e.kind {
                ExprKind::Call { callee, args } => {
                    assert_eq!(callee, "log");
                    assert!(matches!(args[0].kind, ExprKind::Template(_)));
                }
                _ => panic!("expected call"),
            },
            _ => panic!("expected expr stmt"),
        }
    }
}
