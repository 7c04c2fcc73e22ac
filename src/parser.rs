//! Parser for annotated Python kernels
//!
//! Parses sources like:
//! - `def vadd(a, b, c):` with an indented body
//! - `for i in range(4): c[i] = a[i] + b[i]`
//! - `s = dot(map(lambda x: x * 2.0, a), b)`
//! - `return a.map(lambda x: x * x).dot(b)`
//!
//! The grammar follows Python's precedence levels. It accepts more than the
//! compiler supports; rejection of non-hardware constructs is left to the
//! analyzer, which can then name the construct and its location.

use crate::ast::*;
use crate::error::{CompileError, CompileResult};
use crate::lexer::{Lexer, SpannedToken, Token};

/// Parse a whole source text into a [`Module`]
pub fn parse_module(source: &str) -> CompileResult<Module> {
    Parser::new(source)?.parse_module()
}

/// Parser for kernel sources
pub struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    next_id: usize,
}

impl Parser {
    pub fn new(source: &str) -> CompileResult<Self> {
        let tokens = Lexer::new(source).tokenize()?;
        Ok(Self {
            tokens,
            pos: 0,
            next_id: 0,
        })
    }

    fn fresh_id(&mut self) -> AstId {
        let id = AstId::from_raw(self.next_id);
        self.next_id += 1;
        id
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn peek_nth(&self, n: usize) -> &Token {
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)].token
    }

    fn span(&self) -> Span {
        self.tokens[self.pos.min(self.tokens.len() - 1)].span
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].range.start
    }

    /// Advance to the next token
    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    /// Check if current token matches expected
    fn check(&self, expected: &Token) -> bool {
        std::mem::discriminant(self.current()) == std::mem::discriminant(expected)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consume token if it matches, otherwise error
    fn expect(&mut self, expected: Token) -> CompileResult<Token> {
        if self.check(&expected) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected '{}', found '{}'", expected, self.current())))
        }
    }

    fn expect_ident(&mut self) -> CompileResult<String> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            other => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error(format!("expected identifier, found '{}'", other)))
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::parse_error(self.span(), message)
    }

    fn stmt(&mut self, span: Span, kind: StmtKind) -> Stmt {
        Stmt {
            id: self.fresh_id(),
            span,
            kind,
        }
    }

    fn expr(&mut self, span: Span, kind: ExprKind) -> Expr {
        Expr {
            id: self.fresh_id(),
            span,
            kind,
        }
    }

    /// Parse a complete module (multiple statements)
    pub fn parse_module(&mut self) -> CompileResult<Module> {
        let mut body = Vec::new();
        while !self.check(&Token::EndOfFile) {
            if self.eat(&Token::Newline) {
                continue;
            }
            body.extend(self.parse_statement()?);
        }
        Ok(Module { body })
    }

    /// Parse one logical statement; a line of `;`-separated simple
    /// statements yields several
    fn parse_statement(&mut self) -> CompileResult<Vec<Stmt>> {
        match self.current() {
            Token::At | Token::Def => Ok(vec![self.parse_function_def()?]),
            Token::If => Ok(vec![self.parse_if()?]),
            Token::For => Ok(vec![self.parse_for()?]),
            Token::While => Ok(vec![self.parse_while()?]),
            Token::ForeignKeyword(_) => Ok(vec![self.parse_foreign()?]),
            Token::Indent => Err(self.error("unexpected indent")),
            _ => self.parse_simple_statements(),
        }
    }

    fn parse_function_def(&mut self) -> CompileResult<Stmt> {
        let start = self.offset();
        let span = self.span();

        let mut decorators = Vec::new();
        while self.eat(&Token::At) {
            decorators.push(self.parse_test()?);
            self.expect(Token::Newline)?;
        }

        let def_span = self.span();
        self.expect(Token::Def)?;
        let name = self.expect_ident()?;
        self.expect(Token::LParen)?;

        let mut params = Vec::new();
        while !self.check(&Token::RParen) {
            params.push(self.expect_ident()?);
            if self.eat(&Token::Colon) {
                // Annotations carry no hardware meaning
                self.parse_test()?;
            }
            if self.check(&Token::Equals) {
                return Err(self.error("default parameter values are not supported"));
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;

        if self.eat(&Token::Arrow) {
            self.parse_test()?;
        }

        let body = self.parse_block()?;
        let end = self.tokens[self.pos.saturating_sub(1)].range.end;

        let span = if decorators.is_empty() { def_span } else { span };
        Ok(self.stmt(
            span,
            StmtKind::FunctionDef(FunctionDef {
                name,
                params,
                decorators,
                body,
                source_range: start..end,
            }),
        ))
    }

    /// Parse `: suite` where the suite is either simple statements on the
    /// same line or an indented block
    fn parse_block(&mut self) -> CompileResult<Vec<Stmt>> {
        self.expect(Token::Colon)?;

        if !self.eat(&Token::Newline) {
            return self.parse_simple_statements();
        }

        self.expect(Token::Indent)?;
        let mut body = Vec::new();
        while !self.check(&Token::Dedent) && !self.check(&Token::EndOfFile) {
            if self.eat(&Token::Newline) {
                continue;
            }
            body.extend(self.parse_statement()?);
        }
        self.eat(&Token::Dedent);
        Ok(body)
    }

    fn parse_if(&mut self) -> CompileResult<Stmt> {
        let span = self.span();
        // `if` and `elif` both land here
        self.advance();
        let test = self.parse_named_test()?;
        let body = self.parse_block()?;

        let orelse = if self.check(&Token::Elif) {
            vec![self.parse_if()?]
        } else if self.eat(&Token::Else) {
            self.parse_block()?
        } else {
            Vec::new()
        };

        Ok(self.stmt(span, StmtKind::If { test, body, orelse }))
    }

    fn parse_for(&mut self) -> CompileResult<Stmt> {
        let span = self.span();
        self.expect(Token::For)?;
        let target = self.parse_target_list()?;
        self.expect(Token::In)?;
        let iter = self.parse_expr_list()?;
        let body = self.parse_block()?;
        let orelse = if self.eat(&Token::Else) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(self.stmt(
            span,
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            },
        ))
    }

    fn parse_while(&mut self) -> CompileResult<Stmt> {
        let span = self.span();
        self.expect(Token::While)?;
        let test = self.parse_named_test()?;
        let body = self.parse_block()?;
        let orelse = if self.eat(&Token::Else) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(self.stmt(span, StmtKind::While { test, body, orelse }))
    }

    /// Skip a statement introduced by a keyword outside the subset,
    /// including any block it opens
    fn parse_foreign(&mut self) -> CompileResult<Stmt> {
        let span = self.span();
        let keyword = match self.advance() {
            Token::ForeignKeyword(keyword) => keyword,
            other => return Err(self.error(format!("unexpected '{}'", other))),
        };

        let mut opens_block = false;
        while !self.check(&Token::Newline) && !self.check(&Token::EndOfFile) {
            opens_block = matches!(self.advance(), Token::Colon);
        }
        self.eat(&Token::Newline);

        if opens_block && self.eat(&Token::Indent) {
            let mut depth = 1usize;
            while depth > 0 && !self.check(&Token::EndOfFile) {
                match self.advance() {
                    Token::Indent => depth += 1,
                    Token::Dedent => depth -= 1,
                    _ => {}
                }
            }
        }

        Ok(self.stmt(span, StmtKind::Foreign { keyword }))
    }

    fn parse_simple_statements(&mut self) -> CompileResult<Vec<Stmt>> {
        let mut stmts = vec![self.parse_small_statement()?];
        while self.eat(&Token::Semicolon) {
            if self.check(&Token::Newline) {
                break;
            }
            stmts.push(self.parse_small_statement()?);
        }
        if !self.eat(&Token::Newline) && !self.check(&Token::EndOfFile) {
            return Err(self.error(format!("expected end of line, found '{}'", self.current())));
        }
        Ok(stmts)
    }

    fn parse_small_statement(&mut self) -> CompileResult<Stmt> {
        let span = self.span();
        match self.current() {
            Token::Return => {
                self.advance();
                let value = if self.check(&Token::Newline)
                    || self.check(&Token::Semicolon)
                    || self.check(&Token::EndOfFile)
                {
                    None
                } else {
                    Some(self.parse_expr_list()?)
                };
                Ok(self.stmt(span, StmtKind::Return(value)))
            }
            Token::Pass => {
                self.advance();
                Ok(self.stmt(span, StmtKind::Pass))
            }
            Token::Break => {
                self.advance();
                Ok(self.stmt(span, StmtKind::Break))
            }
            Token::Continue => {
                self.advance();
                Ok(self.stmt(span, StmtKind::Continue))
            }
            Token::ForeignKeyword(_) => self.parse_foreign(),
            _ => self.parse_expr_statement(),
        }
    }

    fn parse_expr_statement(&mut self) -> CompileResult<Stmt> {
        let span = self.span();
        let target = self.parse_expr_list()?;

        if self.eat(&Token::Equals) {
            let value = self.parse_expr_list()?;
            if self.check(&Token::Equals) {
                return Err(self.error("chained assignment is not supported"));
            }
            return Ok(self.stmt(span, StmtKind::Assign { target, value }));
        }

        if let Some(op) = augmented_op(self.current()) {
            self.advance();
            let value = self.parse_expr_list()?;
            return Ok(self.stmt(span, StmtKind::AugAssign { target, op, value }));
        }

        if self.check(&Token::Colon) {
            return Err(self.error("annotated assignments are not supported"));
        }

        Ok(self.stmt(span, StmtKind::Expr(target)))
    }

    /// Comma-separated expressions, producing a tuple when a comma is present
    fn parse_expr_list(&mut self) -> CompileResult<Expr> {
        let span = self.span();
        let first = self.parse_test()?;
        if !self.check(&Token::Comma) {
            return Ok(first);
        }

        let mut elements = vec![first];
        while self.eat(&Token::Comma) {
            if !self.starts_expression() {
                break;
            }
            elements.push(self.parse_test()?);
        }
        Ok(self.expr(span, ExprKind::Tuple(elements)))
    }

    /// Loop targets stop before `in`, so they are parsed below comparisons
    fn parse_target_list(&mut self) -> CompileResult<Expr> {
        let span = self.span();
        let first = self.parse_bit_or()?;
        if !self.check(&Token::Comma) {
            return Ok(first);
        }
        let mut elements = vec![first];
        while self.eat(&Token::Comma) {
            if self.check(&Token::In) {
                break;
            }
            elements.push(self.parse_bit_or()?);
        }
        Ok(self.expr(span, ExprKind::Tuple(elements)))
    }

    fn starts_expression(&self) -> bool {
        !matches!(
            self.current(),
            Token::Newline
                | Token::EndOfFile
                | Token::Equals
                | Token::RParen
                | Token::RBracket
                | Token::RBrace
                | Token::Semicolon
                | Token::Colon
        ) && augmented_op(self.current()).is_none()
    }

    /// Test that may not be a tuple (conditions of `if`/`while`)
    fn parse_named_test(&mut self) -> CompileResult<Expr> {
        self.parse_test()
    }

    /// Parse an expression (handles operator precedence)
    pub fn parse_test(&mut self) -> CompileResult<Expr> {
        if self.check(&Token::Lambda) {
            return self.parse_lambda();
        }

        let span = self.span();
        let body = self.parse_or()?;
        if self.eat(&Token::If) {
            let test = self.parse_or()?;
            self.expect(Token::Else)?;
            let orelse = self.parse_test()?;
            return Ok(self.expr(
                span,
                ExprKind::IfExp {
                    test: Box::new(test),
                    body: Box::new(body),
                    orelse: Box::new(orelse),
                },
            ));
        }
        Ok(body)
    }

    fn parse_lambda(&mut self) -> CompileResult<Expr> {
        let span = self.span();
        self.expect(Token::Lambda)?;
        let mut params = Vec::new();
        while !self.check(&Token::Colon) {
            params.push(self.expect_ident()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::Colon)?;
        let body = self.parse_test()?;
        Ok(self.expr(
            span,
            ExprKind::Lambda {
                params,
                body: Box::new(body),
            },
        ))
    }

    fn parse_or(&mut self) -> CompileResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = self.bool_op(BoolOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> CompileResult<Expr> {
        let mut left = self.parse_not()?;
        while self.eat(&Token::And) {
            let right = self.parse_not()?;
            left = self.bool_op(BoolOp::And, left, right);
        }
        Ok(left)
    }

    fn bool_op(&mut self, op: BoolOp, left: Expr, right: Expr) -> Expr {
        let span = left.span;
        self.expr(
            span,
            ExprKind::BoolOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        )
    }

    fn parse_not(&mut self) -> CompileResult<Expr> {
        if self.check(&Token::Not) {
            let span = self.span();
            self.advance();
            let operand = self.parse_not()?;
            return Ok(self.expr(
                span,
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
            ));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> CompileResult<Expr> {
        let span = self.span();
        let left = self.parse_bit_or()?;

        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        while let Some(op) = self.comparison_op() {
            ops.push(op);
            comparators.push(self.parse_bit_or()?);
        }

        if ops.is_empty() {
            return Ok(left);
        }
        Ok(self.expr(
            span,
            ExprKind::Compare {
                left: Box::new(left),
                ops,
                comparators,
            },
        ))
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let op = match self.current() {
            Token::EqEq => CmpOp::Eq,
            Token::NotEq => CmpOp::NotEq,
            Token::Lt => CmpOp::Lt,
            Token::LtEq => CmpOp::LtE,
            Token::Gt => CmpOp::Gt,
            Token::GtEq => CmpOp::GtE,
            Token::In => CmpOp::Membership,
            Token::Is => {
                self.advance();
                self.eat(&Token::Not);
                return Some(CmpOp::Identity);
            }
            Token::Not if matches!(self.peek_nth(1), Token::In) => {
                self.advance();
                CmpOp::Membership
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn parse_binary_level(
        &mut self,
        next: fn(&mut Self) -> CompileResult<Expr>,
        op_for: fn(&Token) -> Option<BinOp>,
    ) -> CompileResult<Expr> {
        let mut left = next(self)?;
        while let Some(op) = op_for(self.current()) {
            self.advance();
            let right = next(self)?;
            let span = left.span;
            left = self.expr(
                span,
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }
        Ok(left)
    }

    fn parse_bit_or(&mut self) -> CompileResult<Expr> {
        self.parse_binary_level(Self::parse_bit_xor, |t| match t {
            Token::Pipe => Some(BinOp::BitOr),
            _ => None,
        })
    }

    fn parse_bit_xor(&mut self) -> CompileResult<Expr> {
        self.parse_binary_level(Self::parse_bit_and, |t| match t {
            Token::Caret => Some(BinOp::BitXor),
            _ => None,
        })
    }

    fn parse_bit_and(&mut self) -> CompileResult<Expr> {
        self.parse_binary_level(Self::parse_shift, |t| match t {
            Token::Amp => Some(BinOp::BitAnd),
            _ => None,
        })
    }

    fn parse_shift(&mut self) -> CompileResult<Expr> {
        self.parse_binary_level(Self::parse_additive, |t| match t {
            Token::Shl => Some(BinOp::Shl),
            Token::Shr => Some(BinOp::Shr),
            _ => None,
        })
    }

    /// Parse additive expressions: a + b, a - b
    fn parse_additive(&mut self) -> CompileResult<Expr> {
        self.parse_binary_level(Self::parse_multiplicative, |t| match t {
            Token::Plus => Some(BinOp::Add),
            Token::Minus => Some(BinOp::Sub),
            _ => None,
        })
    }

    /// Parse multiplicative expressions: a * b, a / b, a // b, a % b, a @ b
    fn parse_multiplicative(&mut self) -> CompileResult<Expr> {
        self.parse_binary_level(Self::parse_unary, |t| match t {
            Token::Star => Some(BinOp::Mul),
            Token::Slash => Some(BinOp::Div),
            Token::DoubleSlash => Some(BinOp::FloorDiv),
            Token::Percent => Some(BinOp::Mod),
            Token::At => Some(BinOp::MatMul),
            _ => None,
        })
    }

    /// Parse unary expressions: -a, +a, ~a
    fn parse_unary(&mut self) -> CompileResult<Expr> {
        let op = match self.current() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Plus,
            Token::Tilde => UnaryOp::Invert,
            _ => return self.parse_power(),
        };
        let span = self.span();
        self.advance();
        let operand = self.parse_unary()?;
        Ok(self.expr(
            span,
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
        ))
    }

    fn parse_power(&mut self) -> CompileResult<Expr> {
        let base = self.parse_postfix()?;
        if self.eat(&Token::DoubleStar) {
            let exponent = self.parse_unary()?;
            let span = base.span;
            return Ok(self.expr(
                span,
                ExprKind::Binary {
                    op: BinOp::Pow,
                    left: Box::new(base),
                    right: Box::new(exponent),
                },
            ));
        }
        Ok(base)
    }

    /// Parse postfix expressions: calls, subscripts and attribute access
    fn parse_postfix(&mut self) -> CompileResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            let span = expr.span;
            if self.check(&Token::LParen) {
                let (args, keywords) = self.parse_args()?;
                expr = self.expr(
                    span,
                    ExprKind::Call {
                        func: Box::new(expr),
                        args,
                        keywords,
                    },
                );
            } else if self.eat(&Token::LBracket) {
                let index = self.parse_subscript()?;
                self.expect(Token::RBracket)?;
                expr = self.expr(
                    span,
                    ExprKind::Subscript {
                        value: Box::new(expr),
                        index: Box::new(index),
                    },
                );
            } else if self.eat(&Token::Dot) {
                let attr = self.expect_ident()?;
                expr = self.expr(
                    span,
                    ExprKind::Attribute {
                        value: Box::new(expr),
                        attr,
                    },
                );
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// Parse primary expressions: literals, names, parenthesized, displays
    fn parse_primary(&mut self) -> CompileResult<Expr> {
        let span = self.span();
        match self.current().clone() {
            Token::Int(n) => {
                self.advance();
                Ok(self.expr(span, ExprKind::Int(n)))
            }
            Token::Float(n) => {
                self.advance();
                Ok(self.expr(span, ExprKind::Float(n)))
            }
            Token::True | Token::False => {
                let value = matches!(self.advance(), Token::True);
                Ok(self.expr(span, ExprKind::Bool(value)))
            }
            Token::NoneLit => {
                self.advance();
                Ok(self.expr(span, ExprKind::NoneLit))
            }
            Token::Str(_) => {
                let mut text = String::new();
                // Adjacent literals concatenate
                while let Token::Str(part) = self.current().clone() {
                    text.push_str(&part);
                    self.advance();
                }
                Ok(self.expr(span, ExprKind::Str(text)))
            }
            Token::Ident(name) => {
                self.advance();
                Ok(self.expr(span, ExprKind::Name(name)))
            }
            Token::LParen => {
                self.advance();
                if self.eat(&Token::RParen) {
                    return Ok(self.expr(span, ExprKind::Tuple(Vec::new())));
                }
                let first = self.parse_test()?;
                if self.check(&Token::For) {
                    self.skip_until_close(Token::RParen)?;
                    return Ok(self.expr(span, ExprKind::ListComp));
                }
                if self.check(&Token::Comma) {
                    let mut elements = vec![first];
                    while self.eat(&Token::Comma) {
                        if self.check(&Token::RParen) {
                            break; // Trailing comma
                        }
                        elements.push(self.parse_test()?);
                    }
                    self.expect(Token::RParen)?;
                    return Ok(self.expr(span, ExprKind::Tuple(elements)));
                }
                // Just a parenthesized expression
                self.expect(Token::RParen)?;
                Ok(first)
            }
            Token::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                while !self.check(&Token::RBracket) {
                    elements.push(self.parse_test()?);
                    if self.check(&Token::For) {
                        self.skip_until_close(Token::RBracket)?;
                        return Ok(self.expr(span, ExprKind::ListComp));
                    }
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::RBracket)?;
                Ok(self.expr(span, ExprKind::List(elements)))
            }
            Token::LBrace => {
                self.advance();
                self.skip_until_close(Token::RBrace)?;
                Ok(self.expr(span, ExprKind::Dict))
            }
            Token::Lambda => self.parse_lambda(),
            Token::EndOfFile => Err(self.error("unexpected end of input")),
            other => Err(self.error(format!("unexpected token '{}'", other))),
        }
    }

    /// Consume tokens up to and including the bracket closing the current
    /// display
    fn skip_until_close(&mut self, close: Token) -> CompileResult<()> {
        let mut depth = 0usize;
        loop {
            match self.current() {
                Token::EndOfFile => return Err(self.error(format!("expected '{}'", close))),
                Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
                Token::RParen | Token::RBracket | Token::RBrace => {
                    if depth == 0 {
                        return self.expect(close).map(|_| ());
                    }
                    depth -= 1;
                }
                _ => {}
            }
            self.advance();
        }
    }

    /// Parse call arguments: (arg1, arg2, name=value, ...)
    fn parse_args(&mut self) -> CompileResult<(Vec<Expr>, Vec<Keyword>)> {
        self.expect(Token::LParen)?;

        let mut args = Vec::new();
        let mut keywords = Vec::new();

        while !self.check(&Token::RParen) {
            let is_keyword = matches!(self.current(), Token::Ident(_))
                && matches!(self.peek_nth(1), Token::Equals);
            if is_keyword {
                let name = self.expect_ident()?;
                self.expect(Token::Equals)?;
                let value = self.parse_test()?;
                keywords.push(Keyword { name, value });
            } else {
                if self.check(&Token::Star) || self.check(&Token::DoubleStar) {
                    return Err(self.error("argument unpacking is not supported"));
                }
                let arg = self.parse_test()?;
                if self.check(&Token::For) {
                    let span = arg.span;
                    self.skip_until_close(Token::RParen)?;
                    args.push(self.expr(span, ExprKind::ListComp));
                    return Ok((args, keywords));
                }
                args.push(arg);
            }

            if !self.eat(&Token::Comma) {
                break;
            }
        }

        self.expect(Token::RParen)?;
        Ok((args, keywords))
    }

    /// Parse the inside of `[...]`: indices, slices, or tuples of both
    fn parse_subscript(&mut self) -> CompileResult<Expr> {
        let span = self.span();
        let first = self.parse_slice_item()?;
        if !self.check(&Token::Comma) {
            return Ok(first);
        }
        let mut elements = vec![first];
        while self.eat(&Token::Comma) {
            if self.check(&Token::RBracket) {
                break;
            }
            elements.push(self.parse_slice_item()?);
        }
        Ok(self.expr(span, ExprKind::Tuple(elements)))
    }

    fn parse_slice_item(&mut self) -> CompileResult<Expr> {
        let span = self.span();
        let lower = if self.check(&Token::Colon) {
            None
        } else {
            let expr = self.parse_test()?;
            if !self.check(&Token::Colon) {
                return Ok(expr);
            }
            Some(Box::new(expr))
        };

        self.expect(Token::Colon)?;
        let ends_item = |t: &Token| matches!(t, Token::RBracket | Token::Comma | Token::Colon);
        let upper = if ends_item(self.current()) {
            None
        } else {
            Some(Box::new(self.parse_test()?))
        };
        let step = if self.eat(&Token::Colon) && !ends_item(self.current()) {
            Some(Box::new(self.parse_test()?))
        } else {
            None
        };

        Ok(self.expr(span, ExprKind::Slice { lower, upper, step }))
    }
}

fn augmented_op(token: &Token) -> Option<BinOp> {
    match token {
        Token::PlusEq => Some(BinOp::Add),
        Token::MinusEq => Some(BinOp::Sub),
        Token::StarEq => Some(BinOp::Mul),
        Token::SlashEq => Some(BinOp::Div),
        Token::DoubleSlashEq => Some(BinOp::FloorDiv),
        Token::PercentEq => Some(BinOp::Mod),
        Token::AmpEq => Some(BinOp::BitAnd),
        Token::PipeEq => Some(BinOp::BitOr),
        Token::CaretEq => Some(BinOp::BitXor),
        Token::ShlEq => Some(BinOp::Shl),
        Token::ShrEq => Some(BinOp::Shr),
        _ => None,
    }
}
