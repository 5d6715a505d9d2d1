//! Recursive-descent parser for the !~ATH language.
//!
//! Statement dispatch is by leading token; an identifier, `[`, or `THIS` at
//! statement position is lookahead-parsed as a DIE statement, an assignment,
//! or an expression statement. Entity expressions are a distinct sub-grammar
//! valid only inside `~ATH(...)`. Wait-mode body restrictions are not
//! enforced here; the grammar stays context-free and the evaluator checks.

use crate::error::{AthError, Result, Span};

use super::ast::{
    BinaryOp, DieTarget, DurationLit, EntityClass, EntityExpr, Expr, ImportArgs, Literal, Program,
    Stmt, UnaryOp,
};
use super::token::{Token, TokenKind};

/// Which statement list is being parsed. `Execute` bodies additionally
/// accept literal-leading expression statements (the `EXECUTE(VOID)` no-op)
/// and let the final expression statement omit its semicolon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyMode {
    Standard,
    Execute,
}

/// Token-stream parser.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// Create a parser over a token stream (must end with `Eof`).
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Parse a whole program: zero or more statements until EOF.
    pub fn parse(mut self) -> Result<Program> {
        let mut statements = Vec::new();
        while !self.check(&TokenKind::Eof) {
            statements.push(self.parse_statement(BodyMode::Standard)?);
        }
        Ok(Program { statements })
    }

    // ============ Cursor helpers ============

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or_else(|| {
            self.tokens.last().expect("token stream ends with Eof")
        })
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn check_identifier(&self) -> bool {
        matches!(self.current().kind, TokenKind::Identifier(_))
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            return true;
        }
        false
    }

    fn consume(&mut self, kind: &TokenKind, message: &str) -> Result<Token> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        Err(self.error(message))
    }

    fn expect_identifier(&mut self, message: &str) -> Result<(String, Span)> {
        let token = self.current().clone();
        if let TokenKind::Identifier(name) = token.kind {
            self.advance();
            return Ok((name, token.span));
        }
        Err(self.error(message))
    }

    fn error(&self, message: &str) -> AthError {
        AthError::parse(message, self.current().span)
    }

    // ============ Statements ============

    fn parse_statement(&mut self, mode: BodyMode) -> Result<Stmt> {
        match self.current().kind.clone() {
            TokenKind::Import => self.parse_import(),
            TokenKind::Bifurcate => self.parse_bifurcate(),
            TokenKind::TildeAth => self.parse_ath_loop(),
            TokenKind::Birth => self.parse_var_decl(false),
            TokenKind::Entomb => self.parse_var_decl(true),
            TokenKind::Rite => self.parse_rite_def(),
            TokenKind::Should => self.parse_conditional(),
            TokenKind::Attempt => self.parse_attempt(),
            TokenKind::Condemn => self.parse_condemn(),
            TokenKind::Bequeath => self.parse_bequeath(),
            TokenKind::LBracket => self.parse_bracket_statement(mode),
            TokenKind::Identifier(_) | TokenKind::This => self.parse_expr_statement(mode),
            _ if mode == BodyMode::Execute => self.parse_expr_statement(mode),
            other => Err(self.error(&format!("Unexpected token: {}", other.describe()))),
        }
    }

    fn parse_import(&mut self) -> Result<Stmt> {
        let span = self.advance().span;

        let class = match &self.current().kind {
            TokenKind::Timer => EntityClass::Timer,
            TokenKind::Process => EntityClass::Process,
            TokenKind::Connection => EntityClass::Connection,
            TokenKind::Watcher => EntityClass::Watcher,
            _ => {
                return Err(
                    self.error("Expected entity type (timer, process, connection, watcher)")
                );
            }
        };
        self.advance();

        let (name, _) = self.expect_identifier("Expected entity name")?;
        self.consume(&TokenKind::LParen, "Expected '(' after entity name")?;

        let args = if class == EntityClass::Timer {
            let token = self.current().clone();
            let duration = match token.kind {
                TokenKind::Duration { unit, value } => {
                    self.advance();
                    DurationLit { value, unit, span: token.span }
                }
                // A bare integer counts as milliseconds.
                TokenKind::Integer(value) => {
                    self.advance();
                    DurationLit {
                        value,
                        unit: super::token::DurationUnit::Millis,
                        span: token.span,
                    }
                }
                _ => return Err(self.error("Expected duration for timer")),
            };
            ImportArgs::Duration(duration)
        } else {
            let mut exprs = Vec::new();
            if !self.check(&TokenKind::RParen) {
                exprs.push(self.parse_expression()?);
                while self.eat(&TokenKind::Comma) {
                    exprs.push(self.parse_expression()?);
                }
            }
            ImportArgs::Exprs(exprs)
        };

        self.consume(&TokenKind::RParen, "Expected ')' after import arguments")?;
        self.consume(&TokenKind::Semicolon, "Expected ';' after import statement")?;

        Ok(Stmt::Import { class, name, args, span })
    }

    fn parse_bifurcate(&mut self) -> Result<Stmt> {
        let span = self.advance().span;

        let entity = if self.eat(&TokenKind::This) {
            "THIS".to_string()
        } else {
            self.expect_identifier("Expected entity to bifurcate")?.0
        };

        self.consume(&TokenKind::LBracket, "Expected '[' after entity")?;
        let (left, _) = self.expect_identifier("Expected first branch name")?;
        self.consume(&TokenKind::Comma, "Expected ',' between branch names")?;
        let (right, _) = self.expect_identifier("Expected second branch name")?;
        self.consume(&TokenKind::RBracket, "Expected ']' after branch names")?;
        self.consume(&TokenKind::Semicolon, "Expected ';' after bifurcate statement")?;

        Ok(Stmt::Bifurcate { entity, left, right, span })
    }

    fn parse_ath_loop(&mut self) -> Result<Stmt> {
        let span = self.advance().span;

        self.consume(&TokenKind::LParen, "Expected '(' after ~ATH")?;
        let condition = self.parse_entity_expr()?;
        self.consume(&TokenKind::RParen, "Expected ')' after entity expression")?;

        self.consume(&TokenKind::LBrace, "Expected '{' for ~ATH body")?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            body.push(self.parse_statement(BodyMode::Standard)?);
        }
        self.consume(&TokenKind::RBrace, "Expected '}' after ~ATH body")?;

        self.consume(&TokenKind::Execute, "Expected 'EXECUTE' after ~ATH body")?;
        self.consume(&TokenKind::LParen, "Expected '(' after EXECUTE")?;
        let execute = self.parse_execute_body()?;
        self.consume(&TokenKind::RParen, "Expected ')' after EXECUTE body")?;
        self.consume(&TokenKind::Semicolon, "Expected ';' after ~ATH loop")?;

        Ok(Stmt::AthLoop { condition, body, execute, span })
    }

    fn parse_execute_body(&mut self) -> Result<Vec<Stmt>> {
        if self.check(&TokenKind::RParen) {
            return Err(self.error("EXECUTE requires at least one statement; use EXECUTE(VOID)"));
        }
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RParen) {
            statements.push(self.parse_statement(BodyMode::Execute)?);
        }
        Ok(statements)
    }

    fn parse_var_decl(&mut self, constant: bool) -> Result<Stmt> {
        let span = self.advance().span;
        let which = if constant { "constant" } else { "variable" };

        let (name, _) = self.expect_identifier(&format!("Expected {} name", which))?;
        self.consume(
            &TokenKind::With,
            &format!("Expected 'WITH' after {} name", which),
        )?;
        let value = self.parse_expression()?;
        self.consume(
            &TokenKind::Semicolon,
            &format!("Expected ';' after {} declaration", which),
        )?;

        Ok(if constant {
            Stmt::ConstDecl { name, value, span }
        } else {
            Stmt::VarDecl { name, value, span }
        })
    }

    fn parse_rite_def(&mut self) -> Result<Stmt> {
        let span = self.advance().span;

        let (name, _) = self.expect_identifier("Expected rite name")?;
        self.consume(&TokenKind::LParen, "Expected '(' after rite name")?;

        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            params.push(self.expect_identifier("Expected parameter name")?.0);
            while self.eat(&TokenKind::Comma) {
                params.push(self.expect_identifier("Expected parameter name")?.0);
            }
        }
        self.consume(&TokenKind::RParen, "Expected ')' after parameters")?;

        self.consume(&TokenKind::LBrace, "Expected '{' for rite body")?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            body.push(self.parse_statement(BodyMode::Standard)?);
        }
        self.consume(&TokenKind::RBrace, "Expected '}' after rite body")?;

        Ok(Stmt::RiteDef { name, params, body, span })
    }

    fn parse_conditional(&mut self) -> Result<Stmt> {
        let span = self.advance().span;

        let condition = self.parse_expression()?;
        self.consume(&TokenKind::LBrace, "Expected '{' after condition")?;
        let mut then_branch = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            then_branch.push(self.parse_statement(BodyMode::Standard)?);
        }
        self.consume(&TokenKind::RBrace, "Expected '}' after then branch")?;

        let else_branch = if self.eat(&TokenKind::Lest) {
            if self.check(&TokenKind::Should) {
                // Chained conditional: LEST SHOULD … nests in the else slot.
                Some(vec![self.parse_conditional()?])
            } else {
                self.consume(&TokenKind::LBrace, "Expected '{' after LEST")?;
                let mut stmts = Vec::new();
                while !self.check(&TokenKind::RBrace) {
                    stmts.push(self.parse_statement(BodyMode::Standard)?);
                }
                self.consume(&TokenKind::RBrace, "Expected '}' after else branch")?;
                Some(stmts)
            }
        } else {
            None
        };

        Ok(Stmt::Conditional { condition, then_branch, else_branch, span })
    }

    fn parse_attempt(&mut self) -> Result<Stmt> {
        let span = self.advance().span;

        self.consume(&TokenKind::LBrace, "Expected '{' after ATTEMPT")?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            body.push(self.parse_statement(BodyMode::Standard)?);
        }
        self.consume(&TokenKind::RBrace, "Expected '}' after ATTEMPT body")?;

        self.consume(&TokenKind::Salvage, "Expected 'SALVAGE' after ATTEMPT block")?;
        let (error_name, _) = self.expect_identifier("Expected error variable name")?;

        self.consume(&TokenKind::LBrace, "Expected '{' after error variable")?;
        let mut salvage = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            salvage.push(self.parse_statement(BodyMode::Standard)?);
        }
        self.consume(&TokenKind::RBrace, "Expected '}' after SALVAGE body")?;

        Ok(Stmt::Attempt { body, error_name, salvage, span })
    }

    fn parse_condemn(&mut self) -> Result<Stmt> {
        let span = self.advance().span;
        let message = self.parse_expression()?;
        self.consume(&TokenKind::Semicolon, "Expected ';' after CONDEMN")?;
        Ok(Stmt::Condemn { message, span })
    }

    fn parse_bequeath(&mut self) -> Result<Stmt> {
        let span = self.advance().span;
        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(&TokenKind::Semicolon, "Expected ';' after BEQUEATH")?;
        Ok(Stmt::Bequeath { value, span })
    }

    /// `[` at statement position: a DIE pair like `[A, B].DIE();` when it
    /// parses as one, otherwise an array-literal expression statement.
    fn parse_bracket_statement(&mut self, mode: BodyMode) -> Result<Stmt> {
        let snapshot = self.pos;
        match self.parse_die_pair_statement() {
            Ok(stmt) => Ok(stmt),
            Err(_) => {
                self.pos = snapshot;
                self.parse_expr_statement(mode)
            }
        }
    }

    fn parse_die_pair_statement(&mut self) -> Result<Stmt> {
        let target = self.parse_die_target()?;
        let span = target.span();
        self.consume(&TokenKind::Dot, "Expected '.' after die target")?;
        self.consume(&TokenKind::Die, "Expected 'DIE' after '.'")?;
        self.consume(&TokenKind::LParen, "Expected '(' after DIE")?;
        self.consume(&TokenKind::RParen, "Expected ')' after DIE(")?;
        self.consume(&TokenKind::Semicolon, "Expected ';' after DIE statement")?;
        Ok(Stmt::Die { target, span })
    }

    fn parse_die_target(&mut self) -> Result<DieTarget> {
        if self.check(&TokenKind::LBracket) {
            let span = self.advance().span;
            let left = self.parse_die_target()?;
            self.consume(&TokenKind::Comma, "Expected ',' in die target pair")?;
            let right = self.parse_die_target()?;
            self.consume(&TokenKind::RBracket, "Expected ']' after die target pair")?;
            return Ok(DieTarget::Pair {
                left: Box::new(left),
                right: Box::new(right),
                span,
            });
        }
        if self.check(&TokenKind::This) {
            let span = self.advance().span;
            return Ok(DieTarget::Ident { name: "THIS".to_string(), span });
        }
        let (name, span) = self.expect_identifier("Expected identifier in die target")?;
        Ok(DieTarget::Ident { name, span })
    }

    /// Expression-leading statement: DIE call, assignment, or bare
    /// expression. In Execute mode the final expression statement may omit
    /// its semicolon (the closing `)` must follow).
    fn parse_expr_statement(&mut self, mode: BodyMode) -> Result<Stmt> {
        let expr = self.parse_expression()?;
        let span = expr.span();

        // ENTITY.DIE() parses as a call on a DIE member; rewrite it into a
        // die statement here since DIE is a keyword, not a value.
        if let Expr::Call { callee, args, .. } = &expr {
            if args.is_empty() {
                if let Expr::Member { object, member, .. } = callee.as_ref() {
                    if member == "DIE" {
                        let target = match object.as_ref() {
                            Expr::Identifier { name, span } => DieTarget::Ident {
                                name: name.clone(),
                                span: *span,
                            },
                            _ => return Err(self.error("Invalid DIE target")),
                        };
                        self.consume(&TokenKind::Semicolon, "Expected ';' after DIE statement")?;
                        return Ok(Stmt::Die { target, span });
                    }
                }
            }
        }

        if self.eat(&TokenKind::Assign) {
            let value = self.parse_expression()?;
            self.consume(&TokenKind::Semicolon, "Expected ';' after assignment")?;
            return Ok(Stmt::Assign { target: expr, value, span });
        }

        if !self.eat(&TokenKind::Semicolon) {
            let lenient = mode == BodyMode::Execute && self.check(&TokenKind::RParen);
            if !lenient {
                return Err(self.error("Expected ';' after expression"));
            }
        }
        Ok(Stmt::Expr { expr, span })
    }

    // ============ Entity expressions ============

    fn parse_entity_expr(&mut self) -> Result<EntityExpr> {
        self.parse_entity_or()
    }

    fn parse_entity_or(&mut self) -> Result<EntityExpr> {
        let mut left = self.parse_entity_and()?;
        while self.eat(&TokenKind::PipePipe) {
            let right = self.parse_entity_and()?;
            let span = left.span();
            left = EntityExpr::Or {
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_entity_and(&mut self) -> Result<EntityExpr> {
        let mut left = self.parse_entity_unary()?;
        while self.eat(&TokenKind::AmpAmp) {
            let right = self.parse_entity_unary()?;
            let span = left.span();
            left = EntityExpr::And {
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_entity_unary(&mut self) -> Result<EntityExpr> {
        if self.check(&TokenKind::Bang) {
            let span = self.advance().span;
            let operand = self.parse_entity_unary()?;
            return Ok(EntityExpr::Not { operand: Box::new(operand), span });
        }
        self.parse_entity_primary()
    }

    fn parse_entity_primary(&mut self) -> Result<EntityExpr> {
        if self.eat(&TokenKind::LParen) {
            let expr = self.parse_entity_expr()?;
            self.consume(&TokenKind::RParen, "Expected ')' after entity expression")?;
            return Ok(expr);
        }
        if self.check(&TokenKind::This) {
            let span = self.advance().span;
            return Ok(EntityExpr::Ident { name: "THIS".to_string(), span });
        }
        let (name, span) = self.expect_identifier("Expected entity identifier")?;
        Ok(EntityExpr::Ident { name, span })
    }

    // ============ Value expressions ============

    fn parse_expression(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.check(&TokenKind::Or) {
            let span = self.advance().span;
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_equality()?;
        while self.check(&TokenKind::And) {
            let span = self.advance().span;
            let right = self.parse_equality()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.current().kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                _ => break,
            };
            let span = self.advance().span;
            let right = self.parse_comparison()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Ge => BinaryOp::Ge,
                _ => break,
            };
            let span = self.advance().span;
            let right = self.parse_additive()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let span = self.advance().span;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => break,
            };
            let span = self.advance().span;
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.check(&TokenKind::Not) {
            let span = self.advance().span;
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary { op: UnaryOp::Not, operand: Box::new(operand), span });
        }
        if self.check(&TokenKind::Minus) {
            let span = self.advance().span;
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary { op: UnaryOp::Neg, operand: Box::new(operand), span });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.eat(&TokenKind::LBracket) {
                let index = self.parse_expression()?;
                self.consume(&TokenKind::RBracket, "Expected ']' after index")?;
                let span = expr.span();
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                    span,
                };
            } else if self.eat(&TokenKind::Dot) {
                // DIE is a keyword; after '.' it is accepted and must be
                // called with empty parentheses.
                if self.check(&TokenKind::Die) {
                    let span = self.advance().span;
                    self.consume(&TokenKind::LParen, "Expected '(' after DIE")?;
                    self.consume(&TokenKind::RParen, "Expected ')' after DIE(")?;
                    let member = Expr::Member {
                        object: Box::new(expr),
                        member: "DIE".to_string(),
                        span,
                    };
                    expr = Expr::Call { callee: Box::new(member), args: Vec::new(), span };
                } else {
                    let (member, span) = self.expect_identifier("Expected member name after '.'")?;
                    expr = Expr::Member { object: Box::new(expr), member, span };
                }
            } else if self.check(&TokenKind::LParen) {
                let span = self.advance().span;
                let mut args = Vec::new();
                if !self.check(&TokenKind::RParen) {
                    args.push(self.parse_expression()?);
                    while self.eat(&TokenKind::Comma) {
                        args.push(self.parse_expression()?);
                    }
                }
                self.consume(&TokenKind::RParen, "Expected ')' after arguments")?;
                expr = Expr::Call { callee: Box::new(expr), args, span };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.current().clone();
        let span = token.span;

        match token.kind {
            TokenKind::Integer(value) => {
                self.advance();
                Ok(Expr::Literal { value: Literal::Integer(value), span })
            }
            TokenKind::Float(value) => {
                self.advance();
                Ok(Expr::Literal { value: Literal::Float(value), span })
            }
            TokenKind::Str(text) => {
                self.advance();
                Ok(Expr::Literal { value: Literal::Str(text), span })
            }
            TokenKind::Alive => {
                self.advance();
                Ok(Expr::Literal { value: Literal::Boolean(true), span })
            }
            TokenKind::Dead => {
                self.advance();
                Ok(Expr::Literal { value: Literal::Boolean(false), span })
            }
            TokenKind::Void => {
                self.advance();
                Ok(Expr::Literal { value: Literal::Void, span })
            }
            TokenKind::This => {
                self.advance();
                Ok(Expr::Identifier { name: "THIS".to_string(), span })
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Expr::Identifier { name, span })
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.consume(&TokenKind::RParen, "Expected ')' after expression")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                self.parse_array_literal(span)
            }
            TokenKind::LBrace => {
                self.advance();
                self.parse_map_literal(span)
            }
            other => Err(self.error(&format!(
                "Unexpected token in expression: {}",
                other.describe()
            ))),
        }
    }

    fn parse_array_literal(&mut self, span: Span) -> Result<Expr> {
        let mut elements = Vec::new();
        if !self.check(&TokenKind::RBracket) {
            elements.push(self.parse_expression()?);
            while self.eat(&TokenKind::Comma) {
                if self.check(&TokenKind::RBracket) {
                    break; // trailing comma
                }
                elements.push(self.parse_expression()?);
            }
        }
        self.consume(&TokenKind::RBracket, "Expected ']' after array elements")?;
        Ok(Expr::Array { elements, span })
    }

    fn parse_map_literal(&mut self, span: Span) -> Result<Expr> {
        let mut entries = Vec::new();
        if !self.check(&TokenKind::RBrace) {
            loop {
                let key = self.parse_map_key()?;
                self.consume(&TokenKind::Colon, "Expected ':' after map key")?;
                let value = self.parse_expression()?;
                entries.push((key, value));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
                if self.check(&TokenKind::RBrace) {
                    break; // trailing comma
                }
            }
        }
        self.consume(&TokenKind::RBrace, "Expected '}' after map entries")?;
        Ok(Expr::Map { entries, span })
    }

    fn parse_map_key(&mut self) -> Result<String> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Str(text) => {
                self.advance();
                Ok(text)
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error("Expected map key (identifier or string)")),
        }
    }
}

/// Lex and parse source text in one step.
pub fn parse_source(source: &str) -> Result<Program> {
    let tokens = super::lexer::Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Program {
        parse_source(source).expect("parse")
    }

    fn parse_err(source: &str) -> AthError {
        parse_source(source).expect_err("expected parse failure")
    }

    #[test]
    fn parses_import_with_duration() {
        let program = parse("import timer T(100ms);");
        match &program.statements[0] {
            Stmt::Import { class, name, args, .. } => {
                assert_eq!(*class, EntityClass::Timer);
                assert_eq!(name, "T");
                match args {
                    ImportArgs::Duration(d) => assert_eq!(d.millis(), 100),
                    other => panic!("expected duration args, got {:?}", other),
                }
            }
            other => panic!("expected import, got {:?}", other),
        }
    }

    #[test]
    fn bare_integer_timer_argument_is_milliseconds() {
        let program = parse("import timer T(5);");
        match &program.statements[0] {
            Stmt::Import { args: ImportArgs::Duration(d), .. } => assert_eq!(d.millis(), 5),
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn parses_ath_loop_with_entity_or() {
        let program = parse("~ATH(T1 || T2) { } EXECUTE(UTTER(\"done\"));");
        match &program.statements[0] {
            Stmt::AthLoop { condition, body, execute, .. } => {
                assert!(matches!(condition, EntityExpr::Or { .. }));
                assert!(body.is_empty());
                assert_eq!(execute.len(), 1);
            }
            other => panic!("expected ~ATH loop, got {:?}", other),
        }
    }

    #[test]
    fn entity_precedence_or_lower_than_and() {
        let program = parse("~ATH(A || B && !C) { } EXECUTE(VOID);");
        match &program.statements[0] {
            Stmt::AthLoop { condition: EntityExpr::Or { right, .. }, .. } => {
                match right.as_ref() {
                    EntityExpr::And { right: not, .. } => {
                        assert!(matches!(not.as_ref(), EntityExpr::Not { .. }));
                    }
                    other => panic!("expected AND on the right, got {:?}", other),
                }
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn execute_final_statement_may_omit_semicolon() {
        parse("~ATH(T) { } EXECUTE(UTTER(\"a\"); UTTER(\"b\"));");
        parse("~ATH(T) { } EXECUTE(UTTER(\"a\"); UTTER(\"b\"))  ;");
        parse("~ATH(T) { } EXECUTE(VOID);");
        let err = parse_err("~ATH(T) { } EXECUTE(UTTER(\"a\") UTTER(\"b\"));");
        assert!(err.message.contains("Expected ';'"), "{}", err.message);
    }

    #[test]
    fn empty_execute_is_rejected() {
        let err = parse_err("~ATH(T) { } EXECUTE();");
        assert!(err.message.contains("EXECUTE requires"), "{}", err.message);
    }

    #[test]
    fn parses_die_statement_forms() {
        let program = parse("T.DIE(); THIS.DIE(); [A, [B, C]].DIE();");
        assert!(matches!(&program.statements[0], Stmt::Die { target: DieTarget::Ident { name, .. }, .. } if name == "T"));
        assert!(matches!(&program.statements[1], Stmt::Die { target: DieTarget::Ident { name, .. }, .. } if name == "THIS"));
        match &program.statements[2] {
            Stmt::Die { target: DieTarget::Pair { right, .. }, .. } => {
                assert!(matches!(right.as_ref(), DieTarget::Pair { .. }));
            }
            other => panic!("expected die pair, got {:?}", other),
        }
    }

    #[test]
    fn die_requires_call_parens() {
        let err = parse_err("T.DIE;");
        assert!(err.message.contains("Expected '(' after DIE"));
    }

    #[test]
    fn parses_assignment_targets() {
        let program = parse("x = 1; arr[0] = 2; m.key = 3;");
        assert!(matches!(&program.statements[0], Stmt::Assign { target: Expr::Identifier { .. }, .. }));
        assert!(matches!(&program.statements[1], Stmt::Assign { target: Expr::Index { .. }, .. }));
        assert!(matches!(&program.statements[2], Stmt::Assign { target: Expr::Member { .. }, .. }));
    }

    #[test]
    fn arithmetic_precedence() {
        let program = parse("BIRTH x WITH 1 + 2 * 3;");
        match &program.statements[0] {
            Stmt::VarDecl { value: Expr::Binary { op: BinaryOp::Add, right, .. }, .. } => {
                assert!(matches!(right.as_ref(), Expr::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn trailing_commas_in_literals() {
        parse("BIRTH a WITH [1, 2, 3,];");
        parse("BIRTH m WITH {x: 1, \"y\": 2,};");
    }

    #[test]
    fn chained_conditionals_nest() {
        let program = parse("SHOULD a { } LEST SHOULD b { } LEST { }");
        match &program.statements[0] {
            Stmt::Conditional { else_branch: Some(else_stmts), .. } => {
                assert!(matches!(&else_stmts[0], Stmt::Conditional { .. }));
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn bequeath_with_and_without_value() {
        let program = parse("RITE f() { BEQUEATH; BEQUEATH 42; }");
        match &program.statements[0] {
            Stmt::RiteDef { body, .. } => {
                assert!(matches!(&body[0], Stmt::Bequeath { value: None, .. }));
                assert!(matches!(&body[1], Stmt::Bequeath { value: Some(_), .. }));
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn entity_operators_rejected_in_value_expressions() {
        let err = parse_err("BIRTH x WITH a && b;");
        assert!(err.message.contains("Expected ';'"), "{}", err.message);
        let err = parse_err("BIRTH x WITH !a;");
        assert!(err.message.contains("Unexpected token in expression"), "{}", err.message);
    }

    #[test]
    fn errors_carry_positions() {
        let err = parse_err("import timer T(1ms)");
        assert!(err.span.is_some());
        assert!(err.message.contains("Expected ';' after import statement"));
    }

    #[test]
    fn ast_round_trips_through_serde() {
        let program = parse("~ATH(T) { } EXECUTE(UTTER(\"hi\")); THIS.DIE();");
        let json = serde_json::to_string(&program).expect("serialize");
        let back: Program = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(program, back);
    }
}
