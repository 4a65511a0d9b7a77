//! Recursive-descent parser for relive script.
//!
//! One grammar serves both dialects; [`Dialect::Core`] rejects the
//! `import`/`export` declarations that the transpiler lowers away.

use std::rc::Rc;

use super::ast::{
    BinaryOp, ExportDecl, Expr, ExprKind, FnDecl, ImportClause, Stmt, StmtKind, UnaryOp,
};
use super::lexer::{Tok, Token, tokenize};
use super::{Dialect, Pos, SyntaxError};

/// Deepest nesting of blocks and operands the parser accepts.
const MAX_NESTING: usize = 100;

/// Parse a whole module body.
pub fn parse(source: &str, dialect: Dialect) -> Result<Vec<Stmt>, SyntaxError> {
    let tokens = tokenize(source)?;
    Parser {
        tokens,
        idx: 0,
        depth: 0,
        dialect,
    }
    .program()
}

struct Parser {
    tokens: Vec<Token>,
    idx: usize,
    depth: usize,
    dialect: Dialect,
}

type PResult<T> = Result<T, SyntaxError>;

impl Parser {
    // -------------------------------------------------------------------------
    // Token helpers
    // -------------------------------------------------------------------------

    fn peek(&self) -> &Tok {
        &self.tokens[self.idx].tok
    }

    fn peek_nth(&self, n: usize) -> &Tok {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.idx + n).min(last)].tok
    }

    fn pos(&self) -> Pos {
        self.tokens[self.idx].pos
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.idx].clone();
        if token.tok != Tok::Eof {
            self.idx += 1;
        }
        token
    }

    fn check(&self, tok: &Tok) -> bool {
        self.peek() == tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.check(tok) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &str) -> SyntaxError {
        SyntaxError::new(
            format!("expected {expected}, found {}", self.peek().describe()),
            self.pos(),
        )
    }

    fn expect(&mut self, tok: &Tok, expected: &str) -> PResult<Pos> {
        if self.check(tok) {
            Ok(self.advance().pos)
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn ident(&mut self, expected: &str) -> PResult<String> {
        match self.peek().clone() {
            Tok::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn string(&mut self, expected: &str) -> PResult<String> {
        match self.peek().clone() {
            Tok::Str(value) => {
                self.advance();
                Ok(value)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    /// Property names may be identifiers or keywords (`exports.default`).
    fn property_name(&mut self) -> PResult<String> {
        let name = match self.peek() {
            Tok::Ident(name) => name.clone(),
            Tok::Str(_) | Tok::Num(_) | Tok::Eof => {
                return Err(self.unexpected("property name"));
            }
            tok => {
                let text = tok.describe();
                let keyword = text.trim_matches('`');
                if !keyword.chars().all(|c| c.is_ascii_alphabetic()) {
                    return Err(self.unexpected("property name"));
                }
                keyword.to_string()
            }
        };
        self.advance();
        Ok(name)
    }

    /// Run `parse` one nesting level deeper.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        if self.depth >= MAX_NESTING {
            return Err(SyntaxError::new(
                format!("nesting exceeds {MAX_NESTING} levels"),
                self.pos(),
            ));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// Statements end with `;`, which may be omitted right after a block.
    fn end_statement(&mut self) -> PResult<()> {
        if self.eat(&Tok::Semi) {
            return Ok(());
        }
        if self.idx > 0 && self.tokens[self.idx - 1].tok == Tok::RBrace {
            return Ok(());
        }
        Err(self.unexpected("`;`"))
    }

    /// Erase `: type` annotations (`a: string`, `xs: number[]`).
    fn skip_annotation(&mut self) -> PResult<()> {
        if !self.eat(&Tok::Colon) {
            return Ok(());
        }
        match self.peek() {
            Tok::Ident(_) | Tok::Nil => {
                self.advance();
            }
            _ => return Err(self.unexpected("type name")),
        }
        while self.check(&Tok::LBracket) && self.peek_nth(1) == &Tok::RBracket {
            self.advance();
            self.advance();
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------------------

    fn program(mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !self.check(&Tok::Eof) {
            if self.eat(&Tok::Semi) {
                continue;
            }
            stmts.push(self.statement(true)?);
        }
        Ok(stmts)
    }

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        self.nested(Self::block_body)
    }

    fn block_body(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(&Tok::LBrace, "`{`")?;
        let mut stmts = Vec::new();
        while !self.check(&Tok::RBrace) {
            if self.check(&Tok::Eof) {
                return Err(self.unexpected("`}`"));
            }
            if self.eat(&Tok::Semi) {
                continue;
            }
            stmts.push(self.statement(false)?);
        }
        self.advance();
        Ok(stmts)
    }

    fn statement(&mut self, top_level: bool) -> PResult<Stmt> {
        let pos = self.pos();
        let kind = match self.peek() {
            Tok::Import | Tok::Export => {
                let keyword = if self.check(&Tok::Import) {
                    "import"
                } else {
                    "export"
                };
                if self.dialect == Dialect::Core {
                    return Err(SyntaxError::new(
                        format!("`{keyword}` must be compiled before execution"),
                        pos,
                    ));
                }
                if !top_level {
                    return Err(SyntaxError::new(
                        format!("`{keyword}` declarations may only appear at top level"),
                        pos,
                    ));
                }
                if self.check(&Tok::Import) {
                    self.import()?
                } else {
                    self.export()?
                }
            }
            Tok::Let => {
                self.advance();
                let name = self.ident("variable name")?;
                self.skip_annotation()?;
                self.expect(&Tok::Assign, "`=`")?;
                let value = self.expression()?;
                self.end_statement()?;
                StmtKind::Let { name, value }
            }
            Tok::Fn if matches!(self.peek_nth(1), Tok::Ident(_)) => {
                StmtKind::Fn(self.function()?)
            }
            Tok::Return => {
                self.advance();
                let value = if self.check(&Tok::Semi) || self.check(&Tok::RBrace) {
                    None
                } else {
                    Some(self.expression()?)
                };
                if !self.check(&Tok::RBrace) {
                    self.end_statement()?;
                }
                StmtKind::Return(value)
            }
            Tok::Throw => {
                self.advance();
                let value = self.expression()?;
                self.end_statement()?;
                StmtKind::Throw(value)
            }
            Tok::If => self.if_statement()?,
            _ => {
                let expr = self.expression()?;
                if self.eat(&Tok::Assign) {
                    if !matches!(
                        expr.kind,
                        ExprKind::Ident(_) | ExprKind::Member { .. } | ExprKind::Index { .. }
                    ) {
                        return Err(SyntaxError::new("invalid assignment target", expr.pos));
                    }
                    let value = self.expression()?;
                    self.end_statement()?;
                    StmtKind::Assign {
                        target: expr,
                        value,
                    }
                } else {
                    self.end_statement()?;
                    StmtKind::Expr(expr)
                }
            }
        };
        Ok(Stmt { kind, pos })
    }

    fn if_statement(&mut self) -> PResult<StmtKind> {
        self.nested(Self::if_chain)
    }

    fn if_chain(&mut self) -> PResult<StmtKind> {
        self.expect(&Tok::If, "`if`")?;
        self.expect(&Tok::LParen, "`(`")?;
        let cond = self.expression()?;
        self.expect(&Tok::RParen, "`)`")?;
        let then = self.block()?;
        let otherwise = if self.eat(&Tok::Else) {
            if self.check(&Tok::If) {
                let pos = self.pos();
                let nested = self.if_statement()?;
                Some(vec![Stmt { kind: nested, pos }])
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };
        Ok(StmtKind::If {
            cond,
            then,
            otherwise,
        })
    }

    fn import(&mut self) -> PResult<StmtKind> {
        self.expect(&Tok::Import, "`import`")?;
        let clause = match self.peek().clone() {
            Tok::Str(source) => {
                self.advance();
                self.end_statement()?;
                return Ok(StmtKind::Import {
                    clause: ImportClause::SideEffect,
                    source,
                });
            }
            Tok::Ident(name) => {
                self.advance();
                ImportClause::Default(name)
            }
            Tok::Star => {
                self.advance();
                self.expect(&Tok::As, "`as`")?;
                ImportClause::Namespace(self.ident("namespace name")?)
            }
            Tok::LBrace => ImportClause::Named(self.name_list(true)?),
            _ => return Err(self.unexpected("import clause")),
        };
        self.expect(&Tok::From, "`from`")?;
        let source = self.string("module specifier")?;
        self.end_statement()?;
        Ok(StmtKind::Import { clause, source })
    }

    fn export(&mut self) -> PResult<StmtKind> {
        self.expect(&Tok::Export, "`export`")?;
        let decl = match self.peek() {
            Tok::Default => {
                self.advance();
                if self.check(&Tok::Fn) && matches!(self.peek_nth(1), Tok::Ident(_)) {
                    ExportDecl::Fn {
                        decl: self.function()?,
                        default: true,
                    }
                } else {
                    let value = self.expression()?;
                    self.end_statement()?;
                    ExportDecl::Default(value)
                }
            }
            Tok::Fn => {
                if !matches!(self.peek_nth(1), Tok::Ident(_)) {
                    return Err(SyntaxError::new(
                        "exported function declarations need a name",
                        self.pos(),
                    ));
                }
                ExportDecl::Fn {
                    decl: self.function()?,
                    default: false,
                }
            }
            Tok::Let => {
                self.advance();
                let name = self.ident("variable name")?;
                self.skip_annotation()?;
                self.expect(&Tok::Assign, "`=`")?;
                let value = self.expression()?;
                self.end_statement()?;
                ExportDecl::Let { name, value }
            }
            Tok::LBrace => {
                let names = self.name_list(false)?;
                self.end_statement()?;
                ExportDecl::Names(names)
            }
            _ => return Err(self.unexpected("`default`, `let`, `fn` or `{` after `export`")),
        };
        Ok(StmtKind::Export(decl))
    }

    /// `{ a, b as c }`. Import lists accept keyword names on the left
    /// (`{ default as x }`).
    fn name_list(&mut self, importing: bool) -> PResult<Vec<(String, String)>> {
        self.expect(&Tok::LBrace, "`{`")?;
        let mut names = Vec::new();
        while !self.check(&Tok::RBrace) {
            let first = if importing {
                self.property_name()?
            } else {
                self.ident("name")?
            };
            let second = if self.eat(&Tok::As) {
                if importing {
                    self.ident("local name")?
                } else {
                    self.property_name()?
                }
            } else {
                first.clone()
            };
            names.push((first, second));
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(&Tok::RBrace, "`}`")?;
        Ok(names)
    }

    /// `fn name?(params) { body }`
    fn function(&mut self) -> PResult<Rc<FnDecl>> {
        let pos = self.expect(&Tok::Fn, "`fn`")?;
        let name = match self.peek().clone() {
            Tok::Ident(name) => {
                self.advance();
                Some(name)
            }
            _ => None,
        };
        self.expect(&Tok::LParen, "`(`")?;
        let mut params = Vec::new();
        while !self.check(&Tok::RParen) {
            params.push(self.ident("parameter name")?);
            self.skip_annotation()?;
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(&Tok::RParen, "`)`")?;
        self.skip_annotation()?;
        let body = self.block()?;
        Ok(Rc::new(FnDecl {
            name,
            params,
            body: body.into(),
            pos,
        }))
    }

    // -------------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------------

    fn expression(&mut self) -> PResult<Expr> {
        self.binary(0)
    }

    fn binary_op(tok: &Tok) -> Option<(BinaryOp, u8)> {
        Some(match tok {
            Tok::OrOr => (BinaryOp::Or, 0),
            Tok::AndAnd => (BinaryOp::And, 1),
            Tok::Eq => (BinaryOp::Eq, 2),
            Tok::NotEq => (BinaryOp::NotEq, 2),
            Tok::Lt => (BinaryOp::Lt, 3),
            Tok::LtEq => (BinaryOp::LtEq, 3),
            Tok::Gt => (BinaryOp::Gt, 3),
            Tok::GtEq => (BinaryOp::GtEq, 3),
            Tok::Plus => (BinaryOp::Add, 4),
            Tok::Minus => (BinaryOp::Sub, 4),
            Tok::Star => (BinaryOp::Mul, 5),
            Tok::Slash => (BinaryOp::Div, 5),
            Tok::Percent => (BinaryOp::Rem, 5),
            _ => return None,
        })
    }

    /// Precedence climbing; all binary operators are left-associative.
    fn binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut lhs = self.unary()?;
        while let Some((op, prec)) = Self::binary_op(self.peek()) {
            if prec < min_prec {
                break;
            }
            self.advance();
            let rhs = self.binary(prec + 1)?;
            let pos = lhs.pos;
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                pos,
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> PResult<Expr> {
        self.nested(Self::operand)
    }

    fn operand(&mut self) -> PResult<Expr> {
        let pos = self.pos();
        let op = match self.peek() {
            Tok::Bang => UnaryOp::Not,
            Tok::Minus => UnaryOp::Neg,
            _ => return self.postfix(),
        };
        self.advance();
        let expr = self.unary()?;
        Ok(Expr {
            kind: ExprKind::Unary {
                op,
                expr: Box::new(expr),
            },
            pos,
        })
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            let pos = self.pos();
            match self.peek() {
                Tok::LParen => {
                    self.advance();
                    let args = self.arguments(&Tok::RParen)?;
                    expr = Expr {
                        kind: ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        pos,
                    };
                }
                Tok::Dot => {
                    self.advance();
                    let name = self.property_name()?;
                    expr = Expr {
                        kind: ExprKind::Member {
                            object: Box::new(expr),
                            name,
                        },
                        pos,
                    };
                }
                Tok::LBracket => {
                    self.advance();
                    let index = self.expression()?;
                    self.expect(&Tok::RBracket, "`]`")?;
                    expr = Expr {
                        kind: ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        pos,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Comma-separated expressions up to `close` (consumed); trailing comma allowed.
    fn arguments(&mut self, close: &Tok) -> PResult<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.check(close) {
            args.push(self.expression()?);
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        let expected = if close == &Tok::RParen { "`)`" } else { "`]`" };
        self.expect(close, expected)?;
        Ok(args)
    }

    fn primary(&mut self) -> PResult<Expr> {
        let pos = self.pos();
        let kind = match self.peek().clone() {
            Tok::Num(n) => {
                self.advance();
                ExprKind::Num(n)
            }
            Tok::Str(s) => {
                self.advance();
                ExprKind::Str(s)
            }
            Tok::True => {
                self.advance();
                ExprKind::Bool(true)
            }
            Tok::False => {
                self.advance();
                ExprKind::Bool(false)
            }
            Tok::Nil => {
                self.advance();
                ExprKind::Nil
            }
            Tok::Ident(name) => {
                self.advance();
                ExprKind::Ident(name)
            }
            Tok::LParen => {
                self.advance();
                let inner = self.expression()?;
                self.expect(&Tok::RParen, "`)`")?;
                return Ok(inner);
            }
            Tok::LBracket => {
                self.advance();
                ExprKind::List(self.arguments(&Tok::RBracket)?)
            }
            Tok::LBrace => ExprKind::Object(self.object()?),
            Tok::Fn => ExprKind::Fn(self.function()?),
            _ => return Err(self.unexpected("expression")),
        };
        Ok(Expr { kind, pos })
    }

    /// `{ key: value, "quoted": value, shorthand }`
    fn object(&mut self) -> PResult<Vec<(String, Expr)>> {
        self.expect(&Tok::LBrace, "`{`")?;
        let mut fields = Vec::new();
        while !self.check(&Tok::RBrace) {
            let key_pos = self.pos();
            let key = match self.peek().clone() {
                Tok::Str(key) => {
                    self.advance();
                    key
                }
                _ => self.property_name()?,
            };
            let value = if self.eat(&Tok::Colon) {
                self.expression()?
            } else {
                Expr {
                    kind: ExprKind::Ident(key.clone()),
                    pos: key_pos,
                }
            };
            fields.push((key, value));
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(&Tok::RBrace, "`}`")?;
        Ok(fields)
    }
}
