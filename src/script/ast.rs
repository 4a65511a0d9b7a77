//! Syntax tree for relive script.

use std::rc::Rc;

use super::Pos;

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Let { name: String, value: Expr },
    Fn(Rc<FnDecl>),
    Return(Option<Expr>),
    Throw(Expr),
    If {
        cond: Expr,
        then: Vec<Stmt>,
        otherwise: Option<Vec<Stmt>>,
    },
    Assign { target: Expr, value: Expr },
    Expr(Expr),
    /// Surface dialect only.
    Import { clause: ImportClause, source: String },
    /// Surface dialect only.
    Export(ExportDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportClause {
    /// `import "./x";`
    SideEffect,
    /// `import x from "./x";`
    Default(String),
    /// `import * as x from "./x";`
    Namespace(String),
    /// `import { a, b as c } from "./x";` as (imported, local) pairs
    Named(Vec<(String, String)>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportDecl {
    /// `export default <expr>;`
    Default(Expr),
    /// `export default fn name() {}` and `export fn name() {}`
    Fn { decl: Rc<FnDecl>, default: bool },
    /// `export let name = <expr>;`
    Let { name: String, value: Expr },
    /// `export { a, b as c };` as (local, exported) pairs
    Names(Vec<(String, String)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Rc<[Stmt]>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Nil,
    Bool(bool),
    Num(f64),
    Str(String),
    Ident(String),
    List(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Fn(Rc<FnDecl>),
    Call { callee: Box<Expr>, args: Vec<Expr> },
    Member { object: Box<Expr>, name: String },
    Index { object: Box<Expr>, index: Box<Expr> },
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}
