//! relive script: the embedded module language.
//!
//! # Dialects
//!
//! | Dialect | Written by | Module syntax |
//! |---------|------------|---------------|
//! | Surface | users      | `import` / `export`, `: type` annotations |
//! | Core    | transpiler | `require(...)`, `exports.x = ...` |
//!
//! Only the core dialect is ever executed.

mod ast;
mod interp;
mod lexer;
mod parser;
mod transpile;
mod value;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use ast::{ExportDecl, ImportClause, Stmt, StmtKind};
pub use interp::{Env, Interpreter, ModuleHost, Nesting, Scope};
pub use parser::parse;
pub use transpile::Transpiler;
pub use value::{List, NativeFn, NativeFnPtr, Object, RequireFn, Value};

/// 1-based line and column in a source file.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
}

impl Pos {
    pub const fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Surface,
    Core,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub pos: Pos,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, pos: Pos) -> Self {
        Self {
            message: message.into(),
            pos,
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.pos)
    }
}

impl std::error::Error for SyntaxError {}
