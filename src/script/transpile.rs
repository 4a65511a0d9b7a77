//! Surface-to-core lowering.
//!
//! The printer is line-preserving: every statement is emitted on the line it
//! started on in the original source, keeping its indentation, so most
//! generated positions are already correct. The source map records
//! the rest: one mapping per statement and per expression node.
//!
//! | Surface | Core |
//! |---------|------|
//! | `import x from "p";` | `let x = __importDefault(require("p"));` |
//! | `import * as ns from "p";` | `let ns = require("p");` |
//! | `import { a, b as c } from "p";` | `let __import0 = require("p"); let a = __import0.a; ...` |
//! | `import "p";` | `require("p");` |
//! | `export default e;` | `exports.default = e;` |
//! | `export let x = e;` | `let x = e; exports.x = x;` |
//! | `export fn f() {}` | `fn f() {} exports.f = f;` |
//! | `export { a, b as c };` | `exports.a = a; exports.c = b;` |

use std::fmt::Write as _;

use super::ast::{ExportDecl, Expr, ExprKind, FnDecl, ImportClause, Stmt, StmtKind, UnaryOp};
use super::{Dialect, Pos, parse};
use crate::compile::{CompileOutput, Compiler, Mapping, SourceMap, TransformOptions};
use crate::error::CompileError;

/// The default [`Compiler`]: parses surface relive script and prints core.
#[derive(Debug, Default, Clone, Copy)]
pub struct Transpiler;

impl Compiler for Transpiler {
    fn compile(
        &self,
        source: &str,
        options: &TransformOptions<'_>,
    ) -> Result<CompileOutput, CompileError> {
        let program = parse(source, Dialect::Surface).map_err(|e| {
            CompileError::new(options.filename, e.message, Some(e.pos)).with_frame(source)
        })?;

        let mut printer = Printer::default();
        printer.block(&program);
        let Printer { out, mappings, .. } = printer;

        Ok(CompileOutput {
            code: out,
            map: options.source_maps.then(|| SourceMap::new(mappings)),
        })
    }
}

struct Printer {
    out: String,
    line: u32,
    col: u32,
    mappings: Vec<Mapping>,
    temps: usize,
}

impl Default for Printer {
    fn default() -> Self {
        Self {
            out: String::new(),
            line: 1,
            col: 1,
            mappings: Vec::new(),
            temps: 0,
        }
    }
}

impl Printer {
    /// Append text that contains no newlines.
    fn write(&mut self, text: &str) {
        self.out.push_str(text);
        self.col += text.chars().count() as u32;
    }

    fn here(&self) -> Pos {
        Pos::new(self.line, self.col)
    }

    fn mark(&mut self, original: Pos) {
        let generated = self.here();
        // keep mappings sorted by generated position
        if let Some(last) = self.mappings.last_mut()
            && last.generated == generated
        {
            last.original = original;
            return;
        }
        self.mappings.push(Mapping {
            generated,
            original,
        });
    }

    /// Move to the statement's original line before printing it.
    fn start(&mut self, pos: Pos) {
        while self.line < pos.line {
            self.out.push('\n');
            self.line += 1;
            self.col = 1;
        }
        if self.col > 1 {
            self.write(" ");
        } else {
            // keep indentation
            while self.col < pos.col {
                self.write(" ");
            }
        }
        self.mark(pos);
    }

    fn temp(&mut self) -> String {
        let name = format!("__import{}", self.temps);
        self.temps += 1;
        name
    }

    // -------------------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------------------

    fn block(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    /// `{ ... }` with the body laid out by original lines.
    fn braced(&mut self, stmts: &[Stmt]) {
        self.write("{");
        self.block(stmts);
        self.write(" }");
    }

    fn stmt(&mut self, stmt: &Stmt) {
        self.start(stmt.pos);
        let pos = stmt.pos;
        match &stmt.kind {
            StmtKind::Let { name, value } => self.let_binding(name, value),
            StmtKind::Fn(decl) => self.function(decl),
            StmtKind::Return(value) => {
                self.write("return");
                if let Some(value) = value {
                    self.write(" ");
                    self.expr(value);
                }
                self.write(";");
            }
            StmtKind::Throw(value) => {
                self.write("throw ");
                self.expr(value);
                self.write(";");
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                self.write("if (");
                self.expr(cond);
                self.write(") ");
                self.braced(then);
                if let Some(otherwise) = otherwise {
                    self.write(" else ");
                    self.braced(otherwise);
                }
            }
            StmtKind::Assign { target, value } => {
                self.expr(target);
                self.write(" = ");
                self.expr(value);
                self.write(";");
            }
            StmtKind::Expr(expr) => {
                self.expr(expr);
                self.write(";");
            }
            StmtKind::Import { clause, source } => self.import(clause, source, pos),
            StmtKind::Export(decl) => self.export(decl, pos),
        }
    }

    fn let_binding(&mut self, name: &str, value: &Expr) {
        self.write("let ");
        self.write(name);
        self.write(" = ");
        self.expr(value);
        self.write(";");
    }

    fn require_call(&mut self, source: &str) {
        self.write("require(");
        self.write(&quote(source));
        self.write(")");
    }

    fn import(&mut self, clause: &ImportClause, source: &str, pos: Pos) {
        match clause {
            ImportClause::SideEffect => {
                self.require_call(source);
                self.write(";");
            }
            ImportClause::Default(local) => {
                self.write("let ");
                self.write(local);
                self.write(" = __importDefault(");
                self.require_call(source);
                self.write(");");
            }
            ImportClause::Namespace(local) => {
                self.write("let ");
                self.write(local);
                self.write(" = ");
                self.require_call(source);
                self.write(";");
            }
            ImportClause::Named(names) => {
                let temp = self.temp();
                self.write("let ");
                self.write(&temp);
                self.write(" = ");
                self.require_call(source);
                self.write(";");
                for (imported, local) in names {
                    self.write(" ");
                    self.mark(pos);
                    self.write(&format!("let {local} = {temp}.{imported};"));
                }
            }
        }
    }

    fn export_binding(&mut self, exported: &str, local: &str, pos: Pos) {
        if self.col > 1 {
            self.write(" ");
        }
        self.mark(pos);
        self.write(&format!("exports.{exported} = {local};"));
    }

    fn export(&mut self, decl: &ExportDecl, pos: Pos) {
        match decl {
            ExportDecl::Default(value) => {
                self.write("exports.default = ");
                self.expr(value);
                self.write(";");
            }
            ExportDecl::Fn { decl, default } => match &decl.name {
                Some(name) => {
                    self.function(decl);
                    let exported = if *default { "default" } else { name.as_str() };
                    self.export_binding(exported, name, pos);
                }
                None => {
                    self.write("exports.default = ");
                    self.function(decl);
                    self.write(";");
                }
            },
            ExportDecl::Let { name, value } => {
                self.let_binding(name, value);
                self.export_binding(name, name, pos);
            }
            ExportDecl::Names(names) => {
                for (i, (local, exported)) in names.iter().enumerate() {
                    if i == 0 {
                        self.write(&format!("exports.{exported} = {local};"));
                    } else {
                        self.export_binding(exported, local, pos);
                    }
                }
            }
        }
    }

    fn function(&mut self, decl: &FnDecl) {
        self.mark(decl.pos);
        self.write("fn");
        if let Some(name) = &decl.name {
            self.write(" ");
            self.write(name);
        }
        self.write("(");
        self.write(&decl.params.join(", "));
        self.write(") ");
        self.braced(&decl.body);
    }

    // -------------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------------

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Call { callee, args } => {
                self.operand(callee);
                self.mark(expr.pos);
                self.write("(");
                self.list(args);
                self.write(")");
                return;
            }
            ExprKind::Member { object, name } => {
                self.operand(object);
                self.mark(expr.pos);
                self.write(".");
                self.write(name);
                return;
            }
            ExprKind::Index { object, index } => {
                self.operand(object);
                self.mark(expr.pos);
                self.write("[");
                self.expr(index);
                self.write("]");
                return;
            }
            _ => {}
        }

        self.mark(expr.pos);
        match &expr.kind {
            ExprKind::Nil => self.write("nil"),
            ExprKind::Bool(b) => self.write(if *b { "true" } else { "false" }),
            ExprKind::Num(n) => self.write(&number(*n)),
            ExprKind::Str(s) => self.write(&quote(s)),
            ExprKind::Ident(name) => self.write(name),
            ExprKind::List(items) => {
                self.write("[");
                self.list(items);
                self.write("]");
            }
            ExprKind::Object(fields) => {
                self.write("{");
                for (i, (key, value)) in fields.iter().enumerate() {
                    self.write(if i == 0 { " " } else { ", " });
                    if is_identifier(key) {
                        self.write(key);
                    } else {
                        self.write(&quote(key));
                    }
                    self.write(": ");
                    self.expr(value);
                }
                self.write(if fields.is_empty() { "}" } else { " }" });
            }
            ExprKind::Fn(decl) => self.function(decl),
            ExprKind::Unary { op, expr: inner } => {
                self.write(match op {
                    UnaryOp::Not => "!",
                    UnaryOp::Neg => "-",
                });
                self.operand(inner);
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.write("(");
                self.expr(lhs);
                self.write(" ");
                self.write(op.symbol());
                self.write(" ");
                self.expr(rhs);
                self.write(")");
            }
            ExprKind::Call { .. } | ExprKind::Member { .. } | ExprKind::Index { .. } => {}
        }
    }

    /// An expression in postfix or prefix position.
    fn operand(&mut self, expr: &Expr) {
        if matches!(expr.kind, ExprKind::Fn(_) | ExprKind::Unary { .. }) {
            self.write("(");
            self.expr(expr);
            self.write(")");
        } else {
            self.expr(expr);
        }
    }

    fn list(&mut self, items: &[Expr]) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.expr(item);
        }
    }
}

fn number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Double-quoted string literal using only escapes the lexer understands.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn compile(source: &str) -> CompileOutput {
        Transpiler
            .compile(
                source,
                &TransformOptions {
                    filename: Path::new("/src/entry.rl"),
                    source_maps: true,
                },
            )
            .unwrap()
    }

    #[test]
    fn test_lowers_default_import() {
        let out = compile("import a from \"./a\";");
        assert_eq!(out.code, "let a = __importDefault(require(\"./a\"));");
    }

    #[test]
    fn test_lowers_named_and_namespace_imports() {
        let out = compile("import { x, y as z } from './m';\nimport * as ns from 'strings';");
        let lines: Vec<_> = out.code.lines().collect();
        assert_eq!(
            lines[0],
            "let __import0 = require(\"./m\"); let x = __import0.x; let z = __import0.y;"
        );
        assert_eq!(lines[1], "let ns = require(\"strings\");");
    }

    #[test]
    fn test_lowers_exports() {
        let out = compile(
            "export default 'v' + 1;\nexport let n: number = 2;\nexport fn f(a: string) { return a; }\nexport { n as m };",
        );
        let lines: Vec<_> = out.code.lines().collect();
        assert_eq!(lines[0], "exports.default = (\"v\" + 1);");
        assert_eq!(lines[1], "let n = 2; exports.n = n;");
        assert_eq!(lines[2], "fn f(a) { return a; } exports.f = f;");
        assert_eq!(lines[3], "exports.m = n;");
    }

    #[test]
    fn test_output_is_valid_core() {
        let source = "import a from './a';\n\nexport default fn greet(name) {\n  if (!name) {\n    throw 'no name';\n  }\n  return a + ', ' + name.length;\n}\n";
        let out = compile(source);
        parse(&out.code, Dialect::Core).expect("core output parses");
    }

    #[test]
    fn test_preserves_statement_lines() {
        let source = "let a = 1;\n\n\nlet b = {\n  k: 1,\n};\nlet c = 3;";
        let out = compile(source);
        let program = parse(&out.code, Dialect::Core).unwrap();
        let lines: Vec<_> = program.iter().map(|s| s.pos.line).collect();
        assert_eq!(lines, vec![1, 4, 7]);
    }

    #[test]
    fn test_map_restores_erased_annotation_columns() {
        let source = "let s: string = 'x'; let n = s.missing();";
        let out = compile(source);
        let map = out.map.unwrap();
        // `(` of the call sits further left once the annotation is erased
        let generated_col = out.code.find("missing(").unwrap() as u32 + 1 + "missing".len() as u32;
        let original_col = source.find("missing(").unwrap() as u32 + 1 + "missing".len() as u32;
        assert_ne!(generated_col, original_col);
        assert_eq!(
            map.original_position(Pos::new(1, generated_col)),
            Pos::new(1, original_col)
        );
    }

    #[test]
    fn test_no_map_when_not_requested() {
        let out = Transpiler
            .compile(
                "let a = 1;",
                &TransformOptions {
                    filename: Path::new("/src/a.rl"),
                    source_maps: false,
                },
            )
            .unwrap();
        assert!(out.map.is_none());
    }

    #[test]
    fn test_syntax_error_names_file_and_position() {
        let err = Transpiler
            .compile(
                "let a = 1;\nlet b = ;",
                &TransformOptions {
                    filename: Path::new("/src/bad.rl"),
                    source_maps: true,
                },
            )
            .unwrap_err();
        assert_eq!(err.path, Path::new("/src/bad.rl"));
        assert_eq!(err.pos, Some(Pos::new(2, 9)));
        assert!(err.frame.as_deref().unwrap_or_default().contains("let b = ;"));
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("a\"b\\c\n"), r#""a\"b\\c\n""#);
        assert_eq!(quote("\u{8}"), r#""\u0008""#);
    }
}
