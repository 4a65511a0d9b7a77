//! Tree-walking interpreter for core-dialect relive script.
//!
//! The interpreter never touches the module system directly. Everything it
//! needs from outside a module's own scope goes through [`ModuleHost`], which
//! the loader implements.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::Pos;
use super::ast::{BinaryOp, Expr, ExprKind, FnDecl, Stmt, StmtKind, UnaryOp};
use super::value::{Closure, List, Object, Value};
use crate::error::{Frame, LoadError, RuntimeError};

/// Script call depth limit. A module body still being evaluated counts as
/// a call, and so does the `require` waiting on it.
const MAX_CALL_DEPTH: usize = 32;

/// Nested expression evaluations allowed at once, across calls and modules.
const MAX_EXPR_DEPTH: usize = 128;

// =============================================================================
// Scopes
// =============================================================================

pub type Env = Rc<RefCell<Scope>>;

#[derive(Default, Debug)]
pub struct Scope {
    vars: FxHashMap<String, Value>,
    /// Hoisted function declarations. A closure over this scope is built on
    /// every lookup, so the scope never owns a closure that owns the scope.
    fns: FxHashMap<String, (Rc<FnDecl>, Rc<PathBuf>)>,
    parent: Option<Env>,
}

impl Scope {
    /// A scope with no parent: module scopes start here, so compiled code
    /// only ever sees the bindings explicitly defined into it.
    pub fn root() -> Env {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn child(parent: &Env) -> Env {
        Rc::new(RefCell::new(Self {
            parent: Some(Rc::clone(parent)),
            ..Self::default()
        }))
    }

    pub fn define(env: &Env, name: impl Into<String>, value: Value) {
        env.borrow_mut().vars.insert(name.into(), value);
    }

    pub fn lookup(env: &Env, name: &str) -> Option<Value> {
        let scope = env.borrow();
        if let Some(value) = scope.vars.get(name) {
            return Some(value.clone());
        }
        if let Some((decl, path)) = scope.fns.get(name) {
            return Some(Value::Function(Rc::new(Closure {
                decl: Rc::clone(decl),
                env: Rc::clone(env),
                path: Rc::clone(path),
            })));
        }
        scope.parent.as_ref().and_then(|p| Self::lookup(p, name))
    }

    /// Drop every binding. Closures over this scope stay callable but see
    /// nothing defined in it.
    pub fn clear(env: &Env) {
        let (vars, fns) = {
            let mut scope = env.borrow_mut();
            (
                std::mem::take(&mut scope.vars),
                std::mem::take(&mut scope.fns),
            )
        };
        drop(vars);
        drop(fns);
    }

    fn hoist(env: &Env, name: &str, decl: &Rc<FnDecl>, path: Rc<PathBuf>) {
        env.borrow_mut()
            .fns
            .insert(name.to_string(), (Rc::clone(decl), path));
    }

    /// Assign to an existing binding; returns false if none is visible.
    fn assign(env: &Env, name: &str, value: Value) -> bool {
        let mut scope = env.borrow_mut();
        if let Some(slot) = scope.vars.get_mut(name) {
            *slot = value;
            return true;
        }
        if scope.fns.remove(name).is_some() {
            scope.vars.insert(name.to_string(), value);
            return true;
        }
        match scope.parent.clone() {
            Some(parent) => {
                drop(scope);
                Self::assign(&parent, name, value)
            }
            None => false,
        }
    }
}

// =============================================================================
// Host interface
// =============================================================================

/// Services a running module needs from the loader.
pub trait ModuleHost {
    /// Load a module on behalf of code living in `from_dir`.
    fn require(&mut self, specifier: &str, from_dir: &Path) -> Result<Value, LoadError>;

    /// Resolve a specifier to a path without loading it.
    fn resolve_only(&self, specifier: &str, from_dir: &Path) -> Result<PathBuf, LoadError>;

    /// Map a position in compiled code back to the original source.
    fn original_position(&self, path: &Path, pos: Pos) -> Pos {
        let _ = path;
        pos
    }

    /// Nesting of the interpreter that is waiting on the current `require`.
    fn nesting(&self) -> Nesting {
        Nesting::default()
    }

    /// Record the nesting of an interpreter about to enter `require`.
    fn set_nesting(&mut self, nesting: Nesting) {
        let _ = nesting;
    }
}

/// How deep evaluation already is when an interpreter starts. A module
/// loaded through `require` inherits its requirer's nesting, so recursion
/// through the module graph is bounded like any other recursion.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Nesting {
    pub calls: usize,
    pub exprs: usize,
}

// =============================================================================
// Interpreter
// =============================================================================

enum Flow {
    Normal,
    Return(Value),
}

struct ActiveFrame {
    function: Option<String>,
    path: Rc<PathBuf>,
    pos: Pos,
}

pub struct Interpreter<'h> {
    host: &'h mut dyn ModuleHost,
    stack: Vec<ActiveFrame>,
    base: Nesting,
    exprs: usize,
}

type Exec<T> = Result<T, LoadError>;

impl<'h> Interpreter<'h> {
    pub fn new(host: &'h mut dyn ModuleHost) -> Self {
        let base = host.nesting();
        Self {
            host,
            stack: Vec::new(),
            base,
            exprs: 0,
        }
    }

    fn nesting(&self) -> Nesting {
        Nesting {
            calls: self.base.calls + self.stack.len(),
            exprs: self.base.exprs + self.exprs,
        }
    }

    /// Run a module body in `env`. A top-level `return` ends the module early.
    pub fn run_module(&mut self, program: &[Stmt], env: &Env, path: Rc<PathBuf>) -> Exec<()> {
        if self.nesting().calls >= MAX_CALL_DEPTH {
            return Err(self.fail("maximum call depth exceeded"));
        }
        self.stack.push(ActiveFrame {
            function: None,
            path,
            pos: Pos::default(),
        });
        let result = self.exec_block(program, env);
        self.stack.pop();
        result.map(|_| ())
    }

    /// Call a script value from outside any module.
    pub fn call(&mut self, callee: &Value, args: Vec<Value>) -> Exec<Value> {
        self.call_value(callee, args)
    }

    fn path(&self) -> Rc<PathBuf> {
        self.stack
            .last()
            .map(|f| Rc::clone(&f.path))
            .unwrap_or_default()
    }

    fn set_pos(&mut self, pos: Pos) {
        if let Some(frame) = self.stack.last_mut() {
            frame.pos = pos;
        }
    }

    /// Build a runtime error carrying the current (source-mapped) stack.
    fn fail(&self, message: impl Into<String>) -> LoadError {
        let frames = self
            .stack
            .iter()
            .rev()
            .map(|f| Frame {
                function: f.function.clone(),
                path: (*f.path).clone(),
                pos: self.host.original_position(&f.path, f.pos),
            })
            .collect();
        LoadError::Runtime(RuntimeError::new(message, frames))
    }

    // -------------------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------------------

    fn exec_block(&mut self, stmts: &[Stmt], env: &Env) -> Exec<Flow> {
        // function declarations are visible throughout their block
        for stmt in stmts {
            if let StmtKind::Fn(decl) = &stmt.kind
                && let Some(name) = &decl.name
            {
                Scope::hoist(env, name, decl, self.path());
            }
        }

        for stmt in stmts {
            if let Flow::Return(value) = self.exec(stmt, env)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, env: &Env) -> Exec<Flow> {
        self.set_pos(stmt.pos);
        match &stmt.kind {
            StmtKind::Let { name, value } => {
                let value = self.eval(value, env)?;
                Scope::define(env, name.clone(), value);
            }
            StmtKind::Fn(_) => {}
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::Nil,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Throw(expr) => {
                let value = self.eval(expr, env)?;
                self.set_pos(stmt.pos);
                return Err(self.fail(value.to_string()));
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                let branch = if self.eval(cond, env)?.is_truthy() {
                    Some(then)
                } else {
                    otherwise.as_ref()
                };
                if let Some(stmts) = branch {
                    return self.exec_block(stmts, &Scope::child(env));
                }
            }
            StmtKind::Assign { target, value } => {
                let value = self.eval(value, env)?;
                self.assign(target, value, env)?;
            }
            StmtKind::Expr(expr) => {
                self.eval(expr, env)?;
            }
            StmtKind::Import { .. } | StmtKind::Export(_) => {
                return Err(self.fail("module declarations must be compiled before execution"));
            }
        }
        Ok(Flow::Normal)
    }

    fn assign(&mut self, target: &Expr, value: Value, env: &Env) -> Exec<()> {
        match &target.kind {
            ExprKind::Ident(name) => {
                if !Scope::assign(env, name, value) {
                    return Err(self.fail(format!("assignment to undeclared variable `{name}`")));
                }
            }
            ExprKind::Member { object, name } => match self.eval(object, env)? {
                Value::Object(o) => o.set(name.clone(), value),
                other => {
                    return Err(self.fail(format!(
                        "cannot set property `{name}` on {}",
                        other.type_name()
                    )));
                }
            },
            ExprKind::Index { object, index } => {
                let object = self.eval(object, env)?;
                let index = self.eval(index, env)?;
                match (&object, &index) {
                    (Value::Object(o), Value::Str(key)) => o.set(key.to_string(), value),
                    (Value::List(l), Value::Num(n)) if *n >= 0.0 && n.fract() == 0.0 => {
                        if !l.set(*n as usize, value) {
                            return Err(self.fail(format!("list index {n} out of bounds")));
                        }
                    }
                    _ => {
                        return Err(self.fail(format!(
                            "cannot index {} with {}",
                            object.type_name(),
                            index.type_name()
                        )));
                    }
                }
            }
            _ => return Err(self.fail("invalid assignment target")),
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------------

    fn eval(&mut self, expr: &Expr, env: &Env) -> Exec<Value> {
        if self.nesting().exprs >= MAX_EXPR_DEPTH {
            self.set_pos(expr.pos);
            return Err(self.fail("expression nesting too deep"));
        }
        self.exprs += 1;
        let result = self.eval_nested(expr, env);
        self.exprs -= 1;
        result
    }

    fn eval_nested(&mut self, expr: &Expr, env: &Env) -> Exec<Value> {
        Ok(match &expr.kind {
            ExprKind::Nil => Value::Nil,
            ExprKind::Bool(b) => Value::Bool(*b),
            ExprKind::Num(n) => Value::Num(*n),
            ExprKind::Str(s) => Value::str(s),
            ExprKind::Ident(name) => match Scope::lookup(env, name) {
                Some(value) => value,
                None => {
                    self.set_pos(expr.pos);
                    return Err(self.fail(format!("`{name}` is not defined")));
                }
            },
            ExprKind::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, env)?);
                }
                Value::List(List::new(values))
            }
            ExprKind::Object(fields) => {
                let object = Object::new();
                for (key, value) in fields {
                    let value = self.eval(value, env)?;
                    object.set(key.clone(), value);
                }
                Value::Object(object)
            }
            ExprKind::Fn(decl) => Value::Function(Rc::new(Closure {
                decl: Rc::clone(decl),
                env: Rc::clone(env),
                path: self.path(),
            })),
            ExprKind::Call { callee, args } => {
                let callee = self.eval(callee, env)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, env)?);
                }
                self.set_pos(expr.pos);
                self.call_value(&callee, values)?
            }
            ExprKind::Member { object, name } => {
                let object = self.eval(object, env)?;
                match object.get_property(name) {
                    Some(value) => value,
                    None => {
                        self.set_pos(expr.pos);
                        return Err(self.fail(format!(
                            "cannot read property `{name}` of {}",
                            object.type_name()
                        )));
                    }
                }
            }
            ExprKind::Index { object, index } => {
                let object = self.eval(object, env)?;
                let index = self.eval(index, env)?;
                self.index(&object, &index, expr.pos)?
            }
            ExprKind::Unary { op, expr: inner } => {
                let value = self.eval(inner, env)?;
                match op {
                    UnaryOp::Not => Value::Bool(!value.is_truthy()),
                    UnaryOp::Neg => match value {
                        Value::Num(n) => Value::Num(-n),
                        other => {
                            self.set_pos(expr.pos);
                            return Err(self.fail(format!("cannot negate {}", other.type_name())));
                        }
                    },
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let left = self.eval(lhs, env)?;
                match op {
                    BinaryOp::And if !left.is_truthy() => left,
                    BinaryOp::Or if left.is_truthy() => left,
                    BinaryOp::And | BinaryOp::Or => self.eval(rhs, env)?,
                    _ => {
                        let right = self.eval(rhs, env)?;
                        self.binary(*op, left, right, expr.pos)?
                    }
                }
            }
        })
    }

    fn index(&mut self, object: &Value, index: &Value, pos: Pos) -> Exec<Value> {
        Ok(match (object, index) {
            (Value::List(l), Value::Num(n)) if *n >= 0.0 && n.fract() == 0.0 => {
                l.get(*n as usize).unwrap_or_default()
            }
            (Value::Str(s), Value::Num(n)) if *n >= 0.0 && n.fract() == 0.0 => s
                .chars()
                .nth(*n as usize)
                .map(|c| Value::str(c.to_string()))
                .unwrap_or_default(),
            (_, Value::Str(key)) if object.get_property(key).is_some() => {
                object.get_property(key).unwrap_or_default()
            }
            _ => {
                self.set_pos(pos);
                return Err(self.fail(format!(
                    "cannot index {} with {}",
                    object.type_name(),
                    index.type_name()
                )));
            }
        })
    }

    fn binary(&mut self, op: BinaryOp, left: Value, right: Value, pos: Pos) -> Exec<Value> {
        use Value::{Bool, Num, Str};
        Ok(match (op, &left, &right) {
            (BinaryOp::Eq, _, _) => Bool(left.strict_eq(&right)),
            (BinaryOp::NotEq, _, _) => Bool(!left.strict_eq(&right)),
            (BinaryOp::Add, Num(a), Num(b)) => Num(a + b),
            (BinaryOp::Add, Str(_), _) | (BinaryOp::Add, _, Str(_)) => {
                Value::str(format!("{left}{right}"))
            }
            (BinaryOp::Sub, Num(a), Num(b)) => Num(a - b),
            (BinaryOp::Mul, Num(a), Num(b)) => Num(a * b),
            (BinaryOp::Div, Num(a), Num(b)) => Num(a / b),
            (BinaryOp::Rem, Num(a), Num(b)) => Num(a % b),
            (BinaryOp::Lt, Num(a), Num(b)) => Bool(a < b),
            (BinaryOp::LtEq, Num(a), Num(b)) => Bool(a <= b),
            (BinaryOp::Gt, Num(a), Num(b)) => Bool(a > b),
            (BinaryOp::GtEq, Num(a), Num(b)) => Bool(a >= b),
            (BinaryOp::Lt, Str(a), Str(b)) => Bool(a < b),
            (BinaryOp::LtEq, Str(a), Str(b)) => Bool(a <= b),
            (BinaryOp::Gt, Str(a), Str(b)) => Bool(a > b),
            (BinaryOp::GtEq, Str(a), Str(b)) => Bool(a >= b),
            _ => {
                self.set_pos(pos);
                return Err(self.fail(format!(
                    "unsupported operands for `{}`: {} and {}",
                    op.symbol(),
                    left.type_name(),
                    right.type_name()
                )));
            }
        })
    }

    fn call_value(&mut self, callee: &Value, args: Vec<Value>) -> Exec<Value> {
        match callee {
            Value::Function(closure) => {
                if self.nesting().calls >= MAX_CALL_DEPTH {
                    return Err(self.fail("maximum call depth exceeded"));
                }
                let env = Scope::child(&closure.env);
                let mut args = args.into_iter();
                for param in &closure.decl.params {
                    Scope::define(&env, param.clone(), args.next().unwrap_or_default());
                }
                self.stack.push(ActiveFrame {
                    function: Some(
                        closure
                            .decl
                            .name
                            .clone()
                            .unwrap_or_else(|| "<anonymous>".to_string()),
                    ),
                    path: Rc::clone(&closure.path),
                    pos: closure.decl.pos,
                });
                let result = self.exec_block(&closure.decl.body, &env);
                self.stack.pop();
                Ok(match result? {
                    Flow::Return(value) => value,
                    Flow::Normal => Value::Nil,
                })
            }
            Value::Native(native) => {
                (native.func)(&args).map_err(|message| self.fail(format!("{}: {message}", native.name)))
            }
            Value::Require(require) => {
                let Some(specifier) = args.first().and_then(Value::as_str) else {
                    return Err(self.fail("require expects a string specifier"));
                };
                if require.resolve_only {
                    let path = self.host.resolve_only(specifier, &require.dir)?;
                    Ok(Value::str(path.to_string_lossy()))
                } else {
                    let outer = self.host.nesting();
                    let mut nesting = self.nesting();
                    nesting.calls += 1;
                    self.host.set_nesting(nesting);
                    let result = self.host.require(specifier, &require.dir);
                    self.host.set_nesting(outer);
                    result
                }
            }
            other => Err(self.fail(format!("{} is not a function", other.type_name()))),
        }
    }
}
