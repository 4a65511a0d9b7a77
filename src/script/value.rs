//! Runtime values.
//!
//! Objects and lists are shared by reference (`Rc<RefCell<_>>`); two values
//! compare equal only if they are the same allocation. This is what lets a
//! partially initialized `exports` object be observed through a circular
//! `require`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

use super::ast::FnDecl;
use super::interp::Env;

/// Signature of host-provided functions.
pub type NativeFnPtr = fn(&[Value]) -> Result<Value, String>;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Num(f64),
    Str(Rc<str>),
    List(List),
    Object(Object),
    Function(Rc<Closure>),
    Native(Rc<NativeFn>),
    /// The `require` binding injected into a module scope.
    Require(Rc<RequireFn>),
}

/// A script function together with its defining scope.
pub struct Closure {
    pub decl: Rc<FnDecl>,
    pub env: Env,
    /// Module the function was defined in (for stack traces).
    pub path: Rc<PathBuf>,
}

pub struct NativeFn {
    pub name: &'static str,
    pub func: NativeFnPtr,
}

/// `require` closed over the requesting module's directory.
pub struct RequireFn {
    pub dir: PathBuf,
    /// `require.resolve`: resolve to a path without loading.
    pub resolve_only: bool,
}

#[derive(Clone, Default)]
pub struct Object(Rc<RefCell<BTreeMap<String, Value>>>);

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.borrow().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.0.borrow_mut().insert(key.into(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.borrow().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl FromIterator<(String, Value)> for Object {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(Rc::new(RefCell::new(iter.into_iter().collect())))
    }
}

#[derive(Clone, Default)]
pub struct List(Rc<RefCell<Vec<Value>>>);

impl List {
    pub fn new(items: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(items)))
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().get(index).cloned()
    }

    /// Set an element; returns false when out of bounds.
    pub fn set(&self, index: usize, value: Value) -> bool {
        match self.0.borrow_mut().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Self {
        Self::Str(Rc::from(s.as_ref()))
    }

    pub fn native(name: &'static str, func: NativeFnPtr) -> Self {
        Self::Native(Rc::new(NativeFn { name, func }))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "bool",
            Self::Num(_) => "number",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Object(_) => "object",
            Self::Function(_) | Self::Native(_) | Self::Require(_) => "function",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Nil => false,
            Self::Bool(b) => *b,
            Self::Num(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function(_) | Self::Native(_) | Self::Require(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            Self::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Property lookup shared by `a.b` and `a["b"]`.
    ///
    /// Returns `None` when the value has no properties at all (nil, bool,
    /// number); missing keys on objects read as nil.
    pub fn get_property(&self, name: &str) -> Option<Value> {
        match self {
            Self::Object(o) => Some(o.get(name).unwrap_or_default()),
            Self::List(l) if name == "length" => Some(Self::Num(l.len() as f64)),
            Self::Str(s) if name == "length" => Some(Self::Num(s.chars().count() as f64)),
            Self::List(_) | Self::Str(_) => Some(Self::Nil),
            Self::Require(r) if name == "resolve" => Some(Self::Require(Rc::new(RequireFn {
                dir: r.dir.clone(),
                resolve_only: true,
            }))),
            Self::Function(_) | Self::Native(_) | Self::Require(_) => Some(Self::Nil),
            Self::Nil | Self::Bool(_) | Self::Num(_) => None,
        }
    }

    /// Strict equality: by value for primitives, by identity otherwise.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Num(a), Self::Num(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => a.ptr_eq(b),
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Function(a), Self::Function(b)) => {
                Rc::ptr_eq(a, b) || (Rc::ptr_eq(&a.decl, &b.decl) && Rc::ptr_eq(&a.env, &b.env))
            }
            (Self::Native(a), Self::Native(b)) => Rc::ptr_eq(a, b),
            (Self::Require(a), Self::Require(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Convert parsed JSON data into a script value.
    pub fn from_json(json: &serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Self::Nil,
            Json::Bool(b) => Self::Bool(*b),
            Json::Number(n) => Self::Num(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Self::str(s),
            Json::Array(items) => Self::List(List::new(items.iter().map(Self::from_json).collect())),
            Json::Object(map) => Self::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// Numbers print without a trailing `.0` when integral.
fn format_number(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{n}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Num(n) => format_number(*n, f),
            Self::Str(s) => f.write_str(s),
            Self::List(_) | Self::Object(_) => write!(f, "{self:?}"),
            Self::Function(c) => match &c.decl.name {
                Some(name) => write!(f, "[fn {name}]"),
                None => f.write_str("[fn]"),
            },
            Self::Native(n) => write!(f, "[native {}]", n.name),
            Self::Require(_) => f.write_str("[fn require]"),
        }
    }
}

/// Debug output quotes strings and expands containers, one level of nesting
/// per container so cyclic graphs (`exports` objects) terminate.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn inner(value: &Value, depth: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match value {
                Value::Str(s) => write!(f, "{:?}", &**s),
                Value::List(l) => {
                    if depth > 3 {
                        return f.write_str("[...]");
                    }
                    f.write_str("[")?;
                    for (i, item) in l.to_vec().iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        inner(item, depth + 1, f)?;
                    }
                    f.write_str("]")
                }
                Value::Object(o) => {
                    if depth > 3 {
                        return f.write_str("{...}");
                    }
                    f.write_str("{")?;
                    for (i, key) in o.keys().iter().enumerate() {
                        if i > 0 {
                            f.write_str(",")?;
                        }
                        write!(f, " {key}: ")?;
                        inner(&o.get(key).unwrap_or_default(), depth + 1, f)?;
                    }
                    if o.is_empty() {
                        f.write_str("}")
                    } else {
                        f.write_str(" }")
                    }
                }
                other => write!(f, "{other}"),
            }
        }
        inner(self, 0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Num(0.0).is_truthy());
        assert!(!Value::str("").is_truthy());
        assert!(Value::str("x").is_truthy());
        assert!(Value::Object(Object::new()).is_truthy());
    }

    #[test]
    fn test_object_identity_equality() {
        let a = Object::new();
        let b = Object::new();
        assert!(Value::Object(a.clone()).strict_eq(&Value::Object(a.clone())));
        assert!(!Value::Object(a).strict_eq(&Value::Object(b)));
        assert!(Value::str("x").strict_eq(&Value::str("x")));
    }

    #[test]
    fn test_number_display() {
        assert_eq!(Value::Num(3.0).to_string(), "3");
        assert_eq!(Value::Num(1.5).to_string(), "1.5");
        assert_eq!(Value::Num(-2.0).to_string(), "-2");
    }

    #[test]
    fn test_debug_nested() {
        let inner = Object::new();
        inner.set("b", Value::str("x"));
        let outer = Object::new();
        outer.set("a", Value::Object(inner));
        outer.set("n", Value::List(List::new(vec![Value::Num(1.0)])));
        assert_eq!(format!("{:?}", Value::Object(outer)), r#"{ a: { b: "x" }, n: [1] }"#);
    }

    #[test]
    fn test_debug_cycle_terminates() {
        let o = Object::new();
        o.set("self", Value::Object(o.clone()));
        let text = format!("{:?}", Value::Object(o));
        assert!(text.contains("{...}"));
    }

    #[test]
    fn test_from_json() {
        let json: serde_json::Value = serde_json::from_str(r#"{"a":[1,true,null],"b":"s"}"#).unwrap();
        let value = Value::from_json(&json);
        let obj = value.as_object().unwrap();
        assert_eq!(obj.keys(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(obj.get("b").unwrap().as_str(), Some("s"));
    }

    #[test]
    fn test_property_lookup() {
        assert!(Value::Nil.get_property("x").is_none());
        assert_eq!(
            Value::str("héllo").get_property("length").unwrap().as_num(),
            Some(5.0)
        );
    }
}
