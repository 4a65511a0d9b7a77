//! Host-provided modules: core modules and non-script files.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::LoadError;
use crate::script::{List, Object, Value};

/// Supplies modules that do not go through the compiler.
pub trait HostLoader {
    /// Whether `name` is a core module specifier.
    fn is_core(&self, name: &str) -> bool;

    /// Build the exports of a core module.
    fn load_core(&self, name: &str) -> Option<Value>;

    /// Load a resolved file whose extension is not a script extension.
    fn load_file(&self, path: &Path) -> Result<Value, LoadError>;
}

/// Default host: `strings`, `math` and `path` core modules; JSON data files.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdHost;

const CORE_MODULES: &[&str] = &["strings", "math", "path"];

/// Largest string `strings.repeat` will build, in bytes.
const MAX_REPEAT_LEN: usize = 1 << 24;

impl HostLoader for StdHost {
    fn is_core(&self, name: &str) -> bool {
        CORE_MODULES.contains(&name)
    }

    fn load_core(&self, name: &str) -> Option<Value> {
        let exports: Object = match name {
            "strings" => [
                Value::native("upper", strings_upper),
                Value::native("lower", strings_lower),
                Value::native("trim", strings_trim),
                Value::native("concat", strings_concat),
                Value::native("repeat", strings_repeat),
                Value::native("split", strings_split),
                Value::native("join", strings_join),
                Value::native("includes", strings_includes),
            ]
            .into_iter()
            .map(named)
            .collect(),
            "math" => [
                Value::native("floor", |a| num(a, 0).map(|n| Value::Num(n.floor()))),
                Value::native("ceil", |a| num(a, 0).map(|n| Value::Num(n.ceil()))),
                Value::native("round", |a| num(a, 0).map(|n| Value::Num(n.round()))),
                Value::native("abs", |a| num(a, 0).map(|n| Value::Num(n.abs()))),
                Value::native("sqrt", |a| num(a, 0).map(|n| Value::Num(n.sqrt()))),
                Value::native("pow", |a| Ok(Value::Num(num(a, 0)?.powf(num(a, 1)?)))),
                Value::native("min", math_min),
                Value::native("max", math_max),
            ]
            .into_iter()
            .map(named)
            .chain([("PI".to_string(), Value::Num(std::f64::consts::PI))])
            .collect(),
            "path" => [
                Value::native("join", path_join),
                Value::native("basename", path_basename),
                Value::native("dirname", path_dirname),
                Value::native("extname", path_extname),
            ]
            .into_iter()
            .map(named)
            .collect(),
            _ => return None,
        };
        Some(Value::Object(exports))
    }

    fn load_file(&self, path: &Path) -> Result<Value, LoadError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if ext != "json" {
            let message = format!("no loader for `.{ext}` files");
            return Err(LoadError::read(path, io::Error::new(io::ErrorKind::InvalidData, message)));
        }

        let content = fs::read_to_string(path).map_err(|e| LoadError::read(path, e))?;
        let json: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| LoadError::read(path, io::Error::new(io::ErrorKind::InvalidData, e)))?;
        Ok(Value::from_json(&json))
    }
}

fn named(value: Value) -> (String, Value) {
    let name = match &value {
        Value::Native(f) => f.name.to_string(),
        _ => String::new(),
    };
    (name, value)
}

// ============================================================================
// Argument helpers
// ============================================================================

fn string(args: &[Value], i: usize) -> Result<&str, String> {
    match args.get(i) {
        Some(Value::Str(s)) => Ok(s),
        other => Err(format!(
            "argument {} must be a string, got {}",
            i + 1,
            other.map_or("nil", Value::type_name)
        )),
    }
}

fn num(args: &[Value], i: usize) -> Result<f64, String> {
    match args.get(i) {
        Some(Value::Num(n)) => Ok(*n),
        other => Err(format!(
            "argument {} must be a number, got {}",
            i + 1,
            other.map_or("nil", Value::type_name)
        )),
    }
}

// ============================================================================
// strings
// ============================================================================

fn strings_upper(args: &[Value]) -> Result<Value, String> {
    Ok(Value::str(string(args, 0)?.to_uppercase()))
}

fn strings_lower(args: &[Value]) -> Result<Value, String> {
    Ok(Value::str(string(args, 0)?.to_lowercase()))
}

fn strings_trim(args: &[Value]) -> Result<Value, String> {
    Ok(Value::str(string(args, 0)?.trim()))
}

fn strings_concat(args: &[Value]) -> Result<Value, String> {
    Ok(Value::str(args.iter().map(Value::to_string).collect::<String>()))
}

fn strings_repeat(args: &[Value]) -> Result<Value, String> {
    let text = string(args, 0)?;
    let count = num(args, 1)?;
    if count < 0.0 || count.fract() != 0.0 || count > MAX_REPEAT_LEN as f64 {
        return Err(format!("invalid count {count}"));
    }
    let count = count as usize;
    match text.len().checked_mul(count) {
        Some(len) if len <= MAX_REPEAT_LEN => Ok(Value::str(text.repeat(count))),
        _ => Err(format!(
            "invalid count {count}: result exceeds {MAX_REPEAT_LEN} bytes"
        )),
    }
}

fn strings_split(args: &[Value]) -> Result<Value, String> {
    let parts = string(args, 0)?
        .split(string(args, 1)?)
        .map(Value::str)
        .collect();
    Ok(Value::List(List::new(parts)))
}

fn strings_join(args: &[Value]) -> Result<Value, String> {
    let items = match args.first() {
        Some(Value::List(items)) => items,
        other => {
            return Err(format!(
                "argument 1 must be a list, got {}",
                other.map_or("nil", Value::type_name)
            ));
        }
    };
    let sep = match args.get(1) {
        None | Some(Value::Nil) => ",",
        Some(_) => string(args, 1)?,
    };
    let parts: Vec<String> = items.to_vec().iter().map(Value::to_string).collect();
    Ok(Value::str(parts.join(sep)))
}

fn strings_includes(args: &[Value]) -> Result<Value, String> {
    Ok(Value::Bool(string(args, 0)?.contains(string(args, 1)?)))
}

// ============================================================================
// math
// ============================================================================

fn math_min(args: &[Value]) -> Result<Value, String> {
    let mut min = f64::INFINITY;
    for i in 0..args.len() {
        min = min.min(num(args, i)?);
    }
    Ok(Value::Num(min))
}

fn math_max(args: &[Value]) -> Result<Value, String> {
    let mut max = f64::NEG_INFINITY;
    for i in 0..args.len() {
        max = max.max(num(args, i)?);
    }
    Ok(Value::Num(max))
}

// ============================================================================
// path
// ============================================================================

fn path_join(args: &[Value]) -> Result<Value, String> {
    let mut joined = PathBuf::new();
    for i in 0..args.len() {
        joined.push(string(args, i)?);
    }
    // lexical `.`/`..` cleanup; the file need not exist
    let mut clean = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir if clean.file_name().is_some() => {
                clean.pop();
            }
            other => clean.push(other),
        }
    }
    Ok(Value::str(clean.to_string_lossy()))
}

fn path_basename(args: &[Value]) -> Result<Value, String> {
    let path = Path::new(string(args, 0)?);
    Ok(Value::str(
        path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
    ))
}

fn path_dirname(args: &[Value]) -> Result<Value, String> {
    let path = Path::new(string(args, 0)?);
    Ok(Value::str(
        path.parent().map(|p| p.to_string_lossy()).unwrap_or_default(),
    ))
}

fn path_extname(args: &[Value]) -> Result<Value, String> {
    let path = Path::new(string(args, 0)?);
    Ok(Value::str(
        path.extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default(),
    ))
}
