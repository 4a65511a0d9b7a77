//! Error types for the load path.

use std::fmt::{self, Write as _};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::ConfigError;
use crate::script::Pos;

// ============================================================================
// LoadError
// ============================================================================

/// Anything that can go wrong while loading or evaluating a module graph.
///
/// Errors raised by a nested `require` reach the top unchanged, so the
/// variant always describes the original failure.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot resolve `{specifier}` from `{}`", from.display())]
    Resolution { specifier: String, from: PathBuf },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("failed to read `{}`", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl LoadError {
    pub fn resolution(specifier: &str, from: &Path) -> Self {
        Self::Resolution {
            specifier: specifier.to_string(),
            from: from.to_path_buf(),
        }
    }

    pub fn read(path: &Path, source: io::Error) -> Self {
        Self::Read {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Human-readable report handed to `on_error`.
    ///
    /// Compile errors read `<path>: <message> (<line>:<col>)` followed by a
    /// code frame; everything else reads like a stack trace.
    pub fn report(&self) -> String {
        match self {
            Self::Compile(e) => match &e.frame {
                Some(frame) if !frame.is_empty() => format!("{e}\n{frame}"),
                _ => e.to_string(),
            },
            Self::Runtime(e) => e.trace(),
            Self::Read { source, .. } => format!("Error: {self}: {source}"),
            other => format!("Error: {other}"),
        }
    }
}

// ============================================================================
// CompileError
// ============================================================================

/// Failure reported by a [`Compiler`](crate::compile::Compiler).
#[derive(Debug, Clone)]
pub struct CompileError {
    pub path: PathBuf,
    pub message: String,
    pub pos: Option<Pos>,
    /// Source excerpt around `pos`.
    pub frame: Option<String>,
}

impl CompileError {
    pub fn new(path: &Path, message: impl Into<String>, pos: Option<Pos>) -> Self {
        Self {
            path: path.to_path_buf(),
            message: message.into(),
            pos,
            frame: None,
        }
    }

    pub fn with_frame(mut self, source: &str) -> Self {
        self.frame = self.pos.map(|pos| code_frame(source, pos));
        self
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)?;
        if let Some(pos) = self.pos {
            write!(f, " ({pos})")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

/// Render lines around `pos` with a caret under the column.
///
/// ```text
///   1 | let a = 1;
/// > 2 | let b = ;
///     |         ^
/// ```
pub fn code_frame(source: &str, pos: Pos) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let line = pos.line.max(1) as usize;
    let first = line.saturating_sub(2).max(1);
    let last = (line + 1).min(lines.len()).max(line);
    let width = last.to_string().len();

    let mut out = String::new();
    for n in first..=last {
        let text = lines.get(n - 1).copied().unwrap_or("");
        let marker = if n == line { '>' } else { ' ' };
        let _ = writeln!(out, "{marker} {n:>width$} | {text}");
        if n == line {
            let pad = " ".repeat(pos.col.saturating_sub(1) as usize);
            let _ = writeln!(out, "  {:>width$} | {pad}^", "");
        }
    }
    out.truncate(out.trim_end_matches('\n').len());
    out
}

// ============================================================================
// RuntimeError
// ============================================================================

/// One entry of a script stack trace, already mapped to original source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// `None` for module top level.
    pub function: Option<String>,
    pub path: PathBuf,
    pub pos: Pos,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function {
            Some(name) => write!(f, "at {name} ({}:{})", self.path.display(), self.pos),
            None => write!(f, "at {}:{}", self.path.display(), self.pos),
        }
    }
}

/// Error thrown (or raised by the interpreter) while evaluating a module.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RuntimeError {
    pub message: String,
    /// Innermost frame first.
    pub frames: Vec<Frame>,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>, frames: Vec<Frame>) -> Self {
        Self {
            message: message.into(),
            frames,
        }
    }

    pub fn trace(&self) -> String {
        let mut out = format!("Error: {}", self.message);
        for frame in &self.frames {
            let _ = write!(out, "\n    {frame}");
        }
        out
    }
}

// ============================================================================
// WatchError
// ============================================================================

/// Change-notification failures. Never fatal: the orchestrator logs them.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to watch `{}`", .0.display())]
    Subscribe(PathBuf, #[source] notify::Error),

    #[error("watcher error: {0}")]
    Backend(#[from] notify::Error),
}
