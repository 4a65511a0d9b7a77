//! Logging utilities with colored output.
//!
//! This module provides:
//! - `log!` macro for formatted terminal output with colored prefixes
//! - `debug!` macro gated behind the global verbose flag
//! - `status_success` / `status_error` for timestamped reload status lines
//!
//! # Example
//!
//! ```ignore
//! log!("watch"; "detected file change: {}", path.display());
//! debug!("cache"; "hit {}", hash);
//! ```

use owo_colors::{OwoColorize, Stream, Style};
use std::{
    io::{Write, stderr, stdout},
    sync::atomic::{AtomicBool, Ordering},
};

/// Global verbose flag (set by --verbose CLI argument)
static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Set verbose mode globally
pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::SeqCst);
}

/// Check if verbose mode is enabled
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

// ============================================================================
// Log Macro
// ============================================================================

/// Log a message with a colored module prefix
///
/// # Usage
/// ```ignore
/// log!("module"; "message with {} formatting", args);
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Log a debug message (only shown when --verbose is enabled)
///
/// # Usage
/// ```ignore
/// debug!("module"; "debug info: {}", value);
/// ```
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Log a message with a colored module prefix.
///
/// `error` lines go to stderr, everything else to stdout.
#[inline]
pub fn log(module: &str, message: &str) {
    let module_lower = module.to_ascii_lowercase();
    let is_error = module_lower == "error";
    let stream = if is_error { Stream::Stderr } else { Stream::Stdout };
    let prefix = colorize_prefix(module, &module_lower, stream);

    if is_error {
        let mut err = stderr().lock();
        writeln!(err, "{prefix} {message}").ok();
        err.flush().ok();
    } else {
        let mut out = stdout().lock();
        writeln!(out, "{prefix} {message}").ok();
        out.flush().ok();
    }
}

/// Apply color to a module prefix based on module type, if `stream`
/// supports it (respects `--color` and `NO_COLOR`).
#[inline]
fn colorize_prefix(module: &str, module_lower: &str, stream: Stream) -> String {
    let style = match module_lower {
        "reload" => Style::new().bright_blue().bold(),
        "watch" => Style::new().bright_green().bold(),
        "error" => Style::new().bright_red().bold(),
        _ => Style::new().bright_yellow().bold(),
    };
    let prefix = format!("[{module}]");
    prefix
        .if_supports_color(stream, |text| text.style(style))
        .to_string()
}

// ============================================================================
// Reload Status
// ============================================================================

/// Get current time formatted as HH:MM:SS (UTC)
fn now() -> String {
    use std::time::SystemTime;
    let secs = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let hours = (secs / 3600) % 24;
    let minutes = (secs / 60) % 60;
    let seconds = secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Timestamped success line (✓ prefix, green).
pub fn status_success(message: &str) {
    let mut out = stdout().lock();
    let timestamp = format!("[{}]", now());
    let timestamp = timestamp.if_supports_color(Stream::Stdout, |t| t.dimmed());
    let mark = "✓".if_supports_color(Stream::Stdout, |t| t.green());
    writeln!(out, "{timestamp} {mark} {message}").ok();
    out.flush().ok();
}

/// Timestamped error block (✗ prefix, red) with optional detail.
pub fn status_error(summary: &str, detail: &str) {
    let mut err = stderr().lock();
    let timestamp = format!("[{}]", now());
    let timestamp = timestamp.if_supports_color(Stream::Stderr, |t| t.dimmed());
    let mark = "✗".if_supports_color(Stream::Stderr, |t| t.red());
    if detail.is_empty() {
        writeln!(err, "{timestamp} {mark} {summary}").ok();
    } else {
        writeln!(err, "{timestamp} {mark} {summary}\n{detail}").ok();
    }
    err.flush().ok();
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_toggle() {
        set_verbose(true);
        assert!(is_verbose());
        set_verbose(false);
        assert!(!is_verbose());
    }

    #[test]
    fn test_prefix_follows_color_override() {
        owo_colors::set_override(false);
        assert_eq!(colorize_prefix("watch", "watch", Stream::Stdout), "[watch]");
        assert_eq!(colorize_prefix("Reload", "reload", Stream::Stdout), "[Reload]");
        assert_eq!(colorize_prefix("error", "error", Stream::Stderr), "[error]");

        owo_colors::set_override(true);
        let colored = colorize_prefix("watch", "watch", Stream::Stdout);
        owo_colors::set_override(false);
        assert!(colored.starts_with('\u{1b}'));
        assert!(colored.contains("[watch]"));
    }

    #[test]
    fn test_now_format() {
        let t = now();
        assert_eq!(t.len(), 8);
        assert_eq!(t.matches(':').count(), 2);
    }
}
