//! Loader options and the `relive.toml` file.
//!
//! # Sections
//!
//! | Key / Section       | Purpose                                       |
//! |---------------------|-----------------------------------------------|
//! | `source_map`        | Inline, separate or no source maps            |
//! | `cache_dir`         | Persistent compile cache directory            |
//! | `fallback`          | Module delivered when loading fails           |
//! | `script_extensions` | Extensions compiled as relive script          |
//! | `[resolve]`         | Resolution extensions and package directory   |
//! | `[watch]`           | Watcher toggle, poll interval, quiet period   |

mod error;
mod section;

pub use error::ConfigError;
pub use section::{ResolveOptions, SourceMapMode, WatchOptions};

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Options for one configured loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    pub source_map: SourceMapMode,

    /// Directory for persisted compile results, keyed by content hash.
    pub cache_dir: Option<PathBuf>,

    /// Module loaded in place of the entry point when loading fails.
    pub fallback: Option<PathBuf>,

    /// Extensions run through the compiler; anything else goes to the host loader.
    pub script_extensions: Vec<String>,

    pub resolve: ResolveOptions,

    pub watch: WatchOptions,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            source_map: SourceMapMode::default(),
            cache_dir: None,
            fallback: None,
            script_extensions: vec!["rl".into()],
            resolve: ResolveOptions::default(),
            watch: WatchOptions::default(),
        }
    }
}

impl CompileOptions {
    /// Load options from a TOML file. Relative `cache_dir` and `fallback`
    /// paths are taken relative to the file's directory.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let mut options = Self::parse(&content)?;

        let base = path.parent().unwrap_or(Path::new(""));
        options.cache_dir = options.cache_dir.map(|dir| base.join(dir));
        options.fallback = options.fallback.map(|file| base.join(file));
        Ok(options)
    }

    /// Parse and validate TOML content.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let options: Self = toml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.script_extensions.is_empty() {
            return Err(ConfigError::Validation(
                "`script_extensions` must not be empty".into(),
            ));
        }
        let extensions = self
            .script_extensions
            .iter()
            .chain(&self.resolve.extensions);
        for ext in extensions {
            if ext.is_empty() || ext.starts_with('.') {
                return Err(ConfigError::Validation(format!(
                    "invalid extension `{ext}`: expected a name without a leading dot"
                )));
            }
        }
        let package_dir = &self.resolve.package_dir;
        if package_dir.is_empty() || package_dir.contains(['/', '\\']) {
            return Err(ConfigError::Validation(format!(
                "`resolve.package_dir` must be a single directory name, got `{package_dir}`"
            )));
        }
        if self.watch.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "`watch.poll_interval_ms` must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Whether `path` is compiled as relive script.
    pub fn is_script(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.script_extensions.iter().any(|s| s == ext))
    }
}
