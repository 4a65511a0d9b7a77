//! Module specifier resolution.
//!
//! # Order
//!
//! 1. Override table: the value is returned as the module, no file involved
//! 2. Core modules of the [`HostLoader`]
//! 3. Files: relative specifiers against the requesting directory, bare
//!    specifiers against `<ancestor>/<package_dir>/` for every ancestor
//!
//! A file candidate is tried as-is, then with each configured extension,
//! then as a directory (`package.json` `main`, then `index.<ext>`).

mod host;

pub use host::{HostLoader, StdHost};

use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use crate::config::ResolveOptions;
use crate::error::LoadError;
use crate::script::Value;
use crate::utils::path::{normalize_path, with_added_extension};

/// What a specifier refers to.
#[derive(Debug, Clone)]
pub enum Resolution {
    Override(Value),
    Core(String),
    Path(PathBuf),
}

pub struct Resolver {
    overrides: FxHashMap<String, Value>,
    options: ResolveOptions,
}

impl Resolver {
    pub fn new(overrides: FxHashMap<String, Value>, options: ResolveOptions) -> Self {
        Self { overrides, options }
    }

    pub fn resolve(
        &self,
        specifier: &str,
        from_dir: &Path,
        host: &dyn HostLoader,
    ) -> Result<Resolution, LoadError> {
        if let Some(value) = self.overrides.get(specifier) {
            return Ok(Resolution::Override(value.clone()));
        }
        if host.is_core(specifier) {
            return Ok(Resolution::Core(specifier.to_string()));
        }
        self.resolve_path(specifier, from_dir).map(Resolution::Path)
    }

    /// Resolve without loading and without consulting overrides. Core
    /// specifiers come back unchanged.
    pub fn resolve_only(
        &self,
        specifier: &str,
        from_dir: &Path,
        host: &dyn HostLoader,
    ) -> Result<PathBuf, LoadError> {
        if host.is_core(specifier) {
            return Ok(PathBuf::from(specifier));
        }
        self.resolve_path(specifier, from_dir)
    }

    fn resolve_path(&self, specifier: &str, from_dir: &Path) -> Result<PathBuf, LoadError> {
        let found = if is_relative(specifier) {
            self.file_or_dir(&from_dir.join(specifier))
        } else {
            from_dir.ancestors().find_map(|ancestor| {
                let base = ancestor.join(&self.options.package_dir).join(specifier);
                self.file_or_dir(&base)
            })
        };

        match found {
            Some(path) => Ok(normalize_path(&path)),
            None => {
                crate::debug!("resolve"; "`{}` not found from {}", specifier, from_dir.display());
                Err(LoadError::resolution(specifier, from_dir))
            }
        }
    }

    fn file_or_dir(&self, base: &Path) -> Option<PathBuf> {
        self.file(base).or_else(|| self.dir(base))
    }

    fn file(&self, base: &Path) -> Option<PathBuf> {
        if base.is_file() {
            return Some(base.to_path_buf());
        }
        self.options
            .extensions
            .iter()
            .map(|ext| with_added_extension(base, ext))
            .find(|candidate| candidate.is_file())
    }

    fn dir(&self, dir: &Path) -> Option<PathBuf> {
        if !dir.is_dir() {
            return None;
        }
        package_main(dir)
            .and_then(|main| self.file(&dir.join(main)))
            .or_else(|| self.file(&dir.join("index")))
    }
}

fn is_relative(specifier: &str) -> bool {
    matches!(specifier, "." | "..")
        || specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier.starts_with('/')
}

/// `main` field of `<dir>/package.json`, if any.
fn package_main(dir: &Path) -> Option<String> {
    let content = fs::read_to_string(dir.join("package.json")).ok()?;
    let json: serde_json::Value = serde_json::from_str(&content).ok()?;
    json.get("main")?.as_str().map(str::to_string)
}
