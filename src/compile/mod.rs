//! Source-to-executable transformation, memoized by content hash.
//!
//! # Lookup order
//!
//! ```text
//! read source ─► dependency? ──yes──► raw source (no transform, no map)
//!                    │no
//!                    ▼
//!              blake3(source) ─► memo ─► store ─► Compiler::compile
//!                                  ▲        ▲            │
//!                                  └────────┴────────────┘ (fill on miss)
//! ```
//!
//! Keys never involve paths: two files with identical bytes share one entry,
//! and a file edited back to earlier content hits the earlier entry.

mod hash;
mod sourcemap;
mod store;

pub use hash::ContentHash;
pub use sourcemap::{INLINE_PREFIX, Mapping, SourceMap, SourceMapRegistry};
pub use store::{CacheStore, DirStore, MemoryStore};

use std::fs;
use std::path::Path;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::{ResolveOptions, SourceMapMode};
use crate::error::{CompileError, LoadError};

/// Pluggable source-to-source transform.
pub trait Compiler {
    fn compile(
        &self,
        source: &str,
        options: &TransformOptions<'_>,
    ) -> Result<CompileOutput, CompileError>;
}

/// Per-call options handed to a [`Compiler`].
#[derive(Debug, Clone, Copy)]
pub struct TransformOptions<'a> {
    pub filename: &'a Path,
    /// Request a position map alongside the code.
    pub source_maps: bool,
}

/// A compile result, and the record persisted by [`CacheStore`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileOutput {
    pub code: String,
    #[serde(default)]
    pub map: Option<SourceMap>,
}

/// Executable code for one module, ready to parse.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSource {
    pub code: String,
}

pub struct CompileCache {
    compiler: Box<dyn Compiler>,
    store: Option<Box<dyn CacheStore>>,
    memo: FxHashMap<ContentHash, Rc<CompileOutput>>,
    source_map: SourceMapMode,
    resolve: ResolveOptions,
    transforms: usize,
}

impl CompileCache {
    pub fn new(compiler: Box<dyn Compiler>, source_map: SourceMapMode, resolve: ResolveOptions) -> Self {
        Self {
            compiler,
            store: None,
            memo: FxHashMap::default(),
            source_map,
            resolve,
            transforms: 0,
        }
    }

    pub fn with_store(mut self, store: Box<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Number of times the compiler actually ran.
    pub fn transforms(&self) -> usize {
        self.transforms
    }

    pub fn is_dependency(&self, path: &Path) -> bool {
        self.resolve.is_dependency(path)
    }

    /// Read `path` and return executable code, registering its source map.
    pub fn load(
        &mut self,
        path: &Path,
        sourcemaps: &mut SourceMapRegistry,
    ) -> Result<CompiledSource, LoadError> {
        let source = fs::read_to_string(path).map_err(|e| LoadError::read(path, e))?;

        if self.is_dependency(path) {
            return Ok(CompiledSource { code: source });
        }

        let hash = ContentHash::of(source.as_bytes());
        let output = self.lookup_or_compile(hash, &source, path)?;

        let mut code = output.code.clone();
        match (&output.map, self.source_map) {
            (Some(map), mode) if mode.enabled() => {
                if mode == SourceMapMode::Inline {
                    match map.inline_comment() {
                        Ok(comment) => {
                            code.push('\n');
                            code.push_str(&comment);
                        }
                        Err(e) => crate::debug!("cache"; "cannot inline map for {}: {}", path.display(), e),
                    }
                }
                sourcemaps.insert(path.to_path_buf(), Rc::new(map.clone()));
            }
            _ => sourcemaps.remove(path),
        }

        Ok(CompiledSource { code })
    }

    fn lookup_or_compile(
        &mut self,
        hash: ContentHash,
        source: &str,
        path: &Path,
    ) -> Result<Rc<CompileOutput>, LoadError> {
        if let Some(hit) = self.memo.get(&hash) {
            crate::debug!("cache"; "memory hit {} for {}", hash, path.display());
            return Ok(Rc::clone(hit));
        }

        if let Some(store) = &self.store {
            match store.get(&hash) {
                Ok(Some(output)) => {
                    crate::debug!("cache"; "store hit {} for {}", hash, path.display());
                    let output = Rc::new(output);
                    self.memo.insert(hash, Rc::clone(&output));
                    return Ok(output);
                }
                Ok(None) => {}
                Err(e) => crate::log!("cache"; "failed to read entry {}: {}", hash, e),
            }
        }

        let options = TransformOptions {
            filename: path,
            source_maps: true,
        };
        let output = self.compiler.compile(source, &options)?;
        self.transforms += 1;
        crate::debug!("cache"; "compiled {} ({})", path.display(), hash);

        if let Some(store) = &self.store
            && let Err(e) = store.put(&hash, &output)
        {
            crate::log!("cache"; "failed to write entry {}: {}", hash, e);
        }

        let output = Rc::new(output);
        self.memo.insert(hash, Rc::clone(&output));
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::path::PathBuf;

    use super::*;
    use crate::script::{Pos, Transpiler};

    /// Wraps the transpiler and counts invocations.
    struct Counting(Rc<Cell<usize>>);

    impl Compiler for Counting {
        fn compile(
            &self,
            source: &str,
            options: &TransformOptions<'_>,
        ) -> Result<CompileOutput, CompileError> {
            self.0.set(self.0.get() + 1);
            assert!(options.source_maps);
            Transpiler.compile(source, options)
        }
    }

    fn cache(mode: SourceMapMode) -> (CompileCache, Rc<Cell<usize>>) {
        let count = Rc::new(Cell::new(0));
        let cache = CompileCache::new(
            Box::new(Counting(Rc::clone(&count))),
            mode,
            ResolveOptions::default(),
        );
        (cache, count)
    }

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_identical_content_compiles_once() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.rl", "export default 'same';");
        let b = write(dir.path(), "b.rl", "export default 'same';");
        let (mut cache, count) = cache(SourceMapMode::Separate);
        let mut maps = SourceMapRegistry::default();

        let first = cache.load(&a, &mut maps).unwrap();
        let second = cache.load(&b, &mut maps).unwrap();
        assert_eq!(count.get(), 1);
        assert_eq!(cache.transforms(), 1);
        assert_eq!(first, second);
        // each path still gets its own map entry
        assert_eq!(maps.len(), 2);
    }

    #[test]
    fn test_persistent_store_survives_new_cache() {
        let dir = tempfile::tempdir().unwrap();
        let src = write(dir.path(), "a.rl", "export let x: number = 1;");
        let cache_dir = dir.path().join(".cache");

        let (first, first_count) = cache(SourceMapMode::Separate);
        let mut first = first.with_store(Box::new(DirStore::new(&cache_dir)));
        let mut maps = SourceMapRegistry::default();
        let compiled = first.load(&src, &mut maps).unwrap();
        assert_eq!(first_count.get(), 1);

        let (second, second_count) = cache(SourceMapMode::Separate);
        let mut second = second.with_store(Box::new(DirStore::new(&cache_dir)));
        let mut maps = SourceMapRegistry::default();
        assert_eq!(second.load(&src, &mut maps).unwrap(), compiled);
        assert_eq!(second_count.get(), 0);
        // a store hit registers the map like a miss would
        assert!(maps.get(&src).is_some());
    }

    #[test]
    fn test_unwritable_store_falls_back_to_compiling() {
        let dir = tempfile::tempdir().unwrap();
        let src = write(dir.path(), "a.rl", "export default 1;");
        // a file where the cache directory should be
        let blocker = write(dir.path(), "blocked", "");

        let (cache, count) = cache(SourceMapMode::Off);
        let mut cache = cache.with_store(Box::new(DirStore::new(&blocker)));
        let mut maps = SourceMapRegistry::default();
        let compiled = cache.load(&src, &mut maps).unwrap();
        assert_eq!(compiled.code, "exports.default = 1;");
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_inline_mode_appends_trailer() {
        let dir = tempfile::tempdir().unwrap();
        let src = write(dir.path(), "a.rl", "export default 1;");
        let (mut cache, _) = cache(SourceMapMode::Inline);
        let mut maps = SourceMapRegistry::default();

        let compiled = cache.load(&src, &mut maps).unwrap();
        let (code, trailer) = compiled.code.split_once('\n').unwrap();
        assert_eq!(code, "exports.default = 1;");
        assert!(trailer.starts_with(INLINE_PREFIX));
        assert!(maps.get(&src).is_some());
    }

    #[test]
    fn test_off_mode_registers_no_map() {
        let dir = tempfile::tempdir().unwrap();
        let src = write(dir.path(), "a.rl", "export default 1;");
        let (mut cache, _) = cache(SourceMapMode::Off);
        let mut maps = SourceMapRegistry::default();

        let compiled = cache.load(&src, &mut maps).unwrap();
        assert_eq!(compiled.code, "exports.default = 1;");
        assert_eq!(maps.original_position(&src, Pos::new(1, 3)), Pos::new(1, 3));
        assert!(maps.is_empty());
    }

    #[test]
    fn test_dependency_is_returned_raw() {
        let dir = tempfile::tempdir().unwrap();
        let dep = write(
            dir.path(),
            "packages/pad/index.rl",
            "exports.pad = fn(s) { return ' ' + s; };",
        );
        let (mut cache, count) = cache(SourceMapMode::Inline);
        let mut maps = SourceMapRegistry::default();

        let compiled = cache.load(&dep, &mut maps).unwrap();
        assert_eq!(compiled.code, "exports.pad = fn(s) { return ' ' + s; };");
        assert_eq!(count.get(), 0);
        assert!(maps.is_empty());
    }

    #[test]
    fn test_compile_error_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let src = write(dir.path(), "bad.rl", "export default ;");
        let (mut cache, count) = cache(SourceMapMode::Inline);
        let mut maps = SourceMapRegistry::default();

        assert!(matches!(cache.load(&src, &mut maps), Err(LoadError::Compile(_))));
        assert!(matches!(cache.load(&src, &mut maps), Err(LoadError::Compile(_))));
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let (mut cache, _) = cache(SourceMapMode::Inline);
        let mut maps = SourceMapRegistry::default();
        let err = cache
            .load(Path::new("/nonexistent/a.rl"), &mut maps)
            .unwrap_err();
        assert!(matches!(err, LoadError::Read { .. }));
    }
}
