//! Module registry and the sandboxed executor.
//!
//! # Two-level cache
//!
//! | Level    | Holds                    | Cleared by                         |
//! |----------|--------------------------|------------------------------------|
//! | compiled | parsed core program      | a change to that file              |
//! | exports  | live `module.exports`    | a change to any file (whole level) |
//!
//! A module's exports object is registered *before* its body runs, so a
//! circular `require` observes the partially populated object instead of
//! recursing.
//!
//! Clearing the exports level retires each module's scope. Exported
//! functions and their scope point at each other, so retired scopes are
//! emptied once the values produced from them are no longer delivered.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::compile::{CompileCache, SourceMapRegistry};
use crate::error::{CompileError, LoadError};
use crate::resolve::{HostLoader, Resolution, Resolver};
use crate::script::{
    Dialect, Env, Interpreter, ModuleHost, Nesting, Object, Pos, RequireFn, Scope, Stmt, Value,
    parse,
};
use crate::utils::path::normalize_path;
use crate::watch::FileWatcher;

// =============================================================================
// Registry
// =============================================================================

/// A module body parsed from executable code, ready to run any number of times.
#[derive(Debug, Clone)]
pub struct ModuleFunction {
    program: Rc<[Stmt]>,
}

impl ModuleFunction {
    pub fn parse(code: &str, path: &Path) -> Result<Self, LoadError> {
        let program = parse(code, Dialect::Core)
            .map_err(|e| CompileError::new(path, e.message, Some(e.pos)).with_frame(code))?;
        Ok(Self {
            program: program.into(),
        })
    }
}

#[derive(Debug)]
pub struct ModuleRecord {
    pub path: PathBuf,
    pub compiled: Option<ModuleFunction>,
    pub exports: Option<Value>,
    pub watched: bool,
    scope: Option<Env>,
}

/// One [`ModuleRecord`] per absolute path.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    records: FxHashMap<PathBuf, ModuleRecord>,
    /// Scopes of modules whose exports were cleared.
    retired: Vec<Env>,
}

impl ModuleRegistry {
    fn record(&mut self, path: &Path) -> &mut ModuleRecord {
        self.records
            .entry(path.to_path_buf())
            .or_insert_with(|| ModuleRecord {
                path: path.to_path_buf(),
                compiled: None,
                exports: None,
                watched: false,
                scope: None,
            })
    }

    pub fn get(&self, path: &Path) -> Option<&ModuleRecord> {
        self.records.get(path)
    }

    pub fn exports(&self, path: &Path) -> Option<Value> {
        self.records.get(path)?.exports.clone()
    }

    pub fn compiled(&self, path: &Path) -> Option<ModuleFunction> {
        self.records.get(path)?.compiled.clone()
    }

    fn set_exports(&mut self, path: &Path, exports: Value) {
        self.record(path).exports = Some(exports);
    }

    fn remove_exports(&mut self, path: &Path) {
        if let Some(record) = self.records.get_mut(path) {
            record.exports = None;
            self.retired.extend(record.scope.take());
        }
    }

    fn set_scope(&mut self, path: &Path, scope: Env) {
        let previous = self.record(path).scope.replace(scope);
        self.retired.extend(previous);
    }

    fn set_compiled(&mut self, path: &Path, function: ModuleFunction) {
        self.record(path).compiled = Some(function);
    }

    fn mark_watched(&mut self, path: &Path) {
        self.record(path).watched = true;
    }

    /// Drop `path`'s compiled function and every module's live exports.
    pub fn invalidate(&mut self, path: &Path) {
        if let Some(record) = self.records.get_mut(path) {
            record.compiled = None;
        }
        for record in self.records.values_mut() {
            record.exports = None;
            self.retired.extend(record.scope.take());
        }
    }

    /// Empty every retired scope, breaking the cycles between them and the
    /// functions they export.
    pub fn release_retired(&mut self) -> usize {
        let retired = std::mem::take(&mut self.retired);
        for scope in &retired {
            Scope::clear(scope);
        }
        if !retired.is_empty() {
            crate::debug!("module"; "released {} retired module scopes", retired.len());
        }
        retired.len()
    }
}

impl Drop for ModuleRegistry {
    fn drop(&mut self) {
        for record in self.records.values_mut() {
            self.retired.extend(record.scope.take());
        }
        self.release_retired();
    }
}

// =============================================================================
// Module system
// =============================================================================

/// Everything needed to load modules: resolution, compilation, caching and
/// watching. Acts as the interpreter's [`ModuleHost`].
pub struct ModuleSystem {
    resolver: Resolver,
    cache: CompileCache,
    sourcemaps: SourceMapRegistry,
    registry: ModuleRegistry,
    watcher: FileWatcher,
    host: Box<dyn HostLoader>,
    /// Core module exports; not affected by invalidation.
    core: FxHashMap<String, Value>,
    script_extensions: Vec<String>,
    /// Nesting of the interpreter whose `require` is being served.
    nesting: Nesting,
}

impl ModuleSystem {
    pub fn new(
        resolver: Resolver,
        cache: CompileCache,
        watcher: FileWatcher,
        host: Box<dyn HostLoader>,
        script_extensions: Vec<String>,
    ) -> Self {
        Self {
            resolver,
            cache,
            sourcemaps: SourceMapRegistry::default(),
            registry: ModuleRegistry::default(),
            watcher,
            host,
            core: FxHashMap::default(),
            script_extensions,
            nesting: Nesting::default(),
        }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn sourcemaps(&self) -> &SourceMapRegistry {
        &self.sourcemaps
    }

    pub fn watcher(&self) -> &FileWatcher {
        &self.watcher
    }

    pub fn cache(&self) -> &CompileCache {
        &self.cache
    }

    pub fn invalidate(&mut self, path: &Path) {
        self.registry.invalidate(path);
    }

    /// Call once values built before the last invalidation are superseded.
    pub fn release_retired(&mut self) -> usize {
        self.registry.release_retired()
    }

    fn is_script(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.script_extensions.iter().any(|s| s == ext))
    }

    /// Load the module at `path`, reusing live exports and compiled code.
    pub fn require_module(&mut self, path: &Path) -> Result<Value, LoadError> {
        let path = normalize_path(path);
        if !self.is_script(&path) {
            return self.host.load_file(&path);
        }

        if !self.cache.is_dependency(&path) && self.watcher.watch(&path) {
            self.registry.mark_watched(&path);
        }

        if let Some(exports) = self.registry.exports(&path) {
            return Ok(exports);
        }

        let function = match self.registry.compiled(&path) {
            Some(function) => function,
            None => {
                let compiled = self.cache.load(&path, &mut self.sourcemaps)?;
                let function = ModuleFunction::parse(&compiled.code, &path)?;
                self.registry.set_compiled(&path, function.clone());
                function
            }
        };

        let exports = Object::new();
        self.registry
            .set_exports(&path, Value::Object(exports.clone()));

        match self.invoke(&function, &path, exports) {
            Ok(value) => {
                self.registry.set_exports(&path, value.clone());
                Ok(value)
            }
            Err(e) => {
                self.registry.remove_exports(&path);
                Err(e)
            }
        }
    }

    /// Run a module body in a fresh scope holding only the module-local
    /// bindings; returns the final `module.exports`.
    fn invoke(
        &mut self,
        function: &ModuleFunction,
        path: &Path,
        exports: Object,
    ) -> Result<Value, LoadError> {
        let dir = path.parent().unwrap_or(Path::new("/")).to_path_buf();
        let filename = Value::str(path.to_string_lossy());

        let module = Object::new();
        module.set("exports", Value::Object(exports.clone()));
        module.set("filename", filename.clone());

        let env = Scope::root();
        Scope::define(&env, "module", Value::Object(module.clone()));
        Scope::define(&env, "exports", Value::Object(exports));
        Scope::define(&env, "__filename", filename);
        Scope::define(&env, "__dirname", Value::str(dir.to_string_lossy()));
        Scope::define(&env, "__importDefault", Value::native("__importDefault", import_default));
        Scope::define(
            &env,
            "require",
            Value::Require(Rc::new(RequireFn {
                dir,
                resolve_only: false,
            })),
        );

        self.registry.set_scope(path, Rc::clone(&env));
        crate::debug!("module"; "evaluating {}", path.display());
        Interpreter::new(self).run_module(&function.program, &env, Rc::new(path.to_path_buf()))?;
        Ok(module.get("exports").unwrap_or_default())
    }

    fn core_module(&mut self, name: &str) -> Result<Value, LoadError> {
        if let Some(value) = self.core.get(name) {
            return Ok(value.clone());
        }
        let value = self
            .host
            .load_core(name)
            .ok_or_else(|| LoadError::resolution(name, Path::new("")))?;
        self.core.insert(name.to_string(), value.clone());
        Ok(value)
    }
}

/// Default-import interop: `exports.default` when present, else the whole
/// exports value.
fn import_default(args: &[Value]) -> Result<Value, String> {
    let value = args.first().cloned().unwrap_or_default();
    Ok(match &value {
        Value::Object(o) if o.contains("default") => o.get("default").unwrap_or_default(),
        _ => value,
    })
}

impl ModuleHost for ModuleSystem {
    fn require(&mut self, specifier: &str, from_dir: &Path) -> Result<Value, LoadError> {
        match self.resolver.resolve(specifier, from_dir, self.host.as_ref())? {
            Resolution::Override(value) => Ok(value),
            Resolution::Core(name) => self.core_module(&name),
            Resolution::Path(path) => self.require_module(&path),
        }
    }

    fn resolve_only(&self, specifier: &str, from_dir: &Path) -> Result<PathBuf, LoadError> {
        self.resolver
            .resolve_only(specifier, from_dir, self.host.as_ref())
    }

    fn original_position(&self, path: &Path, pos: Pos) -> Pos {
        self.sourcemaps.original_position(path, pos)
    }

    fn nesting(&self) -> Nesting {
        self.nesting
    }

    fn set_nesting(&mut self, nesting: Nesting) {
        self.nesting = nesting;
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::config::{ResolveOptions, SourceMapMode};
    use crate::resolve::StdHost;
    use crate::script::Transpiler;

    fn system(overrides: FxHashMap<String, Value>) -> ModuleSystem {
        ModuleSystem::new(
            Resolver::new(overrides, ResolveOptions::default()),
            CompileCache::new(
                Box::new(Transpiler),
                SourceMapMode::Inline,
                ResolveOptions::default(),
            ),
            FileWatcher::disabled(),
            Box::new(StdHost),
            vec!["rl".into()],
        )
    }

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        normalize_path(&path)
    }

    fn default_export(value: &Value) -> Value {
        value.get_property("default").unwrap_or_default()
    }

    #[test]
    fn test_imports_and_default_export() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.rl", "export default 'v';");
        let entry = write(
            dir.path(),
            "entry.rl",
            "import a from './a';\nexport default a + 1;",
        );

        let mut system = system(FxHashMap::default());
        let exports = system.require_module(&entry).unwrap();
        assert_eq!(default_export(&exports).as_str(), Some("v1"));
    }

    #[test]
    fn test_live_exports_are_reused() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(dir.path(), "entry.rl", "export let o = {};");

        let mut system = system(FxHashMap::default());
        let first = system.require_module(&entry).unwrap();
        let second = system.require_module(&entry).unwrap();
        assert!(first.strict_eq(&second));
    }

    #[test]
    fn test_invalidate_keeps_unchanged_compiled() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.rl", "export default 'a';");
        let entry = write(dir.path(), "entry.rl", "import a from './a';\nexport default a;");

        let mut system = system(FxHashMap::default());
        system.require_module(&entry).unwrap();
        system.invalidate(&entry);

        assert!(system.registry().compiled(&entry).is_none());
        assert!(system.registry().compiled(&a).is_some());
        assert!(system.registry().exports(&a).is_none());
        assert!(system.registry().exports(&entry).is_none());
    }

    #[test]
    fn test_circular_imports_see_partial_exports() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "a.rl",
            "export let early = 'a-early';\nimport * as b from './b';\nexport let seen = b.fromA;",
        );
        write(
            dir.path(),
            "b.rl",
            "import * as a from './a';\nexport let fromA = a.early;\nexport let late = a.seen;",
        );
        let entry = write(dir.path(), "entry.rl", "import * as a from './a';\nexport default a;");

        let mut system = system(FxHashMap::default());
        let exports = system.require_module(&entry).unwrap();
        let a = default_export(&exports);
        assert_eq!(a.get_property("seen").unwrap().as_str(), Some("a-early"));

        let b_path = normalize_path(&dir.path().join("b.rl"));
        let b = system.registry().exports(&b_path).unwrap();
        // `seen` was not yet assigned when b ran
        assert!(matches!(b.get_property("late"), Some(Value::Nil)));
    }

    #[test]
    fn test_module_scope_bindings() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(
            dir.path(),
            "entry.rl",
            "export let file = __filename;\nexport let dir = __dirname;\nexport let here = require.resolve('./entry');",
        );

        let mut system = system(FxHashMap::default());
        let exports = system.require_module(&entry).unwrap();
        let entry_str = entry.to_string_lossy().to_string();
        assert_eq!(exports.get_property("file").unwrap().as_str(), Some(entry_str.as_str()));
        assert_eq!(exports.get_property("here").unwrap().as_str(), Some(entry_str.as_str()));
        let dir_str = entry.parent().unwrap().to_string_lossy().to_string();
        assert_eq!(exports.get_property("dir").unwrap().as_str(), Some(dir_str.as_str()));
    }

    #[test]
    fn test_module_exports_reassignment() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "fn.rl", "module.exports = fn(x) { return x * 2; };");
        let entry = write(
            dir.path(),
            "entry.rl",
            "let double = require('./fn');\nexport default double(21);",
        );

        let mut system = system(FxHashMap::default());
        let exports = system.require_module(&entry).unwrap();
        assert_eq!(default_export(&exports).as_num(), Some(42.0));
    }

    #[test]
    fn test_overrides_core_and_json() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "data.json", r#"{"greeting": "hi"}"#);
        let entry = write(
            dir.path(),
            "entry.rl",
            "import strings from 'strings';\nimport config from 'config';\nimport data from './data.json';\nexport default strings.upper(data.greeting) + config.suffix;",
        );

        let config = Object::new();
        config.set("suffix", Value::str("!"));
        let mut overrides = FxHashMap::default();
        overrides.insert("config".to_string(), Value::Object(config));

        let mut system = system(overrides);
        let exports = system.require_module(&entry).unwrap();
        assert_eq!(default_export(&exports).as_str(), Some("HI!"));
    }

    #[test]
    fn test_dependencies_run_raw_and_are_not_watched() {
        let dir = tempfile::tempdir().unwrap();
        let dep = write(
            dir.path(),
            "packages/pad/index.rl",
            "exports.pad = fn(s) { return '[' + s + ']'; };",
        );
        let entry = write(
            dir.path(),
            "src/entry.rl",
            "import { pad } from 'pad';\nexport default pad('x');",
        );

        let mut system = system(FxHashMap::default());
        let exports = system.require_module(&entry).unwrap();
        assert_eq!(default_export(&exports).as_str(), Some("[x]"));
        assert!(system.watcher().is_watched(&entry));
        assert!(!system.watcher().is_watched(&dep));
        assert!(system.registry().get(&entry).unwrap().watched);
        assert_eq!(system.cache().transforms(), 1);
    }

    #[test]
    fn test_failed_module_is_not_left_half_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(dir.path(), "entry.rl", "export let a = 1;\nthrow 'broken';");

        let mut system = system(FxHashMap::default());
        assert!(matches!(system.require_module(&entry), Err(LoadError::Runtime(_))));
        assert!(system.registry().exports(&entry).is_none());
        assert!(system.registry().compiled(&entry).is_some());
    }

    #[test]
    fn test_runtime_error_positions_are_mapped() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(
            dir.path(),
            "entry.rl",
            "import strings from 'strings';\nexport fn shout(s: string) {\n  return strings.upper(s.missing.deeper);\n}\nexport default shout('x');",
        );

        let mut system = system(FxHashMap::default());
        let LoadError::Runtime(err) = system.require_module(&entry).unwrap_err() else {
            panic!("expected runtime error");
        };
        assert_eq!(err.frames[0].function.as_deref(), Some("shout"));
        assert_eq!(err.frames[0].path, entry);
        // `.deeper` on nil: column of the second `.` in the original line
        assert_eq!(err.frames[0].pos, Pos::new(3, 33));
        assert_eq!(err.frames[1].pos.line, 5);
    }

    #[test]
    fn test_require_chain_depth_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let write_chain = |len: usize| {
            for i in 0..len {
                write(
                    dir.path(),
                    &format!("m{i}.rl"),
                    &format!("import next from './m{}';\nexport default next + 1;", i + 1),
                );
            }
            write(dir.path(), &format!("m{len}.rl"), "export default 0;");
            normalize_path(&dir.path().join("m0.rl"))
        };

        let mut shallow = system(FxHashMap::default());
        let exports = shallow.require_module(&write_chain(10)).unwrap();
        assert_eq!(default_export(&exports).as_num(), Some(10.0));

        let mut deep = system(FxHashMap::default());
        let LoadError::Runtime(err) = deep.require_module(&write_chain(100)).unwrap_err() else {
            panic!("expected runtime error");
        };
        assert_eq!(err.message, "maximum call depth exceeded");
    }

    #[test]
    fn test_reload_releases_previous_module_scope() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(
            dir.path(),
            "entry.rl",
            "fn helper(x) { return x + 1; }\nexport fn add(x) { return helper(x); }",
        );

        let mut system = system(FxHashMap::default());
        let exports = system.require_module(&entry).unwrap();
        let Some(Value::Function(add)) = exports.get_property("add") else {
            panic!("expected exported function");
        };
        let scope = Rc::downgrade(&add.env);
        drop(add);

        system.invalidate(&entry);
        let fresh = system.require_module(&entry).unwrap();
        // superseded exports stay usable until released
        assert!(scope.upgrade().is_some());
        assert!(!fresh.strict_eq(&exports));

        drop(exports);
        assert_eq!(system.release_retired(), 1);
        assert!(scope.upgrade().is_none());
    }

    #[test]
    fn test_unresolvable_import() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(dir.path(), "entry.rl", "import x from './nope';");

        let mut system = system(FxHashMap::default());
        let err = system.require_module(&entry).unwrap_err();
        assert!(matches!(err, LoadError::Resolution { ref specifier, .. } if specifier == "./nope"));
    }
}
