//! The public entry point: configure once, then reload on every change.
//!
//! ```text
//! configure ─► initial load ─► on_value / on_error
//!                                   ▲
//! run ─► Orchestrator ─► Session ───┘
//!             ▲
//!   LoaderEvent channel ◄── PollBackend thread / notifier()
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, Sender, unbounded};
use rustc_hash::FxHashMap;

use crate::compile::{CacheStore, CompileCache, Compiler, DirStore};
use crate::config::{CompileOptions, ConfigError};
use crate::error::LoadError;
use crate::module::ModuleSystem;
use crate::reload::{ErrorCallback, ErrorHandler, Exit, Orchestrator, Reload, ValueCallback};
use crate::resolve::{HostLoader, Resolver, StdHost};
use crate::script::{Interpreter, ModuleHost, Transpiler, Value};
use crate::utils::path::normalize_path;
use crate::watch::{FileWatcher, LoaderEvent, PollBackend, WatchBackend};

/// What to load and how. Fixed for the lifetime of a configured loader.
pub struct LoadRequest {
    pub entrypoint: PathBuf,
    /// Specifiers answered with a value instead of a file.
    pub overrides: FxHashMap<String, Value>,
    pub options: CompileOptions,
}

impl LoadRequest {
    pub fn new(entrypoint: impl Into<PathBuf>) -> Self {
        Self {
            entrypoint: entrypoint.into(),
            overrides: FxHashMap::default(),
            options: CompileOptions::default(),
        }
    }

    pub fn with_override(mut self, specifier: impl Into<String>, value: Value) -> Self {
        self.overrides.insert(specifier.into(), value);
        self
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }
}

// =============================================================================
// Session
// =============================================================================

/// A configured module graph plus the callbacks that observe it.
struct Session {
    system: ModuleSystem,
    entry: PathBuf,
    handler: ErrorHandler,
}

impl Session {
    /// Evaluate the entry point, substituting the fallback on failure.
    fn load_entry(&mut self) -> Result<Option<Value>, LoadError> {
        let Self {
            system,
            entry,
            handler,
        } = self;

        let result = match system.require_module(entry.as_path()) {
            Ok(value) => {
                crate::logger::status_success(&format!("loaded {}", entry.display()));
                handler.deliver(&value);
                Ok(Some(value))
            }
            Err(err) => handler.handle(err, |fallback| system.require_module(fallback)),
        };
        // the previous value is superseded only once a new one was delivered
        if let Ok(Some(_)) = &result {
            system.release_retired();
        }
        result
    }
}

impl Reload for Session {
    fn invalidate(&mut self, path: &Path) {
        self.system.invalidate(path);
    }

    fn reload(&mut self) {
        crate::log!("reload"; "reloading {}", self.entry.display());
        if let Err(err) = self.load_entry() {
            self.handler.report(&err);
        }
    }
}

struct Active {
    session: Session,
    orchestrator: Orchestrator,
}

// =============================================================================
// LiveLoader
// =============================================================================

/// Loads an entry module and keeps it fresh as its sources change.
///
/// Values are reference counted without synchronization, so a loader and
/// everything it hands out stay on one thread. Only [`notifier`] senders
/// cross threads.
///
/// [`notifier`]: LiveLoader::notifier
pub struct LiveLoader {
    compiler: Option<Box<dyn Compiler>>,
    host: Option<Box<dyn HostLoader>>,
    backend: Option<Box<dyn WatchBackend>>,
    store: Option<Box<dyn CacheStore>>,
    sender: Sender<LoaderEvent>,
    events: Receiver<LoaderEvent>,
    active: Option<Active>,
}

impl Default for LiveLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveLoader {
    pub fn new() -> Self {
        let (sender, events) = unbounded();
        Self {
            compiler: None,
            host: None,
            backend: None,
            store: None,
            sender,
            events,
            active: None,
        }
    }

    /// Replace the default [`Transpiler`].
    pub fn with_compiler(mut self, compiler: Box<dyn Compiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    /// Replace the default [`StdHost`].
    pub fn with_host(mut self, host: Box<dyn HostLoader>) -> Self {
        self.host = Some(host);
        self
    }

    /// Replace the notify poll watcher. Ignored when watching is disabled.
    pub fn with_watch_backend(mut self, backend: Box<dyn WatchBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Persistent compile store used when no `cache_dir` is configured.
    pub fn with_store(mut self, store: Box<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set everything up and perform the initial load.
    ///
    /// Returns the delivered exports: the entry's, the fallback's, or `None`
    /// when the failure went to `on_error` with no fallback configured.
    pub fn configure(
        &mut self,
        request: LoadRequest,
        on_value: ValueCallback,
        on_error: Option<ErrorCallback>,
    ) -> Result<Option<Value>, LoadError> {
        if self.active.is_some() {
            return Err(ConfigError::AlreadyConfigured.into());
        }

        let LoadRequest {
            entrypoint,
            overrides,
            options,
        } = request;
        options.validate()?;

        let mut cache = CompileCache::new(
            self.compiler.take().unwrap_or_else(|| Box::new(Transpiler)),
            options.source_map,
            options.resolve.clone(),
        );
        if let Some(dir) = &options.cache_dir {
            fs::create_dir_all(dir).map_err(|e| ConfigError::Io(dir.clone(), e))?;
            cache = cache.with_store(Box::new(DirStore::new(dir)));
        } else if let Some(store) = self.store.take() {
            cache = cache.with_store(store);
        }

        let watcher = self.watcher(&options);
        let host = self.host.take().unwrap_or_else(|| Box::new(StdHost));
        let system = ModuleSystem::new(
            Resolver::new(overrides, options.resolve.clone()),
            cache,
            watcher,
            host,
            options.script_extensions.clone(),
        );

        let entry = normalize_path(&entrypoint);
        let fallback = options.fallback.as_deref().map(normalize_path);
        crate::debug!("reload"; "configured {} (fallback: {:?})", entry.display(), fallback);

        let active = self.active.insert(Active {
            session: Session {
                system,
                entry,
                handler: ErrorHandler::new(fallback, on_value, on_error),
            },
            orchestrator: Orchestrator::new(options.watch.quiet_period()),
        });
        active.session.load_entry()
    }

    fn watcher(&mut self, options: &CompileOptions) -> FileWatcher {
        if !options.watch.enabled {
            return FileWatcher::disabled();
        }
        if let Some(backend) = self.backend.take() {
            return FileWatcher::new(backend);
        }
        match PollBackend::new(self.sender.clone(), options.watch.poll_interval()) {
            Ok(backend) => FileWatcher::new(Box::new(backend)),
            Err(e) => {
                crate::log!("watch"; "{}, continuing without file watching", e);
                FileWatcher::disabled()
            }
        }
    }

    fn active(&mut self) -> Result<&mut Active, LoadError> {
        self.active
            .as_mut()
            .ok_or_else(|| ConfigError::NotConfigured.into())
    }

    /// Reload on changes until `LoaderEvent::Shutdown` arrives.
    pub fn run(&mut self) -> Result<(), LoadError> {
        self.run_until(None).map(|_| ())
    }

    /// Like [`run`](Self::run), returning after `duration` at the latest.
    pub fn run_for(&mut self, duration: Duration) -> Result<Exit, LoadError> {
        self.run_until(Some(Instant::now() + duration))
    }

    fn run_until(&mut self, deadline: Option<Instant>) -> Result<Exit, LoadError> {
        let events = self.events.clone();
        let Active {
            session,
            orchestrator,
        } = self.active()?;
        Ok(orchestrator.run(&events, session, deadline))
    }

    /// Call an exported function with this loader as the module host.
    pub fn call(&mut self, function: &Value, args: Vec<Value>) -> Result<Value, LoadError> {
        let active = self.active()?;
        Interpreter::new(&mut active.session.system).call(function, args)
    }

    /// A sender for injecting events, e.g. `Shutdown` from a signal handler.
    pub fn notifier(&self) -> Sender<LoaderEvent> {
        self.sender.clone()
    }

    /// Resolve `specifier` as a module requested from `from_dir` would be.
    pub fn resolve_only(&self, specifier: &str, from_dir: &Path) -> Result<PathBuf, LoadError> {
        let active = self
            .active
            .as_ref()
            .ok_or(LoadError::Config(ConfigError::NotConfigured))?;
        active.session.system.resolve_only(specifier, from_dir)
    }

    pub fn system(&self) -> Option<&ModuleSystem> {
        self.active.as_ref().map(|a| &a.session.system)
    }

    /// Reloads performed by `run`/`run_for` so far.
    pub fn reloads(&self) -> usize {
        self.active
            .as_ref()
            .map_or(0, |a| a.orchestrator.reloads())
    }
}
