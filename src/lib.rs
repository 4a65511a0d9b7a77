//! relive - a live-reloading module loader.
//!
//! Loads an entry module written in relive script, compiles it and everything
//! it requires through a pluggable [`Compiler`], runs the result in isolated
//! module scopes and re-evaluates the entry whenever a loaded file changes.
//!
//! # Architecture
//!
//! ```text
//! LiveLoader ─► reload::Orchestrator ─► module::ModuleSystem
//!                    ▲                    │      │        │
//!             watch::LoaderEvent     resolve  compile  script
//!                    ▲                 (paths) (cache)  (interpreter)
//!             watch::PollBackend
//! ```

#[macro_use]
pub mod logger;

pub mod compile;
pub mod config;
pub mod error;
pub mod loader;
pub mod module;
pub mod reload;
pub mod resolve;
pub mod script;
pub mod utils;
pub mod watch;

pub use compile::{CompileOutput, Compiler, TransformOptions};
pub use config::{CompileOptions, ConfigError, SourceMapMode};
pub use error::{CompileError, LoadError, RuntimeError, WatchError};
pub use loader::{LiveLoader, LoadRequest};
pub use reload::{ErrorCallback, Exit, ValueCallback};
pub use resolve::{HostLoader, StdHost};
pub use script::{Transpiler, Value};
pub use watch::{LoaderEvent, WatchBackend};
