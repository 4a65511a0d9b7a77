//! `[resolve]` and `[watch]` sections, plus the `source_map` setting.
//!
//! # Example
//!
//! ```toml
//! source_map = "inline"        # "inline", "separate", "off" or false
//!
//! [resolve]
//! extensions = ["rl", "json"]  # Tried in order for extensionless specifiers
//! package_dir = "packages"     # Bare specifiers resolve into <ancestor>/packages
//!
//! [watch]
//! enabled = true
//! poll_interval_ms = 100
//! quiet_period_ms = 2000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

/// Where compiled modules keep their source maps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMapMode {
    /// Map is registered and appended to the code as a data-URL comment.
    #[default]
    Inline,
    /// Map is registered only.
    Separate,
    /// No map; stack traces show compiled positions.
    Off,
}

impl SourceMapMode {
    pub fn enabled(self) -> bool {
        self != Self::Off
    }
}

impl<'de> Deserialize<'de> for SourceMapMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(rename_all = "lowercase")]
        enum Name {
            Inline,
            Separate,
            Off,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Flag(bool),
            Name(Name),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Flag(true) | Repr::Name(Name::Inline) => Self::Inline,
            Repr::Name(Name::Separate) => Self::Separate,
            Repr::Flag(false) | Repr::Name(Name::Off) => Self::Off,
        })
    }
}

/// Module resolution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveOptions {
    /// Extensions tried, in order, when a specifier names no existing file.
    pub extensions: Vec<String>,

    /// Directory name holding third-party packages. Files below it are
    /// dependencies: never transformed, cached or watched.
    pub package_dir: String,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            extensions: vec!["rl".into(), "json".into()],
            package_dir: "packages".into(),
        }
    }
}

impl ResolveOptions {
    pub fn is_dependency(&self, path: &Path) -> bool {
        path.components()
            .any(|c| c.as_os_str() == self.package_dir.as_str())
    }
}

/// File watching settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    pub enabled: bool,

    /// Polling interval of the watcher backend.
    pub poll_interval_ms: u64,

    /// Minimum time between two reloads; changes inside it are coalesced.
    pub quiet_period_ms: u64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 100,
            quiet_period_ms: 2000,
        }
    }
}

impl WatchOptions {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        source_map: SourceMapMode,
    }

    fn mode(toml: &str) -> SourceMapMode {
        toml::from_str::<Wrapper>(toml).unwrap().source_map
    }

    #[test]
    fn test_source_map_mode_forms() {
        assert_eq!(mode("source_map = \"inline\""), SourceMapMode::Inline);
        assert_eq!(mode("source_map = \"separate\""), SourceMapMode::Separate);
        assert_eq!(mode("source_map = \"off\""), SourceMapMode::Off);
        assert_eq!(mode("source_map = false"), SourceMapMode::Off);
        assert_eq!(mode("source_map = true"), SourceMapMode::Inline);
        assert!(toml::from_str::<Wrapper>("source_map = \"both\"").is_err());
    }

    #[test]
    fn test_is_dependency() {
        let resolve = ResolveOptions::default();
        assert!(resolve.is_dependency(Path::new("/app/packages/left-pad/index.rl")));
        assert!(!resolve.is_dependency(Path::new("/app/src/packages.rl")));
        assert!(!resolve.is_dependency(Path::new("/app/src/main.rl")));
    }

    #[test]
    fn test_watch_durations() {
        let watch = WatchOptions::default();
        assert_eq!(watch.poll_interval(), Duration::from_millis(100));
        assert_eq!(watch.quiet_period(), Duration::from_secs(2));
    }
}
