//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{ColorChoice, Parser};

/// Load a relive script module and reload it whenever its sources change
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Entry module to load
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub entry: PathBuf,

    /// Config file path (default: relive.toml, if present)
    #[arg(short = 'C', long, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Persist compile results in this directory
    #[arg(long, value_hint = clap::ValueHint::DirPath)]
    pub cache_dir: Option<PathBuf>,

    /// Module delivered while the entry fails to load
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub fallback: Option<PathBuf>,

    /// Disable source maps (runtime errors report compiled positions)
    #[arg(long)]
    pub no_source_map: bool,

    /// Call this exported function after every load and print its result
    #[arg(long, value_name = "NAME")]
    pub call: Option<String>,

    /// Load once and exit without watching
    #[arg(long)]
    pub once: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Control colored output (auto, always, never)
    #[arg(long, default_value = "auto")]
    pub color: ColorChoice,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full() {
        let cli = Cli::try_parse_from([
            "relive",
            "src/main.rl",
            "-C",
            "conf/relive.toml",
            "--fallback",
            "src/fallback.rl",
            "--no-source-map",
            "--call",
            "render",
            "--once",
            "-v",
        ])
        .unwrap();

        assert_eq!(cli.entry, PathBuf::from("src/main.rl"));
        assert_eq!(cli.config, Some(PathBuf::from("conf/relive.toml")));
        assert_eq!(cli.fallback, Some(PathBuf::from("src/fallback.rl")));
        assert!(cli.no_source_map);
        assert_eq!(cli.call.as_deref(), Some("render"));
        assert!(cli.once);
        assert!(cli.verbose);
        assert!(cli.cache_dir.is_none());
    }

    #[test]
    fn test_entry_is_required() {
        assert!(Cli::try_parse_from(["relive", "--once"]).is_err());
    }
}
