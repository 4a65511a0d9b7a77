//! relive - run a script module and reload it on change.

mod cli;

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use clap::{ColorChoice, Parser};
use cli::Cli;
use relive::{CompileOptions, Exit, LiveLoader, LoadRequest, LoaderEvent, SourceMapMode, Value};

/// How often the main loop checks for freshly delivered exports.
const PRINT_INTERVAL: Duration = Duration::from_millis(100);

const DEFAULT_CONFIG: &str = "relive.toml";

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    relive::logger::set_verbose(cli.verbose);

    let options = load_options(&cli)?;
    let mut loader = LiveLoader::new();

    // Ctrl+C ends `run` through the event channel
    let notifier = loader.notifier();
    ctrlc::set_handler(move || {
        let _ = notifier.send(LoaderEvent::Shutdown);
    })
    .map_err(|e| anyhow!("failed to set Ctrl+C handler: {}", e))?;

    let latest: Rc<RefCell<Option<Value>>> = Rc::default();
    let on_value = {
        let latest = Rc::clone(&latest);
        Box::new(move |value: &Value| *latest.borrow_mut() = Some(value.clone()))
    };

    let request = LoadRequest::new(&cli.entry).with_options(options);
    if let Err(e) = loader.configure(request, on_value, None) {
        relive::logger::status_error("initial load failed", &e.report());
        bail!("failed to load `{}`", cli.entry.display());
    }
    print_latest(&mut loader, &latest, cli.call.as_deref());

    if cli.once {
        return Ok(());
    }

    relive::log!("watch"; "watching for changes, press Ctrl+C to stop");
    loop {
        let exit = loader.run_for(PRINT_INTERVAL)?;
        print_latest(&mut loader, &latest, cli.call.as_deref());
        if exit == Exit::Shutdown {
            relive::log!("reload"; "shutting down...");
            return Ok(());
        }
    }
}

/// Options from the config file, overridden by command-line flags.
fn load_options(cli: &Cli) -> Result<CompileOptions> {
    let mut options = match &cli.config {
        Some(path) => CompileOptions::from_path(path)?,
        None if Path::new(DEFAULT_CONFIG).is_file() => {
            CompileOptions::from_path(Path::new(DEFAULT_CONFIG))?
        }
        None => CompileOptions::default(),
    };

    if let Some(dir) = &cli.cache_dir {
        options.cache_dir = Some(dir.clone());
    }
    if let Some(fallback) = &cli.fallback {
        options.fallback = Some(fallback.clone());
    }
    if cli.no_source_map {
        options.source_map = SourceMapMode::Off;
    }
    if cli.once {
        options.watch.enabled = false;
    }
    options.validate()?;
    if !options.is_script(&cli.entry) {
        bail!(
            "`{}` is not a script module (extensions: {})",
            cli.entry.display(),
            options.script_extensions.join(", ")
        );
    }
    Ok(options)
}

/// Print exports delivered since the last call, or the result of calling
/// the `--call` export with them.
fn print_latest(loader: &mut LiveLoader, latest: &RefCell<Option<Value>>, call: Option<&str>) {
    let Some(exports) = latest.borrow_mut().take() else {
        return;
    };

    let Some(name) = call else {
        println!("{exports:?}");
        return;
    };

    match exports.get_property(name) {
        Some(function) if function.is_callable() => match loader.call(&function, Vec::new()) {
            Ok(result) => println!("{result:?}"),
            Err(e) => relive::logger::status_error(&format!("`{name}` failed"), &e.report()),
        },
        _ => relive::log!("error"; "export `{}` is not a function", name),
    }
}
