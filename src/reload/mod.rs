//! Serialized, coalescing reloads of the entry module.
//!
//! # State machine
//!
//! ```text
//!            change                    quiet period over, pending
//!   Idle ──────────────► Reloading ◄─────────────────────────┐
//!    ▲                    │  reload entry, arm quiet timer   │
//!    │                    ▼                                  │
//!    └──────────────── quiet period ── change ─► pending ────┘
//!     over, nothing pending
//! ```
//!
//! Every change invalidates immediately; only re-evaluation is deferred.
//! The loop runs on the loader's thread, so reloads never overlap.

mod fallback;
mod state;

pub use fallback::{ErrorCallback, ErrorHandler, ValueCallback};
pub use state::ReloadState;

use std::path::Path;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, after, never, select};

use crate::watch::LoaderEvent;

/// What the orchestrator drives.
pub trait Reload {
    /// Drop cached state for a changed file.
    fn invalidate(&mut self, path: &Path);

    /// Re-evaluate the entry point and deliver the outcome.
    fn reload(&mut self);
}

/// Why [`Orchestrator::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// `Shutdown` received or every sender dropped.
    Shutdown,
    /// The deadline passed.
    Elapsed,
}

pub struct Orchestrator {
    state: ReloadState,
    quiet_period: Duration,
    reloads: usize,
}

impl Orchestrator {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            state: ReloadState::new(),
            quiet_period,
            reloads: 0,
        }
    }

    pub fn state(&self) -> &ReloadState {
        &self.state
    }

    /// Reloads started by this orchestrator.
    pub fn reloads(&self) -> usize {
        self.reloads
    }

    /// Consume events until shutdown or `deadline`.
    pub fn run(
        &mut self,
        events: &Receiver<LoaderEvent>,
        target: &mut dyn Reload,
        deadline: Option<Instant>,
    ) -> Exit {
        loop {
            let now = Instant::now();
            if deadline.is_some_and(|d| now >= d) {
                return Exit::Elapsed;
            }

            let quiet = match self.state.timeout(now) {
                Some(remaining) => after(remaining),
                None => never(),
            };
            let limit = match deadline {
                Some(d) => after(d.saturating_duration_since(now)),
                None => never(),
            };

            select! {
                recv(events) -> msg => match msg {
                    Ok(LoaderEvent::Changed(path)) => self.on_change(&path, target),
                    Ok(LoaderEvent::WatchError(e)) => crate::log!("watch"; "{}", e),
                    Ok(LoaderEvent::Shutdown) | Err(_) => {
                        crate::debug!("reload"; "shutting down");
                        return Exit::Shutdown;
                    }
                },
                recv(quiet) -> _ => {
                    if self.state.on_quiet_elapsed() {
                        crate::debug!("reload"; "quiet period over, reloading coalesced changes");
                        self.reload(target);
                    }
                }
                recv(limit) -> _ => return Exit::Elapsed,
            }
        }
    }

    fn on_change(&mut self, path: &Path, target: &mut dyn Reload) {
        crate::log!("watch"; "detected file change: {}", path.display());
        target.invalidate(path);
        if self.state.on_invalidate() {
            self.reload(target);
        } else {
            crate::debug!("reload"; "reload in progress, queued {}", path.display());
        }
    }

    fn reload(&mut self, target: &mut dyn Reload) {
        self.reloads += 1;
        target.reload();
        self.state.on_reload_done(Instant::now(), self.quiet_period);
    }
}
