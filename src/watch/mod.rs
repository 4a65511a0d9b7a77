//! File change notification.
//!
//! ```text
//! PollWatcher thread ──LoaderEvent::Changed──► channel ──► reload loop
//! ```
//!
//! The notify callback only filters and forwards; all state lives on the
//! loader's thread.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam::channel::Sender;
use notify::event::ModifyKind;
use notify::{EventKind, PollWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;

use crate::error::WatchError;
use crate::utils::path::normalize_path;

/// Messages consumed by the reload loop.
#[derive(Debug)]
pub enum LoaderEvent {
    /// A watched file's content changed (normalized path).
    Changed(PathBuf),
    WatchError(WatchError),
    /// Stop `LiveLoader::run`.
    Shutdown,
}

/// Subscribes individual files to change notifications.
pub trait WatchBackend {
    fn watch(&mut self, path: &Path) -> Result<(), WatchError>;
}

/// notify `PollWatcher` comparing file contents at a fixed interval.
pub struct PollBackend {
    watcher: PollWatcher,
}

impl PollBackend {
    pub fn new(events: Sender<LoaderEvent>, interval: Duration) -> Result<Self, WatchError> {
        let config = notify::Config::default()
            .with_poll_interval(interval)
            .with_compare_contents(true);

        let watcher = PollWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    for path in changed_paths(&event) {
                        // receiver gone means the loader was dropped
                        let _ = events.send(LoaderEvent::Changed(path));
                    }
                }
                Err(e) => {
                    let _ = events.send(LoaderEvent::WatchError(WatchError::Backend(e)));
                }
            },
            config,
        )?;

        Ok(Self { watcher })
    }
}

impl WatchBackend for PollBackend {
    fn watch(&mut self, path: &Path) -> Result<(), WatchError> {
        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::Subscribe(path.to_path_buf(), e))
    }
}

/// Paths whose content may have changed. Metadata-only changes
/// (mtime/atime/chmod) and removals are ignored.
pub fn changed_paths(event: &notify::Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) => {}
        EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(_) => {}
        _ => return Vec::new(),
    }
    crate::debug!("watch"; "raw notify: {:?} {:?}", event.kind, event.paths);
    event.paths.iter().map(|p| normalize_path(p)).collect()
}

/// The set of watched files, each subscribed exactly once.
pub struct FileWatcher {
    backend: Option<Box<dyn WatchBackend>>,
    watched: FxHashSet<PathBuf>,
}

impl FileWatcher {
    pub fn new(backend: Box<dyn WatchBackend>) -> Self {
        Self {
            backend: Some(backend),
            watched: FxHashSet::default(),
        }
    }

    /// Tracks paths without subscribing anywhere.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            watched: FxHashSet::default(),
        }
    }

    /// Subscribe `path` unless already watched. Failures are logged, never
    /// returned; the path still counts as watched so it is not retried.
    pub fn watch(&mut self, path: &Path) -> bool {
        if !self.watched.insert(path.to_path_buf()) {
            return false;
        }
        if let Some(backend) = &mut self.backend {
            match backend.watch(path) {
                Ok(()) => crate::debug!("watch"; "watching {}", path.display()),
                Err(e) => crate::log!("watch"; "{}", e),
            }
        }
        true
    }

    pub fn is_watched(&self, path: &Path) -> bool {
        self.watched.contains(path)
    }

    pub fn len(&self) -> usize {
        self.watched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn make_event(paths: Vec<&str>, kind: EventKind) -> notify::Event {
        notify::Event {
            kind,
            paths: paths.into_iter().map(PathBuf::from).collect(),
            attrs: Default::default(),
        }
    }

    fn modify_kind() -> EventKind {
        EventKind::Modify(ModifyKind::Data(notify::event::DataChange::Any))
    }

    #[derive(Default)]
    struct Recording {
        calls: Rc<RefCell<Vec<PathBuf>>>,
        fail: bool,
    }

    impl WatchBackend for Recording {
        fn watch(&mut self, path: &Path) -> Result<(), WatchError> {
            self.calls.borrow_mut().push(path.to_path_buf());
            if self.fail {
                return Err(WatchError::Subscribe(
                    path.to_path_buf(),
                    notify::Error::generic("no such file"),
                ));
            }
            Ok(())
        }
    }

    #[test]
    fn test_changed_paths_filters_kinds() {
        let created = make_event(
            vec!["/tmp/a.rl"],
            EventKind::Create(notify::event::CreateKind::File),
        );
        assert_eq!(changed_paths(&created), vec![PathBuf::from("/tmp/a.rl")]);
        assert_eq!(
            changed_paths(&make_event(vec!["/tmp/b.rl"], modify_kind())),
            vec![PathBuf::from("/tmp/b.rl")]
        );

        let metadata = make_event(
            vec!["/tmp/a.rl"],
            EventKind::Modify(ModifyKind::Metadata(notify::event::MetadataKind::WriteTime)),
        );
        assert!(changed_paths(&metadata).is_empty());

        let removed = make_event(
            vec!["/tmp/a.rl"],
            EventKind::Remove(notify::event::RemoveKind::File),
        );
        assert!(changed_paths(&removed).is_empty());
    }

    #[test]
    fn test_watch_is_idempotent() {
        let backend = Recording::default();
        let calls = Rc::clone(&backend.calls);
        let mut watcher = FileWatcher::new(Box::new(backend));

        assert!(watcher.watch(Path::new("/src/a.rl")));
        assert!(!watcher.watch(Path::new("/src/a.rl")));
        assert!(watcher.watch(Path::new("/src/b.rl")));
        assert_eq!(calls.borrow().len(), 2);
        assert_eq!(watcher.len(), 2);
    }

    #[test]
    fn test_subscribe_failure_is_swallowed() {
        let backend = Recording {
            fail: true,
            ..Default::default()
        };
        let calls = Rc::clone(&backend.calls);
        let mut watcher = FileWatcher::new(Box::new(backend));

        assert!(watcher.watch(Path::new("/src/a.rl")));
        assert!(!watcher.watch(Path::new("/src/a.rl")));
        assert!(watcher.is_watched(Path::new("/src/a.rl")));
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn test_disabled_tracks_without_backend() {
        let mut watcher = FileWatcher::disabled();
        assert!(watcher.watch(Path::new("/src/a.rl")));
        assert!(watcher.is_watched(Path::new("/src/a.rl")));
    }

    #[test]
    fn test_poll_backend_reports_content_change() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.rl");
        std::fs::write(&file, "export default 1;").unwrap();

        let (tx, rx) = crossbeam::channel::unbounded();
        let mut backend = PollBackend::new(tx, Duration::from_millis(20)).unwrap();
        backend.watch(&file).unwrap();

        std::thread::sleep(Duration::from_millis(100));
        std::fs::write(&file, "export default 2;").unwrap();

        let expected = normalize_path(&file);
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(LoaderEvent::Changed(path)) if path == expected => break,
                Ok(_) => continue,
                Err(e) => panic!("no change event: {e}"),
            }
        }
    }
}
