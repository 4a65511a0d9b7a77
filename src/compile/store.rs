//! Persistent backing stores for compiled output.
//!
//! Entries are keyed by [`ContentHash`] only, so a store can be shared by
//! any number of loaders and never needs invalidation.

use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::PathBuf;

use rustc_hash::FxHashMap;

use super::CompileOutput;
use super::hash::ContentHash;

/// Key-value store for compile results.
///
/// `get` returns `Ok(None)` when the entry is absent; any other failure is
/// an `Err` that the cache downgrades to a recompile.
pub trait CacheStore {
    fn get(&self, key: &ContentHash) -> io::Result<Option<CompileOutput>>;
    fn put(&self, key: &ContentHash, output: &CompileOutput) -> io::Result<()>;
}

/// One `<hex-hash>.json` file per entry in a directory.
///
/// An entry is the JSON record `{"code": ..., "map": ...}`. A file that is
/// not JSON at all is taken as raw compiled code without a map.
#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn entry_path(&self, key: &ContentHash) -> PathBuf {
        self.dir.join(format!("{}.json", key.to_hex()))
    }
}

impl CacheStore for DirStore {
    fn get(&self, key: &ContentHash) -> io::Result<Option<CompileOutput>> {
        let path = self.entry_path(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let Ok(json) = serde_json::from_str::<serde_json::Value>(&content) else {
            return Ok(Some(CompileOutput {
                code: content,
                map: None,
            }));
        };
        match serde_json::from_value(json) {
            Ok(output) => Ok(Some(output)),
            Err(e) => {
                crate::debug!("cache"; "ignoring malformed entry {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    fn put(&self, key: &ContentHash, output: &CompileOutput) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        let json = serde_json::to_string(output)?;
        let path = self.entry_path(key);
        // write-then-rename so readers never observe a partial entry
        let tmp = path.with_extension(format!("json.{}.tmp", std::process::id()));
        fs::write(&tmp, json)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            fs::remove_file(&tmp).ok();
            return Err(e);
        }

        crate::debug!("cache"; "stored {}", key);
        Ok(())
    }
}

/// In-memory store, for embedding without a cache directory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<FxHashMap<ContentHash, CompileOutput>>,
}

impl MemoryStore {
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &ContentHash) -> io::Result<Option<CompileOutput>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn put(&self, key: &ContentHash, output: &CompileOutput) -> io::Result<()> {
        self.entries.borrow_mut().insert(*key, output.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{Mapping, SourceMap};
    use crate::script::Pos;

    fn output() -> CompileOutput {
        CompileOutput {
            code: "exports.default = 1;".into(),
            map: Some(SourceMap::new(vec![Mapping {
                generated: Pos::new(1, 1),
                original: Pos::new(1, 1),
            }])),
        }
    }

    #[test]
    fn test_dir_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        let store = DirStore::new(&cache_dir);
        let key = ContentHash::of(b"export default 1;");

        assert!(store.get(&key).unwrap().is_none());
        store.put(&key, &output()).unwrap();
        assert_eq!(store.get(&key).unwrap(), Some(output()));

        // only the final entry remains
        let names: Vec<_> = fs::read_dir(&cache_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![format!("{}.json", key.to_hex())]);
    }

    #[test]
    fn test_raw_entry_is_code_without_map() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::new(dir.path());
        let key = ContentHash::of(b"x");
        fs::write(store.entry_path(&key), "exports.x = 1;").unwrap();

        let entry = store.get(&key).unwrap().unwrap();
        assert_eq!(entry.code, "exports.x = 1;");
        assert!(entry.map.is_none());
    }

    #[test]
    fn test_malformed_record_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::new(dir.path());
        let key = ContentHash::of(b"x");
        fs::write(store.entry_path(&key), r#"{"unexpected": true}"#).unwrap();

        assert!(store.get(&key).unwrap().is_none());
    }

    #[test]
    fn test_unreadable_entry_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::new(dir.path());
        let key = ContentHash::of(b"x");
        // a directory where the entry file should be
        fs::create_dir(store.entry_path(&key)).unwrap();

        assert!(store.get(&key).is_err());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::default();
        let key = ContentHash::of(b"a");
        assert!(store.get(&key).unwrap().is_none());
        store.put(&key, &output()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key).unwrap(), Some(output()));
    }
}
