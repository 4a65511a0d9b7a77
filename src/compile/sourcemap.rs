//! Position source maps and the per-file registry.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::script::Pos;

/// Prefix of the trailer appended to compiled code in inline mode.
pub const INLINE_PREFIX: &str = "//# sourceMappingURL=data:application/json,";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub generated: Pos,
    pub original: Pos,
}

/// Mappings from compiled positions to original positions, sorted by
/// generated position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMap {
    pub version: u32,
    pub mappings: Vec<Mapping>,
}

impl SourceMap {
    pub fn new(mappings: Vec<Mapping>) -> Self {
        Self {
            version: 1,
            mappings,
        }
    }

    /// Translate a compiled position using the nearest preceding mapping.
    pub fn original_position(&self, pos: Pos) -> Pos {
        let idx = self.mappings.partition_point(|m| m.generated <= pos);
        let Some(m) = idx.checked_sub(1).map(|i| &self.mappings[i]) else {
            return pos;
        };
        if m.generated.line == pos.line {
            Pos::new(m.original.line, m.original.col + (pos.col - m.generated.col))
        } else {
            Pos::new(m.original.line + (pos.line - m.generated.line), pos.col)
        }
    }

    /// `//# sourceMappingURL=data:application/json,<map>`
    pub fn inline_comment(&self) -> Result<String, serde_json::Error> {
        Ok(format!("{INLINE_PREFIX}{}", serde_json::to_string(self)?))
    }
}

/// Source maps of every compiled module, keyed by absolute path.
#[derive(Debug, Default)]
pub struct SourceMapRegistry {
    maps: FxHashMap<PathBuf, Rc<SourceMap>>,
}

impl SourceMapRegistry {
    pub fn insert(&mut self, path: PathBuf, map: Rc<SourceMap>) {
        self.maps.insert(path, map);
    }

    pub fn remove(&mut self, path: &Path) {
        self.maps.remove(path);
    }

    pub fn get(&self, path: &Path) -> Option<&SourceMap> {
        self.maps.get(path).map(Rc::as_ref)
    }

    /// Map a position in `path`'s compiled code; unmapped files pass through.
    pub fn original_position(&self, path: &Path, pos: Pos) -> Pos {
        self.get(path)
            .map_or(pos, |map| map.original_position(pos))
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> SourceMap {
        SourceMap::new(vec![
            Mapping {
                generated: Pos::new(1, 1),
                original: Pos::new(1, 1),
            },
            Mapping {
                generated: Pos::new(1, 9),
                original: Pos::new(1, 17),
            },
            Mapping {
                generated: Pos::new(3, 1),
                original: Pos::new(3, 8),
            },
        ])
    }

    #[test]
    fn test_exact_and_offset_lookup() {
        let map = map();
        assert_eq!(map.original_position(Pos::new(1, 9)), Pos::new(1, 17));
        assert_eq!(map.original_position(Pos::new(1, 12)), Pos::new(1, 20));
        assert_eq!(map.original_position(Pos::new(1, 4)), Pos::new(1, 4));
    }

    #[test]
    fn test_lookup_on_unmapped_line() {
        let map = map();
        assert_eq!(map.original_position(Pos::new(2, 5)), Pos::new(2, 5));
        assert_eq!(map.original_position(Pos::new(3, 3)), Pos::new(3, 10));
    }

    #[test]
    fn test_empty_map_passes_through() {
        let map = SourceMap::new(Vec::new());
        assert_eq!(map.original_position(Pos::new(4, 2)), Pos::new(4, 2));
    }

    #[test]
    fn test_inline_comment_is_json() {
        let comment = map().inline_comment().unwrap();
        let json = comment.strip_prefix(INLINE_PREFIX).unwrap();
        let parsed: SourceMap = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, map());
    }

    #[test]
    fn test_registry() {
        let mut registry = SourceMapRegistry::default();
        let path = PathBuf::from("/src/a.rl");
        registry.insert(path.clone(), Rc::new(map()));
        assert_eq!(registry.original_position(&path, Pos::new(1, 9)), Pos::new(1, 17));
        assert_eq!(
            registry.original_position(Path::new("/src/b.rl"), Pos::new(1, 9)),
            Pos::new(1, 9)
        );
        registry.remove(&path);
        assert!(registry.is_empty());
    }
}
