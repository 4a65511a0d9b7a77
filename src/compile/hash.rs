//! Content hashing for the compile cache using blake3.

use std::fmt;

/// A 256-bit content hash (blake3 output) of a module's raw source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash raw source bytes.
    pub fn of(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    /// Full hex form, used as the persistent store key.
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // first 16 hex chars
        write!(f, "{}", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_content_same_hash() {
        assert_eq!(ContentHash::of(b"export default 1;"), ContentHash::of(b"export default 1;"));
        assert_ne!(ContentHash::of(b"export default 1;"), ContentHash::of(b"export default 2;"));
    }

    #[test]
    fn test_hex_is_full_blake3_digest() {
        let hash = ContentHash::of(b"abc");
        assert_eq!(hash.to_hex(), blake3::hash(b"abc").to_hex().as_str());
        assert_eq!(hash.to_hex().len(), 64);
    }

    #[test]
    fn test_display_is_prefix() {
        let hash = ContentHash::of(b"abc");
        assert_eq!(hash.to_string(), hash.to_hex()[..16]);
    }
}
