//! Blake3 hashing for artifact contents and input fingerprints

use std::io;
use std::path::Path;

/// Hash a file's contents with blake3.
pub fn hash_file(path: &Path) -> io::Result<blake3::Hash> {
    let mut hasher = blake3::Hasher::new();
    hasher.update_mmap(path)?;
    Ok(hasher.finalize())
}

/// Hash raw bytes with blake3.
pub fn hash_bytes(data: &[u8]) -> blake3::Hash {
    blake3::hash(data)
}

/// Combine multiple hashes into one by hashing their concatenated bytes.
pub fn combine_hashes(hashes: &[blake3::Hash]) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    for h in hashes {
        hasher.update(h.as_bytes());
    }
    hasher.finalize()
}

/// Return the first 8 hex characters of a blake3 hash.
pub fn short_hash(hash: &blake3::Hash) -> String {
    hash.to_hex()[..8].to_string()
}

/// Incremental fingerprint of everything a build reads.
///
/// Each part is length-prefixed so `("ab", "c")` and `("a", "bc")` differ.
#[derive(Debug, Default, Clone)]
pub struct Fingerprint {
    hasher: blake3::Hasher,
}

impl Fingerprint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, label: &str, value: &str) -> Self {
        self.part(label.as_bytes());
        self.part(value.as_bytes());
        self
    }

    /// Add a file by name and content. The directory is not part of the
    /// fingerprint, so moving an input tree does not invalidate it.
    pub fn file(mut self, path: &Path) -> io::Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content = hash_file(path)?;
        self.part(name.as_bytes());
        self.part(content.as_bytes());
        Ok(self)
    }

    pub fn finish(self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }

    fn part(&mut self, bytes: &[u8]) {
        self.hasher.update(&(bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_bytes_deterministic() {
        assert_eq!(hash_bytes(b"hello"), hash_bytes(b"hello"));
        assert_ne!(hash_bytes(b"hello"), hash_bytes(b"world"));
    }

    #[test]
    fn short_hash_length() {
        let h = hash_bytes(b"test");
        assert_eq!(short_hash(&h).len(), 8);
    }

    #[test]
    fn combine_hashes_order_matters() {
        let h1 = hash_bytes(b"a");
        let h2 = hash_bytes(b"b");
        assert_eq!(combine_hashes(&[h1, h2]), combine_hashes(&[h1, h2]));
        assert_ne!(combine_hashes(&[h1, h2]), combine_hashes(&[h2, h1]));
    }

    #[test]
    fn hash_file_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.txt");
        std::fs::write(&path, b"file content").unwrap();
        assert_eq!(hash_file(&path).unwrap(), hash_bytes(b"file content"));
    }

    #[test]
    fn fingerprint_parts_are_delimited() {
        let a = Fingerprint::new().text("ab", "c").finish();
        let b = Fingerprint::new().text("a", "bc").finish();
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_follows_file_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2019_Business.txt");
        std::fs::write(&path, b"A100").unwrap();
        let before = Fingerprint::new().file(&path).unwrap().finish();
        assert_eq!(before, Fingerprint::new().file(&path).unwrap().finish());

        std::fs::write(&path, b"A100\nB200").unwrap();
        let after = Fingerprint::new().file(&path).unwrap().finish();
        assert_ne!(before, after);
    }
}
