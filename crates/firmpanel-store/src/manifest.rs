//! Artifact manifest: content hashes and provenance of one generation

use std::collections::BTreeMap;
use std::path::Path;

use firmpanel_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactName;
use crate::hash;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Manifest stored alongside artifact files.
/// Records how the generation was produced and its content hashes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub artifact: ArtifactName,
    /// Blake3 fingerprint of the inputs the build read.
    pub input_fingerprint: String,
    /// Content-affecting settings (for auditability).
    pub config_json: String,
    /// Per-file blake3 content hashes (filename → full hex hash).
    pub file_hashes: BTreeMap<String, String>,
    /// Combined content hash of all artifact files.
    pub content_hash: String,
    pub row_count: usize,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl ArtifactManifest {
    /// Compute content hashes for all files in a directory.
    /// Returns (file_hashes, combined_content_hash).
    pub fn compute_content_hashes(dir: &Path) -> Result<(BTreeMap<String, String>, blake3::Hash)> {
        let pattern = dir.join("*");
        let pattern_str = pattern.to_string_lossy();

        let mut entries: Vec<_> = glob::glob(&pattern_str)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
            .filter_map(|e| e.ok())
            .filter(|p| p.is_file() && p.file_name().is_none_or(|n| n != MANIFEST_FILE))
            .collect();

        // Sort for deterministic hash order
        entries.sort();

        let mut file_hashes = BTreeMap::new();
        let mut all_hashes = Vec::new();

        for path in &entries {
            let h = hash::hash_file(path)?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            file_hashes.insert(filename, h.to_hex().to_string());
            all_hashes.push(h);
        }

        let content_hash = if all_hashes.is_empty() {
            hash::hash_bytes(b"empty")
        } else {
            hash::combine_hashes(&all_hashes)
        };

        Ok((file_hashes, content_hash))
    }

    /// Short content hash used in generation directory names.
    pub fn short_content_hash(&self) -> &str {
        &self.content_hash[..self.content_hash.len().min(8)]
    }

    /// Write manifest to dir/manifest.json
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::from)?;
        std::fs::write(dir.join(MANIFEST_FILE), json)?;
        Ok(())
    }

    /// Read manifest from dir/manifest.json
    pub fn read_from(dir: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(dir.join(MANIFEST_FILE))?;
        let manifest = serde_json::from_str(&json).map_err(std::io::Error::from)?;
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> ArtifactManifest {
        ArtifactManifest {
            artifact: ArtifactName::Survival,
            input_fingerprint: "abcd1234".into(),
            config_json: r#"{"baseline_year":2019}"#.into(),
            file_hashes: BTreeMap::from([("survival.parquet".into(), "hash_a".into())]),
            content_hash: "deadbeefcafe".into(),
            row_count: 2,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn content_hashes_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let (hashes, combined) = ArtifactManifest::compute_content_hashes(dir.path()).unwrap();
        assert!(hashes.is_empty());
        assert_eq!(combined, hash::hash_bytes(b"empty"));
    }

    #[test]
    fn content_hashes_exclude_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("panel.parquet"), b"data").unwrap();
        std::fs::write(dir.path().join("panel.csv"), b"abi\n").unwrap();

        let (before, h1) = ArtifactManifest::compute_content_hashes(dir.path()).unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), b"{}").unwrap();
        let (after, h2) = ArtifactManifest::compute_content_hashes(dir.path()).unwrap();

        assert_eq!(before.len(), 2);
        assert!(!after.contains_key(MANIFEST_FILE));
        assert_eq!(h1, h2);
    }

    #[test]
    fn manifest_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let m = manifest();
        m.write_to(dir.path()).unwrap();
        let loaded = ArtifactManifest::read_from(dir.path()).unwrap();
        assert_eq!(loaded.artifact, m.artifact);
        assert_eq!(loaded.input_fingerprint, m.input_fingerprint);
        assert_eq!(loaded.content_hash, m.content_hash);
        assert_eq!(loaded.row_count, 2);
        assert_eq!(loaded.short_content_hash(), "deadbeef");
    }

    #[test]
    fn read_corrupt_manifest_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), b"not valid json").unwrap();
        assert!(ArtifactManifest::read_from(dir.path()).is_err());
        let empty = tempfile::tempdir().unwrap();
        assert!(ArtifactManifest::read_from(empty.path()).is_err());
    }
}
