//! Generation store with atomically swapped artifact links
//!
//! Directory layout:
//! ```text
//! {data_output}/
//! ├── store/
//! │   ├── panel-{hash8}/          # immutable generation (content hash)
//! │   │   ├── manifest.json
//! │   │   ├── panel.parquet
//! │   │   └── panel.csv
//! │   ├── survival-{hash8}/
//! │   └── survival.tmp/           # rebuild in progress
//! ├── panel -> store/panel-{hash8}
//! ├── survival -> store/survival-{hash8}
//! └── survival.lock               # held while survival rebuilds
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use firmpanel_core::{Error, Result};
use serde::Serialize;

use crate::artifact::ArtifactName;
use crate::hash;
use crate::lock::RebuildLock;
use crate::manifest::{ArtifactManifest, MANIFEST_FILE};

const TMP_SUFFIX: &str = ".tmp";

/// Result of looking up an artifact's current generation.
#[derive(Debug)]
pub enum Lookup {
    Present(Generation),
    Absent,
}

/// A committed, readable generation of an artifact.
#[derive(Debug, Clone)]
pub struct Generation {
    pub dir: PathBuf,
    pub manifest: ArtifactManifest,
}

impl Generation {
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn parquet(&self) -> PathBuf {
        self.file(self.manifest.artifact.parquet_file())
    }

    /// Directory name under `store/`.
    pub fn name(&self) -> String {
        self.dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// A generation being written. Dropping it without committing removes it.
#[derive(Debug)]
pub struct Staging {
    artifact: ArtifactName,
    dir: PathBuf,
}

impl Staging {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifact(&self) -> ArtifactName {
        self.artifact
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if self.dir.exists() {
            log::info!("store: discarding {}", self.dir.display());
            if let Err(e) = fs::remove_dir_all(&self.dir) {
                log::warn!("failed to remove {}: {e}", self.dir.display());
            }
        }
    }
}

/// Summary of a store generation for listing.
#[derive(Debug, Serialize)]
pub struct StoreEntry {
    pub generation: String,
    pub artifact: ArtifactName,
    pub file_count: usize,
    pub row_count: usize,
    pub content_hash: String,
    pub created_at: String,
    pub referenced: bool,
}

/// Current state of one artifact link.
#[derive(Debug)]
pub enum ArtifactState {
    Absent,
    Present {
        generation: String,
        row_count: usize,
        content_hash: String,
        created_at: String,
    },
    Unreadable(String),
}

#[derive(Debug)]
pub struct ArtifactStatus {
    pub artifact: ArtifactName,
    pub state: ArtifactState,
    pub locked: bool,
}

/// Verification result for a single file.
#[derive(Debug)]
pub struct VerifyResult {
    pub path: String,
    pub expected: String,
    pub actual: String,
    pub ok: bool,
}

/// Artifact store rooted at the `data_output` directory.
pub struct Store {
    base: PathBuf,
}

impl Store {
    /// Open the store rooted at `base`, creating `store/` if needed.
    pub fn new(base: &Path) -> Result<Self> {
        fs::create_dir_all(base.join("store"))?;
        Ok(Self {
            base: base.to_path_buf(),
        })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn store_dir(&self) -> PathBuf {
        self.base.join("store")
    }

    /// Symlink naming the current generation of `artifact`.
    pub fn link_path(&self, artifact: ArtifactName) -> PathBuf {
        self.base.join(artifact.as_str())
    }

    pub fn lock_path(&self, artifact: ArtifactName) -> PathBuf {
        self.base.join(format!("{artifact}.lock"))
    }

    fn staging_path(&self, artifact: ArtifactName) -> PathBuf {
        self.store_dir().join(format!("{artifact}{TMP_SUFFIX}"))
    }

    /// Resolve the current generation of `artifact`.
    ///
    /// No link means `Absent`. A link whose generation, manifest or files
    /// cannot be read is `CacheRead`; it is never reported as absent.
    pub fn lookup(&self, artifact: ArtifactName) -> Result<Lookup> {
        let link = self.link_path(artifact);
        match fs::symlink_metadata(&link) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Lookup::Absent),
            Err(e) => return Err(Error::cache_read(artifact.as_str(), e)),
        }

        let dir = fs::canonicalize(&link).map_err(|e| {
            Error::cache_read(artifact.as_str(), format!("{}: {e}", link.display()))
        })?;
        let manifest = ArtifactManifest::read_from(&dir).map_err(|e| {
            Error::cache_read(artifact.as_str(), format!("{MANIFEST_FILE}: {e}"))
        })?;
        if manifest.artifact != artifact {
            return Err(Error::cache_read(
                artifact.as_str(),
                format!("link points at a {} generation", manifest.artifact),
            ));
        }
        for file in artifact.files() {
            if !dir.join(file).is_file() {
                return Err(Error::cache_read(
                    artifact.as_str(),
                    format!("missing {file} in {}", dir.display()),
                ));
            }
        }

        Ok(Lookup::Present(Generation { dir, manifest }))
    }

    /// Take the rebuild lock for `artifact`.
    pub fn lock(&self, artifact: ArtifactName) -> Result<RebuildLock> {
        RebuildLock::acquire(&self.lock_path(artifact))
    }

    /// Start a new generation. Callers hold the artifact's rebuild lock, so
    /// any existing staging directory is a leftover and is replaced.
    pub fn begin(&self, artifact: ArtifactName) -> Result<Staging> {
        let dir = self.staging_path(artifact);
        if dir.exists() {
            log::warn!("store: removing leftover {}", dir.display());
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        Ok(Staging { artifact, dir })
    }

    /// Commit a completed generation: hash contents, write manifest, rename
    /// into place, then point the artifact link at it.
    pub fn commit(
        &self,
        staging: Staging,
        input_fingerprint: &str,
        config_json: &str,
        row_count: usize,
    ) -> Result<Generation> {
        let artifact = staging.artifact;
        let (file_hashes, content_hash) = ArtifactManifest::compute_content_hashes(&staging.dir)?;

        let manifest = ArtifactManifest {
            artifact,
            input_fingerprint: input_fingerprint.to_string(),
            config_json: config_json.to_string(),
            file_hashes,
            content_hash: content_hash.to_hex().to_string(),
            row_count,
            created_at: chrono::Utc::now(),
        };

        let generation = format!("{artifact}-{}", hash::short_hash(&content_hash));
        let final_dir = self.store_dir().join(&generation);

        if final_dir.exists() {
            // Same content: keep the files, refresh provenance
            log::info!("store: {generation} unchanged, reusing");
            let tmp_manifest = staging.dir.join(MANIFEST_FILE);
            manifest.write_to(&staging.dir)?;
            fs::rename(&tmp_manifest, final_dir.join(MANIFEST_FILE))?;
        } else {
            manifest.write_to(&staging.dir)?;
            fs::rename(&staging.dir, &final_dir)?;
        }
        drop(staging);

        self.swap_link(artifact, &generation)?;
        log::info!(
            "store: {artifact} -> {generation} ({} rows)",
            firmpanel_core::fmt_num(row_count)
        );

        Ok(Generation {
            dir: final_dir,
            manifest,
        })
    }

    /// Replace the artifact link atomically: new link, then rename over.
    fn swap_link(&self, artifact: ArtifactName, generation: &str) -> Result<()> {
        let link = self.link_path(artifact);
        let tmp_link = self.base.join(format!(".{artifact}.link{TMP_SUFFIX}"));
        let target = PathBuf::from("store").join(generation);

        match fs::remove_file(&tmp_link) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        std::os::unix::fs::symlink(&target, &tmp_link)?;
        fs::rename(&tmp_link, &link)?;
        Ok(())
    }

    /// Generation names currently referenced by an artifact link.
    fn referenced(&self) -> HashSet<String> {
        ArtifactName::ALL
            .iter()
            .filter_map(|a| fs::read_link(self.link_path(*a)).ok())
            .filter_map(|target| target.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect()
    }

    /// Current state of every artifact.
    pub fn status(&self) -> Vec<ArtifactStatus> {
        ArtifactName::ALL
            .into_iter()
            .map(|artifact| {
                let state = match self.lookup(artifact) {
                    Ok(Lookup::Absent) => ArtifactState::Absent,
                    Ok(Lookup::Present(generation)) => ArtifactState::Present {
                        generation: generation.name(),
                        row_count: generation.manifest.row_count,
                        content_hash: generation.manifest.short_content_hash().to_string(),
                        created_at: generation
                            .manifest
                            .created_at
                            .format("%Y-%m-%d %H:%M")
                            .to_string(),
                    },
                    Err(e) => ArtifactState::Unreadable(e.to_string()),
                };
                ArtifactStatus {
                    artifact,
                    state,
                    locked: self.lock_path(artifact).exists(),
                }
            })
            .collect()
    }

    /// List all committed generations.
    pub fn list(&self) -> anyhow::Result<Vec<StoreEntry>> {
        let store_dir = self.store_dir();
        let referenced = self.referenced();

        let mut entries = Vec::new();
        for entry in fs::read_dir(&store_dir)
            .with_context(|| format!("failed to read {}", store_dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(TMP_SUFFIX) {
                continue;
            }

            match ArtifactManifest::read_from(&path) {
                Ok(manifest) => {
                    entries.push(StoreEntry {
                        artifact: manifest.artifact,
                        file_count: manifest.file_hashes.len(),
                        row_count: manifest.row_count,
                        content_hash: manifest.short_content_hash().to_string(),
                        created_at: manifest.created_at.format("%Y-%m-%d %H:%M").to_string(),
                        referenced: referenced.contains(&name),
                        generation: name,
                    });
                }
                Err(e) => {
                    log::warn!("skipping {name}: {e}");
                }
            }
        }

        entries.sort_by(|a, b| {
            (a.artifact, &a.created_at, &a.generation).cmp(&(b.artifact, &b.created_at, &b.generation))
        });
        Ok(entries)
    }

    /// Remove generations no link points at, and stale staging directories.
    /// Returns the removed directory names.
    pub fn gc(&self) -> anyhow::Result<Vec<String>> {
        let referenced = self.referenced();
        let store_dir = self.store_dir();
        let mut removed = Vec::new();

        for entry in fs::read_dir(&store_dir)
            .with_context(|| format!("failed to read {}", store_dir.display()))?
        {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            if name.ends_with(TMP_SUFFIX) {
                if self.staging_in_use(&name) {
                    log::info!("gc: keeping {name}, rebuild in progress");
                    continue;
                }
                log::info!("gc: removing stale tmp {name}");
            } else if referenced.contains(&name) {
                continue;
            } else {
                log::info!("gc: removing unreferenced {name}");
            }
            fs::remove_dir_all(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
            removed.push(name);
        }

        Ok(removed)
    }

    fn staging_in_use(&self, dir_name: &str) -> bool {
        dir_name
            .strip_suffix(TMP_SUFFIX)
            .and_then(|a| a.parse::<ArtifactName>().ok())
            .is_some_and(|a| self.lock_path(a).exists())
    }

    /// Re-hash one generation's files against its manifest.
    pub fn verify(&self, generation: &str) -> anyhow::Result<Vec<VerifyResult>> {
        let dir = self.store_dir().join(generation);
        let manifest = ArtifactManifest::read_from(&dir)
            .with_context(|| format!("no manifest for {generation}"))?;

        let mut results = Vec::new();
        for (filename, expected_hash) in &manifest.file_hashes {
            let file_path = dir.join(filename);
            let (actual, ok) = if file_path.exists() {
                match hash::hash_file(&file_path) {
                    Ok(h) => {
                        let hex = h.to_hex().to_string();
                        let ok = hex == *expected_hash;
                        (hex, ok)
                    }
                    Err(e) => (format!("error: {e}"), false),
                }
            } else {
                ("MISSING".to_string(), false)
            };

            results.push(VerifyResult {
                path: filename.clone(),
                expected: expected_hash.clone(),
                actual,
                ok,
            });
        }

        Ok(results)
    }

    /// Verify all committed generations.
    pub fn verify_all(&self) -> anyhow::Result<BTreeMap<String, Vec<VerifyResult>>> {
        let store_dir = self.store_dir();
        let mut all_results = BTreeMap::new();

        for entry in fs::read_dir(&store_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(TMP_SUFFIX) || !entry.path().is_dir() {
                continue;
            }
            match self.verify(&name) {
                Ok(results) => {
                    all_results.insert(name, results);
                }
                Err(e) => {
                    log::warn!("verify {name}: {e:#}");
                }
            }
        }

        Ok(all_results)
    }
}
