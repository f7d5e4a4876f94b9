//! Per-artifact rebuild lock

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use firmpanel_core::{Error, Result};

/// Exclusive right to rebuild one artifact, released on drop.
///
/// The lock is a file created with `create_new`; a lock left behind by a
/// killed process must be removed by hand (`firmpanel gc` reports it).
#[derive(Debug)]
pub struct RebuildLock {
    path: PathBuf,
}

impl RebuildLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                // Holder pid, for humans inspecting a stale lock
                let _ = writeln!(file, "{}", std::process::id());
                log::debug!("acquired {}", path.display());
                Ok(Self {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(Error::ArtifactLocked {
                path: path.to_path_buf(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RebuildLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("failed to release {}: {e}", self.path.display());
        }
    }
}
