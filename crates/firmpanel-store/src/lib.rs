//! firmpanel-store: materialized artifacts for the panel pipeline
//!
//! Each artifact is written as an immutable, content-hashed generation and
//! published by atomically swapping a symlink, so readers only ever see a
//! complete generation. Rebuilds of one artifact are serialized by a lock
//! file.

pub mod artifact;
pub mod hash;
pub mod lock;
pub mod manifest;
pub mod store;

pub use artifact::ArtifactName;
pub use hash::{Fingerprint, combine_hashes, hash_bytes, hash_file, short_hash};
pub use lock::RebuildLock;
pub use manifest::ArtifactManifest;
pub use store::{ArtifactState, ArtifactStatus, Generation, Lookup, Staging, Store};
