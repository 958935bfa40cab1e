#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `dagsync_store` owns everything the pull engine reads and writes on
//! local disk: the content-addressed object store, the summary cache's
//! ETag/mtime validators, and the `commitpartial` marker files that record
//! which commits are not yet fully reachable. The engine (§1) treats the
//! object store itself as an external collaborator behind the [`ObjectStore`]
//! trait; this crate supplies both that trait and the filesystem
//! implementation used in practice.
//!
//! # Design
//!
//! [`FsObjectStore`] lays objects out as
//! `<repo>/objects/<first-2-hex-chars>/<remaining-62-hex-chars>.<suffix>`,
//! mirroring the remote path layout so a fetched response body can be
//! written to disk without reshaping. [`cache`] persists summary cache
//! validators via an xattr (`user.dagsync.etag`) where the filesystem
//! supports it, falling back to a JSON sidecar file
//! (`<name>.meta.json`) otherwise. [`state`] tracks `commitpartial`
//! markers under `<repo>/state/`.
//!
//! # Invariants
//!
//! - [`FsObjectStore::write`] never leaves a half-written object visible to
//!   [`FsObjectStore::has`]: the write lands in a temp file in the same
//!   directory and is renamed into place, which is atomic on the same
//!   filesystem.
//! - A commit with no `commitpartial` marker is, by construction, only ever
//!   produced by [`state::CommitState::clear_partial`], called solely from
//!   the transaction driver after every reachable object is verified
//!   present.

pub mod cache;
pub mod state;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use dagsync_checksum::Checksum;
use dagsync_objects::Object;
use thiserror::Error;

/// Errors raised by the local object store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested object is not present.
    #[error("object {0} not found in local store")]
    NotFound(Checksum),
    /// An I/O error occurred while reading or writing the store.
    #[error("I/O error on object {checksum}: {source}")]
    Io {
        /// The object involved.
        checksum: Checksum,
        /// The underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// A stored object's bytes could not be decoded.
    #[error("object {checksum} is corrupt: {source}")]
    Corrupt {
        /// The object involved.
        checksum: Checksum,
        /// The decode failure.
        #[source]
        source: dagsync_objects::DecodeError,
    },
}

/// The local object store's interface: open/has/load/write by checksum,
/// plus partial-commit marking. A trait boundary (§1 names the object
/// store as an external collaborator) so the engine can be tested against
/// an in-memory fake without touching disk.
pub trait ObjectStore: Send + Sync {
    /// Whether an object with this checksum is already present and
    /// verified.
    fn has(&self, checksum: Checksum) -> bool;

    /// Loads and decodes an object by checksum.
    fn load(&self, checksum: Checksum) -> Result<Object, StoreError>;

    /// Writes an already-verified object's encoded bytes under its
    /// checksum. Callers must have already checked
    /// `Checksum::of(&bytes) == checksum`; this method does not re-verify.
    fn write(&self, checksum: Checksum, encoded: &[u8]) -> Result<(), StoreError>;
}

/// A filesystem-backed [`ObjectStore`] rooted at `<repo>/objects`.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Opens (creating if necessary) an object store rooted at `repo_root`.
    pub fn open(repo_root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = repo_root.into().join("objects");
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Returns the on-disk path an object with this checksum would occupy.
    #[must_use]
    pub fn object_path(&self, checksum: Checksum) -> PathBuf {
        let (head, tail) = checksum.split_object_path();
        self.root.join(head).join(format!("{tail}.obj"))
    }

    fn io_err(checksum: Checksum, source: io::Error) -> StoreError {
        StoreError::Io { checksum, source }
    }
}

impl ObjectStore for FsObjectStore {
    fn has(&self, checksum: Checksum) -> bool {
        self.object_path(checksum).is_file()
    }

    fn load(&self, checksum: Checksum) -> Result<Object, StoreError> {
        let path = self.object_path(checksum);
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StoreError::NotFound(checksum)
            } else {
                Self::io_err(checksum, e)
            }
        })?;
        Object::decode(&bytes).map_err(|source| StoreError::Corrupt { checksum, source })
    }

    fn write(&self, checksum: Checksum, encoded: &[u8]) -> Result<(), StoreError> {
        let path = self.object_path(checksum);
        let dir = path.parent().expect("object_path always has a parent");
        fs::create_dir_all(dir).map_err(|e| Self::io_err(checksum, e))?;
        let tmp = dir.join(format!(".tmp-{}", checksum.to_hex()));
        fs::write(&tmp, encoded).map_err(|e| Self::io_err(checksum, e))?;
        fs::rename(&tmp, &path).map_err(|e| Self::io_err(checksum, e))?;
        Ok(())
    }
}

/// Path to the repository's `state/` directory, creating it if absent.
pub fn state_dir(repo_root: &Path) -> io::Result<PathBuf> {
    let dir = repo_root.join("state");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Path to the repository's `cache/summaries/` directory, creating it if
/// absent.
pub fn summary_cache_dir(repo_root: &Path) -> io::Result<PathBuf> {
    let dir = repo_root.join("cache").join("summaries");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_has_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).unwrap();
        let object = Object::File(b"payload".to_vec());
        let checksum = object.checksum();
        assert!(!store.has(checksum));
        store.write(checksum, &object.encode()).unwrap();
        assert!(store.has(checksum));
        assert_eq!(store.load(checksum).unwrap(), object);
    }

    #[test]
    fn load_missing_object_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).unwrap();
        let checksum = Checksum::of(b"never written");
        assert!(matches!(
            store.load(checksum),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn write_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).unwrap();
        let object = Object::File(b"idempotent".to_vec());
        let checksum = object.checksum();
        let encoded = object.encode();
        store.write(checksum, &encoded).unwrap();
        store.write(checksum, &encoded).unwrap();
        assert_eq!(store.load(checksum).unwrap(), object);
    }
}
