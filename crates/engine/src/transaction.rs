//! The transaction driver (C9): the only writer of `commitpartial`
//! markers and of the `refs/` pointer files a pull ultimately advances.
//!
//! # Invariants
//!
//! - A ref pointer file is only ever replaced by a rename from a temp file
//!   in the same directory, so a reader never observes a half-written
//!   pointer (atomic ref advancement, P3).
//! - `finalize_commit` is called, and a `commitpartial` marker cleared,
//!   only after every object the commit transitively reaches has been
//!   verified and written — the scan queue and scheduler are what
//!   guarantee that ordering, this module just records the outcome.
//! - `dry_run` short-circuits every method to a no-op `Ok(())` before any
//!   filesystem access, so a dry-run pull touches disk only to read the
//!   summary cache, never to stage or commit.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use dagsync_checksum::Checksum;
use dagsync_core::error::{PullError, PullErrorKind};
use dagsync_objects::Object;
use dagsync_store::{state, ObjectStore, StoreError};

/// Drives one pull's object writes and ref advancement.
pub struct Transaction<'a> {
    store: &'a dyn ObjectStore,
    state_dir: PathBuf,
    refs_dir: PathBuf,
    dry_run: bool,
}

fn io_to_resource(context: &str, err: io::Error) -> PullError {
    PullError::new(PullErrorKind::Resource, context).with_source(err)
}

impl<'a> Transaction<'a> {
    /// Opens a transaction rooted at `repo_root`, backed by `store` for
    /// object writes. In `dry_run` mode every method becomes a no-op.
    ///
    /// # Errors
    ///
    /// Returns a [`PullErrorKind::Resource`] error if the repository's
    /// `state/`/`refs/` directories cannot be created.
    pub fn open(repo_root: &Path, store: &'a dyn ObjectStore, dry_run: bool) -> Result<Self, PullError> {
        let state_dir = dagsync_store::state_dir(repo_root)
            .map_err(|e| io_to_resource("opening state directory", e))?;
        let refs_dir = repo_root.join("refs");
        fs::create_dir_all(&refs_dir).map_err(|e| io_to_resource("opening refs directory", e))?;
        Ok(Self {
            store,
            state_dir,
            refs_dir,
            dry_run,
        })
    }

    /// Marks `commit` partial: its reachable objects are not yet confirmed
    /// present. Called once, before the scan queue starts fetching.
    pub fn begin_commit(&self, commit: Checksum) -> Result<(), PullError> {
        if self.dry_run {
            return Ok(());
        }
        state::mark_partial(&self.state_dir, commit)
            .map_err(|e| io_to_resource("marking commit partial", e))
    }

    /// Writes an already-verified object's encoded bytes under `checksum`.
    pub fn write_object(&self, checksum: Checksum, encoded: &[u8]) -> Result<(), PullError> {
        if self.dry_run {
            return Ok(());
        }
        self.store.write(checksum, encoded).map_err(|e| match e {
            StoreError::Io { source, .. } => io_to_resource("writing object", source),
            other => PullError::new(PullErrorKind::Resource, "writing object").with_source(other),
        })
    }

    /// Clears `commit`'s partial marker. Called once every object it
    /// transitively reaches is confirmed present.
    pub fn finalize_commit(&self, commit: Checksum) -> Result<(), PullError> {
        if self.dry_run {
            return Ok(());
        }
        state::clear_partial(&self.state_dir, commit)
            .map_err(|e| io_to_resource("clearing partial marker", e))
    }

    /// Atomically advances `name` (optionally qualified by `collection`) to
    /// point at `commit`.
    pub fn advance_ref(
        &self,
        collection: Option<&str>,
        name: &str,
        commit: Checksum,
    ) -> Result<(), PullError> {
        if self.dry_run {
            return Ok(());
        }
        let path = self.ref_path(collection, name);
        let dir = path.parent().expect("ref_path always has a parent");
        fs::create_dir_all(dir).map_err(|e| io_to_resource("creating ref directory", e))?;
        let tmp = dir.join(format!(".tmp-ref-{}", commit.to_hex()));
        fs::write(&tmp, commit.to_hex()).map_err(|e| io_to_resource("writing ref", e))?;
        fs::rename(&tmp, &path).map_err(|e| io_to_resource("advancing ref", e))?;
        Ok(())
    }

    /// Reads the commit a ref currently points at, if it has ever been
    /// advanced.
    pub fn current_ref(&self, collection: Option<&str>, name: &str) -> Result<Option<Checksum>, PullError> {
        let path = self.ref_path(collection, name);
        match fs::read_to_string(&path) {
            Ok(hex) => Checksum::from_hex(hex.trim())
                .map(Some)
                .map_err(|e| PullError::new(PullErrorKind::Verification, "decoding stored ref").with_source(e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_to_resource("reading ref", e)),
        }
    }

    fn ref_path(&self, collection: Option<&str>, name: &str) -> PathBuf {
        match collection {
            Some(collection) => self.refs_dir.join(collection).join(name),
            None => self.refs_dir.join(name),
        }
    }

    /// Every locally-present, non-partial commit advanced by some ref under
    /// `collection`, newest timestamp first. A delta's `from` point can be
    /// any commit the repository already holds, not just the ref currently
    /// being pulled, so this scans every ref file in the collection's
    /// directory rather than just the one ref's pointer.
    #[must_use]
    pub fn local_delta_candidates(&self, collection: Option<&str>) -> Vec<Checksum> {
        let dir = match collection {
            Some(collection) => self.refs_dir.join(collection),
            None => self.refs_dir.clone(),
        };
        let Ok(entries) = fs::read_dir(&dir) else {
            return Vec::new();
        };

        let mut candidates: Vec<(u64, Checksum)> = Vec::new();
        for entry in entries.flatten() {
            let Ok(text) = fs::read_to_string(entry.path()) else {
                continue;
            };
            let Ok(checksum) = Checksum::from_hex(text.trim()) else {
                continue;
            };
            if state::is_partial(&self.state_dir, checksum) {
                continue;
            }
            let Ok(Object::Commit(commit)) = self.store.load(checksum) else {
                continue;
            };
            candidates.push((commit.timestamp, checksum));
        }
        candidates.sort_by(|a, b| b.0.cmp(&a.0));
        candidates.into_iter().map(|(_, checksum)| checksum).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagsync_objects::Object;
    use dagsync_store::FsObjectStore;

    #[test]
    fn advance_then_read_ref() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).unwrap();
        let txn = Transaction::open(dir.path(), &store, false).unwrap();
        let commit = Checksum::of(b"commit");
        assert_eq!(txn.current_ref(None, "stable").unwrap(), None);
        txn.advance_ref(None, "stable", commit).unwrap();
        assert_eq!(txn.current_ref(None, "stable").unwrap(), Some(commit));
    }

    #[test]
    fn dry_run_never_touches_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).unwrap();
        let txn = Transaction::open(dir.path(), &store, true).unwrap();
        let commit = Checksum::of(b"commit");
        txn.begin_commit(commit).unwrap();
        txn.advance_ref(None, "stable", commit).unwrap();
        txn.finalize_commit(commit).unwrap();
        assert_eq!(txn.current_ref(None, "stable").unwrap(), None);
        assert!(!store.has(commit));
    }

    #[test]
    fn begin_then_finalize_clears_the_partial_marker() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).unwrap();
        let txn = Transaction::open(dir.path(), &store, false).unwrap();
        let commit = Checksum::of(b"commit");
        txn.begin_commit(commit).unwrap();
        assert!(dagsync_store::state::is_partial(&txn.state_dir, commit));
        txn.finalize_commit(commit).unwrap();
        assert!(!dagsync_store::state::is_partial(&txn.state_dir, commit));
    }

    #[test]
    fn write_object_lands_in_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).unwrap();
        let txn = Transaction::open(dir.path(), &store, false).unwrap();
        let object = Object::File(b"payload".to_vec());
        let checksum = object.checksum();
        txn.write_object(checksum, &object.encode()).unwrap();
        assert!(store.has(checksum));
    }

    fn commit_object(timestamp: u64) -> Object {
        Object::Commit(dagsync_objects::Commit {
            timestamp,
            ..Default::default()
        })
    }

    #[test]
    fn local_delta_candidates_are_sorted_newest_first_and_skip_partial_commits() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).unwrap();
        let txn = Transaction::open(dir.path(), &store, false).unwrap();

        let older = commit_object(100);
        let older_checksum = older.checksum();
        store.write(older_checksum, &older.encode()).unwrap();
        txn.advance_ref(None, "older", older_checksum).unwrap();

        let newer = commit_object(200);
        let newer_checksum = newer.checksum();
        store.write(newer_checksum, &newer.encode()).unwrap();
        txn.advance_ref(None, "newer", newer_checksum).unwrap();

        let partial = commit_object(300);
        let partial_checksum = partial.checksum();
        store.write(partial_checksum, &partial.encode()).unwrap();
        txn.advance_ref(None, "partial", partial_checksum).unwrap();
        txn.begin_commit(partial_checksum).unwrap();

        assert_eq!(
            txn.local_delta_candidates(None),
            vec![newer_checksum, older_checksum]
        );
    }

    #[test]
    fn local_delta_candidates_is_empty_when_no_refs_exist() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).unwrap();
        let txn = Transaction::open(dir.path(), &store, false).unwrap();
        assert!(txn.local_delta_candidates(None).is_empty());
    }
}
