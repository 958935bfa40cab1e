//! End-to-end tests driving `dagsync_engine::pull` against hand-built
//! `file://` fixtures, with no network and no running toolchain beyond what
//! `cargo test` itself does.

use std::collections::BTreeMap;
use std::path::Path;

use base64::Engine as _;
use dagsync_checksum::Checksum;
use dagsync_core::{PullErrorKind, PullOptionsBuilder};
use dagsync_delta::{DeltaApplier, DeltaApplyError};
use dagsync_engine::pull;
use dagsync_engine::transaction::Transaction;
use dagsync_objects::{Commit, CommitMeta, Dirmeta, Dirtree, DirtreeEntry, Object, wire_suffix};
use dagsync_store::{FsObjectStore, ObjectStore};
use dagsync_summary::delta::{PartHeader, Superblock};
use dagsync_summary::{RefEntry, RepoMode, Summary};
use dagsync_verify::{SignatureVerifier, VerifyError};

fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

fn write_remote_object(remote_root: &Path, object: &Object) -> (Checksum, Vec<u8>) {
    let encoded = object.encode();
    let checksum = Checksum::of(&encoded);
    let (head, tail) = checksum.split_object_path();
    let dir = remote_root.join("objects").join(&head);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(format!("{tail}.{}", wire_suffix(object))), &encoded).unwrap();
    (checksum, encoded)
}

fn write_commit_meta(remote_root: &Path, commit: Checksum, meta: CommitMeta) {
    let (head, tail) = commit.split_object_path();
    let dir = remote_root.join("objects").join(&head);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(format!("{tail}.commitmeta")), Object::CommitMeta(meta).encode()).unwrap();
}

fn base64_of(bytes: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn delta_dir(to: Checksum, from: Option<Checksum>) -> String {
    let bytes = to.as_bytes();
    let head = base64_of(&bytes[..1]);
    let tail = base64_of(&bytes[1..]);
    match from {
        Some(from) => format!("deltas/{head}/{tail}-{}", base64_of(from.as_bytes())),
        None => format!("deltas/{head}/{tail}"),
    }
}

fn write_delta(remote_root: &Path, to: Checksum, from: Option<Checksum>, superblock: &Superblock, parts: &[Vec<u8>]) {
    let dir = remote_root.join(delta_dir(to, from));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("superblock"), superblock.encode()).unwrap();
    for (index, part) in parts.iter().enumerate() {
        std::fs::write(dir.join(index.to_string()), part).unwrap();
    }
}

fn write_summary(remote_root: &Path, refs: &[(&str, Checksum)], static_deltas: &[(String, Checksum)]) {
    let mut ref_map = BTreeMap::new();
    for (name, commit) in refs {
        ref_map.insert((*name).to_string(), RefEntry { commit_size: 0, commit_checksum: *commit, aux: Vec::new() });
    }
    let summary = Summary {
        refs: ref_map,
        collection_id: None,
        collection_map: BTreeMap::new(),
        static_deltas: static_deltas.iter().cloned().collect(),
        indexed_deltas: false,
        tombstone_commits: false,
        mode: RepoMode::Archive,
        last_modified: 0,
    };
    std::fs::write(remote_root.join("summary"), summary.encode()).unwrap();
}

/// A single commit with a one-file tree, written straight into a remote
/// object store at `remote_root/objects/...`.
struct Fixture {
    commit: Checksum,
    commit_bytes: Vec<u8>,
    dirtree: Checksum,
    dirtree_bytes: Vec<u8>,
    dirmeta: Checksum,
    dirmeta_bytes: Vec<u8>,
    file: Checksum,
    file_bytes: Vec<u8>,
}

fn build_commit_fixture(
    remote_root: &Path,
    ref_name: &str,
    subject: &str,
    timestamp: u64,
    parent: Option<Checksum>,
    content: &[u8],
) -> Fixture {
    let (file, file_bytes) = write_remote_object(remote_root, &Object::File(content.to_vec()));
    let (dirmeta, dirmeta_bytes) = write_remote_object(remote_root, &Object::Dirmeta(Dirmeta::default()));
    let tree = Dirtree::new(vec![DirtreeEntry::File { name: "hello.txt".to_string(), checksum: file }]);
    let (dirtree, dirtree_bytes) = write_remote_object(remote_root, &Object::Dirtree(tree));
    let commit = Commit {
        metadata: BTreeMap::new(),
        parent,
        related_refs: vec![ref_name.to_string()],
        subject: subject.to_string(),
        body: String::new(),
        timestamp,
        root_dirtree: dirtree,
        root_dirmeta: dirmeta,
    };
    let (commit, commit_bytes) = write_remote_object(remote_root, &Object::Commit(commit));
    Fixture { commit, commit_bytes, dirtree, dirtree_bytes, dirmeta, dirmeta_bytes, file, file_bytes }
}

fn seed_local(local_store: &FsObjectStore, fixture: &Fixture) {
    local_store.write(fixture.commit, &fixture.commit_bytes).unwrap();
    local_store.write(fixture.dirtree, &fixture.dirtree_bytes).unwrap();
    local_store.write(fixture.dirmeta, &fixture.dirmeta_bytes).unwrap();
    local_store.write(fixture.file, &fixture.file_bytes).unwrap();
}

fn read_ref(local_root: &Path, name: &str) -> Checksum {
    let text = std::fs::read_to_string(local_root.join("refs").join(name)).unwrap();
    Checksum::from_hex(text.trim()).unwrap()
}

struct FixedDeltaApplier {
    objects: Vec<(Checksum, Object)>,
}

impl DeltaApplier for FixedDeltaApplier {
    fn apply(&self, _superblock: &Superblock, _parts: &[Vec<u8>]) -> Result<Vec<(Checksum, Object)>, DeltaApplyError> {
        Ok(self.objects.clone())
    }
}

struct AlwaysFailVerifier;

impl SignatureVerifier for AlwaysFailVerifier {
    fn verify(&self, _message: &[u8], _signature: &[u8]) -> Result<(), VerifyError> {
        Err(VerifyError::SignatureInvalid)
    }
}

#[tokio::test]
async fn fresh_pull_one_ref_no_deltas() {
    let remote = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    let fixture = build_commit_fixture(remote.path(), "main", "initial", 1_700_000_000, None, b"hello\n");
    write_summary(remote.path(), &[("main", fixture.commit)], &[]);

    let options = PullOptionsBuilder::new(["main"]).build().unwrap();
    let outcome = pull(local.path(), &file_url(remote.path()), &options, None, None).await.unwrap();

    assert_eq!(outcome.refs.len(), 1);
    assert_eq!(outcome.refs[0].0.name, "main");
    assert_eq!(outcome.refs[0].0.commit, fixture.commit);
    assert!(outcome.refs[0].1, "a brand-new ref should report as moved");

    let store = FsObjectStore::open(local.path()).unwrap();
    assert!(store.has(fixture.commit));
    assert!(store.has(fixture.dirtree));
    assert!(store.has(fixture.dirmeta));
    assert!(store.has(fixture.file));
    assert_eq!(read_ref(local.path(), "main"), fixture.commit);
}

#[tokio::test]
async fn resumed_pull_after_crash_fetches_only_the_missing_object() {
    let remote = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    let fixture = build_commit_fixture(remote.path(), "main", "initial", 1_700_000_000, None, b"hello\n");
    write_summary(remote.path(), &[("main", fixture.commit)], &[]);

    // Simulate a crash that landed the commit/tree/meta objects locally but
    // never got to the leaf file, leaving the commit's partial marker set.
    let local_store = FsObjectStore::open(local.path()).unwrap();
    local_store.write(fixture.commit, &fixture.commit_bytes).unwrap();
    local_store.write(fixture.dirtree, &fixture.dirtree_bytes).unwrap();
    local_store.write(fixture.dirmeta, &fixture.dirmeta_bytes).unwrap();
    let state_dir = dagsync_store::state_dir(local.path()).unwrap();
    dagsync_store::state::mark_partial(&state_dir, fixture.commit).unwrap();

    let options = PullOptionsBuilder::new(["main"]).build().unwrap();
    let outcome = pull(local.path(), &file_url(remote.path()), &options, None, None).await.unwrap();

    assert!(outcome.refs[0].1);
    let store = FsObjectStore::open(local.path()).unwrap();
    assert!(store.has(fixture.file), "the missing leaf object should now be present");
    assert!(!dagsync_store::state::is_partial(&state_dir, fixture.commit));
    assert_eq!(read_ref(local.path(), "main"), fixture.commit);
}

#[tokio::test]
async fn delta_with_from_applies_and_advances_the_ref() {
    let remote = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();

    let base = build_commit_fixture(remote.path(), "main", "initial", 1_700_000_000, None, b"hello\n");
    let local_store = FsObjectStore::open(local.path()).unwrap();
    seed_local(&local_store, &base);
    let txn = Transaction::open(local.path(), &local_store, false).unwrap();
    txn.advance_ref(None, "main", base.commit).unwrap();

    let (file_to, _) = write_remote_object(remote.path(), &Object::File(b"hello, again\n".to_vec()));
    let (dirmeta_to, _) = write_remote_object(remote.path(), &Object::Dirmeta(Dirmeta::default()));
    let tree_to = Dirtree::new(vec![DirtreeEntry::File { name: "hello.txt".to_string(), checksum: file_to }]);
    let (dirtree_to, _) = write_remote_object(remote.path(), &Object::Dirtree(tree_to));
    let commit_to_object = Commit {
        metadata: BTreeMap::new(),
        parent: Some(base.commit),
        related_refs: vec!["main".to_string()],
        subject: "second".to_string(),
        body: String::new(),
        timestamp: 1_700_000_100,
        root_dirtree: dirtree_to,
        root_dirmeta: dirmeta_to,
    };
    let commit_to_bytes = Object::Commit(commit_to_object).encode();
    let commit_to = Checksum::of(&commit_to_bytes);
    // Deliberately not written as a plain remote object: only the delta
    // superblock carries it, proving the target commit came from the delta
    // path rather than the ordinary object walk.

    let part = b"synthetic-delta-part".to_vec();
    let part_checksum = Checksum::of(&part);
    let superblock = Superblock {
        metadata: BTreeMap::new(),
        to_commit: commit_to,
        to_commit_inline: commit_to_bytes,
        from_commit: Some(base.commit),
        parts: vec![PartHeader { size: part.len() as u64, checksum: part_checksum }],
        fallback_objects: Vec::new(),
    };
    write_delta(remote.path(), commit_to, Some(base.commit), &superblock, &[part]);
    write_summary(
        remote.path(),
        &[("main", commit_to)],
        &[(format!("{commit_to}-{}", base.commit), Checksum::of(b"delta-marker"))],
    );

    let applier = FixedDeltaApplier {
        objects: vec![
            (file_to, Object::File(b"hello, again\n".to_vec())),
            (dirmeta_to, Object::Dirmeta(Dirmeta::default())),
            (
                dirtree_to,
                Object::Dirtree(Dirtree::new(vec![DirtreeEntry::File {
                    name: "hello.txt".to_string(),
                    checksum: file_to,
                }])),
            ),
        ],
    };

    let options = PullOptionsBuilder::new(["main"]).build().unwrap();
    let outcome = pull(local.path(), &file_url(remote.path()), &options, None, Some(&applier)).await.unwrap();

    assert_eq!(outcome.refs[0].0.commit, commit_to);
    assert!(outcome.refs[0].1);
    let store = FsObjectStore::open(local.path()).unwrap();
    assert!(store.has(commit_to));
    assert!(store.has(dirtree_to));
    assert!(store.has(file_to));
    assert_eq!(read_ref(local.path(), "main"), commit_to);
}

#[tokio::test]
async fn commit_signature_failure_is_fatal_and_leaves_the_store_untouched() {
    let remote = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    let fixture = build_commit_fixture(remote.path(), "main", "initial", 1_700_000_000, None, b"hello\n");
    write_summary(remote.path(), &[("main", fixture.commit)], &[]);

    let mut metadata = BTreeMap::new();
    metadata.insert("ed25519-signature".to_string(), vec![0u8; 64]);
    write_commit_meta(remote.path(), fixture.commit, CommitMeta { metadata });

    let options = PullOptionsBuilder::new(["main"]).gpg_verify(true).build().unwrap();
    let verifier = AlwaysFailVerifier;
    let err = pull(local.path(), &file_url(remote.path()), &options, Some(&verifier), None).await.unwrap_err();
    assert!(matches!(err.kind(), PullErrorKind::Verification));

    assert!(!local.path().join("refs").join("main").exists());
    let store = FsObjectStore::open(local.path()).unwrap();
    assert!(!store.has(fixture.commit));
}

#[tokio::test]
async fn timestamp_check_rejects_a_regressing_commit() {
    let remote = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();

    let newer = build_commit_fixture(remote.path(), "main", "newer", 1_700_000_500, None, b"new content\n");
    let local_store = FsObjectStore::open(local.path()).unwrap();
    seed_local(&local_store, &newer);
    let txn = Transaction::open(local.path(), &local_store, false).unwrap();
    txn.advance_ref(None, "main", newer.commit).unwrap();

    let older = build_commit_fixture(remote.path(), "main", "older", 1_700_000_000, None, b"old content\n");
    write_summary(remote.path(), &[("main", older.commit)], &[]);

    let options = PullOptionsBuilder::new(["main"]).timestamp_check(true).build().unwrap();
    let err = pull(local.path(), &file_url(remote.path()), &options, None, None).await.unwrap_err();
    assert!(matches!(err.kind(), PullErrorKind::Verification));
    assert_eq!(read_ref(local.path(), "main"), newer.commit, "a rejected pull must not move the ref");
}

#[tokio::test]
async fn scan_tolerates_missing_parent_within_depth() {
    let remote = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();

    // The child's `parent` checksum is never published as a remote object,
    // simulating a remote whose retention window has already dropped it.
    let missing_parent = Checksum::of(b"never-published-ancestor");
    let child = build_commit_fixture(
        remote.path(),
        "main",
        "child",
        1_700_000_100,
        Some(missing_parent),
        b"child content\n",
    );
    write_summary(remote.path(), &[("main", child.commit)], &[]);

    // Default depth (-1, infinite) keeps the history walk enabled.
    let options = PullOptionsBuilder::new(["main"]).build().unwrap();
    let outcome = pull(local.path(), &file_url(remote.path()), &options, None, None).await.unwrap();

    assert!(outcome.refs[0].1);
    let store = FsObjectStore::open(local.path()).unwrap();
    assert!(store.has(child.commit), "the child commit itself must still land");
    assert!(!store.has(missing_parent), "a tolerated missing parent is never synthesized");
    assert_eq!(read_ref(local.path(), "main"), child.commit);
}

#[tokio::test]
async fn pull_falls_back_to_direct_ref_fetch_when_remote_has_no_summary() {
    let remote = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    let fixture = build_commit_fixture(remote.path(), "main", "initial", 1_700_000_000, None, b"hello\n");

    // Deliberately no `write_summary` call: the remote publishes refs
    // directly under `refs/heads/<name>` instead.
    let heads_dir = remote.path().join("refs").join("heads");
    std::fs::create_dir_all(&heads_dir).unwrap();
    std::fs::write(heads_dir.join("main"), format!("{}\n", fixture.commit)).unwrap();

    let options = PullOptionsBuilder::new(["main"]).build().unwrap();
    let outcome = pull(local.path(), &file_url(remote.path()), &options, None, None).await.unwrap();

    assert_eq!(outcome.refs[0].0.commit, fixture.commit);
    assert!(outcome.refs[0].1);
    let store = FsObjectStore::open(local.path()).unwrap();
    assert!(store.has(fixture.commit));
    assert!(store.has(fixture.file));
    assert_eq!(read_ref(local.path(), "main"), fixture.commit);
}

#[tokio::test]
async fn mirror_list_falls_back_to_the_first_reachable_candidate() {
    let root = tempfile::tempdir().unwrap();
    let broken = root.path().join("mirror-a");
    let good = root.path().join("mirror-b");
    std::fs::create_dir_all(&good).unwrap();
    // mirror-a is left without a `config` file, so probing it fails outright.
    std::fs::write(good.join("config"), b"[core]\nrepo_version=1\n").unwrap();

    let fixture = build_commit_fixture(&good, "main", "initial", 1_700_000_000, None, b"hello\n");
    write_summary(&good, &[("main", fixture.commit)], &[]);

    let mirrorlist_dir = tempfile::tempdir().unwrap();
    let mirrorlist_path = mirrorlist_dir.path().join("mirrorlist.txt");
    std::fs::write(
        &mirrorlist_path,
        format!("{}\n{}\n", file_url(&broken), file_url(&good)),
    )
    .unwrap();

    let local = tempfile::tempdir().unwrap();
    let remote_base = format!("mirrorlist={}", file_url(&mirrorlist_path));
    let options = PullOptionsBuilder::new(["main"]).build().unwrap();
    let outcome = pull(local.path(), &remote_base, &options, None, None).await.unwrap();

    assert_eq!(outcome.refs[0].0.commit, fixture.commit);
    assert!(outcome.refs[0].1);
    let store = FsObjectStore::open(local.path()).unwrap();
    assert!(store.has(fixture.commit));
}
