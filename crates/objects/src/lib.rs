#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `dagsync_objects` defines the six object kinds that make up the
//! content-addressed Merkle-DAG repository model (file, dirtree, dirmeta,
//! commit, commit-meta, commit-tombstone) and their canonical binary
//! encoding. The checksum of an object is always the SHA-256 of its
//! canonical encoding; this crate is the only place that encoding is
//! produced or consumed, so every caller sees the same bytes for the same
//! value.
//!
//! # Design
//!
//! [`Object`] is a tagged enum over the six kinds. [`Object::encode`]
//! produces the canonical byte string and [`Object::decode`] parses it back;
//! [`Object::checksum`] hashes the encoding via [`dagsync_checksum::Checksum::of`].
//! Maps ([`Dirmeta::xattrs`], [`Commit::metadata`]) are stored as
//! [`std::collections::BTreeMap`] so iteration order — and therefore the
//! encoded bytes — never depends on insertion order.
//!
//! # Invariants
//!
//! - `Object::decode(object.encode()).unwrap() == object` for every object
//!   (round-trip law R2).
//! - [`Dirtree`] entries are always produced pre-sorted by name; decoding
//!   does not re-sort, so a dirtree built out of order and re-encoded
//!   changes its checksum (matching the spec's "sorted by name" invariant).
//!
//! # Errors
//!
//! [`DecodeError`] reports truncated input, an unknown kind tag, or a
//! malformed length prefix.

use std::collections::BTreeMap;

use dagsync_checksum::Checksum;
use thiserror::Error;

/// A single entry in a [`Dirtree`] listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirtreeEntry {
    /// A file (or symlink/hardlink target) named `name`, addressed by
    /// `checksum`.
    File {
        /// Entry name within the directory.
        name: String,
        /// Checksum of the `file` object.
        checksum: Checksum,
    },
    /// A subdirectory named `name`, with separate dirtree and dirmeta
    /// addresses.
    Dir {
        /// Entry name within the directory.
        name: String,
        /// Checksum of the subdirectory's `dirtree` object.
        tree: Checksum,
        /// Checksum of the subdirectory's `dirmeta` object.
        meta: Checksum,
    },
}

impl DirtreeEntry {
    /// Returns the entry's name, regardless of kind.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::File { name, .. } | Self::Dir { name, .. } => name,
        }
    }
}

/// A directory listing: entries sorted by name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dirtree {
    /// Entries, expected sorted by [`DirtreeEntry::name`].
    pub entries: Vec<DirtreeEntry>,
}

impl Dirtree {
    /// Builds a dirtree from entries, sorting them by name.
    #[must_use]
    pub fn new(mut entries: Vec<DirtreeEntry>) -> Self {
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        Self { entries }
    }

    /// Returns whether the entries are sorted by name, the invariant the
    /// object verifier checks on every dirtree it writes.
    #[must_use]
    pub fn is_sorted(&self) -> bool {
        self.entries.windows(2).all(|w| w[0].name() <= w[1].name())
    }
}

/// Ownership and permission metadata for a directory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dirmeta {
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
    /// POSIX mode bits.
    pub mode: u32,
    /// Extended attributes, name to value, sorted by name.
    pub xattrs: BTreeMap<String, Vec<u8>>,
}

/// A commit: the root of a checked-out tree plus provenance metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Commit {
    /// Free-form metadata, sorted by key.
    pub metadata: BTreeMap<String, Vec<u8>>,
    /// Checksum of the parent commit, if any.
    pub parent: Option<Checksum>,
    /// Refs this commit declares itself bound to.
    pub related_refs: Vec<String>,
    /// One-line subject.
    pub subject: String,
    /// Free-form body.
    pub body: String,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    /// Checksum of the root `dirtree` object.
    pub root_dirtree: Checksum,
    /// Checksum of the root `dirmeta` object.
    pub root_dirmeta: Checksum,
}

/// Detached metadata (typically signatures) addressed by its commit's
/// checksum rather than its own.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitMeta {
    /// Free-form metadata, sorted by key.
    pub metadata: BTreeMap<String, Vec<u8>>,
}

/// A marker recording that a commit was intentionally deleted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitTombstone {
    /// Checksum of the commit this tombstone replaces.
    pub commit: Checksum,
    /// Seconds since the Unix epoch at deletion time.
    pub deleted_at: u64,
}

/// The six object kinds stored and transferred by the pull engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Object {
    /// Regular file, symlink, or hardlink target content.
    File(Vec<u8>),
    /// Directory listing.
    Dirtree(Dirtree),
    /// Directory ownership/permission metadata.
    Dirmeta(Dirmeta),
    /// Top-level provenance and tree-root object.
    Commit(Commit),
    /// Detached per-commit metadata.
    CommitMeta(CommitMeta),
    /// Tombstone for an intentionally deleted commit.
    CommitTombstone(CommitTombstone),
}

/// Wire tag bytes for each [`Object`] variant; stable, never renumbered.
mod tag {
    pub const FILE: u8 = 1;
    pub const DIRTREE: u8 = 2;
    pub const DIRMETA: u8 = 3;
    pub const COMMIT: u8 = 4;
    pub const COMMIT_META: u8 = 5;
    pub const COMMIT_TOMBSTONE: u8 = 6;
}

/// The filename suffix a remote uses for each object kind.
#[must_use]
pub fn wire_suffix(object: &Object) -> &'static str {
    match object {
        Object::File(_) => "file",
        Object::Dirtree(_) => "dirtree",
        Object::Dirmeta(_) => "dirmeta",
        Object::Commit(_) => "commit",
        Object::CommitMeta(_) => "commitmeta",
        Object::CommitTombstone(_) => "commit-tombstone",
    }
}

/// Errors raised while decoding an [`Object`] from bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer ended before a length-prefixed field could be read.
    #[error("truncated object encoding: expected {expected} more bytes, found {found}")]
    Truncated {
        /// Bytes required to continue decoding.
        expected: usize,
        /// Bytes actually remaining.
        found: usize,
    },
    /// The first byte did not match a known object tag.
    #[error("unknown object kind tag {0}")]
    UnknownTag(u8),
    /// A string field was not valid UTF-8.
    #[error("object field is not valid UTF-8")]
    InvalidUtf8,
    /// Trailing bytes remained after the object was fully parsed.
    #[error("{0} trailing bytes after object encoding")]
    TrailingBytes(usize),
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let remaining = self.buf.len() - self.pos;
        if remaining < n {
            return Err(DecodeError::Truncated {
                expected: n,
                found: remaining,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().expect("take(4) returns 4 bytes");
        Ok(u32::from_le_bytes(bytes))
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().expect("take(8) returns 8 bytes");
        Ok(u64::from_le_bytes(bytes))
    }

    fn bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn string(&mut self) -> Result<String, DecodeError> {
        String::from_utf8(self.bytes()?).map_err(|_| DecodeError::InvalidUtf8)
    }

    fn checksum(&mut self) -> Result<Checksum, DecodeError> {
        let bytes = self.take(dagsync_checksum::CHECKSUM_LEN)?;
        Checksum::from_bytes(bytes).map_err(|_| DecodeError::Truncated {
            expected: dagsync_checksum::CHECKSUM_LEN,
            found: bytes.len(),
        })
    }

    fn finish(self) -> Result<(), DecodeError> {
        let remaining = self.buf.len() - self.pos;
        if remaining != 0 {
            return Err(DecodeError::TrailingBytes(remaining));
        }
        Ok(())
    }
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn put_string(out: &mut Vec<u8>, s: &str) {
    put_bytes(out, s.as_bytes());
}

fn put_checksum(out: &mut Vec<u8>, checksum: Checksum) {
    out.extend_from_slice(checksum.as_bytes());
}

fn put_map(out: &mut Vec<u8>, map: &BTreeMap<String, Vec<u8>>) {
    out.extend_from_slice(&(map.len() as u32).to_le_bytes());
    for (key, value) in map {
        put_string(out, key);
        put_bytes(out, value);
    }
}

fn get_map(r: &mut Reader<'_>) -> Result<BTreeMap<String, Vec<u8>>, DecodeError> {
    let count = r.u32()?;
    let mut map = BTreeMap::new();
    for _ in 0..count {
        let key = r.string()?;
        let value = r.bytes()?;
        map.insert(key, value);
    }
    Ok(map)
}

impl Object {
    /// Encodes the object into its canonical byte representation.
    ///
    /// The checksum of an object is always `Checksum::of(&object.encode())`.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Object::File(content) => {
                out.push(tag::FILE);
                put_bytes(&mut out, content);
            }
            Object::Dirtree(tree) => {
                out.push(tag::DIRTREE);
                out.extend_from_slice(&(tree.entries.len() as u32).to_le_bytes());
                for entry in &tree.entries {
                    match entry {
                        DirtreeEntry::File { name, checksum } => {
                            out.push(0);
                            put_string(&mut out, name);
                            put_checksum(&mut out, *checksum);
                        }
                        DirtreeEntry::Dir { name, tree, meta } => {
                            out.push(1);
                            put_string(&mut out, name);
                            put_checksum(&mut out, *tree);
                            put_checksum(&mut out, *meta);
                        }
                    }
                }
            }
            Object::Dirmeta(meta) => {
                out.push(tag::DIRMETA);
                out.extend_from_slice(&meta.uid.to_le_bytes());
                out.extend_from_slice(&meta.gid.to_le_bytes());
                out.extend_from_slice(&meta.mode.to_le_bytes());
                put_map(&mut out, &meta.xattrs);
            }
            Object::Commit(commit) => {
                out.push(tag::COMMIT);
                put_map(&mut out, &commit.metadata);
                match commit.parent {
                    Some(parent) => {
                        out.push(1);
                        put_checksum(&mut out, parent);
                    }
                    None => out.push(0),
                }
                out.extend_from_slice(&(commit.related_refs.len() as u32).to_le_bytes());
                for r in &commit.related_refs {
                    put_string(&mut out, r);
                }
                put_string(&mut out, &commit.subject);
                put_string(&mut out, &commit.body);
                out.extend_from_slice(&commit.timestamp.to_le_bytes());
                put_checksum(&mut out, commit.root_dirtree);
                put_checksum(&mut out, commit.root_dirmeta);
            }
            Object::CommitMeta(meta) => {
                out.push(tag::COMMIT_META);
                put_map(&mut out, &meta.metadata);
            }
            Object::CommitTombstone(tombstone) => {
                out.push(tag::COMMIT_TOMBSTONE);
                put_checksum(&mut out, tombstone.commit);
                out.extend_from_slice(&tombstone.deleted_at.to_le_bytes());
            }
        }
        out
    }

    /// Decodes an object from its canonical byte representation.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(bytes);
        let tag = r.u8()?;
        let object = match tag {
            tag::FILE => Object::File(r.bytes()?),
            tag::DIRTREE => {
                let count = r.u32()?;
                let mut entries = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let kind = r.u8()?;
                    let name = r.string()?;
                    let entry = if kind == 0 {
                        DirtreeEntry::File {
                            name,
                            checksum: r.checksum()?,
                        }
                    } else {
                        DirtreeEntry::Dir {
                            name,
                            tree: r.checksum()?,
                            meta: r.checksum()?,
                        }
                    };
                    entries.push(entry);
                }
                Object::Dirtree(Dirtree { entries })
            }
            tag::DIRMETA => {
                let uid = r.u32()?;
                let gid = r.u32()?;
                let mode = r.u32()?;
                let xattrs = get_map(&mut r)?;
                Object::Dirmeta(Dirmeta {
                    uid,
                    gid,
                    mode,
                    xattrs,
                })
            }
            tag::COMMIT => {
                let metadata = get_map(&mut r)?;
                let parent = if r.u8()? == 1 {
                    Some(r.checksum()?)
                } else {
                    None
                };
                let ref_count = r.u32()?;
                let mut related_refs = Vec::with_capacity(ref_count as usize);
                for _ in 0..ref_count {
                    related_refs.push(r.string()?);
                }
                let subject = r.string()?;
                let body = r.string()?;
                let timestamp = r.u64()?;
                let root_dirtree = r.checksum()?;
                let root_dirmeta = r.checksum()?;
                Object::Commit(Commit {
                    metadata,
                    parent,
                    related_refs,
                    subject,
                    body,
                    timestamp,
                    root_dirtree,
                    root_dirmeta,
                })
            }
            tag::COMMIT_META => Object::CommitMeta(CommitMeta {
                metadata: get_map(&mut r)?,
            }),
            tag::COMMIT_TOMBSTONE => Object::CommitTombstone(CommitTombstone {
                commit: r.checksum()?,
                deleted_at: r.u64()?,
            }),
            other => return Err(DecodeError::UnknownTag(other)),
        };
        r.finish()?;
        Ok(object)
    }

    /// Hashes the canonical encoding, producing this object's address.
    #[must_use]
    pub fn checksum(&self) -> Checksum {
        Checksum::of(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_commit() -> Commit {
        let mut metadata = BTreeMap::new();
        metadata.insert("version".to_string(), b"1".to_vec());
        Commit {
            metadata,
            parent: Some(Checksum::of(b"parent")),
            related_refs: vec!["stable".to_string()],
            subject: "release".to_string(),
            body: "notes".to_string(),
            timestamp: 1_700_000_000,
            root_dirtree: Checksum::of(b"tree"),
            root_dirmeta: Checksum::of(b"meta"),
        }
    }

    #[test]
    fn file_round_trips() {
        let object = Object::File(b"contents".to_vec());
        let encoded = object.encode();
        assert_eq!(Object::decode(&encoded).unwrap(), object);
    }

    #[test]
    fn dirtree_round_trips_and_stays_sorted() {
        let tree = Dirtree::new(vec![
            DirtreeEntry::File {
                name: "zeta".to_string(),
                checksum: Checksum::of(b"z"),
            },
            DirtreeEntry::File {
                name: "alpha".to_string(),
                checksum: Checksum::of(b"a"),
            },
        ]);
        assert!(tree.is_sorted());
        assert_eq!(tree.entries[0].name(), "alpha");
        let object = Object::Dirtree(tree);
        let encoded = object.encode();
        assert_eq!(Object::decode(&encoded).unwrap(), object);
    }

    #[test]
    fn commit_round_trips() {
        let object = Object::Commit(sample_commit());
        let encoded = object.encode();
        assert_eq!(Object::decode(&encoded).unwrap(), object);
    }

    #[test]
    fn tombstone_round_trips() {
        let object = Object::CommitTombstone(CommitTombstone {
            commit: Checksum::of(b"dead"),
            deleted_at: 42,
        });
        let encoded = object.encode();
        assert_eq!(Object::decode(&encoded).unwrap(), object);
    }

    #[test]
    fn checksum_is_a_function_of_the_encoding() {
        let a = Object::File(b"same".to_vec());
        let b = Object::File(b"same".to_vec());
        assert_eq!(a.checksum(), b.checksum());
    }

    #[test]
    fn decode_rejects_unknown_tag() {
        assert_eq!(Object::decode(&[255]), Err(DecodeError::UnknownTag(255)));
    }

    #[test]
    fn decode_rejects_truncated_input() {
        let object = Object::File(b"x".to_vec());
        let mut encoded = object.encode();
        encoded.truncate(encoded.len() - 1);
        assert!(matches!(
            Object::decode(&encoded),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let object = Object::File(b"x".to_vec());
        let mut encoded = object.encode();
        encoded.push(0);
        assert!(matches!(
            Object::decode(&encoded),
            Err(DecodeError::TrailingBytes(1))
        ));
    }

    proptest::proptest! {
        #[test]
        fn file_round_trip_prop(bytes: Vec<u8>) {
            let object = Object::File(bytes);
            let encoded = object.encode();
            proptest::prop_assert_eq!(Object::decode(&encoded).unwrap(), object);
        }
    }
}
