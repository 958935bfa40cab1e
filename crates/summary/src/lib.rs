#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `dagsync_summary` models the `summary` file (a signed index of refs and
//! advertised static deltas published by a remote) and the static-delta
//! wire format it advertises. Both are parsed here; *writing* a summary is
//! a remote-side concern the pull engine never performs (§1, deliberately
//! out of scope), so only decoding and round-trip-safe encoding live in
//! this crate.
//!
//! # Design
//!
//! [`Summary`] carries the ref table plus remote metadata (collection id,
//! collection map, advertised static deltas, the `indexed-deltas` and
//! `tombstone-commits` flags, mode, and last-modified timestamp). The
//! [`delta`] submodule models a static delta's superblock, part headers,
//! and fallback-object list.
//!
//! # Errors
//!
//! Decoding failures surface as [`wire::WireError`], which the engine maps
//! to a verification-class `dagsync-core` error (a malformed summary is
//! always a verification failure, never a retryable network error).

pub mod delta;
mod wire;

use std::collections::BTreeMap;

use dagsync_checksum::Checksum;
pub use wire::WireError;

/// A single ref's entry in a [`Summary`]'s index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefEntry {
    /// Size in bytes of the commit object this ref points at, as advertised
    /// by the remote (not independently verified until the commit is
    /// fetched and decoded).
    pub commit_size: u64,
    /// Checksum of the commit object this ref points at.
    pub commit_checksum: Checksum,
    /// Opaque auxiliary metadata the remote attached to this ref entry.
    pub aux: Vec<u8>,
}

/// Storage mode a remote advertises for its object store, relevant to
/// `bareuseronly` verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepoMode {
    /// Ordinary mode: any uid/gid is permitted.
    Archive,
    /// `bareuseronly` mode: file objects must be owner-zero regular files
    /// or symlinks.
    BareUserOnly,
}

/// A parsed `summary` file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Summary {
    /// Ref name to commit entry, sorted by name.
    pub refs: BTreeMap<String, RefEntry>,
    /// Collection id of the remote repository, if it advertises one.
    pub collection_id: Option<String>,
    /// Additional `(collection-id, URI)` pairs the remote is collection-bound to.
    pub collection_map: BTreeMap<String, String>,
    /// Advertised static deltas, keyed by `"<to>"` or `"<to>-<from>"` the
    /// way the remote's `deltas/` path layout keys them.
    pub static_deltas: BTreeMap<String, Checksum>,
    /// Whether the remote publishes `delta-indexes/` for large deltas.
    pub indexed_deltas: bool,
    /// Whether the remote tombstones deleted commits rather than merely
    /// dropping the ref.
    pub tombstone_commits: bool,
    /// The remote's advertised storage mode.
    pub mode: RepoMode,
    /// Seconds since the Unix epoch the summary was last regenerated.
    pub last_modified: u64,
}

impl Summary {
    /// Looks up a ref's commit checksum by name.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Checksum> {
        self.refs.get(name).map(|entry| entry.commit_checksum)
    }

    /// Returns the advertised delta for `to`, preferring `from -> to` over
    /// the scratch (`∅ -> to`) entry when both are present.
    #[must_use]
    pub fn delta_for(&self, to: Checksum, from: Option<Checksum>) -> Option<Checksum> {
        if let Some(from) = from {
            let key = format!("{to}-{from}");
            if let Some(checksum) = self.static_deltas.get(&key) {
                return Some(*checksum);
            }
        }
        self.static_deltas.get(&to.to_string()).copied()
    }

    /// Encodes the summary to its canonical byte representation.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.refs.len() as u32).to_le_bytes());
        for (name, entry) in &self.refs {
            wire::put_string(&mut out, name);
            out.extend_from_slice(&entry.commit_size.to_le_bytes());
            wire::put_checksum(&mut out, entry.commit_checksum);
            wire::put_bytes(&mut out, &entry.aux);
        }
        match &self.collection_id {
            Some(id) => {
                out.push(1);
                wire::put_string(&mut out, id);
            }
            None => out.push(0),
        }
        out.extend_from_slice(&(self.collection_map.len() as u32).to_le_bytes());
        for (id, uri) in &self.collection_map {
            wire::put_string(&mut out, id);
            wire::put_string(&mut out, uri);
        }
        out.extend_from_slice(&(self.static_deltas.len() as u32).to_le_bytes());
        for (key, checksum) in &self.static_deltas {
            wire::put_string(&mut out, key);
            wire::put_checksum(&mut out, *checksum);
        }
        out.push(u8::from(self.indexed_deltas));
        out.push(u8::from(self.tombstone_commits));
        out.push(match self.mode {
            RepoMode::Archive => 0,
            RepoMode::BareUserOnly => 1,
        });
        out.extend_from_slice(&self.last_modified.to_le_bytes());
        out
    }

    /// Decodes a summary from its canonical byte representation.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut r = wire::Reader::new(bytes);
        let ref_count = r.u32()?;
        let mut refs = BTreeMap::new();
        for _ in 0..ref_count {
            let name = r.string()?;
            let commit_size = r.u64()?;
            let commit_checksum = r.checksum()?;
            let aux = r.bytes()?;
            refs.insert(
                name,
                RefEntry {
                    commit_size,
                    commit_checksum,
                    aux,
                },
            );
        }
        let collection_id = if r.u8()? == 1 {
            Some(r.string()?)
        } else {
            None
        };
        let map_count = r.u32()?;
        let mut collection_map = BTreeMap::new();
        for _ in 0..map_count {
            let id = r.string()?;
            let uri = r.string()?;
            collection_map.insert(id, uri);
        }
        let delta_count = r.u32()?;
        let mut static_deltas = BTreeMap::new();
        for _ in 0..delta_count {
            let key = r.string()?;
            let checksum = r.checksum()?;
            static_deltas.insert(key, checksum);
        }
        let indexed_deltas = r.u8()? == 1;
        let tombstone_commits = r.u8()? == 1;
        let mode = match r.u8()? {
            0 => RepoMode::Archive,
            1 => RepoMode::BareUserOnly,
            other => return Err(WireError::UnknownTag(other)),
        };
        let last_modified = r.u64()?;
        if r.remaining() != 0 {
            return Err(WireError::Truncated {
                expected: 0,
                found: r.remaining(),
            });
        }
        Ok(Self {
            refs,
            collection_id,
            collection_map,
            static_deltas,
            indexed_deltas,
            tombstone_commits,
            mode,
            last_modified,
        })
    }
}
