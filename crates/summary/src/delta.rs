//! Static delta wire format: the superblock, its part headers, and the
//! fallback-object list a remote publishes under `deltas/<to>-<from>/`.
//!
//! Applying a delta's parts to materialize new objects is a collaborator's
//! job (§1, the delta-application engine is invoked, not implemented,
//! here); this module only parses what the remote published so
//! `dagsync-delta::select` can decide whether a delta is usable and the
//! engine can hand its parts to that collaborator.

use std::collections::BTreeMap;

use dagsync_checksum::Checksum;

use crate::wire::{self, Reader, WireError};

/// One part of a static delta: a byte range the delta-apply collaborator
/// consumes to materialize some of the target commit's objects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartHeader {
    /// Size in bytes of the part's payload.
    pub size: u64,
    /// Checksum of the part's payload, verified before it is handed to the
    /// delta-apply collaborator.
    pub checksum: Checksum,
}

/// The metadata header of a static delta, found at `deltas/<to>[-<from>]/superblock`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Superblock {
    /// Free-form metadata the remote attached to the delta.
    pub metadata: BTreeMap<String, Vec<u8>>,
    /// Checksum of the target commit.
    pub to_commit: Checksum,
    /// The target commit's encoded bytes, inlined so the engine need not
    /// fetch the commit object separately once the delta is selected.
    pub to_commit_inline: Vec<u8>,
    /// Checksum of the base commit, `None` for a scratch delta (`∅ -> to`).
    pub from_commit: Option<Checksum>,
    /// Headers for each numbered part (`deltas/.../<N>`).
    pub parts: Vec<PartHeader>,
    /// Objects the delta cannot synthesize and which must be fetched
    /// individually once the delta is applied.
    pub fallback_objects: Vec<Checksum>,
}

impl Superblock {
    /// Whether this is a scratch delta (base is the empty commit).
    #[must_use]
    pub fn is_scratch(&self) -> bool {
        self.from_commit.is_none()
    }

    /// Encodes the superblock to its canonical byte representation.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.metadata.len() as u32).to_le_bytes());
        for (key, value) in &self.metadata {
            wire::put_string(&mut out, key);
            wire::put_bytes(&mut out, value);
        }
        wire::put_checksum(&mut out, self.to_commit);
        wire::put_bytes(&mut out, &self.to_commit_inline);
        match self.from_commit {
            Some(from) => {
                out.push(1);
                wire::put_checksum(&mut out, from);
            }
            None => out.push(0),
        }
        out.extend_from_slice(&(self.parts.len() as u32).to_le_bytes());
        for part in &self.parts {
            out.extend_from_slice(&part.size.to_le_bytes());
            wire::put_checksum(&mut out, part.checksum);
        }
        out.extend_from_slice(&(self.fallback_objects.len() as u32).to_le_bytes());
        for checksum in &self.fallback_objects {
            wire::put_checksum(&mut out, *checksum);
        }
        out
    }

    /// Decodes a superblock from its canonical byte representation.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(bytes);
        let meta_count = r.u32()?;
        let mut metadata = BTreeMap::new();
        for _ in 0..meta_count {
            let key = r.string()?;
            let value = r.bytes()?;
            metadata.insert(key, value);
        }
        let to_commit = r.checksum()?;
        let to_commit_inline = r.bytes()?;
        let from_commit = if r.u8()? == 1 {
            Some(r.checksum()?)
        } else {
            None
        };
        let part_count = r.u32()?;
        let mut parts = Vec::with_capacity(part_count as usize);
        for _ in 0..part_count {
            let size = r.u64()?;
            let checksum = r.checksum()?;
            parts.push(PartHeader { size, checksum });
        }
        let fallback_count = r.u32()?;
        let mut fallback_objects = Vec::with_capacity(fallback_count as usize);
        for _ in 0..fallback_count {
            fallback_objects.push(r.checksum()?);
        }
        if r.remaining() != 0 {
            return Err(WireError::Truncated {
                expected: 0,
                found: r.remaining(),
            });
        }
        Ok(Self {
            metadata,
            to_commit,
            to_commit_inline,
            from_commit,
            parts,
            fallback_objects,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Superblock {
        Superblock {
            metadata: BTreeMap::new(),
            to_commit: Checksum::of(b"to"),
            to_commit_inline: b"encoded-commit".to_vec(),
            from_commit: Some(Checksum::of(b"from")),
            parts: vec![PartHeader {
                size: 4096,
                checksum: Checksum::of(b"part-0"),
            }],
            fallback_objects: vec![Checksum::of(b"fallback")],
        }
    }

    #[test]
    fn round_trips() {
        let superblock = sample();
        let encoded = superblock.encode();
        assert_eq!(Superblock::decode(&encoded).unwrap(), superblock);
    }

    #[test]
    fn scratch_delta_has_no_from_commit() {
        let mut superblock = sample();
        superblock.from_commit = None;
        assert!(superblock.is_scratch());
        let encoded = superblock.encode();
        assert_eq!(Superblock::decode(&encoded).unwrap(), superblock);
    }
}
