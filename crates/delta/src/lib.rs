#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `dagsync_delta` is C5, the delta selector: given a target commit and the
//! remote's advertised static-delta table, it picks the best usable "from"
//! commit (or a scratch delta, or nothing) before the scheduler starts
//! fetching. Actually materializing objects from a selected delta's parts
//! is an external collaborator's job — the parent specification names the
//! delta-application engine as invoked, not implemented, here — so this
//! crate also defines [`DeltaApplier`], the trait boundary the engine
//! calls through.
//!
//! # Design
//!
//! [`select`] prefers an incremental delta (`from -> to`) over a scratch
//! delta (`∅ -> to`) whenever a candidate `from` commit is already present
//! locally, since an incremental delta transfers less data. Candidates are
//! tried in the caller's supplied order (typically most-recent-first) and
//! the first advertised match wins.
//!
//! # Errors
//!
//! [`select`] never fails outright — "no usable delta" is
//! [`DeltaSelection::None`], not an error, since the spec requires falling
//! back to an object walk in that case, not aborting the pull.

use dagsync_checksum::Checksum;
use dagsync_objects::Object;
use dagsync_summary::delta::Superblock;
use dagsync_summary::Summary;
use thiserror::Error;

/// The outcome of delta selection for one target commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeltaSelection {
    /// Use the advertised `from -> to` delta.
    Incremental {
        /// The locally-present commit this delta transforms.
        from: Checksum,
        /// Checksum of the delta's superblock object.
        delta: Checksum,
    },
    /// Use the advertised `∅ -> to` (scratch) delta.
    Scratch {
        /// Checksum of the delta's superblock object.
        delta: Checksum,
    },
    /// No usable delta is advertised; fall back to the object walk.
    None,
}

/// Picks the best delta for `to`, preferring an incremental delta from one
/// of `local_candidates` (tried in order) over the scratch delta.
#[must_use]
pub fn select(summary: &Summary, to: Checksum, local_candidates: &[Checksum]) -> DeltaSelection {
    for &from in local_candidates {
        if let Some(delta) = summary.delta_for(to, Some(from)) {
            return DeltaSelection::Incremental { from, delta };
        }
    }
    if let Some(delta) = summary.delta_for(to, None) {
        return DeltaSelection::Scratch { delta };
    }
    DeltaSelection::None
}

/// Errors raised while applying a selected delta's parts.
#[derive(Debug, Error)]
pub enum DeltaApplyError {
    /// A part failed to verify or decode.
    #[error("delta part {index} failed to apply: {message}")]
    PartFailed {
        /// Index of the failing part.
        index: usize,
        /// Human-readable detail.
        message: String,
    },
    /// The delta required a `from` commit that was not actually present
    /// locally when apply was attempted.
    #[error("delta requires base commit {0} which is not present locally")]
    MissingBase(Checksum),
}

/// Trait boundary for the delta-application engine: given a superblock and
/// its parts' raw bytes (already checksum-verified against the
/// superblock's [`dagsync_summary::delta::PartHeader`] entries), produce
/// the objects the delta synthesizes.
pub trait DeltaApplier: Send + Sync {
    /// Applies `superblock`'s parts, returning the `(checksum, object)`
    /// pairs it synthesizes. Objects in `superblock.fallback_objects` are
    /// not produced here; the scheduler fetches them individually.
    fn apply(
        &self,
        superblock: &Superblock,
        parts: &[Vec<u8>],
    ) -> Result<Vec<(Checksum, Object)>, DeltaApplyError>;
}
