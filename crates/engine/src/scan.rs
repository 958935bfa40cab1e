//! The scan queue (C6): walks the object graph reachable from a target
//! commit, producing the frontier of checksums the scheduler still needs
//! to fetch. Two distinct walks share this module: the *tree* walk (a
//! commit's `root_dirtree`/`root_dirmeta` and their descendants) and the
//! *history* walk (a commit's `parent` chain, bounded by the caller's
//! `depth` option rather than [`MAX_TREE_DEPTH`]).

use std::collections::VecDeque;

use dagsync_checksum::Checksum;
use dagsync_core::error::{PullError, PullErrorKind};
use dagsync_objects::{DirtreeEntry, Object};
use rustc_hash::FxHashSet;

/// Hard ceiling on tree-walk recursion depth (P8's depth bound). A real
/// checked-out tree never approaches this; hitting it means a
/// pathologically or maliciously deep dirtree, which is a verification
/// failure rather than a stack overflow.
pub const MAX_TREE_DEPTH: u32 = 256;

/// The checksums a decoded object directly references, i.e. its children
/// in the tree walk. A commit's `parent` is deliberately excluded — that
/// edge belongs to the history walk, not the tree walk.
#[must_use]
pub fn children_of(object: &Object) -> Vec<Checksum> {
    match object {
        Object::File(_) | Object::Dirmeta(_) | Object::CommitMeta(_) | Object::CommitTombstone(_) => {
            Vec::new()
        }
        Object::Dirtree(dirtree) => dirtree
            .entries
            .iter()
            .flat_map(|entry| match entry {
                DirtreeEntry::File { checksum, .. } => vec![*checksum],
                DirtreeEntry::Dir { tree, meta, .. } => vec![*tree, *meta],
            })
            .collect(),
        Object::Commit(commit) => vec![commit.root_dirtree, commit.root_dirmeta],
    }
}

/// Whether the history walk should keep following `parent` edges.
/// `depth_limit < 0` means unbounded (the caller's `-1` "infinite" depth).
#[must_use]
pub fn continue_history(commits_walked: i64, depth_limit: i64) -> bool {
    depth_limit < 0 || commits_walked < depth_limit
}

/// The tree-walk frontier: a dedup set plus a FIFO queue of
/// `(checksum, depth)` pairs still needing a fetch-or-skip decision.
#[derive(Debug, Default)]
pub struct ScanQueue {
    seen: FxHashSet<Checksum>,
    frontier: VecDeque<(Checksum, u32)>,
}

impl ScanQueue {
    /// An empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a root checksum (a target commit) at depth 0, if not
    /// already seen. Returns whether it was newly added.
    pub fn push_root(&mut self, checksum: Checksum) -> bool {
        self.push_at_depth(checksum, 0).unwrap_or(false)
    }

    /// Pops the next checksum and its depth to process.
    pub fn pop(&mut self) -> Option<(Checksum, u32)> {
        self.frontier.pop_front()
    }

    /// Enqueues `object`'s children at `parent_depth + 1`, deduplicating
    /// against everything seen so far.
    ///
    /// # Errors
    ///
    /// Returns a [`PullErrorKind::Verification`] error if `parent_depth + 1`
    /// would exceed [`MAX_TREE_DEPTH`].
    pub fn enqueue_children(&mut self, parent_depth: u32, object: &Object) -> Result<(), PullError> {
        let child_depth = parent_depth + 1;
        if child_depth > MAX_TREE_DEPTH {
            return Err(PullError::new(
                PullErrorKind::Verification,
                format!("tree depth {child_depth} exceeds the {MAX_TREE_DEPTH}-level bound"),
            ));
        }
        for child in children_of(object) {
            self.push_at_depth(child, child_depth)?;
        }
        Ok(())
    }

    fn push_at_depth(&mut self, checksum: Checksum, depth: u32) -> Result<bool, PullError> {
        if self.seen.insert(checksum) {
            self.frontier.push_back((checksum, depth));
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Whether the frontier is empty (the walk is complete).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frontier.is_empty()
    }

    /// Number of checksums already seen (enqueued at least once),
    /// including ones already popped.
    #[must_use]
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagsync_objects::{Commit, Dirtree};

    #[test]
    fn commit_children_are_its_tree_and_meta_not_its_parent() {
        let commit = Commit {
            parent: Some(Checksum::of(b"parent")),
            root_dirtree: Checksum::of(b"tree"),
            root_dirmeta: Checksum::of(b"meta"),
            ..Default::default()
        };
        let children = children_of(&Object::Commit(commit));
        assert_eq!(children, vec![Checksum::of(b"tree"), Checksum::of(b"meta")]);
    }

    #[test]
    fn duplicate_children_are_not_requeued() {
        let shared = Checksum::of(b"shared-file");
        let dirtree = Dirtree::new(vec![
            DirtreeEntry::File { name: "a".into(), checksum: shared },
            DirtreeEntry::File { name: "b".into(), checksum: shared },
        ]);
        let mut queue = ScanQueue::new();
        queue.push_root(Checksum::of(b"root"));
        queue.enqueue_children(0, &Object::Dirtree(dirtree)).unwrap();
        assert_eq!(queue.seen_count(), 2);
    }

    #[test]
    fn depth_bound_is_enforced() {
        let mut queue = ScanQueue::new();
        let file = Object::File(Vec::new());
        let err = queue.enqueue_children(MAX_TREE_DEPTH, &file);
        // A leaf object has no children, so even at the bound this succeeds...
        assert!(err.is_ok());
        let dirtree = Dirtree::new(vec![DirtreeEntry::File {
            name: "x".into(),
            checksum: Checksum::of(b"x"),
        }]);
        let err = queue.enqueue_children(MAX_TREE_DEPTH, &Object::Dirtree(dirtree));
        assert!(matches!(err.unwrap_err().kind(), PullErrorKind::Verification));
    }

    #[test]
    fn history_walk_respects_infinite_depth() {
        assert!(continue_history(1_000_000, -1));
        assert!(continue_history(4, 5));
        assert!(!continue_history(5, 5));
    }
}
