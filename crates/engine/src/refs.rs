//! The ref resolver (C4): turns a caller's requested refs into concrete
//! commit checksums, consulting the fetched [`Summary`] and honoring any
//! `override-commit-ids` the caller supplied.

use dagsync_checksum::Checksum;
use dagsync_core::error::{PullError, PullErrorKind};
use dagsync_core::options::CollectionRef;
use dagsync_summary::Summary;
use dagsync_transport::fetch::{FetchOutcome, FetchRequest, Fetcher};

/// One resolved ref: its name, owning collection (if qualified), and the
/// commit checksum to pull.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedRef {
    /// Collection id the ref belongs to, if the request was qualified.
    pub collection: Option<String>,
    /// Ref name as requested.
    pub name: String,
    /// The commit checksum to pull: either an override the caller supplied
    /// or whatever the summary currently advertises for this name.
    pub commit: Checksum,
}

/// Resolves every plain ref in `refs` and qualified ref in `collection_refs`
/// against `summary`, in that order. `overrides` must be aligned with
/// `refs` (same length or empty), mirroring `PullOptions::override_commit_ids`.
///
/// # Errors
///
/// Returns a [`PullError`] of kind `NotFound` for any ref that is neither
/// overridden nor present in the summary.
pub fn resolve(
    summary: &Summary,
    refs: &[String],
    overrides: &[Option<Checksum>],
    collection_refs: &[CollectionRef],
) -> Result<Vec<ResolvedRef>, PullError> {
    let mut resolved = Vec::with_capacity(refs.len() + collection_refs.len());

    for (i, name) in refs.iter().enumerate() {
        let commit = match overrides.get(i).copied().flatten() {
            Some(commit) => commit,
            None => summary
                .resolve(name)
                .ok_or_else(|| PullError::ref_resolution(None, name, "not present in summary"))?,
        };
        resolved.push(ResolvedRef {
            collection: None,
            name: name.clone(),
            commit,
        });
    }

    for entry in collection_refs {
        let commit = match entry.override_commit {
            Some(commit) => commit,
            None => summary.resolve(&entry.name).ok_or_else(|| {
                PullError::ref_resolution(entry.collection.as_deref(), &entry.name, "not present in summary")
            })?,
        };
        resolved.push(ResolvedRef {
            collection: entry.collection.clone(),
            name: entry.name.clone(),
            commit,
        });
    }

    Ok(resolved)
}

/// Wire path for a ref's direct checksum pointer (§6), for a remote that
/// publishes no `summary` to binary-search instead.
fn direct_ref_path(collection: Option<&str>, name: &str) -> String {
    match collection {
        Some(collection) => format!("refs/mirrors/{collection}/{name}"),
        None => format!("refs/heads/{name}"),
    }
}

fn classify_fetch(err: dagsync_transport::fetch::FetchError) -> PullError {
    use dagsync_transport::fetch::FetchError;
    match err {
        FetchError::Transient { path, message } => {
            PullError::new(PullErrorKind::NetworkTransient, format!("fetching {path}: {message}"))
        }
        FetchError::Fatal { path, message } => {
            PullError::new(PullErrorKind::NetworkFatal, format!("fetching {path}: {message}"))
        }
        FetchError::NotFound(path) => PullError::new(PullErrorKind::NotFound, path),
    }
}

/// Fetches and parses a commit checksum straight from `refs/heads/<name>`
/// (or `refs/mirrors/<collection>/<name>`): the UTF-8-encoded hex checksum
/// a remote without a summary publishes directly (§4.4, §6).
async fn fetch_ref_commit(
    fetcher: &dyn Fetcher,
    collection: Option<&str>,
    name: &str,
) -> Result<Checksum, PullError> {
    let path = direct_ref_path(collection, name);
    let outcome = fetcher
        .fetch(FetchRequest::new(path.clone()))
        .await
        .map_err(classify_fetch)?;
    let bytes = match outcome {
        FetchOutcome::Fresh { bytes, .. } => bytes,
        FetchOutcome::NotModified => {
            return Err(PullError::ref_resolution(
                collection,
                name,
                format!("unconditional fetch of {path} unexpectedly returned not-modified"),
            ));
        }
    };
    let text = std::str::from_utf8(&bytes)
        .map_err(|e| PullError::ref_resolution(collection, name, format!("ref contents are not valid utf-8: {e}")))?;
    Checksum::from_hex(text.trim())
        .map_err(|e| PullError::ref_resolution(collection, name, format!("ref contents are not a valid checksum: {e}")))
}

/// Resolves every plain ref in `refs` and qualified ref in `collection_refs`
/// by fetching each ref's direct pointer file, for a remote that publishes
/// no summary at all (§4.4's no-summary fallback). `overrides` behaves
/// exactly as in [`resolve`].
///
/// # Errors
///
/// Returns a [`PullError`] of kind `NotFound` for any ref whose direct
/// pointer file the remote does not publish, and a network-class error if
/// a fetch itself fails.
pub async fn resolve_without_summary(
    fetcher: &dyn Fetcher,
    refs: &[String],
    overrides: &[Option<Checksum>],
    collection_refs: &[CollectionRef],
) -> Result<Vec<ResolvedRef>, PullError> {
    let mut resolved = Vec::with_capacity(refs.len() + collection_refs.len());

    for (i, name) in refs.iter().enumerate() {
        let commit = match overrides.get(i).copied().flatten() {
            Some(commit) => commit,
            None => fetch_ref_commit(fetcher, None, name).await?,
        };
        resolved.push(ResolvedRef {
            collection: None,
            name: name.clone(),
            commit,
        });
    }

    for entry in collection_refs {
        let commit = match entry.override_commit {
            Some(commit) => commit,
            None => fetch_ref_commit(fetcher, entry.collection.as_deref(), &entry.name).await?,
        };
        resolved.push(ResolvedRef {
            collection: entry.collection.clone(),
            name: entry.name.clone(),
            commit,
        });
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagsync_summary::{RefEntry, RepoMode};
    use std::collections::BTreeMap;

    fn summary_with(refs: &[(&str, Checksum)]) -> Summary {
        let mut map = BTreeMap::new();
        for (name, commit) in refs {
            map.insert(
                (*name).to_string(),
                RefEntry {
                    commit_size: 0,
                    commit_checksum: *commit,
                    aux: Vec::new(),
                },
            );
        }
        Summary {
            refs: map,
            collection_id: None,
            collection_map: BTreeMap::new(),
            static_deltas: BTreeMap::new(),
            indexed_deltas: false,
            tombstone_commits: false,
            mode: RepoMode::Archive,
            last_modified: 0,
        }
    }

    #[test]
    fn resolves_plain_ref_from_summary() {
        let commit = Checksum::of(b"stable-commit");
        let summary = summary_with(&[("stable", commit)]);
        let resolved = resolve(&summary, &["stable".to_string()], &[], &[]).unwrap();
        assert_eq!(resolved, vec![ResolvedRef { collection: None, name: "stable".into(), commit }]);
    }

    #[test]
    fn override_commit_id_wins_over_summary() {
        let summary_commit = Checksum::of(b"summary-commit");
        let override_commit = Checksum::of(b"override-commit");
        let summary = summary_with(&[("stable", summary_commit)]);
        let resolved = resolve(
            &summary,
            &["stable".to_string()],
            &[Some(override_commit)],
            &[],
        )
        .unwrap();
        assert_eq!(resolved[0].commit, override_commit);
    }

    #[test]
    fn unresolvable_ref_is_not_found() {
        let summary = summary_with(&[]);
        let err = resolve(&summary, &["missing".to_string()], &[], &[]).unwrap_err();
        assert!(matches!(err.kind(), dagsync_core::PullErrorKind::NotFound));
    }

    struct DirectRefFetcher {
        refs: std::collections::HashMap<String, String>,
    }

    #[async_trait::async_trait]
    impl Fetcher for DirectRefFetcher {
        async fn fetch(&self, request: FetchRequest) -> Result<FetchOutcome, dagsync_transport::fetch::FetchError> {
            match self.refs.get(&request.path) {
                Some(hex) => Ok(FetchOutcome::Fresh {
                    bytes: format!("{hex}\n").into_bytes(),
                    validator: dagsync_store::cache::CacheValidator::none(),
                }),
                None => Err(dagsync_transport::fetch::FetchError::NotFound(request.path.clone())),
            }
        }

        fn base(&self) -> &str {
            "direct://"
        }
    }

    #[tokio::test]
    async fn resolve_without_summary_fetches_each_ref_directly() {
        let commit = Checksum::of(b"stable-commit");
        let fetcher = DirectRefFetcher {
            refs: std::collections::HashMap::from([("refs/heads/stable".to_string(), commit.to_hex())]),
        };
        let resolved = resolve_without_summary(&fetcher, &["stable".to_string()], &[], &[]).await.unwrap();
        assert_eq!(resolved, vec![ResolvedRef { collection: None, name: "stable".into(), commit }]);
    }

    #[tokio::test]
    async fn resolve_without_summary_honors_override_commit_ids() {
        let fetcher = DirectRefFetcher { refs: std::collections::HashMap::new() };
        let override_commit = Checksum::of(b"override-commit");
        let resolved = resolve_without_summary(&fetcher, &["stable".to_string()], &[Some(override_commit)], &[])
            .await
            .unwrap();
        assert_eq!(resolved[0].commit, override_commit);
    }

    #[tokio::test]
    async fn resolve_without_summary_surfaces_not_found_for_a_missing_ref() {
        let fetcher = DirectRefFetcher { refs: std::collections::HashMap::new() };
        let err = resolve_without_summary(&fetcher, &["missing".to_string()], &[], &[]).await.unwrap_err();
        assert!(matches!(err.kind(), dagsync_core::PullErrorKind::NotFound));
    }
}
