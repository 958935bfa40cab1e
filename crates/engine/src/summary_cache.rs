//! The summary cache (C3): fetches `summary`/`summary.sig`, conditionally
//! against whatever `ETag`/`Last-Modified` validator was recorded on the
//! previous pull, and keeps the last-good copy on disk so a `NotModified`
//! response still yields a usable [`Summary`].

use std::fs;
use std::path::Path;

use dagsync_core::error::{PullError, PullErrorKind};
use dagsync_store::cache::{self, CacheValidator};
use dagsync_summary::Summary;
use dagsync_transport::fetch::{FetchOutcome, FetchRequest, Fetcher};

/// The result of resolving a remote's `summary` (and, if present,
/// `summary.sig`).
pub struct SummaryFetch {
    /// The decoded summary.
    pub summary: Summary,
    /// The summary's raw bytes, as fetched or read from cache (what a
    /// signature is verified against).
    pub summary_bytes: Vec<u8>,
    /// The detached signature's raw bytes, if the remote published one.
    pub summary_sig_bytes: Option<Vec<u8>>,
    /// Whether `summary_bytes` came from the on-disk cache (a `NotModified`
    /// response to a conditional request) rather than a fresh fetch.
    pub from_cache: bool,
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

async fn fetch_cached(
    fetcher: &dyn Fetcher,
    cached_path: &Path,
    remote_path: &str,
    bypass_cache: bool,
) -> Result<(Vec<u8>, bool), PullError> {
    let validator = if bypass_cache { CacheValidator::none() } else { cache::load(cached_path) };
    let outcome = fetcher
        .fetch(FetchRequest::new(remote_path).with_validator(validator))
        .await
        .map_err(classify_fetch)?;
    match outcome {
        FetchOutcome::Fresh { bytes, validator } => {
            fs::write(cached_path, &bytes)
                .map_err(|e| PullError::new(PullErrorKind::Resource, "writing summary cache").with_source(e))?;
            cache::store(cached_path, &validator)
                .map_err(|e| PullError::new(PullErrorKind::Resource, "writing summary cache validator").with_source(e))?;
            Ok((bytes, false))
        }
        FetchOutcome::NotModified => fs::read(cached_path)
            .map(|bytes| (bytes, true))
            .map_err(|e| PullError::new(PullErrorKind::Resource, "reading cached summary").with_source(e)),
    }
}

/// Fetches and decodes `summary`, and `summary.sig` if the remote
/// publishes one, caching both under `cache_dir/<remote_name>.summary[.sig]`.
///
/// When `bypass_cache` is set, any previously-stored validator is ignored so
/// the request always asks for a fresh copy; used to retry once after a
/// signature check fails against a cached (`NotModified`) summary.
///
/// # Errors
///
/// Returns a [`PullErrorKind::Verification`] error if the fetched bytes do
/// not decode as a summary, or a network-class error if the fetch itself
/// fails.
pub async fn fetch_summary(
    fetcher: &dyn Fetcher,
    cache_dir: &Path,
    remote_name: &str,
    bypass_cache: bool,
) -> Result<SummaryFetch, PullError> {
    let summary_path = cache_dir.join(format!("{remote_name}.summary"));
    let (summary_bytes, from_cache) = fetch_cached(fetcher, &summary_path, "summary", bypass_cache).await?;
    let summary = Summary::decode(&summary_bytes)
        .map_err(|e| PullError::new(PullErrorKind::Verification, "decoding summary").with_source(e))?;

    let sig_path = cache_dir.join(format!("{remote_name}.summary.sig"));
    let summary_sig_bytes = match fetch_cached(fetcher, &sig_path, "summary.sig", bypass_cache).await {
        Ok((bytes, _)) => Some(bytes),
        Err(e) if matches!(e.kind(), PullErrorKind::NotFound) => None,
        Err(e) => return Err(e),
    };

    Ok(SummaryFetch {
        summary,
        summary_bytes,
        summary_sig_bytes,
        from_cache,
    })
}

/// Builds a [`SummaryFetch`] from caller-supplied bytes (`summary-bytes`/
/// `summary-sig-bytes` in §6), bypassing the network entirely.
///
/// # Errors
///
/// Returns a [`PullErrorKind::Verification`] error if `summary_bytes` does
/// not decode as a summary.
pub fn from_supplied_bytes(
    summary_bytes: Vec<u8>,
    summary_sig_bytes: Option<Vec<u8>>,
) -> Result<SummaryFetch, PullError> {
    let summary = Summary::decode(&summary_bytes)
        .map_err(|e| PullError::new(PullErrorKind::Verification, "decoding supplied summary bytes").with_source(e))?;
    Ok(SummaryFetch {
        summary,
        summary_bytes,
        summary_sig_bytes,
        from_cache: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dagsync_summary::RepoMode;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn sample_summary() -> Summary {
        Summary {
            refs: BTreeMap::new(),
            collection_id: None,
            collection_map: BTreeMap::new(),
            static_deltas: BTreeMap::new(),
            indexed_deltas: false,
            tombstone_commits: false,
            mode: RepoMode::Archive,
            last_modified: 0,
        }
    }

    struct ScriptedFetcher {
        responses: Mutex<Vec<Result<FetchOutcome, dagsync_transport::fetch::FetchError>>>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, _request: FetchRequest) -> Result<FetchOutcome, dagsync_transport::fetch::FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses.lock().unwrap().remove(0)
        }

        fn base(&self) -> &str {
            "scripted://"
        }
    }

    #[tokio::test]
    async fn fetches_and_decodes_a_fresh_summary_with_no_signature() {
        let bytes = sample_summary().encode();
        let fetcher = ScriptedFetcher {
            responses: Mutex::new(vec![
                Ok(FetchOutcome::Fresh { bytes: bytes.clone(), validator: CacheValidator::none() }),
                Err(dagsync_transport::fetch::FetchError::NotFound("summary.sig".into())),
            ]),
            calls: AtomicU32::new(0),
        };
        let dir = tempfile::tempdir().unwrap();
        let result = fetch_summary(&fetcher, dir.path(), "origin", false).await.unwrap();
        assert_eq!(result.summary, sample_summary());
        assert!(result.summary_sig_bytes.is_none());
        assert!(!result.from_cache);
    }

    #[tokio::test]
    async fn not_modified_falls_back_to_the_cached_copy() {
        let bytes = sample_summary().encode();
        let dir = tempfile::tempdir().unwrap();
        let cached_path = dir.path().join("origin.summary");
        fs::write(&cached_path, &bytes).unwrap();

        let fetcher = ScriptedFetcher {
            responses: Mutex::new(vec![
                Ok(FetchOutcome::NotModified),
                Err(dagsync_transport::fetch::FetchError::NotFound("summary.sig".into())),
            ]),
            calls: AtomicU32::new(0),
        };
        let result = fetch_summary(&fetcher, dir.path(), "origin", false).await.unwrap();
        assert_eq!(result.summary, sample_summary());
        assert!(result.from_cache);
    }

    #[test]
    fn supplied_bytes_bypass_the_network() {
        let bytes = sample_summary().encode();
        let result = from_supplied_bytes(bytes, None).unwrap();
        assert_eq!(result.summary, sample_summary());
        assert!(!result.from_cache);
    }
}
