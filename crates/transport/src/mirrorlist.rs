//! The mirrorlist resolver (C2): turns a configured remote URL — possibly
//! `mirrorlist=<url-to-plaintext-list>` — into the ordered list of base
//! URIs the scheduler round-robins across on retry.

use thiserror::Error;

use crate::fetch::{FetchError, FetchRequest, Fetcher};

/// A parsed remote-URL configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteUrl {
    /// A direct base URI (`http://`, `https://`, or `file://`).
    Direct(String),
    /// `mirrorlist=<url>`: fetch `url`'s body, one base URI per line.
    Mirrorlist(String),
}

/// Errors raised while parsing or resolving a remote URL.
#[derive(Debug, Error)]
pub enum MirrorlistError {
    /// The configured string was empty or had no recognizable scheme.
    #[error("remote url {0:?} has no recognizable scheme")]
    Unrecognized(String),
    /// Fetching the mirrorlist body failed.
    #[error("fetching mirrorlist: {0}")]
    Fetch(#[from] FetchError),
    /// The mirrorlist body contained no usable base URIs.
    #[error("mirrorlist at {0} contained no base URIs")]
    Empty(String),
}

/// Parses a remote URL configuration string.
pub fn parse(raw: &str) -> Result<RemoteUrl, MirrorlistError> {
    if let Some(rest) = raw.strip_prefix("mirrorlist=") {
        return Ok(RemoteUrl::Mirrorlist(rest.to_string()));
    }
    if raw.starts_with("http://") || raw.starts_with("https://") || raw.starts_with("file://") {
        return Ok(RemoteUrl::Direct(raw.to_string()));
    }
    Err(MirrorlistError::Unrecognized(raw.to_string()))
}

/// Resolves `remote` to an ordered list of base URIs, fetching the
/// mirrorlist body via `fetcher` if `remote` is a `mirrorlist=` indirection.
///
/// `fetcher` must already be bound to the mirrorlist URL's own base when
/// `remote` is a [`RemoteUrl::Mirrorlist`]; callers typically construct a
/// one-off [`crate::fetch::HttpFetcher`] for exactly this call.
pub async fn resolve(
    remote: &RemoteUrl,
    fetcher: Option<&dyn Fetcher>,
) -> Result<Vec<String>, MirrorlistError> {
    match remote {
        RemoteUrl::Direct(base) => Ok(vec![normalize_base(base)]),
        RemoteUrl::Mirrorlist(list_url) => {
            let fetcher = fetcher.expect("mirrorlist resolution requires a fetcher");
            let outcome = fetcher
                .fetch(FetchRequest::new(String::new()))
                .await?;
            let body = match outcome {
                crate::fetch::FetchOutcome::Fresh { bytes, .. } => bytes,
                crate::fetch::FetchOutcome::NotModified => Vec::new(),
            };
            let text = String::from_utf8_lossy(&body);
            let bases: Vec<String> = text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(normalize_base)
                .collect();
            if bases.is_empty() {
                return Err(MirrorlistError::Empty(list_url.clone()));
            }
            Ok(bases)
        }
    }
}

fn normalize_base(base: &str) -> String {
    if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    }
}
