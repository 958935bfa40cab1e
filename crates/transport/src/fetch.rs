//! The fetcher facade (C1): "download URL to a byte buffer, optionally
//! with `If-None-Match`/`If-Modified-Since`, retrying transient failures"
//! reduced to a single async trait plus two concrete implementations.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dagsync_store::cache::CacheValidator;
use thiserror::Error;

/// A request to fetch `path` relative to a fetcher's base, carrying
/// whatever cache validator was recorded for it last time.
#[derive(Clone, Debug, Default)]
pub struct FetchRequest {
    /// Path relative to the fetcher's base (e.g. `"summary"`, `"objects/ab/cd…ef.obj"`).
    pub path: String,
    /// Validator from a previous fetch, if any, sent as conditional-request
    /// headers.
    pub validator: Option<CacheValidator>,
}

impl FetchRequest {
    /// Builds an unconditional request for `path`.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            validator: None,
        }
    }

    /// Attaches a cache validator, turning this into a conditional request.
    #[must_use]
    pub fn with_validator(mut self, validator: CacheValidator) -> Self {
        self.validator = Some(validator);
        self
    }
}

/// The result of a fetch: either fresh bytes with their new validator, or
/// confirmation that the cached copy is still current.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The asset was fetched (or read) fresh.
    Fresh {
        /// The asset's bytes.
        bytes: Vec<u8>,
        /// The validator to record for the next conditional fetch.
        validator: CacheValidator,
    },
    /// The server (or a stat() on a local mirror) confirmed the cached
    /// copy described by the request's validator is still current.
    NotModified,
}

/// Errors raised by a [`Fetcher`], classified the way the pull engine's
/// error taxonomy requires: transient failures are retried by the
/// scheduler, fatal ones propagate immediately, and not-found is swallowed
/// for optional assets.
#[derive(Debug, Error)]
pub enum FetchError {
    /// A timeout, connection reset, 5xx response, or truncated body.
    /// Retryable.
    #[error("transient fetch failure for {path}: {message}")]
    Transient {
        /// Path that failed.
        path: String,
        /// Human-readable detail.
        message: String,
    },
    /// Authentication failure, a 4xx other than 404, or a malformed
    /// response. Not retryable.
    #[error("fatal fetch failure for {path}: {message}")]
    Fatal {
        /// Path that failed.
        path: String,
        /// Human-readable detail.
        message: String,
    },
    /// A 404 (or local-file ENOENT) on the requested path.
    #[error("{0} not found")]
    NotFound(String),
}

impl FetchError {
    /// Whether the scheduler should retry this fetch.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }
}

/// Abstract "download this path to bytes" operation. Implementations are
/// bound to one base URI; [`crate::mirrorlist::resolve`] supplies the
/// ordered list the scheduler constructs one fetcher per mirror from.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `request.path`, honoring any attached validator.
    async fn fetch(&self, request: FetchRequest) -> Result<FetchOutcome, FetchError>;

    /// The base URI this fetcher is bound to, used for diagnostics and for
    /// constructing the next mirror on fallback.
    fn base(&self) -> &str;
}

/// An HTTP(S)-backed [`Fetcher`].
pub struct HttpFetcher {
    client: reqwest::Client,
    base: url::Url,
}

impl HttpFetcher {
    /// Builds a fetcher rooted at `base`, which must end in `/` so relative
    /// paths join correctly.
    #[must_use]
    pub fn new(client: reqwest::Client, base: url::Url) -> Self {
        Self { client, base }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchOutcome, FetchError> {
        let url = self.base.join(&request.path).map_err(|e| FetchError::Fatal {
            path: request.path.clone(),
            message: format!("invalid path join against base {}: {e}", self.base),
        })?;

        let mut builder = self.client.get(url.clone());
        if let Some(validator) = &request.validator {
            if let Some(etag) = &validator.etag {
                builder = builder.header(reqwest::header::IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = &validator.last_modified {
                builder = builder.header(reqwest::header::IF_MODIFIED_SINCE, last_modified);
            }
        }

        let response = builder.send().await.map_err(|e| classify_transport_error(&request.path, &e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::NotModified);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(request.path));
        }
        if status.is_server_error() {
            return Err(FetchError::Transient {
                path: request.path,
                message: format!("server error: {status}"),
            });
        }
        if status.is_client_error() {
            return Err(FetchError::Fatal {
                path: request.path,
                message: format!("client error: {status}"),
            });
        }

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let last_modified = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_transport_error(&request.path, &e))?;

        Ok(FetchOutcome::Fresh {
            bytes: bytes.to_vec(),
            validator: CacheValidator {
                etag,
                last_modified,
            },
        })
    }

    fn base(&self) -> &str {
        self.base.as_str()
    }
}

fn classify_transport_error(path: &str, error: &reqwest::Error) -> FetchError {
    if error.is_timeout() || error.is_connect() {
        FetchError::Transient {
            path: path.to_string(),
            message: error.to_string(),
        }
    } else {
        FetchError::Fatal {
            path: path.to_string(),
            message: error.to_string(),
        }
    }
}

/// A `file://`-backed [`Fetcher`], used to import from a local mirror
/// rather than fetching over HTTP.
pub struct FileFetcher {
    base: PathBuf,
}

impl FileFetcher {
    /// Builds a fetcher rooted at the local directory `base`.
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn resolved(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.base.clone()
        } else {
            self.base.join(path)
        }
    }
}

#[async_trait]
impl Fetcher for FileFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchOutcome, FetchError> {
        let path = self.resolved(&request.path);
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FetchError::NotFound(request.path.clone())
            } else {
                FetchError::Fatal {
                    path: request.path.clone(),
                    message: e.to_string(),
                }
            }
        })?;
        Ok(FetchOutcome::Fresh {
            bytes,
            validator: CacheValidator::none(),
        })
    }

    fn base(&self) -> &str {
        self.base.to_str().unwrap_or("<non-utf8 path>")
    }
}

/// Returns whether `path` looks like a `file://` URL's target directory.
#[must_use]
pub fn is_local_path(path: &Path) -> bool {
    path.is_absolute()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_fetcher_reads_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("summary"), b"summary-bytes").unwrap();
        let fetcher = FileFetcher::new(dir.path());
        let outcome = fetcher.fetch(FetchRequest::new("summary")).await.unwrap();
        match outcome {
            FetchOutcome::Fresh { bytes, .. } => assert_eq!(bytes, b"summary-bytes"),
            FetchOutcome::NotModified => panic!("expected fresh bytes"),
        }
    }

    #[tokio::test]
    async fn file_fetcher_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FileFetcher::new(dir.path());
        let err = fetcher
            .fetch(FetchRequest::new("summary.sig"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
    }

    #[test]
    fn retryable_only_for_transient() {
        let transient = FetchError::Transient {
            path: "x".into(),
            message: "timeout".into(),
        };
        let fatal = FetchError::Fatal {
            path: "x".into(),
            message: "bad request".into(),
        };
        assert!(transient.is_retryable());
        assert!(!fatal.is_retryable());
    }
}
