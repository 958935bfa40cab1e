//! Cache validators (`ETag` / mtime) for the summary cache (C3), keyed by
//! remote name under `<repo>/cache/summaries/`.
//!
//! A validator is written through an xattr on Unix filesystems that
//! support `user.*` attributes, and through a JSON sidecar file everywhere
//! else (tmpfs mounted without `user_xattr`, non-Unix targets). Callers do
//! not need to know which path was taken; [`CacheEntry::load`] tries the
//! xattr first and falls back transparently.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const XATTR_NAME: &str = "user.dagsync.cache-validator";

/// Cache validators for one cached `summary`/`summary.sig` pair, used to
/// send conditional-fetch headers (`If-None-Match` / `If-Modified-Since`)
/// on the next pull.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheValidator {
    /// The remote's `ETag` response header, if any.
    pub etag: Option<String>,
    /// The remote's `Last-Modified` response header, if any, as raw text
    /// (the engine never parses it beyond passing it back verbatim).
    pub last_modified: Option<String>,
}

impl CacheValidator {
    /// A validator carrying no cache information, forcing an unconditional
    /// fetch.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }
}

fn sidecar_path(summary_path: &Path) -> PathBuf {
    let mut name = summary_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".meta.json");
    summary_path.with_file_name(name)
}

/// Persists `validator` alongside `summary_path`, the bytes of whatever
/// summary (or `summary.sig`) this validator describes.
pub fn store(summary_path: &Path, validator: &CacheValidator) -> io::Result<()> {
    #[cfg(unix)]
    {
        let json = serde_json::to_vec(validator)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if xattr::set(summary_path, XATTR_NAME, &json).is_ok() {
            return Ok(());
        }
    }
    let json = serde_json::to_vec_pretty(validator)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(sidecar_path(summary_path), json)
}

/// Loads the validator previously stored for `summary_path`, returning the
/// empty validator if none was ever stored.
pub fn load(summary_path: &Path) -> CacheValidator {
    #[cfg(unix)]
    {
        if let Ok(Some(bytes)) = xattr::get(summary_path, XATTR_NAME) {
            if let Ok(validator) = serde_json::from_slice(&bytes) {
                return validator;
            }
        }
    }
    fs::read(sidecar_path(summary_path))
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_sidecar_or_xattr() {
        let dir = tempfile::tempdir().unwrap();
        let summary_path = dir.path().join("some-remote");
        fs::write(&summary_path, b"summary bytes").unwrap();

        let validator = CacheValidator {
            etag: Some("\"abc123\"".to_string()),
            last_modified: Some("Tue, 01 Jan 2030 00:00:00 GMT".to_string()),
        };
        store(&summary_path, &validator).unwrap();
        assert_eq!(load(&summary_path), validator);
    }

    #[test]
    fn missing_validator_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let summary_path = dir.path().join("untouched-remote");
        assert_eq!(load(&summary_path), CacheValidator::none());
    }
}
