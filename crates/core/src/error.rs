//! The pull engine's seven-kind error taxonomy (§7) and the [`PullError`]
//! wrapper that carries a component/context prefix alongside each one, the
//! way the teacher's `core::message` module tags diagnostics with a role.

use std::fmt;

use dagsync_checksum::Checksum;

/// The seven error kinds the pull engine can terminate with.
#[derive(Debug)]
pub enum PullErrorKind {
    /// Socket timeout, connection reset, 5xx, partial body. Retried by the
    /// scheduler up to its retry budget; only surfaces as a terminal error
    /// once that budget is exhausted.
    NetworkTransient,
    /// Auth failure, a 4xx other than 404, malformed response, or size
    /// overrun. Never retried.
    NetworkFatal,
    /// 404 on an optional asset. Callers are expected to swallow this
    /// variant themselves; it only reaches [`PullError`] if a caller
    /// mistakenly propagates it for a non-optional asset.
    NotFound,
    /// Checksum mismatch, malformed structure, invalid signature, binding
    /// mismatch, timestamp regression, or an unknown ref in the summary.
    Verification,
    /// ENOSPC, a filesystem I/O error on write, or a quota violation.
    /// Fatal after the scheduler drains in-flight work.
    Resource,
    /// The pull was cancelled; the transaction is aborted.
    Cancelled,
    /// A configuration error detected at setup, before any network
    /// activity (e.g. `require-static-deltas` with none advertised,
    /// mutually exclusive options).
    Misconfiguration,
}

impl PullErrorKind {
    /// Whether the scheduler should retry the operation that produced
    /// this kind, rather than latching it as the pull's terminal error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, PullErrorKind::NetworkTransient)
    }

    /// A short machine-stable name, used in `Display` output and by the
    /// CLI's `--verbose` diagnostics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            PullErrorKind::NetworkTransient => "network-transient",
            PullErrorKind::NetworkFatal => "network-fatal",
            PullErrorKind::NotFound => "not-found",
            PullErrorKind::Verification => "verification",
            PullErrorKind::Resource => "resource",
            PullErrorKind::Cancelled => "cancelled",
            PullErrorKind::Misconfiguration => "misconfiguration",
        }
    }
}

/// A pull-engine error: a [`PullErrorKind`], a component/context prefix
/// ("GPG", "Parsing commit <checksum>", "Fetching checksum for ref
/// (<collection>, <name>)"), and an optional underlying cause.
#[derive(Debug)]
pub struct PullError {
    kind: PullErrorKind,
    context: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl PullError {
    /// Builds an error of `kind` with a human-readable `context` prefix.
    pub fn new(kind: PullErrorKind, context: impl Into<String>) -> Self {
        Self {
            kind,
            context: context.into(),
            source: None,
        }
    }

    /// Attaches an underlying cause.
    #[must_use]
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Convenience constructor for a verification failure naming a commit.
    pub fn verification_for_commit(commit: Checksum, detail: impl fmt::Display) -> Self {
        Self::new(
            PullErrorKind::Verification,
            format!("Parsing commit {commit}: {detail}"),
        )
    }

    /// Convenience constructor for a ref-resolution failure.
    pub fn ref_resolution(collection: Option<&str>, name: &str, detail: impl fmt::Display) -> Self {
        Self::new(
            PullErrorKind::NotFound,
            format!(
                "Fetching checksum for ref ({}, {name}): {detail}",
                collection.unwrap_or("")
            ),
        )
    }

    /// The error kind.
    #[must_use]
    pub fn kind(&self) -> &PullErrorKind {
        &self.kind
    }

    /// Whether this error's kind should be retried rather than latched as
    /// terminal.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Display for PullError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.label(), self.context)?;
        if let Some(source) = &self.source {
            write!(f, " ({source})")?;
        }
        Ok(())
    }
}

impl std::error::Error for PullError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}
