//! The pull engine's caller-facing configuration surface (§6), built
//! incrementally and validated at [`PullOptionsBuilder::build`], the way
//! the teacher's `client::config::builder` assembles a `ClientConfig`.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use dagsync_checksum::Checksum;

use crate::error::{PullError, PullErrorKind};

/// The scheduler's bounded-concurrency limits (§5): total fetches, delta
/// parts, and local writes in flight at once. Named constants, never zero
/// or unbounded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerLimits {
    /// Ceiling on the sum of outstanding metadata/content/delta-index/
    /// delta-superblock fetches.
    pub max_fetches: NonZeroUsize,
    /// Hard ceiling on outstanding delta-part fetches, independent of
    /// `max_fetches`.
    pub max_delta_parts: NonZeroUsize,
    /// Ceiling on outstanding local writes of any kind.
    pub max_writes: NonZeroUsize,
}

impl Default for SchedulerLimits {
    fn default() -> Self {
        Self {
            max_fetches: NonZeroUsize::new(8).expect("8 != 0"),
            max_delta_parts: NonZeroUsize::new(2).expect("2 != 0"),
            max_writes: NonZeroUsize::new(16).expect("16 != 0"),
        }
    }
}

/// One `(collection-id, ref-name, override-commit)` request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionRef {
    /// Collection id the ref is qualified under, if any.
    pub collection: Option<String>,
    /// Ref name within the collection.
    pub name: String,
    /// Commit checksum to use verbatim instead of resolving the ref, if
    /// the caller already knows it.
    pub override_commit: Option<Checksum>,
}

/// A `(keyring-remote)` mapping entry for a `(collection, ref)` pair, used
/// to pick which keyring verifies a ref's commit signatures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefKeyringMapping {
    /// Collection id being mapped.
    pub collection: String,
    /// Ref name being mapped.
    pub name: String,
    /// Name of the remote whose keyring should verify this ref.
    pub keyring_remote: String,
}

/// The fully-validated configuration for one call to `pull`.
#[derive(Clone, Debug)]
pub struct PullOptions {
    /// Plain ref names to fetch (unqualified by collection).
    pub refs: Vec<String>,
    /// Collection-qualified ref requests.
    pub collection_refs: Vec<CollectionRef>,
    /// Treat the local repo as a mirror: advance the ref namespace exactly
    /// as seen on the remote, and copy `summary`/`summary.sig` locally.
    pub mirror: bool,
    /// Fetch only the commit objects, skipping dirtree/dirmeta/file.
    pub commit_only: bool,
    /// Skip signature and binding verification entirely (the caller
    /// accepts full responsibility for the remote's trustworthiness).
    pub untrusted: bool,
    /// Require file objects to be owner-zero regular files or symlinks.
    pub bareuseronly_files: bool,
    /// Fetch only metadata objects (commit/dirtree/dirmeta), never file
    /// content.
    pub metadata_only: bool,
    /// Treat `http://` (not just `https://`) as acceptable without a
    /// separate opt-in per request.
    pub trusted_http: bool,
    /// Restrict the object walk to these subdirectories of the checked-out
    /// tree.
    pub subdirs: Vec<String>,
    /// Use this name instead of the remote's configured name in local
    /// storage.
    pub override_remote_name: Option<String>,
    /// Verify commit signatures (GPG and/or ed25519).
    pub gpg_verify: bool,
    /// Verify the summary's own signature.
    pub gpg_verify_summary: bool,
    /// Disable detached-signature verification outright.
    pub disable_sign_verify: bool,
    /// Disable summary signature verification outright.
    pub disable_sign_verify_summary: bool,
    /// History depth to walk via commit parents; `-1` means infinite.
    pub depth: i64,
    /// Never consider static deltas, even if advertised.
    pub disable_static_deltas: bool,
    /// Fail the pull if no usable static delta is found for any ref.
    pub require_static_deltas: bool,
    /// Per-ref override commit ids, aligned with `refs`.
    pub override_commit_ids: Vec<Option<Checksum>>,
    /// Reject ref advancement if the new commit's timestamp regresses.
    pub timestamp_check: bool,
    /// Compare against this rev's timestamp instead of the current local
    /// ref's, when `timestamp_check` is set.
    pub timestamp_check_from_rev: Option<String>,
    /// Maximum size in bytes for a single metadata object.
    pub max_metadata_size: u64,
    /// Perform all checks and fetch metadata, but write nothing durable.
    pub dry_run: bool,
    /// Use this URL instead of the remote's configured URL.
    pub override_url: Option<String>,
    /// Skip the transaction driver's final ref-directory fsync, inheriting
    /// durability from an enclosing transaction. Per-object fsyncs still
    /// happen when `per_object_fsync` is set, regardless of this flag.
    pub inherit_transaction: bool,
    /// fsync every object write immediately, regardless of
    /// `inherit_transaction`.
    pub per_object_fsync: bool,
    /// Extra HTTP headers sent with every fetch.
    pub http_headers: Vec<(String, String)>,
    /// Minimum interval between progress snapshots, in milliseconds; `0`
    /// requests a snapshot after every state change.
    pub update_frequency_ms: u64,
    /// Local repositories to consult for importable objects before
    /// fetching over the network.
    pub localcache_repos: Vec<PathBuf>,
    /// Appended to the fetcher's `User-Agent` header.
    pub append_user_agent: Option<String>,
    /// Retry budget for transient network failures.
    pub n_network_retries: u32,
    /// `(collection, ref) -> keyring remote` overrides.
    pub ref_keyring_map: Vec<RefKeyringMapping>,
    /// Pre-fetched `summary` bytes, supplied instead of fetching.
    pub summary_bytes: Option<Vec<u8>>,
    /// Pre-fetched `summary.sig` bytes, supplied instead of fetching.
    pub summary_sig_bytes: Option<Vec<u8>>,
    /// Skip ref-binding and collection-binding checks.
    pub disable_verify_bindings: bool,
    /// The scheduler's concurrency bounds.
    pub scheduler_limits: SchedulerLimits,
}

/// Builder for [`PullOptions`], validating mutually-exclusive and
/// paired options at [`PullOptionsBuilder::build`].
#[derive(Clone, Debug, Default)]
pub struct PullOptionsBuilder {
    refs: Vec<String>,
    collection_refs: Vec<CollectionRef>,
    mirror: bool,
    commit_only: bool,
    untrusted: bool,
    bareuseronly_files: bool,
    metadata_only: bool,
    trusted_http: bool,
    subdirs: Vec<String>,
    override_remote_name: Option<String>,
    gpg_verify: bool,
    gpg_verify_summary: bool,
    disable_sign_verify: bool,
    disable_sign_verify_summary: bool,
    depth: i64,
    disable_static_deltas: bool,
    require_static_deltas: bool,
    override_commit_ids: Vec<Option<Checksum>>,
    timestamp_check: bool,
    timestamp_check_from_rev: Option<String>,
    max_metadata_size: Option<u64>,
    dry_run: bool,
    override_url: Option<String>,
    inherit_transaction: bool,
    per_object_fsync: bool,
    http_headers: Vec<(String, String)>,
    update_frequency_ms: Option<u64>,
    localcache_repos: Vec<PathBuf>,
    append_user_agent: Option<String>,
    n_network_retries: Option<u32>,
    ref_keyring_map: Vec<RefKeyringMapping>,
    summary_bytes: Option<Vec<u8>>,
    summary_sig_bytes: Option<Vec<u8>>,
    disable_verify_bindings: bool,
    scheduler_limits: SchedulerLimits,
}

/// Default history depth: `-1`, meaning "walk the full parent chain".
pub const DEFAULT_DEPTH: i64 = -1;
/// Default cap on a single metadata object's size, 10 MiB per §5.
pub const DEFAULT_MAX_METADATA_SIZE: u64 = 10 * 1024 * 1024;
/// Default progress snapshot interval.
pub const DEFAULT_UPDATE_FREQUENCY_MS: u64 = 1000;
/// Default transient-network-failure retry budget.
pub const DEFAULT_NETWORK_RETRIES: u32 = 5;

impl PullOptionsBuilder {
    /// Starts a builder for the given refs, the common case.
    #[must_use]
    pub fn new(refs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            refs: refs.into_iter().map(Into::into).collect(),
            depth: DEFAULT_DEPTH,
            ..Default::default()
        }
    }

    /// Adds a collection-qualified ref request.
    #[must_use]
    pub fn collection_ref(mut self, collection_ref: CollectionRef) -> Self {
        self.collection_refs.push(collection_ref);
        self
    }

    /// Sets mirror mode.
    #[must_use]
    pub fn mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    /// Sets commit-only mode.
    #[must_use]
    pub fn commit_only(mut self, commit_only: bool) -> Self {
        self.commit_only = commit_only;
        self
    }

    /// Marks the remote untrusted, skipping verification.
    #[must_use]
    pub fn untrusted(mut self, untrusted: bool) -> Self {
        self.untrusted = untrusted;
        self
    }

    /// Requires bareuseronly file objects.
    #[must_use]
    pub fn bareuseronly_files(mut self, bareuseronly_files: bool) -> Self {
        self.bareuseronly_files = bareuseronly_files;
        self
    }

    /// Restricts the pull to metadata objects only.
    #[must_use]
    pub fn metadata_only(mut self, metadata_only: bool) -> Self {
        self.metadata_only = metadata_only;
        self
    }

    /// Accepts plain `http://` remotes without an additional opt-in.
    #[must_use]
    pub fn trusted_http(mut self, trusted_http: bool) -> Self {
        self.trusted_http = trusted_http;
        self
    }

    /// Restricts the object walk to the given subdirectories.
    #[must_use]
    pub fn subdirs(mut self, subdirs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.subdirs = subdirs.into_iter().map(Into::into).collect();
        self
    }

    /// Overrides the locally-stored remote name.
    #[must_use]
    pub fn override_remote_name(mut self, name: impl Into<String>) -> Self {
        self.override_remote_name = Some(name.into());
        self
    }

    /// Enables commit signature verification.
    #[must_use]
    pub fn gpg_verify(mut self, gpg_verify: bool) -> Self {
        self.gpg_verify = gpg_verify;
        self
    }

    /// Enables summary signature verification.
    #[must_use]
    pub fn gpg_verify_summary(mut self, gpg_verify_summary: bool) -> Self {
        self.gpg_verify_summary = gpg_verify_summary;
        self
    }

    /// Disables detached-signature verification outright.
    #[must_use]
    pub fn disable_sign_verify(mut self, disable: bool) -> Self {
        self.disable_sign_verify = disable;
        self
    }

    /// Disables summary signature verification outright.
    #[must_use]
    pub fn disable_sign_verify_summary(mut self, disable: bool) -> Self {
        self.disable_sign_verify_summary = disable;
        self
    }

    /// Sets the history depth (`-1` for infinite).
    #[must_use]
    pub fn depth(mut self, depth: i64) -> Self {
        self.depth = depth;
        self
    }

    /// Disables static-delta usage entirely.
    #[must_use]
    pub fn disable_static_deltas(mut self, disable: bool) -> Self {
        self.disable_static_deltas = disable;
        self
    }

    /// Requires a usable static delta for every ref.
    #[must_use]
    pub fn require_static_deltas(mut self, require: bool) -> Self {
        self.require_static_deltas = require;
        self
    }

    /// Sets per-ref override commit ids, aligned with the refs passed to
    /// [`PullOptionsBuilder::new`].
    #[must_use]
    pub fn override_commit_ids(mut self, ids: Vec<Option<Checksum>>) -> Self {
        self.override_commit_ids = ids;
        self
    }

    /// Enables timestamp-regression checking.
    #[must_use]
    pub fn timestamp_check(mut self, timestamp_check: bool) -> Self {
        self.timestamp_check = timestamp_check;
        self
    }

    /// Compares against this rev instead of the current local ref.
    #[must_use]
    pub fn timestamp_check_from_rev(mut self, rev: impl Into<String>) -> Self {
        self.timestamp_check_from_rev = Some(rev.into());
        self
    }

    /// Sets the maximum size for a single metadata object.
    #[must_use]
    pub fn max_metadata_size(mut self, bytes: u64) -> Self {
        self.max_metadata_size = Some(bytes);
        self
    }

    /// Enables dry-run mode: fetch and verify, write nothing durable.
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Overrides the remote's configured URL.
    #[must_use]
    pub fn override_url(mut self, url: impl Into<String>) -> Self {
        self.override_url = Some(url.into());
        self
    }

    /// Skips the transaction driver's final ref-directory fsync.
    #[must_use]
    pub fn inherit_transaction(mut self, inherit: bool) -> Self {
        self.inherit_transaction = inherit;
        self
    }

    /// fsyncs every object write regardless of `inherit_transaction`.
    #[must_use]
    pub fn per_object_fsync(mut self, fsync: bool) -> Self {
        self.per_object_fsync = fsync;
        self
    }

    /// Adds an HTTP header sent with every fetch.
    #[must_use]
    pub fn http_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.http_headers.push((key.into(), value.into()));
        self
    }

    /// Sets the minimum interval between progress snapshots.
    #[must_use]
    pub fn update_frequency_ms(mut self, ms: u64) -> Self {
        self.update_frequency_ms = Some(ms);
        self
    }

    /// Adds a local repository to consult for importable objects.
    #[must_use]
    pub fn localcache_repo(mut self, path: impl Into<PathBuf>) -> Self {
        self.localcache_repos.push(path.into());
        self
    }

    /// Appends text to the fetcher's `User-Agent` header.
    #[must_use]
    pub fn append_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.append_user_agent = Some(agent.into());
        self
    }

    /// Sets the transient-network-failure retry budget.
    #[must_use]
    pub fn n_network_retries(mut self, retries: u32) -> Self {
        self.n_network_retries = Some(retries);
        self
    }

    /// Adds a `(collection, ref) -> keyring remote` override.
    #[must_use]
    pub fn ref_keyring_mapping(mut self, mapping: RefKeyringMapping) -> Self {
        self.ref_keyring_map.push(mapping);
        self
    }

    /// Supplies pre-fetched `summary` and `summary.sig` bytes instead of
    /// fetching them. Both or neither must be given; enforced at
    /// [`PullOptionsBuilder::build`].
    #[must_use]
    pub fn summary_bytes(mut self, summary: Vec<u8>, summary_sig: Vec<u8>) -> Self {
        self.summary_bytes = Some(summary);
        self.summary_sig_bytes = Some(summary_sig);
        self
    }

    /// Disables ref-binding and collection-binding verification.
    #[must_use]
    pub fn disable_verify_bindings(mut self, disable: bool) -> Self {
        self.disable_verify_bindings = disable;
        self
    }

    /// Overrides the scheduler's concurrency bounds.
    #[must_use]
    pub fn scheduler_limits(mut self, limits: SchedulerLimits) -> Self {
        self.scheduler_limits = limits;
        self
    }

    /// Validates the accumulated options and produces a [`PullOptions`].
    ///
    /// # Errors
    ///
    /// Returns a [`PullErrorKind::Misconfiguration`] error if
    /// `require_static_deltas` and `disable_static_deltas` are both set, if
    /// exactly one of `summary_bytes`/`summary_sig_bytes` was supplied, or
    /// if `override_commit_ids` was supplied with a length different from
    /// `refs`.
    pub fn build(self) -> Result<PullOptions, PullError> {
        if self.require_static_deltas && self.disable_static_deltas {
            return Err(PullError::new(
                PullErrorKind::Misconfiguration,
                "require-static-deltas and disable-static-deltas are mutually exclusive",
            ));
        }
        if self.summary_bytes.is_some() != self.summary_sig_bytes.is_some() {
            return Err(PullError::new(
                PullErrorKind::Misconfiguration,
                "summary-bytes and summary-sig-bytes must be supplied together or not at all",
            ));
        }
        if !self.override_commit_ids.is_empty() && self.override_commit_ids.len() != self.refs.len()
        {
            return Err(PullError::new(
                PullErrorKind::Misconfiguration,
                format!(
                    "override-commit-ids has {} entries but {} refs were requested",
                    self.override_commit_ids.len(),
                    self.refs.len()
                ),
            ));
        }

        Ok(PullOptions {
            refs: self.refs,
            collection_refs: self.collection_refs,
            mirror: self.mirror,
            commit_only: self.commit_only,
            untrusted: self.untrusted,
            bareuseronly_files: self.bareuseronly_files,
            metadata_only: self.metadata_only,
            trusted_http: self.trusted_http,
            subdirs: self.subdirs,
            override_remote_name: self.override_remote_name,
            gpg_verify: self.gpg_verify,
            gpg_verify_summary: self.gpg_verify_summary,
            disable_sign_verify: self.disable_sign_verify,
            disable_sign_verify_summary: self.disable_sign_verify_summary,
            depth: self.depth,
            disable_static_deltas: self.disable_static_deltas,
            require_static_deltas: self.require_static_deltas,
            override_commit_ids: self.override_commit_ids,
            timestamp_check: self.timestamp_check,
            timestamp_check_from_rev: self.timestamp_check_from_rev,
            max_metadata_size: self.max_metadata_size.unwrap_or(DEFAULT_MAX_METADATA_SIZE),
            dry_run: self.dry_run,
            override_url: self.override_url,
            inherit_transaction: self.inherit_transaction,
            per_object_fsync: self.per_object_fsync,
            http_headers: self.http_headers,
            update_frequency_ms: self
                .update_frequency_ms
                .unwrap_or(DEFAULT_UPDATE_FREQUENCY_MS),
            localcache_repos: self.localcache_repos,
            append_user_agent: self.append_user_agent,
            n_network_retries: self.n_network_retries.unwrap_or(DEFAULT_NETWORK_RETRIES),
            ref_keyring_map: self.ref_keyring_map,
            summary_bytes: self.summary_bytes,
            summary_sig_bytes: self.summary_sig_bytes,
            disable_verify_bindings: self.disable_verify_bindings,
            scheduler_limits: self.scheduler_limits,
        })
    }
}
