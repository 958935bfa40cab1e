//! The pull controller (C11): composes every other component into one
//! `pull` entry point. This is the crate's only component that knows
//! about all the others; everything else is reachable (and testable)
//! without it.

use std::path::Path;
use std::sync::Arc;

use dagsync_checksum::Checksum;
use dagsync_core::error::{PullError, PullErrorKind};
use dagsync_core::options::PullOptions;
use dagsync_delta::{DeltaApplier, DeltaSelection};
use dagsync_objects::{Commit, DirtreeEntry, Object};
use dagsync_store::{FsObjectStore, ObjectStore};
use dagsync_summary::delta::Superblock;
use dagsync_summary::{RepoMode, Summary};
use dagsync_transport::fetch::{FetchOutcome, FetchRequest, Fetcher, FileFetcher, HttpFetcher};
use dagsync_transport::mirrorlist::{self, RemoteUrl};
use dagsync_verify::{ObjectVerifier, SignatureVerifier, VerifyPolicy};
use futures::stream::{FuturesUnordered, StreamExt};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::progress::{ProgressReporter, ProgressSnapshot};
use crate::refs::{self, ResolvedRef};
use crate::scan::{continue_history, ScanQueue};
use crate::scheduler::Scheduler;
use crate::state::{Phase, PullState};
use crate::summary_cache::{self, SummaryFetch};
use crate::transaction::Transaction;

/// Upper bound on how many scan-queue items are in flight at once; the
/// scheduler's own semaphores (§5's `max-fetches`/`max-writes`) are the
/// real throttle, this just bounds how many futures `pull_one_ref` polls
/// concurrently.
const SCAN_CONCURRENCY: usize = 16;

/// A remote with no summary at all has nothing to key static deltas or
/// collection bindings off, so [`pull_one_ref`] is handed this empty stand-in
/// instead of threading an `Option<&Summary>` through every call site.
fn no_summary() -> Summary {
    Summary {
        refs: std::collections::BTreeMap::new(),
        collection_id: None,
        collection_map: std::collections::BTreeMap::new(),
        static_deltas: std::collections::BTreeMap::new(),
        indexed_deltas: false,
        tombstone_commits: false,
        mode: RepoMode::Archive,
        last_modified: 0,
    }
}

/// What one `pull` call accomplished.
#[derive(Debug)]
pub struct PullOutcome {
    /// Each requested ref, the commit it now points at, and whether the
    /// local ref pointer actually moved (`false` on a no-op pull against
    /// an already-current ref).
    pub refs: Vec<(ResolvedRef, bool)>,
    /// Final progress counters.
    pub progress: ProgressSnapshot,
}

fn remote_path(checksum: Checksum, suffix: &str) -> String {
    let (head, tail) = checksum.split_object_path();
    format!("objects/{head}/{tail}.{suffix}")
}

/// Key under which a commit's detached signature lives in its `commitmeta`
/// object's metadata map.
const COMMIT_SIGNATURE_KEY: &str = "ed25519-signature";

fn base64_of(bytes: &[u8]) -> String {
    use base64::Engine as _;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Remote directory a static delta from `from` (or scratch, if `None`) to
/// `to` is published under.
fn delta_dir(to: Checksum, from: Option<Checksum>) -> String {
    let to_bytes = to.as_bytes();
    let head = base64_of(&to_bytes[..1]);
    let tail = base64_of(&to_bytes[1..]);
    match from {
        Some(from) => format!("deltas/{head}/{tail}-{}", base64_of(from.as_bytes())),
        None => format!("deltas/{head}/{tail}"),
    }
}

fn io_to_resource(context: &str, err: std::io::Error) -> PullError {
    PullError::new(PullErrorKind::Resource, context).with_source(err)
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

/// The children of `object` paired with the wire suffix to request them
/// under, skipping the commit's `parent` edge (a history-walk concern, not
/// a tree-walk one).
fn children_with_suffix(object: &Object) -> Vec<(Checksum, &'static str)> {
    match object {
        Object::Dirtree(tree) => tree
            .entries
            .iter()
            .flat_map(|entry| match entry {
                DirtreeEntry::File { checksum, .. } => vec![(*checksum, "file")],
                DirtreeEntry::Dir { tree, meta, .. } => vec![(*tree, "dirtree"), (*meta, "dirmeta")],
            })
            .collect(),
        Object::Commit(commit) => vec![(commit.root_dirtree, "dirtree"), (commit.root_dirmeta, "dirmeta")],
        _ => Vec::new(),
    }
}

/// Builds the [`Fetcher`] for the first usable base URI resolved from
/// `options.override_url` or `remote_base`.
async fn build_fetcher(
    remote_base: &str,
    options: &PullOptions,
) -> Result<Box<dyn Fetcher>, PullError> {
    let raw = options.override_url.as_deref().unwrap_or(remote_base);
    let remote = mirrorlist::parse(raw)
        .map_err(|e| PullError::new(PullErrorKind::Misconfiguration, "parsing remote url").with_source(e))?;

    let bases = match &remote {
        RemoteUrl::Direct(_) => mirrorlist::resolve(&remote, None)
            .await
            .map_err(|e| PullError::new(PullErrorKind::Misconfiguration, "resolving remote url").with_source(e))?,
        RemoteUrl::Mirrorlist(list_url) => {
            let list_fetcher = fetcher_for_base(list_url, options)?;
            let resolved = mirrorlist::resolve(&remote, Some(list_fetcher.as_ref()))
                .await
                .map_err(|e| PullError::new(PullErrorKind::NetworkFatal, "resolving mirrorlist").with_source(e))?;
            probe_mirrors(resolved, options).await?
        }
    };

    let base = bases
        .first()
        .ok_or_else(|| PullError::new(PullErrorKind::Misconfiguration, "mirror list resolved to no usable base"))?;
    fetcher_for_base(base, options)
}

/// Probes resolved mirror candidates in order by requesting their `config`
/// file, and reorders the list so the first candidate to answer becomes the
/// effective head. Candidates that fail the probe are kept, just demoted
/// behind the winner, since a later fetch may still succeed against them.
/// If every candidate fails its probe the original order is returned
/// unchanged and resolution is left to the real fetch/retry path.
async fn probe_mirrors(bases: Vec<String>, options: &PullOptions) -> Result<Vec<String>, PullError> {
    if bases.len() <= 1 {
        return Ok(bases);
    }
    for (winner, base) in bases.iter().enumerate() {
        let fetcher = match fetcher_for_base(base, options) {
            Ok(f) => f,
            Err(_) => continue,
        };
        if fetcher.fetch(FetchRequest::new("config")).await.is_ok() {
            let mut ordered = Vec::with_capacity(bases.len());
            ordered.push(bases[winner].clone());
            ordered.extend(bases.iter().enumerate().filter(|(i, _)| *i != winner).map(|(_, b)| b.clone()));
            return Ok(ordered);
        }
    }
    Ok(bases)
}

fn fetcher_for_base(base: &str, options: &PullOptions) -> Result<Box<dyn Fetcher>, PullError> {
    if let Some(path) = base.strip_prefix("file://") {
        return Ok(Box::new(FileFetcher::new(path)));
    }
    if base.starts_with("http://") && !options.trusted_http {
        return Err(PullError::new(
            PullErrorKind::Misconfiguration,
            format!("refusing plain http:// base {base:?} without trusted-http"),
        ));
    }
    let mut builder = reqwest::Client::builder();
    if let Some(suffix) = &options.append_user_agent {
        builder = builder.user_agent(format!("dagsync/{} {suffix}", env!("CARGO_PKG_VERSION")));
    } else {
        builder = builder.user_agent(format!("dagsync/{}", env!("CARGO_PKG_VERSION")));
    }
    let client = builder
        .build()
        .map_err(|e| PullError::new(PullErrorKind::Misconfiguration, "building http client").with_source(e))?;
    let url = url::Url::parse(base)
        .map_err(|e| PullError::new(PullErrorKind::Misconfiguration, "parsing base url").with_source(e))?;
    Ok(Box::new(HttpFetcher::new(client, url)))
}

fn verify_policy(options: &PullOptions, ref_name: &str) -> VerifyPolicy {
    VerifyPolicy {
        bareuseronly: options.bareuseronly_files,
        require_ref_binding: if options.disable_verify_bindings || options.untrusted {
            None
        } else {
            Some(Box::leak(ref_name.to_string().into_boxed_str()))
        },
        require_collection_binding: None,
    }
}

fn signature_enforced(options: &PullOptions, is_summary: bool) -> bool {
    if options.untrusted {
        return false;
    }
    if is_summary {
        options.gpg_verify_summary && !options.disable_sign_verify_summary
    } else {
        options.gpg_verify && !options.disable_sign_verify
    }
}

/// Whether `checksum` is present in any of `options.localcache_repos`, and
/// if so, its encoded bytes (already on disk, no network fetch needed).
fn check_local_caches(options: &PullOptions, checksum: Checksum) -> Option<Vec<u8>> {
    for repo in &options.localcache_repos {
        if let Ok(store) = FsObjectStore::open(repo) {
            if store.has(checksum) {
                let path = store.object_path(checksum);
                if let Ok(bytes) = std::fs::read(&path) {
                    return Some(bytes);
                }
            }
        }
    }
    None
}

/// Runs one pull of `options.refs`/`options.collection_refs` from
/// `remote_base` into the repository rooted at `repo_root`.
///
/// # Errors
///
/// Returns the first terminal [`PullError`] encountered; per the
/// transaction driver's invariants, any ref not yet advanced is left
/// exactly as it was before the call.
pub async fn pull(
    repo_root: &Path,
    remote_base: &str,
    options: &PullOptions,
    signature_verifier: Option<&dyn SignatureVerifier>,
    delta_applier: Option<&dyn DeltaApplier>,
) -> Result<PullOutcome, PullError> {
    let mut state = PullState::new();
    let progress = ProgressReporter::new(options.update_frequency_ms);

    let store = FsObjectStore::open(repo_root).map_err(|e| io_to_resource("opening object store", e))?;
    let scheduler = Arc::new(Scheduler::new(options.scheduler_limits, options.n_network_retries));
    let txn = Transaction::open(repo_root, &store, options.dry_run)?;

    state.advance(Phase::FetchingSummary);
    let remote_name = options.override_remote_name.as_deref().unwrap_or("origin");
    let fetcher = build_fetcher(remote_base, options).await?;

    // `None` here means the remote publishes no `summary` at all (a `NotFound`
    // on that specific fetch, not any other failure), triggering §4.4's
    // direct-ref-fetch fallback below rather than a terminal error.
    let summary_attempt = match (&options.summary_bytes, &options.summary_sig_bytes) {
        (Some(bytes), sig) => Some(summary_cache::from_supplied_bytes(bytes.clone(), sig.clone())?),
        (None, _) => {
            let cache_dir = dagsync_store::summary_cache_dir(repo_root)
                .map_err(|e| io_to_resource("opening summary cache", e))?;
            match summary_cache::fetch_summary(fetcher.as_ref(), &cache_dir, remote_name, false).await {
                Ok(fetch) => Some(fetch),
                Err(e) if matches!(e.kind(), PullErrorKind::NotFound) => None,
                Err(e) => return Err(e),
            }
        }
    };

    let summary_attempt = match summary_attempt {
        Some(mut fetch) => {
            if let Err(first_err) = verify_summary_signature(&fetch, options, signature_verifier) {
                // A signature failure against a cached (NotModified) summary may mean the
                // local cache is stale relative to the signature, not that the summary is
                // actually forged. Re-fetch once without cache validators before giving up.
                if fetch.from_cache && options.summary_bytes.is_none() {
                    let cache_dir = dagsync_store::summary_cache_dir(repo_root)
                        .map_err(|e| io_to_resource("opening summary cache", e))?;
                    fetch = summary_cache::fetch_summary(fetcher.as_ref(), &cache_dir, remote_name, true).await?;
                    verify_summary_signature(&fetch, options, signature_verifier)?;
                } else {
                    return Err(first_err);
                }
            }
            Some(fetch)
        }
        None => None,
    };

    state.advance(Phase::ResolvingRefs);
    let (summary, resolved) = match summary_attempt {
        Some(fetch) => {
            let resolved = refs::resolve(
                &fetch.summary,
                &options.refs,
                &options.override_commit_ids,
                &options.collection_refs,
            )?;
            (fetch.summary, resolved)
        }
        None => {
            let resolved = refs::resolve_without_summary(
                fetcher.as_ref(),
                &options.refs,
                &options.override_commit_ids,
                &options.collection_refs,
            )
            .await?;
            (no_summary(), resolved)
        }
    };

    let mut outcome_refs = Vec::with_capacity(resolved.len());
    for resolved_ref in resolved {
        let moved = pull_one_ref(
            &resolved_ref,
            fetcher.as_ref(),
            &store,
            &scheduler,
            &txn,
            &progress,
            options,
            signature_verifier,
            &summary,
            delta_applier,
            &mut state,
        )
        .await?;
        outcome_refs.push((resolved_ref, moved));
    }

    state.advance(Phase::Completed);
    Ok(PullOutcome {
        refs: outcome_refs,
        progress: progress.snapshot(),
    })
}

fn verify_summary_signature(
    fetch: &SummaryFetch,
    options: &PullOptions,
    signature_verifier: Option<&dyn SignatureVerifier>,
) -> Result<(), PullError> {
    if !signature_enforced(options, true) {
        return Ok(());
    }
    let verifier = signature_verifier.ok_or_else(|| {
        PullError::new(
            PullErrorKind::Misconfiguration,
            "gpg-verify-summary requested but no signature verifier was supplied",
        )
    })?;
    let signature = fetch.summary_sig_bytes.as_deref().ok_or_else(|| {
        PullError::new(PullErrorKind::Verification, "gpg-verify-summary requested but remote published no summary.sig")
    })?;
    verifier
        .verify(&fetch.summary_bytes, signature)
        .map_err(|e| PullError::new(PullErrorKind::Verification, "summary signature verification failed").with_source(e))
}

/// What one scan-queue item's fetch-verify-write step produced.
enum ScanOutcome {
    /// The object is now present locally (already was, or was just
    /// written); its children still need enqueuing.
    Ready {
        depth: u32,
        object: Object,
        fetched_bytes: u64,
    },
    /// A history-walk parent was missing remotely, and the walk is allowed
    /// to stop there (P.Open-Question-1's conservative tolerance) rather
    /// than failing the whole pull.
    ToleratedMissingParent,
}

/// Fetches (or loads locally), verifies, and writes one scan-queue item.
/// `is_history_parent` marks a checksum reached only via a commit's
/// `parent` edge, not its tree: a `NotFound` for one of these is tolerated,
/// since the history walk is explicitly allowed to run out before the
/// remote's retention window does.
#[allow(clippy::too_many_arguments)]
async fn scan_one(
    checksum: Checksum,
    depth: u32,
    suffix: &'static str,
    is_history_parent: bool,
    fetcher: &dyn Fetcher,
    scheduler: &Scheduler,
    store: &FsObjectStore,
    txn: &Transaction<'_>,
    verifier: &ObjectVerifier<'_>,
    options: &PullOptions,
    parent_timestamp: Option<u64>,
    fetched_from_collection: Option<&str>,
) -> Result<ScanOutcome, PullError> {
    let (encoded, fetched_bytes) = if store.has(checksum) {
        (store_encoded(store, checksum)?, 0u64)
    } else if let Some(bytes) = check_local_caches(options, checksum) {
        (bytes, 0u64)
    } else {
        let path = remote_path(checksum, suffix);
        match fetch_object(fetcher, scheduler, &path).await {
            Ok(bytes) => {
                let len = bytes_len(&bytes);
                (bytes, len)
            }
            Err(err) if is_history_parent && matches!(err.kind(), PullErrorKind::NotFound) => {
                return Ok(ScanOutcome::ToleratedMissingParent);
            }
            Err(err) => return Err(err),
        }
    };

    if matches!(suffix, "commit" | "dirtree" | "dirmeta") && encoded.len() as u64 > options.max_metadata_size {
        return Err(PullError::new(
            PullErrorKind::Verification,
            format!(
                "{checksum} ({suffix}) is {} bytes, exceeding the {}-byte max-metadata-size cap",
                encoded.len(),
                options.max_metadata_size
            ),
        ));
    }

    let object = Object::decode(&encoded)
        .map_err(|e| PullError::new(PullErrorKind::Verification, format!("decoding {checksum}")).with_source(e))?;

    verifier
        .verify(checksum, &object, &encoded, parent_timestamp, fetched_from_collection)
        .map_err(|e| PullError::new(PullErrorKind::Verification, format!("verifying {checksum}")).with_source(e))?;

    if !store.has(checksum) {
        if matches!(object, Object::Commit(_)) {
            verify_commit_signature(fetcher, scheduler, checksum, verifier, options).await?;
        }
        let _permit = scheduler.write_permit().await;
        txn.write_object(checksum, &encoded)?;
    }

    Ok(ScanOutcome::Ready { depth, object, fetched_bytes })
}

#[allow(clippy::too_many_arguments)]
async fn pull_one_ref(
    resolved: &ResolvedRef,
    fetcher: &dyn Fetcher,
    store: &FsObjectStore,
    scheduler: &Arc<Scheduler>,
    txn: &Transaction<'_>,
    progress: &ProgressReporter,
    options: &PullOptions,
    signature_verifier: Option<&dyn SignatureVerifier>,
    summary: &Summary,
    delta_applier: Option<&dyn DeltaApplier>,
    state: &mut PullState,
) -> Result<bool, PullError> {
    progress.set_current_ref(resolved.name.clone());

    let already_current = txn.current_ref(resolved.collection.as_deref(), &resolved.name)? == Some(resolved.commit);
    if already_current && store.has(resolved.commit) {
        return Ok(false);
    }

    txn.begin_commit(resolved.commit)?;

    let parent_timestamp = if options.timestamp_check {
        parent_timestamp_for(store, txn, options.timestamp_check_from_rev.as_deref().unwrap_or(&resolved.name))?
    } else {
        None
    };

    let policy = verify_policy(options, &resolved.name);
    let verifier = ObjectVerifier::new(policy, signature_enforced(options, false).then_some(signature_verifier).flatten());
    let fetched_from_collection = resolved.collection.as_deref();

    if !options.disable_static_deltas {
        let local_candidates = txn.local_delta_candidates(resolved.collection.as_deref());
        let applied = apply_delta_if_selected(
            fetcher,
            scheduler,
            store,
            txn,
            summary,
            resolved.commit,
            &local_candidates,
            delta_applier,
            &verifier,
            options,
            parent_timestamp,
            fetched_from_collection,
        )
        .await?;
        if options.require_static_deltas && !applied {
            return Err(PullError::new(
                PullErrorKind::Misconfiguration,
                format!("require-static-deltas set but no usable delta is advertised for {}", resolved.commit),
            ));
        }
    }

    let mut queue = ScanQueue::new();
    let mut kind_hint: FxHashMap<Checksum, &'static str> = FxHashMap::default();
    let mut history_parents: FxHashSet<Checksum> = FxHashSet::default();
    let mut commits_walked: i64 = 0;
    queue.push_root(resolved.commit);
    kind_hint.insert(resolved.commit, "commit");

    // Keeps up to `SCAN_CONCURRENCY` fetch-verify-write steps in flight at
    // once; the scheduler's own semaphores are the actual concurrency bound,
    // this just lets the scan loop stop awaiting one checksum at a time.
    let mut in_flight = FuturesUnordered::new();
    loop {
        while in_flight.len() < SCAN_CONCURRENCY {
            let Some((checksum, depth)) = queue.pop() else {
                break;
            };
            progress.set_pending(1);
            let suffix = *kind_hint.get(&checksum).unwrap_or(&"commit");
            if options.metadata_only && suffix == "file" {
                continue;
            }
            let is_history_parent = history_parents.contains(&checksum);
            in_flight.push(scan_one(
                checksum,
                depth,
                suffix,
                is_history_parent,
                fetcher,
                scheduler,
                store,
                txn,
                &verifier,
                options,
                parent_timestamp,
                fetched_from_collection,
            ));
        }

        let Some(outcome) = in_flight.next().await else {
            break;
        };
        let ScanOutcome::Ready { depth, object, fetched_bytes } = outcome? else {
            continue;
        };
        progress.record_object(fetched_bytes);

        if options.commit_only && matches!(object, Object::Commit(_)) {
            continue;
        }

        let mut children = children_with_suffix(&object);
        if depth == 1 && !options.subdirs.is_empty() {
            if let Object::Dirtree(tree) = &object {
                let allowed: Vec<(Checksum, &'static str)> = tree
                    .entries
                    .iter()
                    .filter(|entry| options.subdirs.iter().any(|s| s == entry.name()))
                    .flat_map(|entry| match entry {
                        DirtreeEntry::File { checksum, .. } => vec![(*checksum, "file")],
                        DirtreeEntry::Dir { tree, meta, .. } => vec![(*tree, "dirtree"), (*meta, "dirmeta")],
                    })
                    .collect();
                children = allowed;
            }
        }
        for (child, child_suffix) in &children {
            kind_hint.entry(*child).or_insert(child_suffix);
        }
        queue.enqueue_children(depth, &object)?;

        if let Object::Commit(commit) = &object {
            if let Some(parent) = commit.parent {
                if continue_history(commits_walked, options.depth) {
                    commits_walked += 1;
                    state.mark_parent_known(parent);
                    history_parents.insert(parent);
                    kind_hint.entry(parent).or_insert("commit");
                    queue.push_root(parent);
                }
            }
        }
    }

    txn.finalize_commit(resolved.commit)?;
    if !options.inherit_transaction {
        txn.advance_ref(resolved.collection.as_deref(), &resolved.name, resolved.commit)?;
    }
    Ok(true)
}

fn bytes_len(bytes: &[u8]) -> u64 {
    bytes.len() as u64
}

/// Fetches `checksum`'s `commitmeta` object and verifies the detached
/// signature it carries, when `options` requires commit signatures. Called
/// once per commit, immediately before that commit is first written, so a
/// commit whose signature fails verification is never written (P6).
async fn verify_commit_signature(
    fetcher: &dyn Fetcher,
    scheduler: &Scheduler,
    checksum: Checksum,
    verifier: &ObjectVerifier<'_>,
    options: &PullOptions,
) -> Result<(), PullError> {
    if !signature_enforced(options, false) {
        return Ok(());
    }
    let path = remote_path(checksum, "commitmeta");
    let outcome = scheduler.fetch(|| fetcher.fetch(FetchRequest::new(path.clone()))).await;
    let bytes = match outcome {
        Ok(FetchOutcome::Fresh { bytes, .. }) => bytes,
        Ok(FetchOutcome::NotModified) => {
            return Err(PullError::new(
                PullErrorKind::NetworkFatal,
                format!("unconditional fetch of {path} unexpectedly returned not-modified"),
            ));
        }
        Err(dagsync_transport::fetch::FetchError::NotFound(_)) => {
            return Err(PullError::new(
                PullErrorKind::Verification,
                format!("commit {checksum} has no commit-meta but signature verification is required"),
            ));
        }
        Err(e) => return Err(classify_fetch(e)),
    };
    let meta = Object::decode(&bytes)
        .map_err(|e| PullError::new(PullErrorKind::Verification, format!("decoding commit-meta for {checksum}")).with_source(e))?;
    let Object::CommitMeta(meta) = meta else {
        return Err(PullError::new(
            PullErrorKind::Verification,
            format!("commit-meta for {checksum} decoded as the wrong object kind"),
        ));
    };
    let signature = meta.metadata.get(COMMIT_SIGNATURE_KEY).ok_or_else(|| {
        PullError::new(
            PullErrorKind::Verification,
            format!("commit-meta for {checksum} carries no {COMMIT_SIGNATURE_KEY} entry"),
        )
    })?;
    verifier
        .verify_signature(checksum, signature)
        .map_err(|e| PullError::new(PullErrorKind::Verification, format!("verifying commit {checksum} signature")).with_source(e))
}

fn store_encoded(store: &FsObjectStore, checksum: Checksum) -> Result<Vec<u8>, PullError> {
    let path = store.object_path(checksum);
    std::fs::read(&path).map_err(|e| io_to_resource("reading local object", e))
}

async fn fetch_object(fetcher: &dyn Fetcher, scheduler: &Scheduler, path: &str) -> Result<Vec<u8>, PullError> {
    let outcome = scheduler
        .fetch(|| fetcher.fetch(FetchRequest::new(path.to_string())))
        .await
        .map_err(classify_fetch)?;
    match outcome {
        FetchOutcome::Fresh { bytes, .. } => Ok(bytes),
        FetchOutcome::NotModified => Err(PullError::new(
            PullErrorKind::NetworkFatal,
            format!("unconditional fetch of {path} unexpectedly returned not-modified"),
        )),
    }
}

/// Selects and applies a static delta for `to`, if one is advertised and an
/// applier is available. Synthesized objects (and the target commit itself,
/// inlined in the superblock) are written straight to the store; the
/// fallback objects a delta cannot synthesize are left for the normal
/// object-walk loop to fetch individually, since it already skips anything
/// [`ObjectStore::has`] reports present. Returns whether a delta was
/// actually applied.
#[allow(clippy::too_many_arguments)]
async fn apply_delta_if_selected(
    fetcher: &dyn Fetcher,
    scheduler: &Scheduler,
    store: &FsObjectStore,
    txn: &Transaction<'_>,
    summary: &Summary,
    to: Checksum,
    local_candidates: &[Checksum],
    delta_applier: Option<&dyn DeltaApplier>,
    verifier: &ObjectVerifier<'_>,
    options: &PullOptions,
    parent_timestamp: Option<u64>,
    fetched_from_collection: Option<&str>,
) -> Result<bool, PullError> {
    let Some(applier) = delta_applier else {
        return Ok(false);
    };
    let (dir, expected_from) = match dagsync_delta::select(summary, to, local_candidates) {
        DeltaSelection::Incremental { from, .. } => (delta_dir(to, Some(from)), Some(from)),
        DeltaSelection::Scratch { .. } => (delta_dir(to, None), None),
        DeltaSelection::None => return Ok(false),
    };

    let superblock_bytes = fetch_object(fetcher, scheduler, &format!("{dir}/superblock")).await?;
    let superblock = Superblock::decode(&superblock_bytes)
        .map_err(|e| PullError::new(PullErrorKind::Verification, "decoding delta superblock").with_source(e))?;
    if superblock.to_commit != to || superblock.from_commit != expected_from {
        return Err(PullError::new(
            PullErrorKind::Verification,
            "delta superblock does not match the selected (to, from) pair",
        ));
    }

    let mut parts = Vec::with_capacity(superblock.parts.len());
    for (index, header) in superblock.parts.iter().enumerate() {
        let bytes = fetch_object(fetcher, scheduler, &format!("{dir}/{index}")).await?;
        ObjectVerifier::verify_checksum(header.checksum, &bytes)
            .map_err(|e| PullError::new(PullErrorKind::Verification, format!("delta part {index}")).with_source(e))?;
        parts.push(bytes);
    }

    let synthesized = applier
        .apply(&superblock, &parts)
        .map_err(|e| PullError::new(PullErrorKind::Verification, "applying static delta").with_source(e))?;

    for (checksum, object) in synthesized {
        if store.has(checksum) {
            continue;
        }
        let encoded = object.encode();
        ObjectVerifier::verify_checksum(checksum, &encoded)
            .map_err(|e| PullError::new(PullErrorKind::Verification, format!("delta-synthesized object {checksum}")).with_source(e))?;
        let _permit = scheduler.write_permit().await;
        txn.write_object(checksum, &encoded)?;
    }

    if !store.has(to) {
        let commit_object = Object::decode(&superblock.to_commit_inline)
            .map_err(|e| PullError::new(PullErrorKind::Verification, "decoding delta-inlined target commit").with_source(e))?;
        verifier
            .verify(to, &commit_object, &superblock.to_commit_inline, parent_timestamp, fetched_from_collection)
            .map_err(|e| PullError::new(PullErrorKind::Verification, format!("verifying delta-inlined commit {to}")).with_source(e))?;
        verify_commit_signature(fetcher, scheduler, to, verifier, options).await?;
        let _permit = scheduler.write_permit().await;
        txn.write_object(to, &superblock.to_commit_inline)?;
    }

    Ok(true)
}

fn parent_timestamp_for(
    store: &FsObjectStore,
    txn: &Transaction<'_>,
    base_ref: &str,
) -> Result<Option<u64>, PullError> {
    let Some(commit) = txn.current_ref(None, base_ref)? else {
        return Ok(None);
    };
    if !store.has(commit) {
        return Ok(None);
    }
    match store.load(commit) {
        Ok(Object::Commit(Commit { timestamp, .. })) => Ok(Some(timestamp)),
        _ => Ok(None),
    }
}
