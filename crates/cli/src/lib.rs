#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The command-line front end for the pull engine: argument parsing,
//! translating flags into a [`dagsync_core::options::PullOptions`], driving
//! [`dagsync_engine::controller::pull`] on a `tokio` runtime, and mapping
//! the outcome (or error) onto a process exit code.
//!
//! # Design
//!
//! [`build_command`] defines the argument grammar with `clap`'s builder API
//! (no derive macro, matching how this workspace already uses `clap`
//! elsewhere); [`run`] parses, builds a [`dagsync_core::options::PullOptions`]
//! via its builder, and drives one pull to completion, printing progress
//! lines the way the teacher's own CLI streams transfer stats.
//! [`exit_code_from`] is kept separate from [`run`] so a caller embedding
//! this crate (or a test) can inspect a [`dagsync_core::error::PullError`]
//! without going through `std::process::exit`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Arg, ArgAction, Command};
use dagsync_core::error::{PullError, PullErrorKind};
use dagsync_core::options::PullOptionsBuilder;
use dagsync_engine::controller;
use dagsync_verify::{Ed25519Verifier, SignatureVerifier};

/// Builds the `dagsync` command-line grammar.
#[must_use]
pub fn build_command() -> Command {
    Command::new("dagsync")
        .about("Pull a content-addressed object graph from a remote summary")
        .arg(Arg::new("repo").required(true).help("Local repository directory"))
        .arg(Arg::new("remote").required(true).help("Remote base URL, or a metalink= indirection"))
        .arg(Arg::new("ref").required(true).num_args(1..).help("Ref name(s) to pull"))
        .arg(Arg::new("mirror").long("mirror").action(ArgAction::SetTrue))
        .arg(Arg::new("commit-only").long("commit-only").action(ArgAction::SetTrue))
        .arg(Arg::new("untrusted").long("untrusted").action(ArgAction::SetTrue))
        .arg(Arg::new("bareuseronly-files").long("bareuseronly-files").action(ArgAction::SetTrue))
        .arg(Arg::new("metadata-only").long("metadata-only").action(ArgAction::SetTrue))
        .arg(Arg::new("trusted-http").long("trusted-http").action(ArgAction::SetTrue))
        .arg(Arg::new("subdir").long("subdir").action(ArgAction::Append).help("Restrict the walk to this subdirectory; repeatable"))
        .arg(Arg::new("remote-name").long("remote-name").help("Name this remote is stored under locally"))
        .arg(Arg::new("gpg-verify").long("gpg-verify").action(ArgAction::SetTrue))
        .arg(Arg::new("gpg-verify-summary").long("gpg-verify-summary").action(ArgAction::SetTrue))
        .arg(Arg::new("no-gpg-verify").long("no-gpg-verify").action(ArgAction::SetTrue))
        .arg(Arg::new("no-gpg-verify-summary").long("no-gpg-verify-summary").action(ArgAction::SetTrue))
        .arg(Arg::new("keyring").long("keyring").help("Path to a raw 32-byte ed25519 public key trusted for commit/summary signatures"))
        .arg(Arg::new("depth").long("depth").help("History depth to walk; -1 for infinite").default_value("-1"))
        .arg(Arg::new("disable-static-deltas").long("disable-static-deltas").action(ArgAction::SetTrue))
        .arg(Arg::new("require-static-deltas").long("require-static-deltas").action(ArgAction::SetTrue))
        .arg(Arg::new("timestamp-check").long("timestamp-check").action(ArgAction::SetTrue))
        .arg(Arg::new("timestamp-check-from-rev").long("timestamp-check-from-rev"))
        .arg(Arg::new("max-metadata-size").long("max-metadata-size").help("Maximum size in bytes for a single metadata object"))
        .arg(Arg::new("dry-run").long("dry-run").action(ArgAction::SetTrue))
        .arg(Arg::new("url").long("url").help("Override the remote's configured URL"))
        .arg(Arg::new("inherit-transaction").long("inherit-transaction").action(ArgAction::SetTrue))
        .arg(Arg::new("per-object-fsync").long("per-object-fsync").action(ArgAction::SetTrue))
        .arg(Arg::new("header").long("header").action(ArgAction::Append).help("Extra HTTP header as KEY=VALUE; repeatable"))
        .arg(Arg::new("update-frequency-ms").long("update-frequency-ms"))
        .arg(Arg::new("localcache-repo").long("localcache-repo").action(ArgAction::Append).help("Local repository consulted for importable objects; repeatable"))
        .arg(Arg::new("append-user-agent").long("append-user-agent"))
        .arg(Arg::new("retries").long("retries").help("Transient-network-failure retry budget"))
        .arg(Arg::new("verbose").short('v').long("verbose").action(ArgAction::Count))
        .arg(Arg::new("quiet").short('q').long("quiet").action(ArgAction::SetTrue))
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("invalid --header {raw:?}, expected KEY=VALUE"))
}

fn load_keyring(path: &str) -> Result<Ed25519Verifier, PullError> {
    let bytes = std::fs::read(path).map_err(|e| {
        PullError::new(PullErrorKind::Misconfiguration, format!("reading keyring {path:?}")).with_source(e)
    })?;
    let key_bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        PullError::new(
            PullErrorKind::Misconfiguration,
            format!("keyring {path:?} is not exactly 32 bytes"),
        )
    })?;
    let key = ed25519_dalek::VerifyingKey::from_bytes(&key_bytes).map_err(|e| {
        PullError::new(PullErrorKind::Misconfiguration, format!("keyring {path:?} is not a valid ed25519 public key"))
            .with_source(e)
    })?;
    Ok(Ed25519Verifier::new(key))
}

/// Applies `-v`/`--verbose` to [`dagsync_logging`]'s process-global
/// verbosity: each level bumps every info category by one, matching the
/// teacher's own "repeat the flag for more detail" convention.
fn apply_verbosity(count: u8, quiet: bool) {
    let level = if quiet { 0 } else { count };
    dagsync_logging::init(dagsync_logging::VerbosityConfig {
        info: dagsync_logging::InfoLevels {
            r#ref: level,
            scan: level,
            delta: level,
            transaction: level,
            stats: level,
        },
        debug: dagsync_logging::DebugLevels {
            fetch: level.saturating_sub(1),
            verify: level.saturating_sub(1),
            scheduler: level.saturating_sub(1),
            cache: level.saturating_sub(1),
            wire: level.saturating_sub(1),
        },
    });
}

/// Parses `args` (excluding the program name) and runs one pull,
/// printing progress to stdout and errors to stderr.
///
/// # Errors
///
/// Returns the first terminal [`PullError`] the pull encountered, or a
/// [`PullErrorKind::Misconfiguration`] error for a malformed argument.
pub async fn run<I, S>(args: I) -> Result<(), PullError>
where
    I: IntoIterator<Item = S>,
    S: Into<std::ffi::OsString> + Clone,
{
    let matches = build_command()
        .try_get_matches_from(args)
        .map_err(|e| PullError::new(PullErrorKind::Misconfiguration, e.to_string()))?;

    apply_verbosity(
        matches.get_count("verbose"),
        matches.get_flag("quiet"),
    );
    dagsync_logging::install_tracing();

    let repo: PathBuf = matches.get_one::<String>("repo").expect("required").into();
    let remote = matches.get_one::<String>("remote").expect("required").clone();
    let refs: Vec<String> = matches
        .get_many::<String>("ref")
        .expect("required")
        .cloned()
        .collect();

    let mut builder = PullOptionsBuilder::new(refs)
        .mirror(matches.get_flag("mirror"))
        .commit_only(matches.get_flag("commit-only"))
        .untrusted(matches.get_flag("untrusted"))
        .bareuseronly_files(matches.get_flag("bareuseronly-files"))
        .metadata_only(matches.get_flag("metadata-only"))
        .trusted_http(matches.get_flag("trusted-http"))
        .gpg_verify(matches.get_flag("gpg-verify"))
        .gpg_verify_summary(matches.get_flag("gpg-verify-summary"))
        .disable_sign_verify(matches.get_flag("no-gpg-verify"))
        .disable_sign_verify_summary(matches.get_flag("no-gpg-verify-summary"))
        .disable_static_deltas(matches.get_flag("disable-static-deltas"))
        .require_static_deltas(matches.get_flag("require-static-deltas"))
        .timestamp_check(matches.get_flag("timestamp-check"))
        .dry_run(matches.get_flag("dry-run"))
        .inherit_transaction(matches.get_flag("inherit-transaction"))
        .per_object_fsync(matches.get_flag("per-object-fsync"));

    if let Some(subdirs) = matches.get_many::<String>("subdir") {
        builder = builder.subdirs(subdirs.cloned());
    }
    if let Some(name) = matches.get_one::<String>("remote-name") {
        builder = builder.override_remote_name(name.clone());
    }
    if let Some(depth) = matches.get_one::<String>("depth") {
        let depth: i64 = depth
            .parse()
            .map_err(|_| PullError::new(PullErrorKind::Misconfiguration, format!("invalid --depth {depth:?}")))?;
        builder = builder.depth(depth);
    }
    if let Some(rev) = matches.get_one::<String>("timestamp-check-from-rev") {
        builder = builder.timestamp_check_from_rev(rev.clone());
    }
    if let Some(size) = matches.get_one::<String>("max-metadata-size") {
        let size: u64 = size
            .parse()
            .map_err(|_| PullError::new(PullErrorKind::Misconfiguration, format!("invalid --max-metadata-size {size:?}")))?;
        builder = builder.max_metadata_size(size);
    }
    if let Some(url) = matches.get_one::<String>("url") {
        builder = builder.override_url(url.clone());
    }
    if let Some(headers) = matches.get_many::<String>("header") {
        for raw in headers {
            let (key, value) = parse_header(raw).map_err(|e| PullError::new(PullErrorKind::Misconfiguration, e))?;
            builder = builder.http_header(key, value);
        }
    }
    if let Some(ms) = matches.get_one::<String>("update-frequency-ms") {
        let ms: u64 = ms
            .parse()
            .map_err(|_| PullError::new(PullErrorKind::Misconfiguration, format!("invalid --update-frequency-ms {ms:?}")))?;
        builder = builder.update_frequency_ms(ms);
    }
    if let Some(repos) = matches.get_many::<String>("localcache-repo") {
        for repo in repos {
            builder = builder.localcache_repo(PathBuf::from(repo));
        }
    }
    if let Some(agent) = matches.get_one::<String>("append-user-agent") {
        builder = builder.append_user_agent(agent.clone());
    }
    if let Some(retries) = matches.get_one::<String>("retries") {
        let retries: u32 = retries
            .parse()
            .map_err(|_| PullError::new(PullErrorKind::Misconfiguration, format!("invalid --retries {retries:?}")))?;
        builder = builder.n_network_retries(retries);
    }

    let options = builder.build()?;

    let verifier = match matches.get_one::<String>("keyring") {
        Some(path) => Some(load_keyring(path)?),
        None => None,
    };
    let signature_verifier: Option<&dyn SignatureVerifier> = verifier.as_ref().map(|v| v as &dyn SignatureVerifier);

    let outcome = controller::pull(&repo, &remote, &options, signature_verifier, None).await?;

    for (resolved, moved) in &outcome.refs {
        if moved {
            println!("{}: now at {}", resolved.name, resolved.commit);
        } else {
            println!("{}: already up to date at {}", resolved.name, resolved.commit);
        }
    }
    println!(
        "{} objects, {} bytes transferred",
        outcome.progress.objects_fetched, outcome.progress.bytes_fetched
    );

    Ok(())
}

/// Maps a [`PullError`]'s kind onto a process exit code, following the
/// `sysexits.h`-flavored convention the teacher's own CLI uses for its own
/// terminal error classes.
#[must_use]
pub fn exit_code_from(error: &PullError) -> i32 {
    match error.kind() {
        PullErrorKind::Misconfiguration => 64,
        PullErrorKind::NotFound => 65,
        PullErrorKind::Verification => 66,
        PullErrorKind::NetworkTransient | PullErrorKind::NetworkFatal => 69,
        PullErrorKind::Resource => 74,
        PullErrorKind::Cancelled => 130,
    }
}

/// Builds a current-thread-friendly multi-thread `tokio` runtime and runs
/// [`run`] to completion, returning the process exit code: `0` on success,
/// [`exit_code_from`] on failure. Intended for `main`.
#[must_use]
pub fn main_with_args<I, S>(args: I) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<std::ffi::OsString> + Clone,
{
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("dagsync: failed to start async runtime: {e}");
            return 71;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("dagsync: {e}");
            exit_code_from(&e)
        }
    }
}
