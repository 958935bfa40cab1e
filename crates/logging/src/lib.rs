#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! A per-category verbosity system, the way the teacher's own `logging`
//! crate lets `-v`/`--debug` turn on progressively noisier output for
//! individual subsystems rather than one global level. Here the
//! categories are the pull engine's own components instead of rsync's
//! transfer phases: [`InfoFlag`] covers user-facing progress (ref
//! resolution, scan, delta selection, transaction commit, summary
//! statistics), and [`DebugFlag`] covers internals a developer debugging
//! the engine would want (fetch scheduling, verification, the scheduler's
//! concurrency bookkeeping, cache hits, wire decoding).
//!
//! # Design
//!
//! [`VerbosityConfig`] holds a per-flag `u8` level; [`init`] installs it
//! as the process-global configuration (repeatable — a later `init` fully
//! replaces an earlier one, there is no merging). [`info_log`]/[`debug_log`]
//! check the configured level with [`info_gte`]/[`debug_gte`] before doing
//! any work, so disabled categories cost one atomic load. With the
//! `tracing` feature (on by default), [`install_tracing`] bridges emitted
//! events into a real `tracing_subscriber::fmt` subscriber filtered by
//! `RUST_LOG`; without it, [`drain_events`] lets tests and the CLI inspect
//! what would have been logged.
//!
//! # See also
//!
//! - [`dagsync_engine::progress`] for the snapshot-based progress reporter
//!   this crate's [`InfoFlag::Stats`] category feeds.

use std::sync::{Mutex, OnceLock, RwLock};

/// A user-facing progress category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InfoFlag {
    /// Ref resolution and advancement.
    Ref,
    /// Object-graph scanning (the work queue, C6).
    Scan,
    /// Delta selection and application (C5).
    Delta,
    /// Transaction staging and commit (C9).
    Transaction,
    /// Byte/object-count summary statistics.
    Stats,
}

/// An internals-facing debug category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DebugFlag {
    /// Fetch dispatch and retry handling (C1/C7).
    Fetch,
    /// Checksum, signature, and binding verification (C8).
    Verify,
    /// The fetch scheduler's semaphore and queue bookkeeping (C7).
    Scheduler,
    /// Local object-store and summary-cache hits/misses (C3).
    Cache,
    /// Wire encoding and decoding of objects and summaries.
    Wire,
}

/// Per-[`InfoFlag`] verbosity levels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InfoLevels {
    /// Level for [`InfoFlag::Ref`].
    pub r#ref: u8,
    /// Level for [`InfoFlag::Scan`].
    pub scan: u8,
    /// Level for [`InfoFlag::Delta`].
    pub delta: u8,
    /// Level for [`InfoFlag::Transaction`].
    pub transaction: u8,
    /// Level for [`InfoFlag::Stats`].
    pub stats: u8,
}

/// Per-[`DebugFlag`] verbosity levels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DebugLevels {
    /// Level for [`DebugFlag::Fetch`].
    pub fetch: u8,
    /// Level for [`DebugFlag::Verify`].
    pub verify: u8,
    /// Level for [`DebugFlag::Scheduler`].
    pub scheduler: u8,
    /// Level for [`DebugFlag::Cache`].
    pub cache: u8,
    /// Level for [`DebugFlag::Wire`].
    pub wire: u8,
}

/// The full verbosity configuration installed by [`init`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VerbosityConfig {
    /// User-facing progress levels.
    pub info: InfoLevels,
    /// Internals debug levels.
    pub debug: DebugLevels,
}

fn config_cell() -> &'static RwLock<VerbosityConfig> {
    static CONFIG: OnceLock<RwLock<VerbosityConfig>> = OnceLock::new();
    CONFIG.get_or_init(|| RwLock::new(VerbosityConfig::default()))
}

fn events_cell() -> &'static Mutex<Vec<LogEvent>> {
    static EVENTS: OnceLock<Mutex<Vec<LogEvent>>> = OnceLock::new();
    EVENTS.get_or_init(|| Mutex::new(Vec::new()))
}

/// Installs `config` as the process-global verbosity configuration,
/// replacing whatever was installed before.
pub fn init(config: VerbosityConfig) {
    *config_cell().write().expect("verbosity lock poisoned") = config;
}

/// The currently installed verbosity configuration.
#[must_use]
pub fn current() -> VerbosityConfig {
    *config_cell().read().expect("verbosity lock poisoned")
}

fn info_level(flag: InfoFlag) -> u8 {
    let config = current();
    match flag {
        InfoFlag::Ref => config.info.r#ref,
        InfoFlag::Scan => config.info.scan,
        InfoFlag::Delta => config.info.delta,
        InfoFlag::Transaction => config.info.transaction,
        InfoFlag::Stats => config.info.stats,
    }
}

fn debug_level(flag: DebugFlag) -> u8 {
    let config = current();
    match flag {
        DebugFlag::Fetch => config.debug.fetch,
        DebugFlag::Verify => config.debug.verify,
        DebugFlag::Scheduler => config.debug.scheduler,
        DebugFlag::Cache => config.debug.cache,
        DebugFlag::Wire => config.debug.wire,
    }
}

/// Whether `flag`'s configured level is at least `level`.
#[must_use]
pub fn info_gte(flag: InfoFlag, level: u8) -> bool {
    info_level(flag) >= level
}

/// Whether `flag`'s configured level is at least `level`.
#[must_use]
pub fn debug_gte(flag: DebugFlag, level: u8) -> bool {
    debug_level(flag) >= level
}

/// Sets an [`InfoFlag`] level by its lowercase name, with an optional
/// trailing digit (`"delta2"` means level 2; a bare name means level 1).
///
/// # Errors
///
/// Returns an error string if the name doesn't match a known flag.
pub fn apply_info_flag(spec: &str) -> Result<(), String> {
    let (name, level) = split_level(spec);
    let mut guard = config_cell().write().expect("verbosity lock poisoned");
    match name {
        "ref" => guard.info.r#ref = level,
        "scan" => guard.info.scan = level,
        "delta" => guard.info.delta = level,
        "transaction" => guard.info.transaction = level,
        "stats" => guard.info.stats = level,
        other => return Err(format!("unknown info flag: {other}")),
    }
    Ok(())
}

/// Sets a [`DebugFlag`] level by its lowercase name; same syntax as
/// [`apply_info_flag`].
///
/// # Errors
///
/// Returns an error string if the name doesn't match a known flag.
pub fn apply_debug_flag(spec: &str) -> Result<(), String> {
    let (name, level) = split_level(spec);
    let mut guard = config_cell().write().expect("verbosity lock poisoned");
    match name {
        "fetch" => guard.debug.fetch = level,
        "verify" => guard.debug.verify = level,
        "scheduler" => guard.debug.scheduler = level,
        "cache" => guard.debug.cache = level,
        "wire" => guard.debug.wire = level,
        other => return Err(format!("unknown debug flag: {other}")),
    }
    Ok(())
}

fn split_level(spec: &str) -> (&str, u8) {
    let digits_at = spec.find(|c: char| c.is_ascii_digit());
    match digits_at {
        Some(at) => {
            let level = spec[at..].parse().unwrap_or(1);
            (&spec[..at], level)
        }
        None => (spec, 1),
    }
}

/// A single recorded log event, captured by [`drain_events`] for tests
/// and for callers not using the `tracing` bridge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEvent {
    /// Human-readable category name (`"info:delta"`, `"debug:fetch"`).
    pub category: &'static str,
    /// The level the event was emitted at.
    pub level: u8,
    /// The formatted message.
    pub message: String,
}

#[doc(hidden)]
pub fn record_info(flag: &'static str, level: u8, message: std::fmt::Arguments<'_>) {
    let message = message.to_string();
    #[cfg(feature = "tracing")]
    tracing::info!(category = flag, level, "{message}");
    events_cell()
        .lock()
        .expect("event log poisoned")
        .push(LogEvent {
            category: flag,
            level,
            message,
        });
}

#[doc(hidden)]
pub fn record_debug(flag: &'static str, level: u8, message: std::fmt::Arguments<'_>) {
    let message = message.to_string();
    #[cfg(feature = "tracing")]
    tracing::debug!(category = flag, level, "{message}");
    events_cell()
        .lock()
        .expect("event log poisoned")
        .push(LogEvent {
            category: flag,
            level,
            message,
        });
}

/// Drains and returns every event recorded since the last drain.
pub fn drain_events() -> Vec<LogEvent> {
    std::mem::take(&mut *events_cell().lock().expect("event log poisoned"))
}

/// Emits an info-level event if `InfoFlag::$flag`'s configured level is at
/// least `$level`.
#[macro_export]
macro_rules! info_log {
    ($flag:ident, $level:expr, $($arg:tt)*) => {
        if $crate::info_gte($crate::InfoFlag::$flag, $level) {
            $crate::record_info(concat!("info:", stringify!($flag)), $level, format_args!($($arg)*));
        }
    };
}

/// Emits a debug-level event if `DebugFlag::$flag`'s configured level is
/// at least `$level`.
#[macro_export]
macro_rules! debug_log {
    ($flag:ident, $level:expr, $($arg:tt)*) => {
        if $crate::debug_gte($crate::DebugFlag::$flag, $level) {
            $crate::record_debug(concat!("debug:", stringify!($flag)), $level, format_args!($($arg)*));
        }
    };
}

/// Installs a `tracing_subscriber::fmt` subscriber filtered by the
/// `RUST_LOG` environment variable (or `info` if unset), mirroring the
/// teacher's own tracing-bridge example. A no-op if a global subscriber
/// is already installed.
#[cfg(feature = "tracing")]
pub fn install_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_gte_returns_true_for_sufficient_level() {
        let mut config = VerbosityConfig::default();
        config.info.delta = 3;
        init(config);

        assert!(info_gte(InfoFlag::Delta, 0));
        assert!(info_gte(InfoFlag::Delta, 3));
        assert!(!info_gte(InfoFlag::Delta, 4));
    }

    #[test]
    fn debug_gte_returns_true_for_sufficient_level() {
        let mut config = VerbosityConfig::default();
        config.debug.fetch = 2;
        init(config);

        assert!(debug_gte(DebugFlag::Fetch, 2));
        assert!(!debug_gte(DebugFlag::Fetch, 3));
    }

    #[test]
    fn apply_info_flag_updates_config() {
        init(VerbosityConfig::default());
        apply_info_flag("scan2").unwrap();
        assert!(info_gte(InfoFlag::Scan, 2));
        assert!(!info_gte(InfoFlag::Scan, 3));
    }

    #[test]
    fn apply_flag_default_level_is_one() {
        init(VerbosityConfig::default());
        apply_debug_flag("cache").unwrap();
        assert!(debug_gte(DebugFlag::Cache, 1));
        assert!(!debug_gte(DebugFlag::Cache, 2));
    }

    #[test]
    fn apply_info_flag_rejects_unknown() {
        init(VerbosityConfig::default());
        let err = apply_info_flag("not_a_flag").unwrap_err();
        assert!(err.contains("unknown info flag"));
    }

    #[test]
    fn filtering_prevents_log_emission() {
        let mut config = VerbosityConfig::default();
        config.info.transaction = 1;
        init(config);
        drain_events();

        info_log!(Transaction, 1, "visible");
        info_log!(Transaction, 2, "filtered");
        info_log!(Scan, 1, "different flag - filtered");

        let events = drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, "info:Transaction");
    }

    #[test]
    fn reinit_replaces_config() {
        let mut config = VerbosityConfig::default();
        config.info.delta = 5;
        init(config);
        assert!(info_gte(InfoFlag::Delta, 5));

        init(VerbosityConfig::default());
        assert!(!info_gte(InfoFlag::Delta, 1));
    }
}
