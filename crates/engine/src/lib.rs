#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `dagsync_engine` is the pull engine itself: every component named in
//! the architecture (C3 through C11) except the fetcher facade, the
//! object verifier, the delta selector, and the object store, which live
//! in their own crates and are wired together here.
//!
//! # Design
//!
//! [`controller::pull`] is the single entry point. It drives
//! [`state::PullState`] forward through [`state::Phase`], consulting
//! [`summary_cache`] for the remote's summary, [`refs`] to turn requested
//! ref names into commit checksums, [`scan`] to walk the object graph
//! reachable from each, [`scheduler`] to bound and retry the fetches that
//! walk requires, [`transaction`] to write verified objects and advance
//! refs atomically, and [`progress`] to report counters back to the
//! caller throughout.
//!
//! Each submodule is independently testable against the trait boundaries
//! (`dagsync_transport::fetch::Fetcher`, `dagsync_store::ObjectStore`)
//! the rest of the workspace defines; [`controller`] is the only module
//! that needs every other crate at once.

pub mod controller;
pub mod progress;
pub mod refs;
pub mod scan;
pub mod scheduler;
pub mod state;
pub mod summary_cache;
pub mod transaction;

pub use controller::{pull, PullOutcome};
pub use state::{Phase, PullState};
