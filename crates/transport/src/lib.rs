#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `dagsync_transport` is C1 (the fetcher facade) and C2 (the mirrorlist
//! resolver): the only place the pull engine talks to the network or a
//! local mirror directory. Every other crate asks for bytes by path and
//! gets back a [`fetch::FetchOutcome`] or a classified [`fetch::FetchError`];
//! none of them construct a [`reqwest::Client`] or open a file directly.
//!
//! # Design
//!
//! [`fetch::Fetcher`] is a small async trait with two implementations:
//! [`fetch::HttpFetcher`] for `http://`/`https://` base URIs, and
//! [`fetch::FileFetcher`] for `file://` mirrors (used for the local-import
//! path, §5). [`mirrorlist::resolve`] turns a configured remote URL —
//! possibly a `mirrorlist=<url>` indirection — into the ordered list of
//! base URIs [`fetch::HttpFetcher`] round-robins across on retry.
//!
//! # Errors
//!
//! [`fetch::FetchError`] distinguishes transient failures (timeouts, 5xx,
//! connection reset — retryable by the scheduler) from fatal ones (4xx
//! other than 404, malformed responses) and from not-found (404 on an
//! optional asset, swallowed by the caller). This split mirrors the
//! network-transient / network-fatal / not-found error classes in the
//! pull engine's error taxonomy.

pub mod fetch;
pub mod mirrorlist;

pub use fetch::{FetchError, FetchOutcome, FetchRequest, Fetcher, FileFetcher, HttpFetcher};
pub use mirrorlist::{resolve as resolve_mirrors, RemoteUrl};
