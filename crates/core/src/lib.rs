#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `dagsync_core` centralizes the concerns shared by every other crate in
//! the workspace: the pull engine's seven-kind error taxonomy ([`error`])
//! and its caller-facing configuration surface ([`options`]). The
//! kind-to-exit-code mapping lives with its only consumer, in
//! `dagsync_cli::exit_code_from`, rather than here.
//!
//! # Design
//!
//! Every fallible operation elsewhere in the workspace ultimately returns
//! (or is wrapped into) a [`error::PullError`], so user-visible diagnostics
//! share one `Display` implementation and one prefixing convention
//! ("component: detail").
//!
//! # See also
//!
//! - [`dagsync_engine`] for the component that actually raises most of
//!   these errors.
//! - [`dagsync_cli`] for the binary-facing consumer that turns a terminal
//!   [`error::PullError`] into a process exit status.

pub mod error;
pub mod options;

pub use error::{PullError, PullErrorKind};
pub use options::{PullOptions, PullOptionsBuilder};
