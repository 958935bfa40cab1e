#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `dagsync_checksum` provides the single content-address primitive used
//! throughout the pull engine: a 32-byte SHA-256 digest with two
//! interchangeable representations, raw bytes and a 64-character lowercase
//! hex string. Every object the engine writes is addressed by the checksum
//! of its canonical serialization; this crate is the bottom of that stack.
//!
//! # Design
//!
//! [`Checksum`] wraps a `[u8; 32]` and offers `from_hex`/`to_hex` and
//! `from_bytes`/`as_bytes` conversions, plus [`Checksum::of`] to hash a byte
//! slice directly via [`sha2::Sha256`]. The type is `Copy`, orderable, and
//! hashable so it can key `HashMap`/`BTreeMap` tables throughout the engine
//! without cloning.
//!
//! # Invariants
//!
//! - `Checksum::from_hex(checksum.to_hex()) == checksum` for every value
//!   (round-trip law R1).
//! - `from_hex` rejects any input that is not exactly 64 lowercase hex
//!   characters; it never silently truncates or pads.
//!
//! # Errors
//!
//! [`ChecksumError`] reports malformed hex (wrong length, non-hex byte) or a
//! byte slice of the wrong length passed to [`Checksum::from_bytes`].
//!
//! # Examples
//!
//! ```
//! use dagsync_checksum::Checksum;
//!
//! let sum = Checksum::of(b"hello world");
//! let hex = sum.to_hex();
//! assert_eq!(Checksum::from_hex(&hex).unwrap(), sum);
//! ```

use std::fmt;
use std::str::FromStr;

use digest::Digest;
use thiserror::Error;

/// Number of raw bytes in a checksum (SHA-256 output length).
pub const CHECKSUM_LEN: usize = 32;

/// Number of hex characters in a checksum's string representation.
pub const CHECKSUM_HEX_LEN: usize = CHECKSUM_LEN * 2;

/// A 32-byte SHA-256 content address.
///
/// Both the raw-byte and hex-string forms are first-class; neither is
/// privileged as "the" internal representation beyond storage layout.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct Checksum([u8; CHECKSUM_LEN]);

/// Errors raised while parsing or constructing a [`Checksum`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChecksumError {
    /// The hex string was not exactly [`CHECKSUM_HEX_LEN`] characters long.
    #[error("checksum hex string must be {CHECKSUM_HEX_LEN} characters, got {0}")]
    WrongHexLength(usize),
    /// The hex string contained a non-hex-digit byte.
    #[error("checksum hex string contains a non-hex character at byte {0}")]
    InvalidHexChar(usize),
    /// A byte slice passed to [`Checksum::from_bytes`] was not exactly
    /// [`CHECKSUM_LEN`] bytes long.
    #[error("checksum byte slice must be {CHECKSUM_LEN} bytes, got {0}")]
    WrongByteLength(usize),
}

impl Checksum {
    /// Hashes `data` with SHA-256 and wraps the result.
    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        let digest = sha2::Sha256::digest(data);
        Self(digest.into())
    }

    /// Wraps an already-computed 32-byte digest.
    #[must_use]
    pub fn from_array(bytes: [u8; CHECKSUM_LEN]) -> Self {
        Self(bytes)
    }

    /// Parses a checksum from a byte slice, requiring an exact length match.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChecksumError> {
        let array: [u8; CHECKSUM_LEN] = bytes
            .try_into()
            .map_err(|_| ChecksumError::WrongByteLength(bytes.len()))?;
        Ok(Self(array))
    }

    /// Parses a checksum from a lowercase hex string.
    pub fn from_hex(hex: &str) -> Result<Self, ChecksumError> {
        let hex = hex.as_bytes();
        if hex.len() != CHECKSUM_HEX_LEN {
            return Err(ChecksumError::WrongHexLength(hex.len()));
        }
        let mut out = [0u8; CHECKSUM_LEN];
        for (i, chunk) in hex.chunks_exact(2).enumerate() {
            let hi = hex_digit(chunk[0]).ok_or(ChecksumError::InvalidHexChar(i * 2))?;
            let lo = hex_digit(chunk[1]).ok_or(ChecksumError::InvalidHexChar(i * 2 + 1))?;
            out[i] = (hi << 4) | lo;
        }
        Ok(Self(out))
    }

    /// Returns the raw 32-byte representation.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; CHECKSUM_LEN] {
        &self.0
    }

    /// Renders the checksum as a 64-character lowercase hex string.
    #[must_use]
    pub fn to_hex(self) -> String {
        let mut out = String::with_capacity(CHECKSUM_HEX_LEN);
        for byte in self.0 {
            use fmt::Write as _;
            write!(&mut out, "{byte:02x}").expect("write! to String cannot fail");
        }
        out
    }

    /// Splits the hex form into the `(first two chars, remaining 62 chars)`
    /// pair used by the remote object path layout (`objects/<aa>/<rest>`).
    #[must_use]
    pub fn split_object_path(self) -> (String, String) {
        let hex = self.to_hex();
        let (head, tail) = hex.split_at(2);
        (head.to_string(), tail.to_string())
    }
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Checksum").field(&self.to_hex()).finish()
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Checksum {
    type Err = ChecksumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for Checksum {
    type Error = ChecksumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Checksum> for String {
    fn from(value: Checksum) -> Self {
        value.to_hex()
    }
}
