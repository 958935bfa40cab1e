//! Minimal length-prefixed reader/writer shared by [`crate::Summary`] and
//! [`crate::delta`] encodings. Kept private and duplicated rather than
//! depending on `dagsync-objects`, since summaries and deltas are a
//! different wire artifact with their own evolution path.

use dagsync_checksum::Checksum;
use thiserror::Error;

/// Errors raised while decoding a summary or delta artifact.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// The buffer ended before a length-prefixed field could be read.
    #[error("truncated input: expected {expected} more bytes, found {found}")]
    Truncated {
        /// Bytes required to continue decoding.
        expected: usize,
        /// Bytes actually remaining.
        found: usize,
    },
    /// A string field was not valid UTF-8.
    #[error("field is not valid UTF-8")]
    InvalidUtf8,
    /// An enum/tag byte did not match a known variant.
    #[error("unknown tag byte {0}")]
    UnknownTag(u8),
}

pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        let remaining = self.buf.len() - self.pos;
        if remaining < n {
            return Err(WireError::Truncated {
                expected: n,
                found: remaining,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u32(&mut self) -> Result<u32, WireError> {
        let b: [u8; 4] = self.take(4)?.try_into().expect("take(4)");
        Ok(u32::from_le_bytes(b))
    }

    pub(crate) fn u64(&mut self) -> Result<u64, WireError> {
        let b: [u8; 8] = self.take(8)?.try_into().expect("take(8)");
        Ok(u64::from_le_bytes(b))
    }

    pub(crate) fn bytes(&mut self) -> Result<Vec<u8>, WireError> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub(crate) fn string(&mut self) -> Result<String, WireError> {
        String::from_utf8(self.bytes()?).map_err(|_| WireError::InvalidUtf8)
    }

    pub(crate) fn checksum(&mut self) -> Result<Checksum, WireError> {
        let bytes = self.take(dagsync_checksum::CHECKSUM_LEN)?;
        Checksum::from_bytes(bytes).map_err(|_| WireError::Truncated {
            expected: dagsync_checksum::CHECKSUM_LEN,
            found: bytes.len(),
        })
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

pub(crate) fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

pub(crate) fn put_string(out: &mut Vec<u8>, s: &str) {
    put_bytes(out, s.as_bytes());
}

pub(crate) fn put_checksum(out: &mut Vec<u8>, checksum: Checksum) {
    out.extend_from_slice(checksum.as_bytes());
}
