//! Client-side framing: split requests into write-sized fragments and
//! join indicated fragments back into envelopes

use provd_proto::{decode, DecodeError, Envelope};

/// Responses larger than this are dropped
pub const MAX_RESPONSE: usize = 8 * 1024;

/// Split an encoded request into fragments of at most `size` bytes
pub fn fragments(payload: &[u8], size: usize) -> impl Iterator<Item = &[u8]> {
    payload.chunks(size.max(1))
}

/// Accumulates indicated fragments until they parse as one envelope
#[derive(Debug, Default)]
pub struct ResponseReader {
    buf: Vec<u8>,
}

impl ResponseReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one fragment; returns the envelope once the buffer holds a
    /// complete document
    ///
    /// A buffer that decodes to JSON which is not an envelope, or that
    /// grows past [`MAX_RESPONSE`], is discarded and reported as an error.
    pub fn push(&mut self, fragment: &[u8]) -> Result<Option<Envelope>, DecodeError> {
        self.buf.extend_from_slice(fragment);
        match decode(&self.buf) {
            Ok(envelope) => {
                self.buf.clear();
                Ok(Some(envelope))
            }
            Err(e) if e.is_recoverable() && self.buf.len() <= MAX_RESPONSE => Ok(None),
            Err(e) => {
                self.buf.clear();
                Err(e)
            }
        }
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
