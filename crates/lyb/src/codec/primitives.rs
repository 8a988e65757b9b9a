//! Byte cursors under the chunk layer.
//!
//! Neither type knows about chunk framing: [`Reader`] walks a slice with
//! bounds checks and [`Writer`] appends to a buffer it can patch later.
//! [`super::chunk`] builds the framed reader and writer on top of them.

use crate::error::{DecodeError, EncodeError};
use crate::limits::MAX_STRING_LEN;

// =============================================================================
// DECODING
// =============================================================================

/// Forward-only cursor over an input slice.
///
/// Every read names what it was reading so a truncated input reports the
/// field where it ran out.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Offset of the next unread byte.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining_len(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Looks at the next byte without moving.
    pub fn peek_byte(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Borrows the next `n` bytes and moves past them.
    #[inline]
    pub fn read_bytes(&mut self, n: usize, context: &'static str) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or(DecodeError::UnexpectedEof { context })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    #[inline]
    pub fn read_u16(&mut self, context: &'static str) -> Result<u16, DecodeError> {
        let bytes = self.read_bytes(2, context)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn skip(&mut self, n: usize, context: &'static str) -> Result<(), DecodeError> {
        self.read_bytes(n, context).map(|_| ())
    }
}

// =============================================================================
// ENCODING
// =============================================================================

/// Growable output buffer.
///
/// Meta records are reserved as zeros and filled in with [`Writer::patch`]
/// once the chunk they describe is complete.
#[derive(Debug, Clone, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Number of bytes written so far, which is also the offset of the next.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Replaces bytes already written at `position`.
    pub fn patch(&mut self, position: usize, bytes: &[u8]) -> Result<(), EncodeError> {
        let target = position
            .checked_add(bytes.len())
            .and_then(|end| self.buf.get_mut(position..end))
            .ok_or(EncodeError::Internal {
                context: "patch outside of written bytes",
            })?;
        target.copy_from_slice(bytes);
        Ok(())
    }
}

/// Checks that a length fits the 2-byte length prefix.
pub fn checked_u16_len(len: usize, field: &'static str) -> Result<u16, EncodeError> {
    if len > MAX_STRING_LEN {
        return Err(EncodeError::LengthExceedsLimit {
            field,
            len,
            max: MAX_STRING_LEN,
        });
    }
    Ok(len as u16)
}
