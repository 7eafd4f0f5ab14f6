//! Frame decoding.

use crate::codec::NONE_LEN;
use crate::error::{DecodeError, DecodeResult};
use crate::types::{FormatVersion, ItemId, ItemType};
use bytes::Buf;

/// Reads fields of one frame at the version the frame declares.
///
/// Every getter checks the remaining length first, so running out of input
/// always surfaces as [`DecodeError::UnexpectedEof`] and never panics.
#[derive(Debug)]
pub struct FrameReader<'a> {
    buf: &'a [u8],
    start_len: usize,
    version: FormatVersion,
}

impl<'a> FrameReader<'a> {
    /// Creates a reader over `input`.
    #[must_use]
    pub fn new(input: &'a [u8], version: FormatVersion) -> Self {
        Self {
            buf: input,
            start_len: input.len(),
            version,
        }
    }

    /// The version fields are being read at.
    #[must_use]
    pub fn version(&self) -> FormatVersion {
        self.version
    }

    /// Switches the version once the frame header has declared it.
    pub(crate) fn set_version(&mut self, version: FormatVersion) {
        self.version = version;
    }

    /// Bytes consumed so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.start_len - self.buf.len()
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Reads a field added in `introduced`, or returns `None` if the frame's
    /// version predates it.
    pub fn since<T, F>(&mut self, introduced: FormatVersion, read: F) -> DecodeResult<Option<T>>
    where
        F: FnOnce(&mut Self) -> DecodeResult<T>,
    {
        if self.version.at_least(introduced) {
            read(self).map(Some)
        } else {
            Ok(None)
        }
    }

    fn need(&self, needed: usize) -> DecodeResult<()> {
        if self.buf.remaining() < needed {
            return Err(DecodeError::UnexpectedEof {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    /// Reads one byte.
    pub fn get_u8(&mut self) -> DecodeResult<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    /// Reads a boolean; anything other than `0`/`1` is invalid.
    pub fn get_bool(&mut self, field: &'static str) -> DecodeResult<bool> {
        match self.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::InvalidValue {
                field,
                value: i64::from(other),
            }),
        }
    }

    /// Reads a big-endian `u16`.
    pub fn get_u16(&mut self) -> DecodeResult<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    /// Reads a big-endian `i32`.
    pub fn get_i32(&mut self) -> DecodeResult<i32> {
        self.need(4)?;
        Ok(self.buf.get_i32())
    }

    /// Reads a big-endian `u32`.
    pub fn get_u32(&mut self) -> DecodeResult<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    /// Reads a big-endian `i64`.
    pub fn get_i64(&mut self) -> DecodeResult<i64> {
        self.need(8)?;
        Ok(self.buf.get_i64())
    }

    /// Reads a big-endian `u64`.
    pub fn get_u64(&mut self) -> DecodeResult<u64> {
        self.need(8)?;
        Ok(self.buf.get_u64())
    }

    /// Reads raw bytes.
    pub fn get_bytes(&mut self, len: usize) -> DecodeResult<&'a [u8]> {
        self.need(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// Reads an item id.
    pub fn get_item_id(&mut self) -> DecodeResult<ItemId> {
        self.get_i32().map(ItemId::new)
    }

    /// Reads an item type byte.
    pub fn get_item_type(&mut self, field: &'static str) -> DecodeResult<ItemType> {
        let raw = self.get_u8()?;
        ItemType::from_byte(raw).ok_or(DecodeError::InvalidValue {
            field,
            value: i64::from(raw),
        })
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn get_str(&mut self, field: &'static str) -> DecodeResult<String> {
        match self.get_opt_str(field)? {
            Some(s) => Ok(s),
            None => Err(DecodeError::InvalidValue {
                field,
                value: i64::from(NONE_LEN),
            }),
        }
    }

    /// Reads an optional string.
    pub fn get_opt_str(&mut self, field: &'static str) -> DecodeResult<Option<String>> {
        let len = self.get_u32()?;
        if len == NONE_LEN {
            return Ok(None);
        }
        let raw = self.get_bytes(len as usize)?;
        std::str::from_utf8(raw)
            .map(|s| Some(s.to_owned()))
            .map_err(|_| DecodeError::InvalidUtf8 { field })
    }

    /// Reads an optional `i32` written as a presence byte and value.
    pub fn get_opt_i32(&mut self, field: &'static str) -> DecodeResult<Option<i32>> {
        if self.get_bool(field)? {
            self.get_i32().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Reads a collection count, checking that `entry_size * count` bytes
    /// can still follow so corrupt counts never drive a huge allocation.
    pub fn get_count(&mut self, entry_size: usize) -> DecodeResult<usize> {
        let count = self.get_u32()? as usize;
        self.need(count.saturating_mul(entry_size))?;
        Ok(count)
    }

    /// Reads a counted list of item ids.
    pub fn get_ids(&mut self) -> DecodeResult<Vec<ItemId>> {
        let count = self.get_count(4)?;
        (0..count).map(|_| self.get_item_id()).collect()
    }
}
