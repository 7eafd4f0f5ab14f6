//! Frame encoding.

use crate::codec::NONE_LEN;
use crate::error::{CoreError, CoreResult};
use crate::types::{FormatVersion, ItemId, ItemType};
use bytes::{BufMut, BytesMut};

/// Accumulates one frame at a negotiated format version.
#[derive(Debug)]
pub struct FrameWriter {
    buf: BytesMut,
    version: FormatVersion,
}

impl FrameWriter {
    /// Creates an empty writer for `version`.
    #[must_use]
    pub fn new(version: FormatVersion) -> Self {
        Self {
            buf: BytesMut::with_capacity(64),
            version,
        }
    }

    /// The version fields are being written for.
    #[must_use]
    pub fn version(&self) -> FormatVersion {
        self.version
    }

    /// Runs `write` only if the negotiated version includes fields added in
    /// `introduced`.
    pub fn since<F>(&mut self, introduced: FormatVersion, write: F) -> CoreResult<()>
    where
        F: FnOnce(&mut Self) -> CoreResult<()>,
    {
        if self.version.at_least(introduced) {
            write(self)?;
        }
        Ok(())
    }

    /// Writes one byte.
    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    /// Writes a boolean as `0` or `1`.
    pub fn put_bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    /// Writes a signed 32-bit integer.
    pub fn put_i32(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    /// Writes an unsigned 32-bit integer.
    pub fn put_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    /// Writes an unsigned 16-bit integer.
    pub fn put_u16(&mut self, value: u16) {
        self.buf.put_u16(value);
    }

    /// Writes a signed 64-bit integer.
    pub fn put_i64(&mut self, value: i64) {
        self.buf.put_i64(value);
    }

    /// Writes an unsigned 64-bit integer.
    pub fn put_u64(&mut self, value: u64) {
        self.buf.put_u64(value);
    }

    /// Writes an item id.
    pub fn put_item_id(&mut self, id: ItemId) {
        self.buf.put_i32(id.as_i32());
    }

    /// Writes an item type byte.
    pub fn put_item_type(&mut self, item_type: ItemType) {
        self.buf.put_u8(item_type.as_byte());
    }

    /// Writes a length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is too long for the length prefix.
    pub fn put_str(&mut self, value: &str) -> CoreResult<()> {
        let len = Self::length_prefix(value.len(), "string")?;
        self.buf.put_u32(len);
        self.buf.put_slice(value.as_bytes());
        Ok(())
    }

    /// Writes an optional string, `None` as the reserved length.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is too long for the length prefix.
    pub fn put_opt_str(&mut self, value: Option<&str>) -> CoreResult<()> {
        match value {
            Some(s) => self.put_str(s),
            None => {
                self.buf.put_u32(NONE_LEN);
                Ok(())
            }
        }
    }

    /// Writes an optional `i32` as a presence byte followed by the value.
    pub fn put_opt_i32(&mut self, value: Option<i32>) {
        match value {
            Some(v) => {
                self.buf.put_u8(1);
                self.buf.put_i32(v);
            }
            None => self.buf.put_u8(0),
        }
    }

    /// Writes a counted list of item ids.
    ///
    /// # Errors
    ///
    /// Returns an error if the list is too long for the count prefix.
    pub fn put_ids(&mut self, ids: &[ItemId]) -> CoreResult<()> {
        self.put_count(ids.len())?;
        for id in ids {
            self.put_item_id(*id);
        }
        Ok(())
    }

    /// Writes a collection count.
    ///
    /// # Errors
    ///
    /// Returns an error if `count` does not fit the prefix.
    pub fn put_count(&mut self, count: usize) -> CoreResult<()> {
        let count = Self::length_prefix(count, "collection")?;
        self.buf.put_u32(count);
        Ok(())
    }

    fn length_prefix(len: usize, what: &str) -> CoreResult<u32> {
        u32::try_from(len)
            .ok()
            .filter(|&n| n != NONE_LEN)
            .ok_or_else(|| CoreError::invalid_record(format!("{what} too long: {len}")))
    }

    /// Bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finishes the frame.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}
