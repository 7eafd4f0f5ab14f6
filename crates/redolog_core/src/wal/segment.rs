//! Segment files: header layout and the active/sealed segment states.
//!
//! ## Header Format
//!
//! ```text
//! +-----------+--------------------+-------------+----------------+-------------------+
//! | magic (4) | header version (2) | log id (16) | segment id (8) | created at ms (8) |
//! +-----------+--------------------+-------------+----------------+-------------------+
//! ```
//!
//! - magic: `RDLG`
//! - log id: random uuid shared by every segment of one log
//!
//! Frames follow the header back to back.

use crate::error::{CoreError, CoreResult, DecodeError, DecodeResult};
use crate::record::{OpRecord, SealSegment};
use crate::types::{now_millis, FormatVersion, MailboxId, SegmentId, TransactionId};
use crate::wal::dir::SegmentStore;
use bytes::{Buf, BufMut};
use redolog_storage::StorageBackend;
use serde::Serialize;
use uuid::Uuid;

/// Magic bytes opening every segment file.
pub const SEGMENT_MAGIC: [u8; 4] = *b"RDLG";

/// Current segment header layout version.
pub const SEGMENT_HEADER_VERSION: u16 = 1;

/// Encoded header size.
pub const SEGMENT_HEADER_LEN: usize = 4 + 2 + 16 + 8 + 8;

/// Fixed header at the start of every segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Identity of the log the segment belongs to.
    pub log_id: Uuid,
    /// This segment's id.
    pub segment_id: SegmentId,
    /// When the segment was created, in milliseconds since the epoch.
    pub created_at_ms: i64,
}

impl SegmentHeader {
    /// Creates a header stamped with the current time.
    #[must_use]
    pub fn new(log_id: Uuid, segment_id: SegmentId) -> Self {
        Self {
            log_id,
            segment_id,
            created_at_ms: now_millis(),
        }
    }

    /// Encodes the header.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SEGMENT_HEADER_LEN);
        buf.put_slice(&SEGMENT_MAGIC);
        buf.put_u16(SEGMENT_HEADER_VERSION);
        buf.put_slice(self.log_id.as_bytes());
        buf.put_u64(self.segment_id.as_u64());
        buf.put_i64(self.created_at_ms);
        buf
    }

    /// Decodes a header from the first [`SEGMENT_HEADER_LEN`] bytes of
    /// `input`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnexpectedEof`] for short input and
    /// [`DecodeError::BadSegmentHeader`] for a wrong magic or version.
    pub fn decode(input: &[u8]) -> DecodeResult<Self> {
        if input.len() < SEGMENT_HEADER_LEN {
            return Err(DecodeError::UnexpectedEof {
                needed: SEGMENT_HEADER_LEN,
                remaining: input.len(),
            });
        }
        let mut buf = &input[..SEGMENT_HEADER_LEN];
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if magic != SEGMENT_MAGIC {
            return Err(DecodeError::BadSegmentHeader(format!(
                "invalid magic {magic:02x?}"
            )));
        }
        let version = buf.get_u16();
        if version != SEGMENT_HEADER_VERSION {
            return Err(DecodeError::BadSegmentHeader(format!(
                "unsupported header version {version}"
            )));
        }
        let mut log_id = [0u8; 16];
        buf.copy_to_slice(&mut log_id);
        Ok(Self {
            log_id: Uuid::from_bytes(log_id),
            segment_id: SegmentId::new(buf.get_u64()),
            created_at_ms: buf.get_i64(),
        })
    }
}

/// Summary of a segment that has been sealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SealedSegment {
    /// The sealed segment.
    pub segment_id: SegmentId,
    /// Segment the log continues in.
    pub next_segment_id: SegmentId,
    /// Final size in bytes, seal included.
    pub len: u64,
    /// Frames in the segment, seal included.
    pub frames: u64,
}

/// The segment currently accepting appends.
///
/// `len` is the length of the last complete frame's end. Every failed write
/// is rolled back to it, so a reader never sees a partial frame written by
/// a live writer.
pub struct SegmentHandle {
    header: SegmentHeader,
    backend: Box<dyn StorageBackend>,
    len: u64,
    frames: u64,
    sealed: bool,
    poisoned: bool,
}

impl SegmentHandle {
    /// Creates a fresh segment in `store` and durably writes its header.
    pub(crate) fn create(
        store: &dyn SegmentStore,
        log_id: Uuid,
        segment_id: SegmentId,
    ) -> CoreResult<Self> {
        let backend = store.create_segment(segment_id)?;
        Self::initialize(backend, SegmentHeader::new(log_id, segment_id))
    }

    /// Writes `header` over whatever `backend` holds and syncs.
    pub(crate) fn initialize(
        mut backend: Box<dyn StorageBackend>,
        header: SegmentHeader,
    ) -> CoreResult<Self> {
        if backend.size()? > 0 {
            backend.truncate(0)?;
        }
        backend.append(&header.encode())?;
        backend.sync()?;
        Ok(Self {
            header,
            backend,
            len: SEGMENT_HEADER_LEN as u64,
            frames: 0,
            sealed: false,
            poisoned: false,
        })
    }

    /// Continues an existing segment whose valid prefix ends at `len`.
    pub(crate) fn resume(
        header: SegmentHeader,
        backend: Box<dyn StorageBackend>,
        len: u64,
        frames: u64,
    ) -> Self {
        Self {
            header,
            backend,
            len,
            frames,
            sealed: false,
            poisoned: false,
        }
    }

    /// Segment id.
    #[must_use]
    pub fn id(&self) -> SegmentId {
        self.header.segment_id
    }

    /// Segment header.
    #[must_use]
    pub fn header(&self) -> &SegmentHeader {
        &self.header
    }

    /// Bytes written, header included.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true if no frame has been written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Frames written.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Milliseconds since the segment was created.
    #[must_use]
    pub fn age_ms(&self) -> i64 {
        now_millis().saturating_sub(self.header.created_at_ms)
    }

    /// Returns true once the seal record has been written.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Returns true if a failed write could not be rolled back.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Appends one encoded frame, returning its offset.
    ///
    /// With `sync` set the frame is durable when this returns. On failure
    /// the segment is truncated back to the previous frame boundary; if that
    /// fails too the handle is poisoned.
    pub(crate) fn append_frame(&mut self, frame: &[u8], sync: bool) -> CoreResult<u64> {
        if self.poisoned {
            return Err(CoreError::WriterPoisoned {
                segment_id: self.id(),
            });
        }
        if self.sealed {
            return Err(CoreError::durability(self.id(), "segment is sealed"));
        }
        let offset = self.len;
        let written = self.backend.append(frame).and_then(|at| {
            if sync {
                self.backend.sync()?;
            }
            Ok(at)
        });
        match written {
            Ok(at) if at == offset => {
                self.len += frame.len() as u64;
                self.frames += 1;
                Ok(offset)
            }
            Ok(at) => {
                self.rollback();
                Err(CoreError::durability(
                    self.id(),
                    format!("frame landed at {at}, expected {offset}"),
                ))
            }
            Err(err) => {
                self.rollback();
                Err(CoreError::durability(self.id(), err.to_string()))
            }
        }
    }

    fn rollback(&mut self) {
        let restored = self
            .backend
            .truncate(self.len)
            .and_then(|()| self.backend.sync());
        if let Err(err) = restored {
            tracing::error!(
                segment = %self.id(),
                len = self.len,
                error = %err,
                "rollback after failed append failed; writer poisoned"
            );
            self.poisoned = true;
        }
    }

    /// Syncs appended frames.
    pub(crate) fn sync(&mut self) -> CoreResult<()> {
        self.backend
            .sync()
            .map_err(|err| CoreError::durability(self.id(), err.to_string()))
    }

    /// Writes and syncs the seal record. The handle accepts no further
    /// frames afterwards.
    pub(crate) fn seal(
        &mut self,
        format_version: FormatVersion,
        transaction_id: TransactionId,
    ) -> CoreResult<SealedSegment> {
        let seal = SealSegment::new(self.id());
        let record = OpRecord::new(MailboxId::SYSTEM, transaction_id, seal)
            .with_format_version(format_version);
        let frame = record.encode()?;
        self.append_frame(&frame, true)?;
        self.sealed = true;
        Ok(SealedSegment {
            segment_id: self.id(),
            next_segment_id: seal.next_segment_id,
            len: self.len,
            frames: self.frames,
        })
    }
}

impl std::fmt::Debug for SegmentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentHandle")
            .field("header", &self.header)
            .field("len", &self.len)
            .field("frames", &self.frames)
            .field("sealed", &self.sealed)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redolog_storage::InMemoryBackend;

    #[test]
    fn header_roundtrip() {
        let header = SegmentHeader::new(Uuid::new_v4(), SegmentId::new(12));
        let bytes = header.encode();
        assert_eq!(bytes.len(), SEGMENT_HEADER_LEN);
        assert_eq!(&bytes[..4], b"RDLG");
        assert_eq!(SegmentHeader::decode(&bytes).unwrap(), header);
    }

    #[test]
    fn header_rejects_bad_magic() {
        let mut bytes = SegmentHeader::new(Uuid::new_v4(), SegmentId::FIRST).encode();
        bytes[0] = b'X';
        assert!(matches!(
            SegmentHeader::decode(&bytes),
            Err(DecodeError::BadSegmentHeader(_))
        ));
    }

    #[test]
    fn short_header_is_eof() {
        let bytes = SegmentHeader::new(Uuid::new_v4(), SegmentId::FIRST).encode();
        assert!(SegmentHeader::decode(&bytes[..10]).unwrap_err().is_eof());
    }

    #[test]
    fn append_tracks_offsets_and_seal_blocks_appends() {
        let header = SegmentHeader::new(Uuid::new_v4(), SegmentId::FIRST);
        let mut handle =
            SegmentHandle::initialize(Box::new(InMemoryBackend::new()), header).unwrap();
        assert!(handle.is_empty());

        let first = handle.append_frame(b"abc", true).unwrap();
        assert_eq!(first, SEGMENT_HEADER_LEN as u64);
        let second = handle.append_frame(b"de", false).unwrap();
        assert_eq!(second, first + 3);
        assert_eq!(handle.frames(), 2);

        let sealed = handle
            .seal(FormatVersion::CURRENT, TransactionId::new(1, 0))
            .unwrap();
        assert_eq!(sealed.next_segment_id, SegmentId::new(2));
        assert_eq!(sealed.frames, 3);
        assert!(handle.is_sealed());
        assert!(handle.append_frame(b"x", true).is_err());
    }
}
