//! Error types for the redo log core.

use crate::record::RecordKind;
use crate::types::{FormatVersion, MailboxId, SegmentId};
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Result type for frame decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Errors that can occur in redo log operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] redolog_storage::StorageError),

    /// I/O error outside a storage backend (directory handling).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A segment could not be decoded past `offset`.
    ///
    /// Fatal for the segment: nothing after the offset is trusted.
    #[error("decode error in {segment_id} at offset {offset}: {source}")]
    Decode {
        /// Segment being scanned.
        segment_id: SegmentId,
        /// Offset of the frame (or header) that failed.
        offset: u64,
        /// What went wrong.
        #[source]
        source: DecodeError,
    },

    /// A record could not be made durable. The mutation it describes must
    /// not be treated as committed.
    #[error("durability failure appending to {segment_id}: {message}")]
    Durability {
        /// Segment the append targeted.
        segment_id: SegmentId,
        /// Description of the failure.
        message: String,
    },

    /// A record was rejected before encoding.
    #[error("invalid record: {message}")]
    InvalidRecord {
        /// Why the record is invalid.
        message: String,
    },

    /// Another process holds the log directory.
    #[error("log directory locked: another process has exclusive access")]
    LogLocked,

    /// The log directory is missing or malformed.
    #[error("invalid log directory: {message}")]
    InvalidLogDir {
        /// Description of the problem.
        message: String,
    },

    /// The writer lost track of the active segment after a failed append
    /// and refuses further writes until reopened.
    #[error("log writer poisoned after failed rollback in {segment_id}")]
    WriterPoisoned {
        /// Segment left in an unknown state.
        segment_id: SegmentId,
    },
}

impl CoreError {
    /// Creates a decode error positioned in a segment.
    pub fn decode(segment_id: SegmentId, offset: u64, source: DecodeError) -> Self {
        Self::Decode {
            segment_id,
            offset,
            source,
        }
    }

    /// Creates a durability error.
    pub fn durability(segment_id: SegmentId, message: impl Into<String>) -> Self {
        Self::Durability {
            segment_id,
            message: message.into(),
        }
    }

    /// Creates an invalid record error.
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Creates an invalid log directory error.
    pub fn invalid_log_dir(message: impl Into<String>) -> Self {
        Self::InvalidLogDir {
            message: message.into(),
        }
    }

    /// Returns true for decode errors.
    #[must_use]
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

/// Why a frame or segment header could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The input ended inside a frame. At the end of a segment this marks a
    /// torn write and is not reported as an error.
    #[error("unexpected end of frame: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof {
        /// Bytes the next field required.
        needed: usize,
        /// Bytes left in the input.
        remaining: usize,
    },

    /// The kind byte names no record this reader knows.
    #[error("unknown record kind 0x{0:02x}")]
    UnknownKind(u8),

    /// The frame was written by a newer format than this reader supports.
    #[error("unsupported format version {found} (reader supports up to {supported})")]
    UnsupportedVersion {
        /// Version found in the frame.
        found: FormatVersion,
        /// Newest version this reader understands.
        supported: FormatVersion,
    },

    /// The frame claims a version older than its kind's introduction.
    #[error("{kind} records do not exist before format {introduced} (frame claims {found})")]
    KindNotInVersion {
        /// Kind of the frame.
        kind: RecordKind,
        /// Version the kind was introduced in.
        introduced: FormatVersion,
        /// Version found in the frame.
        found: FormatVersion,
    },

    /// A field held a value outside its domain.
    #[error("invalid value for {field}: {value}")]
    InvalidValue {
        /// Field being decoded.
        field: &'static str,
        /// Offending raw value.
        value: i64,
    },

    /// A string field was not valid UTF-8.
    #[error("invalid UTF-8 in {field}")]
    InvalidUtf8 {
        /// Field being decoded.
        field: &'static str,
    },

    /// The segment header is malformed or names a different segment.
    #[error("bad segment header: {0}")]
    BadSegmentHeader(String),

    /// Bytes follow the record that sealed the segment.
    #[error("frame found after segment seal")]
    FrameAfterSeal,

    /// The segment belongs to a different log than the ones before it.
    #[error("segment belongs to another log")]
    ForeignSegment,

    /// A mailbox record carries the reserved system mailbox id, or a
    /// marker carries a real one.
    #[error("record kind {kind} cannot target {mailbox_id}")]
    MailboxMismatch {
        /// Kind of the frame.
        kind: RecordKind,
        /// Mailbox id found in the frame.
        mailbox_id: MailboxId,
    },
}

impl DecodeError {
    /// Returns true if the input simply ran out.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::UnexpectedEof { .. })
    }
}
