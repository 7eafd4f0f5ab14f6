//! # Redolog Core
//!
//! Write-ahead redo log for mailbox mutations.
//!
//! Every mutation a mailbox server performs is first appended to the log as
//! an [`OpRecord`]. After a crash, or when restoring from a backup, the log
//! is scanned and replayed against the live mailboxes so that every
//! acknowledged mutation is reflected exactly once.
//!
//! This crate provides:
//! - the operation record model and its version-gated binary codec
//! - [`LogWriter`] for appends, segment rotation and sealing
//! - [`LogReader`] for lazy, restartable scans that tolerate a torn tail
//! - [`replay`] and [`replay_parallel`], which drive records through a
//!   [`MailboxResolver`] under an [`IdempotencyPolicy`]
//!
//! ## Example
//!
//! ```rust
//! use redolog_core::{
//!     AlterItemTag, ItemId, ItemType, LogConfig, LogReader, LogWriter, MailboxId,
//!     MemorySegmentStore, OpRecord, TxnIdGenerator,
//! };
//!
//! let writer = LogWriter::with_store(MemorySegmentStore::new(), LogConfig::default()).unwrap();
//! let txns = TxnIdGenerator::new();
//! let record = OpRecord::new(
//!     MailboxId::new(42),
//!     txns.next_id(),
//!     AlterItemTag::new(vec![ItemId::new(257)], ItemType::Message, "urgent", true),
//! );
//! let token = writer.append(&record).unwrap();
//!
//! let reader = LogReader::new(writer.store());
//! let scanned: Vec<_> = reader.scan_all().unwrap().collect::<Result<_, _>>().unwrap();
//! assert_eq!(scanned.len(), 1);
//! assert_eq!(scanned[0].offset, token.offset);
//! assert_eq!(scanned[0].record, record);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod config;
mod error;
mod record;
mod replay;
mod target;
mod types;
mod wal;

pub use codec::{FrameReader, FrameWriter};
pub use config::{LogConfig, ReplayConfig};
pub use error::{CoreError, CoreResult, DecodeError, DecodeResult};
pub use record::{
    AlterItemTag, ApplyOutcome, BackupMarker, CopyTarget, CreateFolder, CreateMountpoint,
    DismissCalendarAlarm, EnableSharedReminder, ImapCopyItem, OpBody, OpPayload, OpRecord,
    RecordHeader, RecordKind, SealSegment, SetItemColor, FRAME_HEADER_LEN,
};
pub use replay::{
    replay, replay_parallel, replay_with, AbortedMailbox, CancellationToken, Disposition,
    IdempotencyPolicy, ReplayEngine, ReplayReport, ReplayState, SegmentFailure, SkipReason,
    SkippedRecord,
};
pub use target::{
    MailboxResolver, MailboxTarget, ResolveError, TargetError, TargetErrorClass, TargetResult,
};
pub use types::{
    FormatVersion, ItemId, ItemType, MailboxId, SegmentId, TransactionId, TxnIdGenerator,
};
pub use wal::{
    CommitToken, LogDir, LogReader, LogScanner, LogWriter, MemorySegmentStore, ScannedRecord,
    SealedSegment, SegmentHandle, SegmentHeader, SegmentInfo, SegmentScanner, SegmentStore,
    SEGMENT_HEADER_LEN, SEGMENT_HEADER_VERSION, SEGMENT_MAGIC,
};

/// Crate version, recorded by tooling that prints log metadata.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
