//! Log writer.

use crate::config::LogConfig;
use crate::error::{CoreError, CoreResult};
use crate::record::OpRecord;
use crate::types::{now_millis, SegmentId, TransactionId};
use crate::wal::dir::{LogDir, SegmentStore};
use crate::wal::scanner::SegmentScanner;
use crate::wal::segment::{SealedSegment, SegmentHandle, SegmentHeader, SEGMENT_HEADER_LEN};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

/// Proof that a record is in the log.
///
/// With `sync_on_append` enabled (the default) the record was synced before
/// the token was returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommitToken {
    /// Segment holding the frame.
    pub segment_id: SegmentId,
    /// Byte offset of the frame within the segment.
    pub offset: u64,
    /// Transaction id of the appended record.
    pub transaction_id: TransactionId,
}

struct WriterState {
    active: SegmentHandle,
    last_transaction_id: Option<TransactionId>,
}

/// Appends records to the active segment and rotates full segments.
///
/// # Thread Safety
///
/// All appends go through one lock around the active segment, so frames
/// never interleave. A caller blocks until its frame is written (and synced,
/// when configured).
pub struct LogWriter<S: SegmentStore = LogDir> {
    store: S,
    config: LogConfig,
    log_id: Uuid,
    state: Mutex<WriterState>,
}

impl LogWriter<LogDir> {
    /// Opens the log at `path`, taking the directory lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be opened or locked, or the
    /// newest segment cannot be recovered.
    pub fn open(path: &Path, config: LogConfig) -> CoreResult<Self> {
        let dir = LogDir::open(path, config.create_if_missing)?;
        Self::with_store(dir, config)
    }
}

impl<S: SegmentStore> LogWriter<S> {
    /// Opens a writer over `store`, recovering its newest segment.
    ///
    /// - An empty store gets a new log id and a first segment
    /// - A torn trailing frame is truncated away
    /// - A segment shorter than its header is rewritten
    /// - A sealed newest segment is followed by a fresh one
    ///
    /// # Errors
    ///
    /// Returns an error if the newest segment holds an undecodable frame or
    /// the store fails.
    pub fn with_store(store: S, config: LogConfig) -> CoreResult<Self> {
        let segments = store.list_segments()?;
        let (log_id, active, last_transaction_id) = match segments.last() {
            None => {
                let log_id = Uuid::new_v4();
                let active = SegmentHandle::create(&store, log_id, SegmentId::FIRST)?;
                tracing::info!(%log_id, "created new log");
                (log_id, active, None)
            }
            Some(&newest) => Self::recover(&store, &segments, newest)?,
        };
        tracing::info!(
            %log_id,
            segment = %active.id(),
            len = active.len(),
            last_txn = ?last_transaction_id,
            "log writer open"
        );
        Ok(Self {
            store,
            config,
            log_id,
            state: Mutex::new(WriterState {
                active,
                last_transaction_id,
            }),
        })
    }

    fn recover(
        store: &S,
        segments: &[SegmentId],
        newest: SegmentId,
    ) -> CoreResult<(Uuid, SegmentHandle, Option<TransactionId>)> {
        let mut backend = store.open_segment(newest)?;
        if backend.size()? < SEGMENT_HEADER_LEN as u64 {
            // Creation was torn before the header was durable.
            let previous = segments.iter().rev().nth(1).copied();
            let (log_id, last_txn) = match previous {
                Some(prev) => Self::summarize(store, prev)?,
                None => (Uuid::new_v4(), None),
            };
            tracing::warn!(segment = %newest, "rewriting incomplete segment header");
            let active = SegmentHandle::initialize(backend, SegmentHeader::new(log_id, newest))?;
            return Ok((log_id, active, last_txn));
        }

        let mut scanner = SegmentScanner::open(newest, store.read_segment(newest)?)?;
        let mut last_txn = None;
        for item in scanner.by_ref() {
            let (_, record) = item?;
            last_txn = last_txn.max(Some(record.transaction_id()));
        }
        let header = scanner
            .header()
            .copied()
            .ok_or_else(|| CoreError::invalid_log_dir(format!("{newest} has no header")))?;

        if let Some(torn) = scanner.torn_tail() {
            tracing::warn!(
                segment = %newest,
                offset = torn,
                discarded = scanner.size() - torn,
                "truncating torn frame"
            );
            backend.truncate(scanner.valid_len())?;
            backend.sync()?;
        }

        if last_txn.is_none() {
            if let Some(prev) = segments.iter().rev().nth(1) {
                last_txn = Self::summarize(store, *prev)?.1;
            }
        }

        if let Some(seal) = scanner.sealed() {
            drop(backend);
            tracing::info!(segment = %newest, next = %seal.next_segment_id, "newest segment sealed; starting next");
            let active = SegmentHandle::create(store, header.log_id, seal.next_segment_id)?;
            return Ok((header.log_id, active, last_txn));
        }

        let active =
            SegmentHandle::resume(header, backend, scanner.valid_len(), scanner.frames());
        Ok((header.log_id, active, last_txn))
    }

    /// Log id and last transaction id of a complete older segment.
    fn summarize(store: &S, id: SegmentId) -> CoreResult<(Uuid, Option<TransactionId>)> {
        let mut scanner = SegmentScanner::open(id, store.read_segment(id)?)?;
        let mut last = None;
        for item in scanner.by_ref() {
            let (_, record) = item?;
            last = last.max(Some(record.transaction_id()));
        }
        let log_id = scanner
            .header()
            .map(|h| h.log_id)
            .ok_or_else(|| CoreError::invalid_log_dir(format!("{id} has no header")))?;
        Ok((log_id, last))
    }

    /// Appends `record` and returns where it landed.
    ///
    /// A record newer than [`LogConfig::format_version`] is written at that
    /// version instead.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidRecord`] for records callers may not
    /// write or whose kind the negotiated version lacks, [`CoreError::Durability`] if the frame could not be written
    /// or synced, and [`CoreError::WriterPoisoned`] once a failed write
    /// could not be rolled back.
    pub fn append(&self, record: &OpRecord) -> CoreResult<CommitToken> {
        if record.kind().is_internal() {
            return Err(CoreError::invalid_record(format!(
                "{} records are written by the log itself",
                record.kind()
            )));
        }
        let frame = self.encode_negotiated(record)?;

        let mut state = self.state.lock();
        self.rotate_if_needed(&mut state, frame.len() as u64)?;
        let segment_id = state.active.id();
        let offset = match state.active.append_frame(&frame, self.config.sync_on_append) {
            Ok(offset) => offset,
            Err(err) => {
                tracing::error!(
                    segment = %segment_id,
                    mailbox = %record.mailbox_id(),
                    txn = %record.transaction_id(),
                    error = %err,
                    "append failed"
                );
                return Err(err);
            }
        };
        state.last_transaction_id = state.last_transaction_id.max(Some(record.transaction_id()));
        tracing::debug!(
            segment = %segment_id,
            offset,
            kind = %record.kind(),
            mailbox = %record.mailbox_id(),
            txn = %record.transaction_id(),
            "appended record"
        );
        Ok(CommitToken {
            segment_id,
            offset,
            transaction_id: record.transaction_id(),
        })
    }

    /// Encodes `record` at no newer a version than the log writes. Fields
    /// introduced after the negotiated version are dropped.
    fn encode_negotiated(&self, record: &OpRecord) -> CoreResult<Vec<u8>> {
        let negotiated = self.config.format_version;
        let kind = record.kind();
        if !negotiated.at_least(kind.introduced_in()) {
            return Err(CoreError::invalid_record(format!(
                "{kind} requires format {} but the log writes {negotiated}",
                kind.introduced_in()
            )));
        }
        if negotiated.at_least(record.format_version()) {
            record.encode()
        } else {
            record.clone().with_format_version(negotiated).encode()
        }
    }

    fn rotate_if_needed(&self, state: &mut WriterState, frame_len: u64) -> CoreResult<()> {
        if state.active.is_sealed() {
            // A previous rotation sealed the segment but failed to create
            // the next one.
            return self.open_next(state);
        }
        if state.active.is_empty() || state.active.is_poisoned() {
            return Ok(());
        }
        let too_big = state.active.len() + frame_len > self.config.max_segment_size;
        let max_age = self.config.max_segment_age;
        let too_old = !max_age.is_zero()
            && u128::try_from(state.active.age_ms()).unwrap_or(0) >= max_age.as_millis();
        if too_big || too_old {
            self.rotate_locked(state)?;
        }
        Ok(())
    }

    fn rotate_locked(&self, state: &mut WriterState) -> CoreResult<SealedSegment> {
        let now = TransactionId::new(now_millis(), 0);
        let seal_txn = state
            .last_transaction_id
            .map_or(now, |last| now.max(last));
        let sealed = state.active.seal(self.config.format_version, seal_txn)?;
        state.last_transaction_id = Some(seal_txn);
        tracing::info!(
            segment = %sealed.segment_id,
            len = sealed.len,
            frames = sealed.frames,
            next = %sealed.next_segment_id,
            "sealed segment"
        );
        self.open_next(state)?;
        Ok(sealed)
    }

    fn open_next(&self, state: &mut WriterState) -> CoreResult<()> {
        let next = state.active.id().next();
        state.active = SegmentHandle::create(&self.store, self.log_id, next)?;
        Ok(())
    }

    /// Seals the active segment and starts the next one.
    ///
    /// # Errors
    ///
    /// Returns an error if the seal cannot be written or the next segment
    /// cannot be created.
    pub fn rotate(&self) -> CoreResult<SealedSegment> {
        let mut state = self.state.lock();
        if state.active.is_sealed() {
            self.open_next(&mut state)?;
        }
        self.rotate_locked(&mut state)
    }

    /// Syncs the active segment.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Durability`] if the sync fails.
    pub fn sync(&self) -> CoreResult<()> {
        self.state.lock().active.sync()
    }

    /// Segment currently accepting appends.
    #[must_use]
    pub fn active_segment(&self) -> SegmentId {
        self.state.lock().active.id()
    }

    /// Newest transaction id in the log, if any record was ever written.
    ///
    /// Seed a [`crate::TxnIdGenerator`] with it after a restart.
    #[must_use]
    pub fn last_transaction_id(&self) -> Option<TransactionId> {
        self.state.lock().last_transaction_id
    }

    /// Identity shared by every segment of this log.
    #[must_use]
    pub fn log_id(&self) -> Uuid {
        self.log_id
    }

    /// Returns true if a failed write could not be rolled back. Reopen the
    /// log to recover.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.state.lock().active.is_poisoned()
    }

    /// The underlying segment store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Configuration the writer was opened with.
    #[must_use]
    pub fn config(&self) -> &LogConfig {
        &self.config
    }
}

impl<S: SegmentStore> std::fmt::Debug for LogWriter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogWriter")
            .field("log_id", &self.log_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AlterItemTag, CreateFolder, OpPayload, SealSegment};
    use crate::types::{FormatVersion, ItemId, ItemType, MailboxId};
    use crate::wal::memory::MemorySegmentStore;
    use crate::wal::scanner::LogReader;
    use tempfile::tempdir;

    fn tag(mailbox: i32, ts: i64) -> OpRecord {
        OpRecord::new(
            MailboxId::new(mailbox),
            TransactionId::new(ts, 0),
            AlterItemTag::new(vec![ItemId::new(7)], ItemType::Message, "flagged", true),
        )
    }

    #[test]
    fn append_returns_increasing_offsets() {
        let writer = LogWriter::with_store(MemorySegmentStore::new(), LogConfig::new()).unwrap();
        let a = writer.append(&tag(1, 10)).unwrap();
        let b = writer.append(&tag(2, 11)).unwrap();
        assert_eq!(a.segment_id, SegmentId::FIRST);
        assert_eq!(a.offset, SEGMENT_HEADER_LEN as u64);
        assert!(b.offset > a.offset);
        assert_eq!(b.transaction_id, TransactionId::new(11, 0));
        assert_eq!(writer.last_transaction_id(), Some(TransactionId::new(11, 0)));
    }

    #[test]
    fn callers_cannot_append_seals_or_system_records() {
        let writer = LogWriter::with_store(MemorySegmentStore::new(), LogConfig::new()).unwrap();
        let seal = OpRecord::new(
            MailboxId::SYSTEM,
            TransactionId::new(1, 0),
            SealSegment::new(SegmentId::FIRST),
        );
        assert!(matches!(
            writer.append(&seal),
            Err(CoreError::InvalidRecord { .. })
        ));
        assert!(writer.append(&tag(0, 1)).is_err());
        assert!(writer.append(&tag(-4, 1)).is_err());
    }

    #[test]
    fn records_are_written_at_the_negotiated_version() {
        let config = LogConfig::new().format_version(FormatVersion::V1_1);
        let writer = LogWriter::with_store(MemorySegmentStore::new(), config).unwrap();
        let mut altered =
            AlterItemTag::new(vec![ItemId::new(7)], ItemType::Message, "flagged", true);
        altered.constraint = Some("-tj".into());
        altered.tag_id = Some(64);
        writer
            .append(&OpRecord::new(MailboxId::new(1), TransactionId::new(1, 0), altered))
            .unwrap();
        writer
            .append(&tag(1, 2).with_format_version(FormatVersion::V1_0))
            .unwrap();

        let records: Vec<_> = LogReader::new(writer.store())
            .scan_all()
            .unwrap()
            .map(|r| r.unwrap().record)
            .collect();
        assert_eq!(records[0].format_version(), FormatVersion::V1_1);
        let OpPayload::AlterItemTag(written) = &records[0].payload else {
            panic!("wrong kind");
        };
        assert_eq!(written.constraint.as_deref(), Some("-tj"));
        assert_eq!(written.tag_id, None);
        assert_eq!(records[1].format_version(), FormatVersion::V1_0);
    }

    #[test]
    fn kinds_newer_than_the_negotiated_version_are_refused() {
        let config = LogConfig::new().format_version(FormatVersion::V1_2);
        let writer = LogWriter::with_store(MemorySegmentStore::new(), config).unwrap();
        let folder = OpRecord::new(
            MailboxId::new(1),
            TransactionId::new(1, 0),
            CreateFolder {
                folder_id: ItemId::new(300),
                parent_id: ItemId::new(1),
                name: "Projects".into(),
                view: ItemType::Message,
                flags: 0,
                color: 0,
                uuid: None,
            },
        );
        assert!(matches!(
            writer.append(&folder),
            Err(CoreError::InvalidRecord { .. })
        ));
        let user_frames = LogReader::new(writer.store())
            .scan_all()
            .unwrap()
            .filter(|r| !r.as_ref().unwrap().record.kind().is_internal())
            .count();
        assert_eq!(user_frames, 0);
    }

    #[test]
    fn rotates_by_size_and_seals() {
        let config = LogConfig::new().max_segment_size(SEGMENT_HEADER_LEN as u64 + 60);
        let writer = LogWriter::with_store(MemorySegmentStore::new(), config).unwrap();
        for ts in 1..=5 {
            writer.append(&tag(1, ts)).unwrap();
        }
        assert!(writer.active_segment() > SegmentId::FIRST);

        let reader = LogReader::new(writer.store());
        let segments = reader.segments().unwrap();
        assert_eq!(segments.len() as u64, writer.active_segment().as_u64());
        for id in &segments[..segments.len() - 1] {
            assert!(reader.inspect(*id).unwrap().sealed);
        }
        let mailbox_records = reader
            .scan_all()
            .unwrap()
            .map(Result::unwrap)
            .filter(|r| !r.record.kind().is_marker())
            .count();
        assert_eq!(mailbox_records, 5);
    }

    #[test]
    fn oversized_record_still_lands_in_empty_segment() {
        let config = LogConfig::new().max_segment_size(10);
        let writer = LogWriter::with_store(MemorySegmentStore::new(), config).unwrap();
        let first = writer.append(&tag(1, 1)).unwrap();
        assert_eq!(first.segment_id, SegmentId::FIRST);
        let second = writer.append(&tag(1, 2)).unwrap();
        assert_eq!(second.segment_id, SegmentId::new(2));
    }

    #[test]
    fn explicit_rotate() {
        let writer = LogWriter::with_store(MemorySegmentStore::new(), LogConfig::new()).unwrap();
        writer.append(&tag(1, 1)).unwrap();
        let sealed = writer.rotate().unwrap();
        assert_eq!(sealed.segment_id, SegmentId::FIRST);
        assert_eq!(sealed.frames, 2);
        assert_eq!(writer.active_segment(), SegmentId::new(2));
        let token = writer.append(&tag(1, 2)).unwrap();
        assert_eq!(token.segment_id, SegmentId::new(2));
    }

    #[test]
    fn reopen_resumes_after_last_frame() {
        let temp = tempdir().unwrap();
        let (log_id, last) = {
            let writer = LogWriter::open(temp.path(), LogConfig::new()).unwrap();
            writer.append(&tag(1, 1)).unwrap();
            let last = writer.append(&tag(2, 2)).unwrap();
            (writer.log_id(), last)
        };

        let writer = LogWriter::open(temp.path(), LogConfig::new()).unwrap();
        assert_eq!(writer.log_id(), log_id);
        assert_eq!(writer.last_transaction_id(), Some(TransactionId::new(2, 0)));
        let next = writer.append(&tag(1, 3)).unwrap();
        assert_eq!(next.segment_id, last.segment_id);
        assert!(next.offset > last.offset);
    }

    #[test]
    fn reopen_truncates_torn_tail() {
        let store = MemorySegmentStore::new();
        let writer = LogWriter::with_store(store.clone(), LogConfig::new()).unwrap();
        let token = writer.append(&tag(1, 1)).unwrap();
        drop(writer);

        let mut bytes = store.segment_bytes(SegmentId::FIRST).unwrap();
        let good_len = bytes.len();
        let partial = tag(1, 2).encode().unwrap();
        bytes.extend_from_slice(&partial[..partial.len() / 2]);
        store.put_segment_bytes(SegmentId::FIRST, bytes);

        let writer = LogWriter::with_store(store.clone(), LogConfig::new()).unwrap();
        assert_eq!(store.segment_bytes(SegmentId::FIRST).unwrap().len(), good_len);
        let next = writer.append(&tag(1, 3)).unwrap();
        assert_eq!(next.offset, good_len as u64);
        assert!(next.offset > token.offset);
    }

    #[test]
    fn reopen_after_seal_starts_next_segment() {
        let store = MemorySegmentStore::new();
        let writer = LogWriter::with_store(store.clone(), LogConfig::new()).unwrap();
        writer.append(&tag(1, 1)).unwrap();
        writer.rotate().unwrap();
        drop(writer);
        store.remove_segment(SegmentId::new(2));

        let writer = LogWriter::with_store(store, LogConfig::new()).unwrap();
        assert_eq!(writer.active_segment(), SegmentId::new(2));
        assert!(writer.last_transaction_id().is_some());
    }

    #[test]
    fn reopen_rewrites_incomplete_header() {
        let store = MemorySegmentStore::new();
        let writer = LogWriter::with_store(store.clone(), LogConfig::new()).unwrap();
        writer.append(&tag(1, 1)).unwrap();
        writer.rotate().unwrap();
        let log_id = writer.log_id();
        drop(writer);
        store.put_segment_bytes(SegmentId::new(2), b"RDL".to_vec());

        let writer = LogWriter::with_store(store.clone(), LogConfig::new()).unwrap();
        assert_eq!(writer.log_id(), log_id);
        assert_eq!(writer.active_segment(), SegmentId::new(2));
        writer.append(&tag(1, 2)).unwrap();

        let records: Vec<_> = LogReader::new(&store)
            .scan_all()
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(records.len(), 3);
        assert!(matches!(records[1].record.payload, OpPayload::SealSegment(_)));
    }
}
