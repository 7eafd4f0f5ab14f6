//! Streaming log scanner.
//!
//! Records are decoded lazily, one frame at a time, through a bounded read
//! buffer. Memory use stays constant regardless of log size; the buffer only
//! grows for a frame larger than itself.
//!
//! # Error Handling
//!
//! - A frame cut short by the end of the segment is a torn tail: the segment
//!   ends cleanly and the torn offset is recorded
//! - Any other decode failure is yielded once and ends the whole scan
//! - After a seal record, any further byte in the segment is an error

use crate::error::{CoreError, CoreResult, DecodeError};
use crate::record::{OpPayload, OpRecord, SealSegment};
use crate::types::SegmentId;
use crate::wal::dir::SegmentStore;
use crate::wal::segment::{SegmentHeader, SEGMENT_HEADER_LEN};
use redolog_storage::StorageBackend;
use serde::Serialize;
use std::collections::VecDeque;
use uuid::Uuid;

/// Initial read buffer size.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// A decoded record and where it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedRecord {
    /// Segment holding the frame.
    pub segment_id: SegmentId,
    /// Byte offset of the frame within the segment file.
    pub offset: u64,
    /// The decoded record.
    pub record: OpRecord,
}

/// Forward-only decoder over one segment.
pub struct SegmentScanner {
    segment_id: SegmentId,
    backend: Box<dyn StorageBackend>,
    header: Option<SegmentHeader>,
    size: u64,
    buffer: Vec<u8>,
    buffer_pos: usize,
    buffer_len: usize,
    /// Offset of the next frame.
    offset: u64,
    frames: u64,
    sealed: Option<SealSegment>,
    torn_tail: Option<u64>,
    finished: bool,
}

impl SegmentScanner {
    /// Opens a scanner over `backend`, validating the segment header.
    ///
    /// A file shorter than the header is a segment whose creation was torn:
    /// it scans as empty with a torn tail at offset 0.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the header is malformed or names another
    /// segment, or a storage error if the backend cannot be read.
    pub fn open(segment_id: SegmentId, backend: Box<dyn StorageBackend>) -> CoreResult<Self> {
        let size = backend.size()?;
        let mut scanner = Self {
            segment_id,
            backend,
            header: None,
            size,
            buffer: Vec::new(),
            buffer_pos: 0,
            buffer_len: 0,
            offset: 0,
            frames: 0,
            sealed: None,
            torn_tail: None,
            finished: false,
        };
        if size < SEGMENT_HEADER_LEN as u64 {
            scanner.torn_tail = Some(0);
            scanner.finished = true;
            return Ok(scanner);
        }
        let raw = scanner.backend.read_at(0, SEGMENT_HEADER_LEN)?;
        let header =
            SegmentHeader::decode(&raw).map_err(|e| CoreError::decode(segment_id, 0, e))?;
        if header.segment_id != segment_id {
            return Err(CoreError::decode(
                segment_id,
                0,
                DecodeError::BadSegmentHeader(format!(
                    "header names {}, file is {segment_id}",
                    header.segment_id
                )),
            ));
        }
        scanner.header = Some(header);
        scanner.offset = SEGMENT_HEADER_LEN as u64;
        scanner.buffer = vec![0u8; READ_BUFFER_SIZE];
        Ok(scanner)
    }

    /// Segment being scanned.
    #[must_use]
    pub fn segment_id(&self) -> SegmentId {
        self.segment_id
    }

    /// The segment header, or `None` if the file is shorter than one.
    #[must_use]
    pub fn header(&self) -> Option<&SegmentHeader> {
        self.header.as_ref()
    }

    /// File size when the scanner was opened.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Frames decoded so far.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// End of the last complete frame.
    #[must_use]
    pub fn valid_len(&self) -> u64 {
        self.offset
    }

    /// The seal record, once it has been read.
    #[must_use]
    pub fn sealed(&self) -> Option<SealSegment> {
        self.sealed
    }

    /// Offset of a partial trailing frame, once the scan reached it.
    #[must_use]
    pub fn torn_tail(&self) -> Option<u64> {
        self.torn_tail
    }

    /// Returns true once the segment has been read to its end.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Makes at least one more byte available, compacting and growing the
    /// buffer as needed. Returns false if the segment has no more bytes.
    fn fill_buffer(&mut self) -> CoreResult<bool> {
        let available = self.buffer_len - self.buffer_pos;
        let read_from = self.offset + available as u64;
        if read_from >= self.size {
            return Ok(false);
        }
        if self.buffer_pos > 0 {
            self.buffer.copy_within(self.buffer_pos..self.buffer_len, 0);
        }
        self.buffer_pos = 0;
        self.buffer_len = available;
        if available == self.buffer.len() {
            let grown = (self.buffer.len() * 2).max(READ_BUFFER_SIZE);
            self.buffer.resize(grown, 0);
        }
        let room = (self.buffer.len() - available) as u64;
        let to_read = room.min(self.size - read_from) as usize;
        let data = self.backend.read_at(read_from, to_read)?;
        self.buffer[available..available + data.len()].copy_from_slice(&data);
        self.buffer_len += data.len();
        Ok(true)
    }

    /// Decodes the next frame. `Ok(None)` at the end of the segment.
    fn read_next(&mut self) -> CoreResult<Option<(u64, OpRecord)>> {
        loop {
            if self.finished {
                return Ok(None);
            }
            if self.buffer_pos == self.buffer_len && !self.fill_buffer()? {
                self.finished = true;
                return Ok(None);
            }
            if self.sealed.is_some() {
                self.finished = true;
                return Err(CoreError::decode(
                    self.segment_id,
                    self.offset,
                    DecodeError::FrameAfterSeal,
                ));
            }
            let frame_offset = self.offset;
            match OpRecord::decode(&self.buffer[self.buffer_pos..self.buffer_len]) {
                Ok((record, used)) => {
                    self.buffer_pos += used;
                    self.offset += used as u64;
                    self.frames += 1;
                    if let OpPayload::SealSegment(seal) = &record.payload {
                        if seal.segment_id != self.segment_id {
                            self.finished = true;
                            return Err(CoreError::decode(
                                self.segment_id,
                                frame_offset,
                                DecodeError::BadSegmentHeader(format!(
                                    "seal names {}, file is {}",
                                    seal.segment_id, self.segment_id
                                )),
                            ));
                        }
                        self.sealed = Some(*seal);
                    }
                    return Ok(Some((frame_offset, record)));
                }
                Err(err) if err.is_eof() => {
                    if !self.fill_buffer()? {
                        tracing::warn!(
                            segment = %self.segment_id,
                            offset = frame_offset,
                            size = self.size,
                            "torn frame at end of segment"
                        );
                        self.torn_tail = Some(frame_offset);
                        self.finished = true;
                        return Ok(None);
                    }
                }
                Err(err) => {
                    self.finished = true;
                    return Err(CoreError::decode(self.segment_id, frame_offset, err));
                }
            }
        }
    }
}

impl Iterator for SegmentScanner {
    type Item = CoreResult<(u64, OpRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

impl std::fmt::Debug for SegmentScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentScanner")
            .field("segment_id", &self.segment_id)
            .field("size", &self.size)
            .field("offset", &self.offset)
            .field("frames", &self.frames)
            .field("sealed", &self.sealed)
            .field("torn_tail", &self.torn_tail)
            .finish_non_exhaustive()
    }
}

/// Lazily decodes records across consecutive segments.
///
/// Yields `CoreResult<ScannedRecord>`. The first error ends the scan; later
/// segments are not read since per-mailbox order cannot be trusted across a
/// gap. Restart from any segment boundary with [`LogReader::scan_from`].
pub struct LogScanner<'a> {
    store: &'a dyn SegmentStore,
    pending: VecDeque<SegmentId>,
    current: Option<SegmentScanner>,
    log_id: Option<Uuid>,
    expected_next: Option<SegmentId>,
    last_completed: Option<SegmentId>,
    torn_tails: Vec<(SegmentId, u64)>,
    failed: Option<SegmentId>,
    finished: bool,
}

impl<'a> LogScanner<'a> {
    fn new(store: &'a dyn SegmentStore, segments: Vec<SegmentId>) -> Self {
        Self {
            store,
            pending: segments.into(),
            current: None,
            log_id: None,
            expected_next: None,
            last_completed: None,
            torn_tails: Vec::new(),
            failed: None,
            finished: false,
        }
    }

    /// Last segment read to its end without error.
    #[must_use]
    pub fn last_completed_segment(&self) -> Option<SegmentId> {
        self.last_completed
    }

    /// Segment currently being scanned.
    #[must_use]
    pub fn current_segment(&self) -> Option<SegmentId> {
        self.current.as_ref().map(SegmentScanner::segment_id)
    }

    /// Segment whose decode error ended the scan.
    #[must_use]
    pub fn failed_segment(&self) -> Option<SegmentId> {
        self.failed
    }

    /// Torn tails found so far.
    #[must_use]
    pub fn torn_tails(&self) -> &[(SegmentId, u64)] {
        &self.torn_tails
    }

    fn fail(&mut self, segment_id: SegmentId, err: CoreError) -> Option<CoreResult<ScannedRecord>> {
        tracing::error!(segment = %segment_id, error = %err, "log scan stopped");
        self.failed = Some(segment_id);
        self.finished = true;
        self.current = None;
        Some(Err(err))
    }

    fn open_next(&mut self, id: SegmentId) -> CoreResult<SegmentScanner> {
        if let Some(expected) = self.expected_next {
            if expected != id {
                return Err(CoreError::decode(
                    id,
                    0,
                    DecodeError::BadSegmentHeader(format!(
                        "previous segment was sealed into {expected}"
                    )),
                ));
            }
        }
        let scanner = SegmentScanner::open(id, self.store.read_segment(id)?)?;
        if let Some(header) = scanner.header() {
            match self.log_id {
                None => self.log_id = Some(header.log_id),
                Some(log_id) if log_id != header.log_id => {
                    return Err(CoreError::decode(id, 0, DecodeError::ForeignSegment));
                }
                Some(_) => {}
            }
        }
        tracing::debug!(segment = %id, size = scanner.size(), "scanning segment");
        Ok(scanner)
    }
}

impl Iterator for LogScanner<'_> {
    type Item = CoreResult<ScannedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }
            if self.current.is_none() {
                let Some(id) = self.pending.pop_front() else {
                    self.finished = true;
                    return None;
                };
                match self.open_next(id) {
                    Ok(scanner) => self.current = Some(scanner),
                    Err(err) => return self.fail(id, err),
                }
            }
            let Some(scanner) = self.current.as_mut() else {
                continue;
            };
            let segment_id = scanner.segment_id();
            match scanner.next() {
                Some(Ok((offset, record))) => {
                    return Some(Ok(ScannedRecord {
                        segment_id,
                        offset,
                        record,
                    }));
                }
                Some(Err(err)) => return self.fail(segment_id, err),
                None => {
                    if let Some(torn) = scanner.torn_tail() {
                        self.torn_tails.push((segment_id, torn));
                    }
                    self.expected_next = scanner.sealed().map(|s| s.next_segment_id);
                    self.last_completed = Some(segment_id);
                    self.current = None;
                }
            }
        }
    }
}

/// Summary of one segment, as shown by operator tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentInfo {
    /// Segment id.
    pub segment_id: SegmentId,
    /// File size in bytes.
    pub size: u64,
    /// Creation time from the header, if the header is complete.
    pub created_at_ms: Option<i64>,
    /// Log identity from the header.
    pub log_id: Option<String>,
    /// Frames decoded.
    pub frames: u64,
    /// Whether the segment ends with a seal record.
    pub sealed: bool,
    /// Offset of a torn trailing frame.
    pub torn_tail: Option<u64>,
    /// Decode error that stopped the inspection.
    pub error: Option<String>,
}

/// Read access to a log's segments.
#[derive(Clone, Copy)]
pub struct LogReader<'a> {
    store: &'a dyn SegmentStore,
}

impl<'a> LogReader<'a> {
    /// Creates a reader over `store`.
    #[must_use]
    pub fn new(store: &'a dyn SegmentStore) -> Self {
        Self { store }
    }

    /// Existing segments in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    pub fn segments(&self) -> CoreResult<Vec<SegmentId>> {
        self.store.list_segments()
    }

    /// Scans every segment from the oldest.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    pub fn scan_all(&self) -> CoreResult<LogScanner<'a>> {
        Ok(LogScanner::new(self.store, self.segments()?))
    }

    /// Scans segments with id `from` and above.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    pub fn scan_from(&self, from: SegmentId) -> CoreResult<LogScanner<'a>> {
        let segments = self.segments()?.into_iter().filter(|id| *id >= from).collect();
        Ok(LogScanner::new(self.store, segments))
    }

    /// Scans one segment on its own.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment cannot be opened or its header is
    /// invalid.
    pub fn scan_segment(&self, id: SegmentId) -> CoreResult<SegmentScanner> {
        SegmentScanner::open(id, self.store.read_segment(id)?)
    }

    /// Decodes one segment fully and summarizes it.
    ///
    /// Decode errors are reported in [`SegmentInfo::error`] rather than
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns an error only if the segment cannot be read at all.
    pub fn inspect(&self, id: SegmentId) -> CoreResult<SegmentInfo> {
        let backend = self.store.read_segment(id)?;
        let size = backend.size()?;
        let mut scanner = match SegmentScanner::open(id, backend) {
            Ok(scanner) => scanner,
            Err(err) if err.is_decode() => {
                return Ok(SegmentInfo {
                    segment_id: id,
                    size,
                    created_at_ms: None,
                    log_id: None,
                    frames: 0,
                    sealed: false,
                    torn_tail: None,
                    error: Some(err.to_string()),
                });
            }
            Err(err) => return Err(err),
        };
        let mut error = None;
        for item in scanner.by_ref() {
            if let Err(err) = item {
                if !err.is_decode() {
                    return Err(err);
                }
                error = Some(err.to_string());
                break;
            }
        }
        Ok(SegmentInfo {
            segment_id: id,
            size,
            created_at_ms: scanner.header().map(|h| h.created_at_ms),
            log_id: scanner.header().map(|h| h.log_id.to_string()),
            frames: scanner.frames(),
            sealed: scanner.sealed().is_some(),
            torn_tail: scanner.torn_tail(),
            error,
        })
    }
}

impl std::fmt::Debug for LogReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogReader").finish_non_exhaustive()
    }
}
