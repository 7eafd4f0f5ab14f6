//! Segmented write-ahead log.
//!
//! The log is a sequence of segments. Exactly one, the newest, accepts
//! appends; every older one ends with a seal record naming its successor.
//! Frames carry no checksum or length prefix, so a crash mid-append leaves a
//! torn trailing frame that readers detect as an early end of input and
//! treat as the end of the segment.
//!
//! - [`LogWriter`] appends and rotates
//! - [`LogReader`] and [`LogScanner`] decode lazily, restartable at any
//!   segment boundary
//! - [`SegmentStore`] abstracts where segment bytes live

mod dir;
mod memory;
mod scanner;
mod segment;
mod writer;

pub use dir::{LogDir, SegmentStore};
pub use memory::MemorySegmentStore;
pub use scanner::{LogReader, LogScanner, ScannedRecord, SegmentInfo, SegmentScanner};
pub use segment::{
    SealedSegment, SegmentHandle, SegmentHeader, SEGMENT_HEADER_LEN, SEGMENT_HEADER_VERSION,
    SEGMENT_MAGIC,
};
pub use writer::{CommitToken, LogWriter};
