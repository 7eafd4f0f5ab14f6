//! Marker records. They are logged for their position in the stream and
//! never mutate a mailbox.

use super::{redact, ApplyOutcome, OpBody, RecordKind};
use crate::codec::{FrameReader, FrameWriter};
use crate::error::{CoreResult, DecodeError, DecodeResult};
use crate::target::{MailboxTarget, TargetResult};
use crate::types::SegmentId;

/// Backup boundary. Everything logged before it is covered by the backup
/// named `label`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupMarker {
    /// Backup label.
    pub label: String,
    /// When the backup was taken, in milliseconds since the epoch.
    pub marked_at_ms: i64,
}

impl BackupMarker {
    /// Creates a backup marker.
    pub fn new(label: impl Into<String>, marked_at_ms: i64) -> Self {
        Self {
            label: label.into(),
            marked_at_ms,
        }
    }
}

impl OpBody for BackupMarker {
    const KIND: RecordKind = RecordKind::BackupMarker;

    fn encode(&self, w: &mut FrameWriter) -> CoreResult<()> {
        w.put_str(&self.label)?;
        w.put_i64(self.marked_at_ms);
        Ok(())
    }

    fn decode(r: &mut FrameReader<'_>) -> DecodeResult<Self> {
        Ok(Self {
            label: r.get_str("label")?,
            marked_at_ms: r.get_i64()?,
        })
    }

    fn apply(&self, _target: &mut dyn MailboxTarget) -> TargetResult<ApplyOutcome> {
        Ok(ApplyOutcome::NoOp)
    }

    fn describe(&self) -> String {
        format!("backup {} at {}", redact::text(&self.label), self.marked_at_ms)
    }
}

/// Last record of a full segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SealSegment {
    /// Segment being sealed.
    pub segment_id: SegmentId,
    /// Segment the log continues in.
    pub next_segment_id: SegmentId,
}

impl SealSegment {
    /// Seals `segment_id`, continuing in the following segment.
    #[must_use]
    pub const fn new(segment_id: SegmentId) -> Self {
        Self {
            segment_id,
            next_segment_id: segment_id.next(),
        }
    }
}

impl OpBody for SealSegment {
    const KIND: RecordKind = RecordKind::SealSegment;

    fn encode(&self, w: &mut FrameWriter) -> CoreResult<()> {
        w.put_u64(self.segment_id.as_u64());
        w.put_u64(self.next_segment_id.as_u64());
        Ok(())
    }

    fn decode(r: &mut FrameReader<'_>) -> DecodeResult<Self> {
        let segment_id = SegmentId::new(r.get_u64()?);
        let next_segment_id = SegmentId::new(r.get_u64()?);
        if next_segment_id <= segment_id {
            return Err(DecodeError::InvalidValue {
                field: "next_segment_id",
                value: i64::try_from(next_segment_id.as_u64()).unwrap_or(i64::MAX),
            });
        }
        Ok(Self {
            segment_id,
            next_segment_id,
        })
    }

    fn apply(&self, _target: &mut dyn MailboxTarget) -> TargetResult<ApplyOutcome> {
        Ok(ApplyOutcome::NoOp)
    }

    fn describe(&self) -> String {
        format!("seal {} (next {})", self.segment_id, self.next_segment_id)
    }
}
