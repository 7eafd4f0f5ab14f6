//! Calendar records.

use super::{ApplyOutcome, OpBody, RecordKind};
use crate::codec::{FrameReader, FrameWriter};
use crate::error::{CoreResult, DecodeResult};
use crate::target::{MailboxTarget, TargetResult};
use crate::types::ItemId;

/// Dismisses the pending alarm of a calendar item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DismissCalendarAlarm {
    /// Appointment or task whose alarm was dismissed.
    pub item_id: ItemId,
    /// When the user dismissed it, in milliseconds since the epoch.
    pub dismissed_at_ms: i64,
}

impl OpBody for DismissCalendarAlarm {
    const KIND: RecordKind = RecordKind::DismissCalendarAlarm;

    fn encode(&self, w: &mut FrameWriter) -> CoreResult<()> {
        w.put_item_id(self.item_id);
        w.put_i64(self.dismissed_at_ms);
        Ok(())
    }

    fn decode(r: &mut FrameReader<'_>) -> DecodeResult<Self> {
        Ok(Self {
            item_id: r.get_item_id()?,
            dismissed_at_ms: r.get_i64()?,
        })
    }

    fn apply(&self, target: &mut dyn MailboxTarget) -> TargetResult<ApplyOutcome> {
        target.apply_dismiss_alarm(self)?;
        Ok(ApplyOutcome::Applied)
    }

    fn describe(&self) -> String {
        format!("dismiss alarm on {} at {}", self.item_id, self.dismissed_at_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FormatVersion;

    #[test]
    fn fixed_width_layout() {
        let op = DismissCalendarAlarm {
            item_id: ItemId::new(42),
            dismissed_at_ms: 1_700_000_123_456,
        };
        let mut w = FrameWriter::new(FormatVersion::V1_0);
        op.encode(&mut w).unwrap();
        let bytes = w.into_vec();
        assert_eq!(bytes.len(), 12);

        let mut r = FrameReader::new(&bytes, FormatVersion::V1_0);
        assert_eq!(DismissCalendarAlarm::decode(&mut r).unwrap(), op);
    }
}
