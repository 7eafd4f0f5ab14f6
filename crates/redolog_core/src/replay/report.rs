//! Replay outcome reporting.

use crate::record::RecordKind;
use crate::target::TargetErrorClass;
use crate::types::{MailboxId, SegmentId, TransactionId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Replay state of one mailbox.
///
/// `Idle -> Replaying -> {Complete | Aborted}`. A mailbox enters
/// `Replaying` when its first record is resolved and stays there until the
/// pass ends. If the pass was cancelled, mailboxes still `Replaying` in the
/// report were interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReplayState {
    /// No record for the mailbox has been resolved.
    Idle,
    /// The mailbox is held and records are being applied.
    Replaying,
    /// Every record for the mailbox was applied or absorbed.
    Complete,
    /// A record failed; later records for the mailbox were not applied.
    Aborted,
}

/// Why a record was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// The mailbox no longer exists.
    MailboxNotFound,
    /// The record's transaction id does not follow the last one replayed for
    /// its mailbox.
    OutOfOrder {
        /// Last transaction id replayed for the mailbox.
        last: TransactionId,
    },
}

/// A record replay did not apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    /// Segment holding the record.
    pub segment_id: SegmentId,
    /// Offset within the segment.
    pub offset: u64,
    /// Mailbox the record targets.
    pub mailbox_id: MailboxId,
    /// Transaction id.
    pub transaction_id: TransactionId,
    /// Record kind.
    pub kind: RecordKind,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// A mailbox whose replay stopped at a failing record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbortedMailbox {
    /// The mailbox.
    pub mailbox_id: MailboxId,
    /// Segment of the failing record.
    pub segment_id: SegmentId,
    /// Offset of the failing record.
    pub offset: u64,
    /// Transaction id of the failing record.
    pub transaction_id: TransactionId,
    /// Kind of the failing record.
    pub kind: RecordKind,
    /// The first fatal error.
    pub error: String,
    /// Class of the error, if the target raised it.
    pub error_class: Option<TargetErrorClass>,
    /// Later records for the mailbox that were not replayed.
    pub records_not_replayed: u64,
}

/// A decode or storage failure that ended the scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentFailure {
    /// Segment being read, if known.
    pub segment_id: Option<SegmentId>,
    /// Offset of the bad frame, if known.
    pub offset: Option<u64>,
    /// The error.
    pub error: String,
}

/// Everything a replay pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    /// Records read from the log.
    pub records_seen: u64,
    /// Records whose mutation was performed.
    pub applied: u64,
    /// Records the mailbox already reflected.
    pub absorbed: u64,
    /// Marker records passed over.
    pub markers: u64,
    /// Records not applied, in log order.
    pub skipped: Vec<SkippedRecord>,
    /// Mailboxes whose replay aborted.
    pub aborted: Vec<AbortedMailbox>,
    /// Failures that ended the scan.
    pub segment_failures: Vec<SegmentFailure>,
    /// Final state of every mailbox that left `Idle`.
    pub mailboxes: BTreeMap<MailboxId, ReplayState>,
    /// Whether the pass was cancelled.
    pub cancelled: bool,
    /// Segment to rescan from after cancellation.
    pub resume_from: Option<SegmentId>,
    /// Last segment whose records were all dispatched.
    pub last_completed_segment: Option<SegmentId>,
}

impl ReplayReport {
    /// Returns true if nothing was skipped, aborted or left unread.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
            && self.aborted.is_empty()
            && self.segment_failures.is_empty()
            && !self.cancelled
    }

    /// Final state of `mailbox_id`.
    #[must_use]
    pub fn state_of(&self, mailbox_id: MailboxId) -> ReplayState {
        self.mailboxes
            .get(&mailbox_id)
            .copied()
            .unwrap_or(ReplayState::Idle)
    }

    /// Folds a worker's per-mailbox results into this report.
    ///
    /// Workers own disjoint mailboxes, so nothing is double counted.
    pub fn merge(&mut self, other: Self) {
        self.records_seen += other.records_seen;
        self.applied += other.applied;
        self.absorbed += other.absorbed;
        self.markers += other.markers;
        self.skipped.extend(other.skipped);
        self.aborted.extend(other.aborted);
        self.segment_failures.extend(other.segment_failures);
        self.mailboxes.extend(other.mailboxes);
        self.skipped.sort_by_key(|s| (s.segment_id, s.offset));
        self.aborted.sort_by_key(|a| a.mailbox_id);
    }
}

impl fmt::Display for ReplayReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records: {} applied, {} absorbed, {} markers, {} skipped, {} mailboxes aborted",
            self.records_seen,
            self.applied,
            self.absorbed,
            self.markers,
            self.skipped.len(),
            self.aborted.len()
        )?;
        if !self.segment_failures.is_empty() {
            write!(f, ", scan failed")?;
        }
        if self.cancelled {
            write!(f, ", cancelled")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_sums_and_orders() {
        let skipped = |seg: u64, offset: u64| SkippedRecord {
            segment_id: SegmentId::new(seg),
            offset,
            mailbox_id: MailboxId::new(1),
            transaction_id: TransactionId::new(1, 0),
            kind: RecordKind::AlterItemTag,
            reason: SkipReason::MailboxNotFound,
        };
        let mut a = ReplayReport {
            applied: 2,
            skipped: vec![skipped(2, 10)],
            ..ReplayReport::default()
        };
        a.mailboxes.insert(MailboxId::new(1), ReplayState::Complete);
        let mut b = ReplayReport {
            applied: 3,
            absorbed: 1,
            skipped: vec![skipped(1, 50)],
            ..ReplayReport::default()
        };
        b.mailboxes.insert(MailboxId::new(2), ReplayState::Aborted);

        a.merge(b);
        assert_eq!(a.applied, 5);
        assert_eq!(a.absorbed, 1);
        assert_eq!(a.skipped[0].segment_id, SegmentId::new(1));
        assert_eq!(a.state_of(MailboxId::new(2)), ReplayState::Aborted);
        assert_eq!(a.state_of(MailboxId::new(3)), ReplayState::Idle);
        assert!(!a.is_clean());
    }

    #[test]
    fn serializes_to_json() {
        let mut report = ReplayReport::default();
        report.mailboxes.insert(MailboxId::new(7), ReplayState::Complete);
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"7\":\"Complete\""));
    }
}
